//! Reference Manager
//!
//! Values of opted-in classes cross the wire as opaque handles instead of
//! being copied:
//!
//! ```json
//! {"JSONRPCType": "CallableReference", "$type": "Counter", "objectID": 3}
//! ```
//!
//! # Handles
//!
//! [`ReferenceTable`] mints handles from a counter starting at 1 and keeps
//! the referenced value alive for the life of its scope, so a handle stays
//! valid across calls and the same value always gets the same handle.
//!
//! # Plain vs Callable
//!
//! A plain reference only resolves back to its value when passed as an
//! argument. A callable reference additionally exposes the value's instance
//! methods as `.obj[<handle>].<method>`.
//!
//! # Opt-in
//!
//! [`ReferencePolicy`] records which classes are passed by reference. A value
//! qualifies if its runtime class or any of its supertypes, walked
//! transitively, was registered. Plain registrations are checked first.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value as JsonValue};

use dumborb_common::protocol::envelope::{OBJECT_ID, REFERENCE_TAG, TYPE_HINT};
use dumborb_common::{DumborbError, ObjectId, Result, Type, Value};
use dumborb_serializer::{ClassCatalog, Converter, Match, MarshalState, ScoreState, Serializer, ValueState};

const PLAIN_TAG: &str = "Reference";
const CALLABLE_TAG: &str = "CallableReference";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    Plain,
    Callable,
}

impl ReferenceKind {
    fn tag(self) -> &'static str {
        match self {
            ReferenceKind::Plain => PLAIN_TAG,
            ReferenceKind::Callable => CALLABLE_TAG,
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            PLAIN_TAG => Some(ReferenceKind::Plain),
            CALLABLE_TAG => Some(ReferenceKind::Callable),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Entry {
    value: Value,
    kind: ReferenceKind,
}

#[derive(Debug)]
struct Table {
    by_identity: HashMap<ObjectId, u64>,
    entries: HashMap<u64, Entry>,
    next: u64,
}

/// Handle table of one scope.
#[derive(Debug)]
pub struct ReferenceTable {
    inner: Mutex<Table>,
}

impl Default for ReferenceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Table {
                by_identity: HashMap::new(),
                entries: HashMap::new(),
                next: 1,
            }),
        }
    }

    /// Returns the handle of `value`, minting one on first sight.
    ///
    /// Minting a callable reference for a value already held as a plain one
    /// upgrades the entry.
    ///
    /// # Errors
    ///
    /// Returns `DumborbError::Marshal` if `value` has no identity.
    pub fn mint(&self, value: &Value, kind: ReferenceKind) -> Result<u64> {
        let id = value.identity().ok_or_else(|| {
            DumborbError::Marshal(format!("{} cannot be passed by reference", value.kind_name()))
        })?;
        let mut table = self.inner.lock();
        if let Some(handle) = table.by_identity.get(&id).copied() {
            if let Some(entry) = table.entries.get_mut(&handle) {
                if kind == ReferenceKind::Callable {
                    entry.kind = kind;
                }
            }
            return Ok(handle);
        }
        let handle = table.next;
        table.next += 1;
        table.by_identity.insert(id, handle);
        table.entries.insert(
            handle,
            Entry {
                value: value.clone(),
                kind,
            },
        );
        tracing::debug!("minted {:?} reference {} for {}", kind, handle, value.kind_name());
        Ok(handle)
    }

    /// # Errors
    ///
    /// Returns `DumborbError::NoSuchObject` for an unknown handle.
    pub fn resolve(&self, handle: u64) -> Result<Value> {
        self.inner
            .lock()
            .entries
            .get(&handle)
            .map(|entry| entry.value.clone())
            .ok_or(DumborbError::NoSuchObject(handle))
    }

    /// Resolves a handle whose methods may be called remotely.
    ///
    /// # Errors
    ///
    /// Returns `DumborbError::NoSuchObject` for an unknown handle or one that
    /// is only a plain reference.
    pub fn resolve_callable(&self, handle: u64) -> Result<Value> {
        match self.inner.lock().entries.get(&handle) {
            Some(entry) if entry.kind == ReferenceKind::Callable => Ok(entry.value.clone()),
            _ => Err(DumborbError::NoSuchObject(handle)),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Classes passed by reference in one scope.
#[derive(Debug, Default)]
pub struct ReferencePolicy {
    plain: RwLock<BTreeSet<Arc<str>>>,
    callable: RwLock<BTreeSet<Arc<str>>>,
}

impl ReferencePolicy {
    pub fn add(&self, class: &str, kind: ReferenceKind) {
        let set = match kind {
            ReferenceKind::Plain => &self.plain,
            ReferenceKind::Callable => &self.callable,
        };
        set.write().insert(Arc::from(class));
    }

    /// How values of `class` are passed, if by reference at all.
    pub fn kind_of(&self, catalog: &ClassCatalog, class: &str) -> Option<ReferenceKind> {
        let ancestors = catalog.ancestors(class);
        let plain = self.plain.read();
        if ancestors.iter().any(|c| plain.contains(c)) {
            return Some(ReferenceKind::Plain);
        }
        let callable = self.callable.read();
        if ancestors.iter().any(|c| callable.contains(c)) {
            return Some(ReferenceKind::Callable);
        }
        None
    }

    /// Registered callable reference classes, sorted.
    pub fn callable_classes(&self) -> Vec<Arc<str>> {
        self.callable.read().iter().cloned().collect()
    }
}

/// Marshals reference-eligible values as handles and resolves handles back.
///
/// Registered on a scope's serializer when references are first enabled.
pub struct ReferenceConverter {
    table: Arc<ReferenceTable>,
    policy: Arc<ReferencePolicy>,
}

impl ReferenceConverter {
    pub fn new(table: Arc<ReferenceTable>, policy: Arc<ReferencePolicy>) -> Self {
        Self { table, policy }
    }

    fn handle(wire: &JsonValue) -> Option<(ReferenceKind, u64)> {
        let object = wire.as_object()?;
        let kind = object
            .get(REFERENCE_TAG)
            .and_then(JsonValue::as_str)
            .and_then(ReferenceKind::from_tag)?;
        let handle = object.get(OBJECT_ID).and_then(JsonValue::as_u64)?;
        Some((kind, handle))
    }

    fn lookup(&self, ser: &Serializer, target: &Type, wire: &JsonValue) -> Result<Value> {
        let (_, handle) = Self::handle(wire)
            .ok_or_else(|| DumborbError::Unmarshal("malformed reference".into()))?;
        let value = self.table.resolve(handle)?;
        let fits = match target {
            Type::Class(name) => value
                .class_name()
                .is_some_and(|class| ser.catalog().is_assignable(class, name)),
            _ => true,
        };
        if fits {
            Ok(value)
        } else {
            Err(DumborbError::Unmarshal(format!(
                "reference {} is a {}, not a {}",
                handle,
                value.kind_name(),
                target
            )))
        }
    }
}

impl Converter for ReferenceConverter {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn can_marshal(&self, ser: &Serializer, value: &Value) -> bool {
        value
            .class_name()
            .is_some_and(|class| self.policy.kind_of(ser.catalog(), class).is_some())
    }

    fn can_unmarshal(&self, _ser: &Serializer, _target: &Type, wire: &JsonValue) -> bool {
        Self::handle(wire).is_some()
    }

    fn marshal(&self, ser: &Serializer, _state: &mut MarshalState, value: &Value) -> Result<JsonValue> {
        let class = value
            .class_name()
            .ok_or_else(|| DumborbError::Marshal(format!("{} has no class", value.kind_name())))?;
        let kind = self
            .policy
            .kind_of(ser.catalog(), class)
            .ok_or_else(|| DumborbError::Marshal(format!("{} is not passed by reference", class)))?;
        let handle = self.table.mint(value, kind)?;
        Ok(json!({
            REFERENCE_TAG: kind.tag(),
            TYPE_HINT: class,
            OBJECT_ID: handle,
        }))
    }

    fn try_unmarshal(
        &self,
        ser: &Serializer,
        _state: &mut ScoreState,
        target: &Type,
        wire: &JsonValue,
    ) -> Result<Match> {
        self.lookup(ser, target, wire).map(|_| Match::OKAY)
    }

    fn unmarshal(
        &self,
        ser: &Serializer,
        _state: &mut ValueState,
        target: &Type,
        wire: &JsonValue,
    ) -> Result<Value> {
        self.lookup(ser, target, wire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dumborb_serializer::ClassDescriptor;

    #[test]
    fn test_mint_reuses_handles() {
        let table = ReferenceTable::new();
        let a = Value::object("A", 1u32);
        let b = Value::object("A", 2u32);
        let first = table.mint(&a, ReferenceKind::Plain).unwrap();
        assert_eq!(first, 1);
        assert_eq!(table.mint(&a, ReferenceKind::Plain).unwrap(), first);
        assert_eq!(table.mint(&b, ReferenceKind::Plain).unwrap(), 2);
        assert!(table.resolve(first).unwrap().same(&a));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_unknown_handle_is_no_such_object() {
        let table = ReferenceTable::new();
        assert!(matches!(table.resolve(42), Err(DumborbError::NoSuchObject(42))));
    }

    #[test]
    fn test_callable_resolution_requires_callable_kind() {
        let table = ReferenceTable::new();
        let a = Value::object("A", ());
        let handle = table.mint(&a, ReferenceKind::Plain).unwrap();
        assert!(table.resolve_callable(handle).is_err());
        table.mint(&a, ReferenceKind::Callable).unwrap();
        assert!(table.resolve_callable(handle).unwrap().same(&a));
    }

    #[test]
    fn test_scalars_cannot_be_referenced() {
        let table = ReferenceTable::new();
        assert!(table.mint(&Value::Int(1), ReferenceKind::Plain).is_err());
    }

    #[test]
    fn test_policy_walks_supertypes() {
        let catalog = ClassCatalog::new();
        catalog.register(ClassDescriptor::interface("Remote")).unwrap();
        catalog.register(ClassDescriptor::opaque("Base").extends("Remote")).unwrap();
        catalog.register(ClassDescriptor::opaque("Leaf").extends("Base")).unwrap();

        let policy = ReferencePolicy::default();
        assert_eq!(policy.kind_of(&catalog, "Leaf"), None);
        policy.add("Remote", ReferenceKind::Callable);
        assert_eq!(policy.kind_of(&catalog, "Leaf"), Some(ReferenceKind::Callable));
        policy.add("Base", ReferenceKind::Plain);
        assert_eq!(policy.kind_of(&catalog, "Leaf"), Some(ReferenceKind::Plain));
        assert_eq!(policy.callable_classes(), vec![Arc::<str>::from("Remote")]);
    }
}
