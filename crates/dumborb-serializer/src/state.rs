//! Traversal State
//!
//! Per-operation bookkeeping that turns repeated and circular references into
//! fixups instead of infinite recursion.
//!
//! # Outbound
//!
//! [`MarshalState`] is keyed by value identity ([`ObjectId`]). A value is
//! stored *before* its children are visited, so a child pointing back at an
//! ancestor is seen as circular; once conversion completes the entry is
//! marked converted, and any later sighting is a duplicate. Scalars have no
//! identity; policies that fix them up key them by value instead.
//!
//! # Inbound
//!
//! [`UnmarshalState`] is keyed by position in the wire value. It is built
//! from the fixups carried by the envelope: the positions fixups point at are
//! tracked, and the fixup locations redirect to them. Containers attach their
//! empty shell before filling in children, so a cyclic fixup resolves to the
//! very value under construction. The state is generic over what it records:
//! real unmarshalling records values, speculative scoring records
//! [`Match`](crate::Match) scores and never touches a real state.
//!
//! States are plain owned structs. They belong to one pass and are never
//! shared between threads.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value as JsonValue;

use dumborb_common::{DumborbError, Fixup, ObjectId, Path, PathSegment, Result, Value};

use crate::serializer::FixupPolicy;

/// Outcome of an outbound identity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sighting {
    New,
    /// Seen and still being converted: a back edge
    Circular(Path),
    /// Seen and fully converted: a shared instance
    Duplicate(Path),
}

/// Value key of a scalar, for policies that fix up repeated scalars.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ScalarKey {
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(String),
}

impl ScalarKey {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(ScalarKey::Bool(*b)),
            Value::Int(i) => Some(ScalarKey::Int(*i)),
            Value::Float(f) => Some(ScalarKey::Float(f.to_bits())),
            Value::Str(s) => Some(ScalarKey::Str(s.clone())),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Seen {
    original: Path,
    converted: bool,
}

/// Outbound traversal state.
#[derive(Debug)]
pub struct MarshalState {
    policy: FixupPolicy,
    max_depth: usize,
    path: Path,
    seen: HashMap<ObjectId, Seen>,
    // First location of each scalar.
    scalars: HashMap<ScalarKey, Path>,
    // Keeps every keyed value alive so its ObjectId cannot be reused.
    pinned: Vec<Value>,
    fixups: Vec<Fixup>,
}

impl MarshalState {
    pub fn new(policy: FixupPolicy, max_depth: usize) -> Self {
        Self {
            policy,
            max_depth,
            path: Path::new(),
            seen: HashMap::new(),
            scalars: HashMap::new(),
            pinned: Vec::new(),
            fixups: Vec::new(),
        }
    }

    pub fn policy(&self) -> FixupPolicy {
        self.policy
    }

    /// Current location, relative to the root value.
    pub fn path(&self) -> &[PathSegment] {
        &self.path
    }

    /// Descends into a child position.
    ///
    /// # Errors
    ///
    /// Returns `DumborbError::Marshal` when the maximum depth is exceeded.
    pub fn enter(&mut self, segment: PathSegment) -> Result<()> {
        if self.path.len() >= self.max_depth {
            return Err(DumborbError::Marshal(format!(
                "maximum nesting depth {} exceeded",
                self.max_depth
            )));
        }
        self.path.push(segment);
        Ok(())
    }

    pub fn leave(&mut self) {
        self.path.pop();
    }

    /// Looks a value up by identity, or by value for scalars when the policy
    /// fixes them up. Everything else, and every value in an untracked
    /// pass, is new.
    pub fn check_seen(&self, value: &Value) -> Sighting {
        if !self.policy.tracks() {
            return Sighting::New;
        }
        let Some(id) = value.identity() else {
            return match self.scalar_key(value).and_then(|key| self.scalars.get(&key)) {
                Some(original) => Sighting::Duplicate(original.clone()),
                None => Sighting::New,
            };
        };
        match self.seen.get(&id) {
            None => Sighting::New,
            Some(seen) if seen.converted => Sighting::Duplicate(seen.original.clone()),
            Some(seen) => Sighting::Circular(seen.original.clone()),
        }
    }

    /// Records the value at the current location, before its children.
    ///
    /// Storing an already converted value again restarts it at the current
    /// location; this is how duplicates are re-serialized when only circular
    /// references are fixed up.
    pub fn store(&mut self, value: &Value) {
        if !self.policy.tracks() {
            return;
        }
        let Some(id) = value.identity() else {
            if let Some(key) = self.scalar_key(value) {
                let path = self.path.clone();
                self.scalars.entry(key).or_insert(path);
            }
            return;
        };
        let entry = Seen {
            original: self.path.clone(),
            converted: false,
        };
        if self.seen.insert(id, entry).is_none() {
            self.pinned.push(value.clone());
        }
    }

    fn scalar_key(&self, value: &Value) -> Option<ScalarKey> {
        if self.policy.fixes_scalars() {
            ScalarKey::of(value)
        } else {
            None
        }
    }

    pub fn mark_converted(&mut self, value: &Value) {
        if let Some(seen) = value.identity().and_then(|id| self.seen.get_mut(&id)) {
            seen.converted = true;
        }
    }

    /// Emits a fixup from the current location to `original`.
    pub fn add_fixup(&mut self, original: Path) {
        tracing::debug!("fixup {:?} -> {:?}", self.path, original);
        self.fixups.push(Fixup::new(self.path.clone(), original));
    }

    pub fn fixups(&self) -> &[Fixup] {
        &self.fixups
    }

    pub fn into_fixups(self) -> Vec<Fixup> {
        self.fixups
    }
}

/// Outcome of an inbound position check.
#[derive(Debug, Clone, PartialEq)]
pub enum Position<T> {
    /// Nothing recorded; convert the wire value here
    New,
    /// A fixup or tracked position whose value is already available
    Converted(T),
    /// A fixup pointing at a value still being converted without a shell
    InProgress,
    /// A fixup pointing at a position not visited yet
    Forward(Path),
}

#[derive(Debug)]
enum Slot<T> {
    InProgress,
    Converted(T),
}

/// Inbound traversal state.
#[derive(Debug)]
pub struct UnmarshalState<T> {
    root: Arc<JsonValue>,
    redirects: HashMap<Path, Path>,
    tracked: HashSet<Path>,
    slots: HashMap<Path, Slot<T>>,
    path: Path,
    max_depth: usize,
}

/// Follows `path` into a wire value.
pub fn wire_at<'a>(root: &'a JsonValue, path: &[PathSegment]) -> Option<&'a JsonValue> {
    path.iter().try_fold(root, |node, segment| match segment {
        PathSegment::Index(i) => node.as_array().and_then(|items| items.get(*i)),
        PathSegment::Key(key) => node.as_object().and_then(|map| map.get(key)),
    })
}

impl<T: Clone> UnmarshalState<T> {
    /// Creates a state for the wire value `root`.
    ///
    /// # Errors
    ///
    /// Returns `DumborbError::Fixup` if a fixup has an empty location, points
    /// at itself or at a position inside its own location, chains onto
    /// another fixup, repeats a location, or names an original that does not
    /// exist in `root`. With tracking disabled the fixups are ignored.
    pub fn new(
        root: Arc<JsonValue>,
        fixups: &[Fixup],
        policy: FixupPolicy,
        max_depth: usize,
    ) -> Result<Self> {
        let mut redirects = HashMap::new();
        let mut tracked = HashSet::new();
        if policy.tracks() {
            for fixup in fixups {
                if fixup.location.is_empty() {
                    return Err(DumborbError::Fixup("fixup location is empty".into()));
                }
                if fixup.original.starts_with(&fixup.location) {
                    return Err(DumborbError::Fixup(format!(
                        "fixup original {:?} lies inside its location {:?}",
                        fixup.original, fixup.location
                    )));
                }
                if wire_at(&root, &fixup.original).is_none() {
                    return Err(DumborbError::Fixup(format!(
                        "fixup original {:?} not found",
                        fixup.original
                    )));
                }
                if redirects
                    .insert(fixup.location.clone(), fixup.original.clone())
                    .is_some()
                {
                    return Err(DumborbError::Fixup(format!(
                        "duplicate fixup location {:?}",
                        fixup.location
                    )));
                }
                tracked.insert(fixup.original.clone());
            }
            if let Some(chained) = tracked.iter().find(|original| redirects.contains_key(*original)) {
                return Err(DumborbError::Fixup(format!(
                    "fixup original {:?} is itself a fixup location",
                    chained
                )));
            }
        }
        Ok(Self {
            root,
            redirects,
            tracked,
            slots: HashMap::new(),
            path: Path::new(),
            max_depth,
        })
    }

    pub fn root(&self) -> Arc<JsonValue> {
        Arc::clone(&self.root)
    }

    pub fn path(&self) -> &[PathSegment] {
        &self.path
    }

    /// Descends into a child position.
    ///
    /// # Errors
    ///
    /// Returns `DumborbError::Unmarshal` when the maximum depth is exceeded.
    pub fn enter(&mut self, segment: PathSegment) -> Result<()> {
        if self.path.len() >= self.max_depth {
            return Err(DumborbError::Unmarshal(format!(
                "maximum nesting depth {} exceeded",
                self.max_depth
            )));
        }
        self.path.push(segment);
        Ok(())
    }

    pub fn leave(&mut self) {
        self.path.pop();
    }

    /// Replaces the current location, returning the previous one.
    pub fn relocate(&mut self, path: Path) -> Path {
        std::mem::replace(&mut self.path, path)
    }

    /// Checks the current position, storing it as in progress on first sight
    /// if it is tracked.
    pub fn check_seen(&mut self) -> Position<T> {
        if let Some(original) = self.redirects.get(&self.path) {
            return match self.slots.get(original) {
                Some(Slot::Converted(value)) => Position::Converted(value.clone()),
                Some(Slot::InProgress) => Position::InProgress,
                None => Position::Forward(original.clone()),
            };
        }
        if !self.tracked.contains(&self.path) {
            return Position::New;
        }
        match self.slots.get(&self.path) {
            Some(Slot::Converted(value)) => Position::Converted(value.clone()),
            Some(Slot::InProgress) => Position::InProgress,
            None => {
                self.slots.insert(self.path.clone(), Slot::InProgress);
                Position::New
            }
        }
    }

    /// Attaches the converted value (or its still empty shell) to the
    /// current position. Untracked positions are ignored.
    pub fn mark_converted(&mut self, value: T) {
        if self.tracked.contains(&self.path) {
            self.slots.insert(self.path.clone(), Slot::Converted(value));
        }
    }
}
