//! Type-Directed Serializer
//!
//! The [`Serializer`] drives converters over whole value graphs.
//!
//! # Converter Lookup
//!
//! Marshalling picks a converter for the value's runtime shape, unmarshalling
//! one for the resolved target type. Both first consult an exact cache keyed
//! by [`TypeKey`]; a cache entry is only used if the converter also accepts
//! the value or type at hand. Otherwise the registered converters are
//! scanned, most recently registered first, so a later registration
//! overrides an earlier one.
//!
//! # Type Resolution
//!
//! On unmarshal a `$type` hint naming a registered class assignable to the
//! declared class wins over the declaration. With an `Any` target the hint
//! decides; without a hint the JSON shape does (a hintless object becomes a
//! map). Hints are read whatever `marshal_class_hints` says.
//!
//! # Wire Formats
//!
//! [`Serializer::encode_root`] lays a result out as configured by
//! [`WireFormat`]; [`Serializer::decode_params`] accepts either layout.
//!
//! # Nulls
//!
//! Marshalling null always emits JSON null without consulting a converter.
//! Unmarshalling JSON null yields [`Value::Null`] unless the target is a
//! non-nullable primitive, which is an error.

mod config;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value as JsonValue;

use dumborb_common::protocol::envelope::{DATE_HINT, LIST_HINT, MAP_HINT};
use dumborb_common::{DumborbError, Fixup, FlatObjects, PathSegment, Request, Result, Type, TypeKey, Value};

use crate::catalog::{ClassCatalog, ClassKind};
use crate::converters::{self, json_kind, type_hint, Converter};
use crate::flat;
use crate::matching::Match;
use crate::state::{wire_at, MarshalState, Position, Sighting, UnmarshalState};

pub use config::{FixupPolicy, SerializerConfig, WireFormat};

/// Inbound state of a real unmarshal pass.
pub type ValueState = UnmarshalState<Value>;
/// Inbound state of a speculative scoring pass.
pub type ScoreState = UnmarshalState<Match>;

/// A marshalled result, ready to go into a response envelope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Encoded {
    pub result: JsonValue,
    pub fixups: Vec<Fixup>,
    /// Object table of a flat result; empty otherwise
    pub objects: FlatObjects,
}

impl Encoded {
    /// A result that needs neither fixups nor flattening.
    pub fn plain(result: JsonValue) -> Self {
        Self {
            result,
            ..Self::default()
        }
    }
}

/// Marshals and unmarshals value graphs using registered converters.
pub struct Serializer {
    catalog: Arc<ClassCatalog>,
    config: SerializerConfig,
    converters: RwLock<Vec<Arc<dyn Converter>>>,
    exact: RwLock<HashMap<TypeKey, Arc<dyn Converter>>>,
}

impl Serializer {
    /// Creates a serializer with the built-in converters registered.
    pub fn new(catalog: Arc<ClassCatalog>, config: SerializerConfig) -> Self {
        let serializer = Self {
            catalog,
            config,
            converters: RwLock::new(Vec::new()),
            exact: RwLock::new(HashMap::new()),
        };
        for converter in converters::defaults() {
            serializer.register_converter(converter);
        }
        serializer
    }

    /// Registers a converter. It takes precedence over every converter
    /// registered before it.
    pub fn register_converter(&self, converter: Arc<dyn Converter>) {
        {
            let mut exact = self.exact.write();
            for key in converter.keys() {
                exact.insert(*key, Arc::clone(&converter));
            }
        }
        tracing::debug!("registered {} converter", converter.name());
        self.converters.write().push(converter);
    }

    pub fn catalog(&self) -> &Arc<ClassCatalog> {
        &self.catalog
    }

    pub fn config(&self) -> &SerializerConfig {
        &self.config
    }

    pub fn marshal_state(&self) -> MarshalState {
        MarshalState::new(self.config.fixup_policy, self.config.max_depth)
    }

    /// Creates the state for unmarshalling `root`, validating `fixups`.
    ///
    /// # Errors
    ///
    /// Returns `DumborbError::Fixup` for invalid fixups.
    pub fn value_state(&self, root: Arc<JsonValue>, fixups: &[Fixup]) -> Result<ValueState> {
        UnmarshalState::new(root, fixups, self.config.fixup_policy, self.config.max_depth)
    }

    /// Creates a disposable state for scoring against `root`.
    ///
    /// # Errors
    ///
    /// Returns `DumborbError::Fixup` for invalid fixups.
    pub fn score_state(&self, root: Arc<JsonValue>, fixups: &[Fixup]) -> Result<ScoreState> {
        UnmarshalState::new(root, fixups, self.config.fixup_policy, self.config.max_depth)
    }

    /// Marshals a whole value, returning the wire value and its fixups.
    pub fn marshal_root(&self, value: &Value) -> Result<(JsonValue, Vec<Fixup>)> {
        let mut state = self.marshal_state();
        let wire = self.marshal(&mut state, value)?;
        Ok((wire, state.into_fixups()))
    }

    /// Marshals a whole value in the configured [`WireFormat`].
    ///
    /// # Errors
    ///
    /// Returns `DumborbError::Marshal` if marshalling fails, or if a flat
    /// layout is asked for a graph with a cycle of bare arrays.
    pub fn encode_root(&self, value: &Value) -> Result<Encoded> {
        let (wire, fixups) = self.marshal_root(value)?;
        match self.config.wire_format {
            WireFormat::Fixups => Ok(Encoded {
                result: wire,
                fixups,
                objects: FlatObjects::new(),
            }),
            WireFormat::Flat => {
                let (result, objects) = flat::flatten(&wire, &fixups)?;
                Ok(Encoded {
                    result,
                    fixups: Vec::new(),
                    objects,
                })
            }
        }
    }

    /// The nested params of `request` and the fixups relative to them.
    ///
    /// A flat request is expanded first; fixups it carries explicitly are
    /// kept after the ones the expansion produces.
    ///
    /// # Errors
    ///
    /// Returns `DumborbError::Fixup` for a malformed fixup list and
    /// `DumborbError::Parse` for an unknown object index.
    pub fn decode_params(&self, request: &Request) -> Result<(Vec<JsonValue>, Vec<Fixup>)> {
        let explicit = request.fixups()?;
        if !request.is_flat() {
            return Ok((request.params.clone(), explicit));
        }
        let (nested, mut fixups) = flat::unflatten(&JsonValue::Array(request.params.clone()), &request.objects)?;
        fixups.extend(explicit);
        match nested {
            JsonValue::Array(params) => Ok((params, fixups)),
            _ => Err(DumborbError::Parse("flat params did not expand to an array".into())),
        }
    }

    /// Unmarshals a whole wire value carrying `fixups`.
    pub fn unmarshal_root(&self, target: &Type, wire: &JsonValue, fixups: &[Fixup]) -> Result<Value> {
        let root = Arc::new(wire.clone());
        let mut state = self.value_state(Arc::clone(&root), fixups)?;
        self.unmarshal(&mut state, target, &root)
    }

    /// Marshals `value` at the state's current location.
    ///
    /// A value already seen in this pass yields a null placeholder and a
    /// fixup when the fixup policy asks for one.
    ///
    /// # Errors
    ///
    /// Returns `DumborbError::Marshal` if no converter accepts the value or a
    /// converter fails.
    pub fn marshal(&self, state: &mut MarshalState, value: &Value) -> Result<JsonValue> {
        if value.is_null() {
            return Ok(JsonValue::Null);
        }
        let policy = state.policy();
        match state.check_seen(value) {
            Sighting::Circular(original) if policy.fixes_circular() => {
                state.add_fixup(original);
                return Ok(JsonValue::Null);
            }
            Sighting::Duplicate(original) if policy.fixes_duplicates() => {
                state.add_fixup(original);
                return Ok(JsonValue::Null);
            }
            _ => {}
        }
        state.store(value);
        let converter = self.marshal_converter(value)?;
        let wire = converter.marshal(self, state, value)?;
        state.mark_converted(value);
        Ok(wire)
    }

    /// Marshals a child at `segment` below the current location.
    pub fn marshal_child(
        &self,
        state: &mut MarshalState,
        segment: PathSegment,
        value: &Value,
    ) -> Result<JsonValue> {
        state.enter(segment)?;
        let result = self.marshal(state, value);
        state.leave();
        result
    }

    /// Unmarshals `wire` at the state's current location into `target`.
    ///
    /// # Errors
    ///
    /// Returns `DumborbError::Unmarshal` if the wire value does not fit the
    /// target, and `DumborbError::Fixup` if a fixup resolves to a value of
    /// the wrong type.
    pub fn unmarshal(&self, state: &mut ValueState, target: &Type, wire: &JsonValue) -> Result<Value> {
        match state.check_seen() {
            Position::New => {}
            Position::Converted(value) => return self.check_fit(value, target),
            Position::InProgress => {
                return Err(DumborbError::Fixup(format!(
                    "value at {:?} referenced before it was created",
                    state.path()
                )))
            }
            Position::Forward(original) => {
                let root = state.root();
                let wire = wire_at(&root, &original).ok_or_else(|| {
                    DumborbError::Fixup(format!("fixup original {:?} not found", original))
                })?;
                let saved = state.relocate(original.clone());
                let result = self.unmarshal(state, target, wire);
                state.relocate(saved);
                return result;
            }
        }
        if wire.is_null() {
            let value = self.null_for(target)?;
            state.mark_converted(value.clone());
            return Ok(value);
        }
        let (resolved, _) = self.resolve_type(target, wire)?;
        let converter = self.unmarshal_converter(&resolved, wire)?;
        let value = converter.unmarshal(self, state, &resolved, wire)?;
        state.mark_converted(value.clone());
        Ok(value)
    }

    /// Unmarshals a child at `segment` below the current location.
    pub fn unmarshal_child(
        &self,
        state: &mut ValueState,
        segment: PathSegment,
        target: &Type,
        wire: &JsonValue,
    ) -> Result<Value> {
        state.enter(segment)?;
        let result = self.unmarshal(state, target, wire);
        state.leave();
        result
    }

    /// Scores how well `wire` fits `target` without building any value.
    ///
    /// Revisited positions score `OKAY`; their cost was counted where the
    /// original was scored.
    ///
    /// # Errors
    ///
    /// Returns an error if the wire value cannot be unmarshalled into
    /// `target` at all.
    pub fn try_unmarshal(&self, state: &mut ScoreState, target: &Type, wire: &JsonValue) -> Result<Match> {
        match state.check_seen() {
            Position::New => {}
            Position::Converted(_) | Position::InProgress => return Ok(Match::OKAY),
            Position::Forward(original) => {
                let root = state.root();
                let wire = wire_at(&root, &original).ok_or_else(|| {
                    DumborbError::Fixup(format!("fixup original {:?} not found", original))
                })?;
                let saved = state.relocate(original.clone());
                let result = self.try_unmarshal(state, target, wire);
                state.relocate(saved);
                return result;
            }
        }
        if wire.is_null() {
            self.null_for(target)?;
            state.mark_converted(Match::OKAY);
            return Ok(Match::OKAY);
        }
        let (resolved, base) = self.resolve_type(target, wire)?;
        let converter = self.unmarshal_converter(&resolved, wire)?;
        let score = converter.try_unmarshal(self, state, &resolved, wire)?.worse(base);
        state.mark_converted(score);
        Ok(score)
    }

    /// Scores a child at `segment` below the current location.
    pub fn try_unmarshal_child(
        &self,
        state: &mut ScoreState,
        segment: PathSegment,
        target: &Type,
        wire: &JsonValue,
    ) -> Result<Match> {
        state.enter(segment)?;
        let result = self.try_unmarshal(state, target, wire);
        state.leave();
        result
    }

    /// The concrete type to unmarshal `wire` into, and the penalty for
    /// getting there.
    ///
    /// # Errors
    ///
    /// Returns `DumborbError::Unmarshal` for an `Any` target whose hint names
    /// an unknown type.
    pub fn resolve_type(&self, target: &Type, wire: &JsonValue) -> Result<(Type, Match)> {
        let base = target.base();
        let hint = type_hint(wire);
        match (base, hint) {
            (Type::Any, Some(hint)) => Ok((self.hinted_type(hint)?, Match::SIMILAR)),
            (Type::Any, None) => Ok((natural_type(wire), Match::SIMILAR)),
            (Type::Class(name), Some(hint))
                if hint != &**name && self.catalog.is_assignable(hint, name) =>
            {
                Ok((self.hinted_type(hint)?, Match::SIMILAR))
            }
            (other, _) => Ok((other.clone(), Match::OKAY)),
        }
    }

    fn hinted_type(&self, hint: &str) -> Result<Type> {
        match hint {
            LIST_HINT => Ok(Type::list(Type::Any)),
            MAP_HINT => Ok(Type::map(Type::Any)),
            DATE_HINT => Ok(Type::Date),
            class => match self.catalog.descriptor(class).map(|d| d.kind().clone()) {
                Some(ClassKind::Enum(_)) => Ok(Type::enumeration(class)),
                Some(_) => Ok(Type::class(class)),
                None => Err(DumborbError::Unmarshal(format!("unknown type hint '{}'", class))),
            },
        }
    }

    fn null_for(&self, target: &Type) -> Result<Value> {
        if target.is_primitive() {
            Err(DumborbError::Unmarshal(format!("null cannot be assigned to {}", target)))
        } else {
            Ok(Value::Null)
        }
    }

    fn check_fit(&self, value: Value, target: &Type) -> Result<Value> {
        if self.fits(&value, target) {
            Ok(value)
        } else {
            Err(DumborbError::Fixup(format!(
                "fixup resolves to {} where {} is expected",
                value.kind_name(),
                target
            )))
        }
    }

    fn fits(&self, value: &Value, target: &Type) -> bool {
        match (target, value) {
            (_, Value::Null) => !target.is_primitive(),
            (Type::Any | Type::Raw, _) => true,
            (Type::Nullable(inner), _) => self.fits(value, inner),
            (Type::Bool, Value::Bool(_))
            | (Type::Int, Value::Int(_))
            | (Type::Float, Value::Float(_))
            | (Type::Str, Value::Str(_))
            | (Type::Date, Value::Date(_))
            | (Type::Array(_), Value::Array(_))
            | (Type::List(_), Value::List(_))
            | (Type::Map(_), Value::Map(_)) => true,
            (Type::Enum(name), Value::Enum(e)) => e.type_name == *name,
            (Type::Class(name), _) => value
                .class_name()
                .is_some_and(|class| self.catalog.is_assignable(class, name)),
            _ => false,
        }
    }

    fn marshal_converter(&self, value: &Value) -> Result<Arc<dyn Converter>> {
        let cached = self.exact.read().get(&value.key()).cloned();
        if let Some(converter) = cached.filter(|c| c.can_marshal(self, value)) {
            return Ok(converter);
        }
        let converters = self.converters.read().clone();
        converters
            .into_iter()
            .rev()
            .find(|c| c.can_marshal(self, value))
            .ok_or_else(|| {
                DumborbError::Marshal(format!("no converter can marshal {}", value.kind_name()))
            })
    }

    fn unmarshal_converter(&self, target: &Type, wire: &JsonValue) -> Result<Arc<dyn Converter>> {
        let cached = target
            .key()
            .and_then(|key| self.exact.read().get(&key).cloned());
        if let Some(converter) = cached.filter(|c| c.can_unmarshal(self, target, wire)) {
            return Ok(converter);
        }
        let converters = self.converters.read().clone();
        converters
            .into_iter()
            .rev()
            .find(|c| c.can_unmarshal(self, target, wire))
            .ok_or_else(|| {
                DumborbError::Unmarshal(format!(
                    "no converter can unmarshal {} into {}",
                    json_kind(wire),
                    target
                ))
            })
    }
}

/// The type a wire value has on its own, without hint or declaration.
fn natural_type(wire: &JsonValue) -> Type {
    match wire {
        JsonValue::Null => Type::Any,
        JsonValue::Bool(_) => Type::Bool,
        JsonValue::Number(n) if n.is_i64() => Type::Int,
        JsonValue::Number(_) => Type::Float,
        JsonValue::String(_) => Type::Str,
        JsonValue::Array(_) => Type::array(Type::Any),
        JsonValue::Object(_) => Type::map(Type::Any),
    }
}
