//! Shape Converters
//!
//! One converter per data shape. Each converter answers two questions, "can
//! I marshal this value" and "can I unmarshal into this type", and performs
//! the conversion in both directions. Unmarshalling comes in two flavors: a
//! real one producing a [`Value`] and a speculative one producing a [`Match`]
//! score for overload resolution.
//!
//! # Shapes
//!
//! | Converter | Values | Wire |
//! |-----------|--------|------|
//! | [`PrimitiveConverter`] | bool, int, float | JSON scalar |
//! | [`StringConverter`] | string | JSON string |
//! | [`DateConverter`] | date | `{"$type":"date","time":ms}` |
//! | [`EnumConverter`] | enum | variant name |
//! | [`ArrayConverter`] | array | JSON array |
//! | [`ListConverter`] | list | `{"$type":"list","list":[...]}` |
//! | [`MapConverter`] | map | `{"$type":"map","map":{...}}` |
//! | [`BeanConverter`] | bean | `{"$type":"Class", fields...}` |
//! | [`RawConverter`] | raw JSON | itself |
//!
//! Children are always converted through the [`Serializer`], never directly,
//! so that traversal state and fixups apply at every level.

mod bean;
mod date;
mod map;
mod primitive;
mod raw;
mod sequence;


use std::sync::Arc;

use serde_json::Value as JsonValue;

use dumborb_common::protocol::envelope::TYPE_HINT;
use dumborb_common::{DumborbError, Result, Type, TypeKey, Value};

use crate::matching::Match;
use crate::serializer::{ScoreState, Serializer, ValueState};
use crate::state::MarshalState;

pub use bean::BeanConverter;
pub use date::DateConverter;
pub use map::MapConverter;
pub use primitive::{EnumConverter, PrimitiveConverter, StringConverter};
pub use raw::RawConverter;
pub use sequence::{ArrayConverter, ListConverter};

/// A pluggable per-shape converter.
///
/// `target` passed to the unmarshal methods is already resolved: never
/// `Any`, never `Nullable`, with any assignable type hint applied. Wire
/// `null` never reaches a converter.
pub trait Converter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Value shapes this converter handles exactly. Used to seed the exact
    /// lookup cache, which is consulted before the registration list.
    fn keys(&self) -> &'static [TypeKey] {
        &[]
    }

    fn can_marshal(&self, ser: &Serializer, value: &Value) -> bool;

    fn can_unmarshal(&self, ser: &Serializer, target: &Type, wire: &JsonValue) -> bool;

    fn marshal(&self, ser: &Serializer, state: &mut MarshalState, value: &Value) -> Result<JsonValue>;

    /// Scores how well `wire` fits `target` without building anything.
    fn try_unmarshal(
        &self,
        ser: &Serializer,
        state: &mut ScoreState,
        target: &Type,
        wire: &JsonValue,
    ) -> Result<Match>;

    fn unmarshal(
        &self,
        ser: &Serializer,
        state: &mut ValueState,
        target: &Type,
        wire: &JsonValue,
    ) -> Result<Value>;
}

/// The built-in converters, in registration order.
pub fn defaults() -> Vec<Arc<dyn Converter>> {
    vec![
        Arc::new(RawConverter),
        Arc::new(BeanConverter),
        Arc::new(ArrayConverter),
        Arc::new(MapConverter),
        Arc::new(ListConverter),
        Arc::new(DateConverter),
        Arc::new(EnumConverter),
        Arc::new(StringConverter),
        Arc::new(PrimitiveConverter),
    ]
}

pub(crate) fn json_kind(wire: &JsonValue) -> &'static str {
    match wire {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

pub(crate) fn mismatch(target: &Type, wire: &JsonValue) -> DumborbError {
    DumborbError::Unmarshal(format!("cannot unmarshal {} into {}", json_kind(wire), target))
}

pub(crate) fn unexpected(converter: &str, value: &Value) -> DumborbError {
    DumborbError::Marshal(format!("{} converter cannot marshal {}", converter, value.kind_name()))
}

/// The `$type` hint of a wire map, if any.
pub(crate) fn type_hint(wire: &JsonValue) -> Option<&str> {
    wire.as_object()
        .and_then(|map| map.get(TYPE_HINT))
        .and_then(JsonValue::as_str)
}

/// Starts a wire map, carrying `hint` if class hints are enabled.
pub(crate) fn hinted_object(ser: &Serializer, hint: &str) -> serde_json::Map<String, JsonValue> {
    let mut map = serde_json::Map::new();
    if ser.config().marshal_class_hints {
        map.insert(TYPE_HINT.to_string(), JsonValue::String(hint.to_string()));
    }
    map
}
