use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use dumborb_common::protocol::envelope::{MAP_HINT, TYPE_HINT};
use dumborb_common::{PathSegment, Result, Shared, SharedMap, Type, TypeKey, Value};

use super::{hinted_object, mismatch, unexpected, Converter};
use crate::matching::Match;
use crate::serializer::{ScoreState, Serializer, ValueState};
use crate::state::MarshalState;

const MAP_KEY: &str = "map";

type Entries<'a> = Vec<(&'a String, &'a JsonValue)>;

/// Entries of a map wire value, the key they are wrapped under (if any), and
/// the base score for that form.
///
/// The wrapped form is an object whose only keys are `map` and an optional
/// `$type`. Any other object is taken as the entries themselves, minus the
/// hint, at `ROUGHLY_SIMILAR`.
fn entries(wire: &JsonValue) -> Option<(Entries<'_>, Option<&'static str>, Match)> {
    let object = wire.as_object()?;
    let wrapped = object.get(MAP_KEY).and_then(JsonValue::as_object);
    match wrapped {
        Some(inner) if object.keys().all(|k| k == MAP_KEY || k == TYPE_HINT) => {
            Some((inner.iter().collect(), Some(MAP_KEY), Match::OKAY))
        }
        _ => Some((
            object.iter().filter(|(k, _)| *k != TYPE_HINT).collect(),
            None,
            Match::ROUGHLY_SIMILAR,
        )),
    }
}

fn value_type(target: &Type) -> Option<&Type> {
    match target {
        Type::Map(value) => Some(value.as_ref()),
        _ => None,
    }
}

/// String-keyed maps, `{"$type":"map","map":{...}}` on the wire.
pub struct MapConverter;

impl Converter for MapConverter {
    fn name(&self) -> &'static str {
        "map"
    }

    fn keys(&self) -> &'static [TypeKey] {
        &[TypeKey::Map]
    }

    fn can_marshal(&self, _ser: &Serializer, value: &Value) -> bool {
        matches!(value, Value::Map(_))
    }

    fn can_unmarshal(&self, _ser: &Serializer, target: &Type, _wire: &JsonValue) -> bool {
        matches!(target, Type::Map(_))
    }

    fn marshal(&self, ser: &Serializer, state: &mut MarshalState, value: &Value) -> Result<JsonValue> {
        let Value::Map(map) = value else {
            return Err(unexpected(self.name(), value));
        };
        let mut out = hinted_object(ser, MAP_HINT);
        state.enter(PathSegment::from(MAP_KEY))?;
        let inner: Result<serde_json::Map<String, JsonValue>> = map
            .snapshot()
            .into_iter()
            .map(|(key, item)| {
                let wire = ser.marshal_child(state, PathSegment::Key(key.clone()), &item)?;
                Ok((key, wire))
            })
            .collect();
        state.leave();
        out.insert(MAP_KEY.to_string(), JsonValue::Object(inner?));
        Ok(JsonValue::Object(out))
    }

    fn try_unmarshal(
        &self,
        ser: &Serializer,
        state: &mut ScoreState,
        target: &Type,
        wire: &JsonValue,
    ) -> Result<Match> {
        let item_type = value_type(target).ok_or_else(|| mismatch(target, wire))?;
        let (items, prefix, base) = entries(wire).ok_or_else(|| mismatch(target, wire))?;
        if let Some(key) = prefix {
            state.enter(PathSegment::from(key))?;
        }
        let result: Result<Match> = items.iter().try_fold(base, |worst, (key, item)| {
            ser.try_unmarshal_child(state, PathSegment::Key((*key).clone()), item_type, item)
                .map(|m| worst.worse(m))
        });
        if prefix.is_some() {
            state.leave();
        }
        result
    }

    fn unmarshal(
        &self,
        ser: &Serializer,
        state: &mut ValueState,
        target: &Type,
        wire: &JsonValue,
    ) -> Result<Value> {
        let item_type = value_type(target).ok_or_else(|| mismatch(target, wire))?;
        let (items, prefix, _) = entries(wire).ok_or_else(|| mismatch(target, wire))?;
        let shell: SharedMap = Shared::new(BTreeMap::new());
        let value = Value::Map(shell.clone());
        state.mark_converted(value.clone());
        if let Some(key) = prefix {
            state.enter(PathSegment::from(key))?;
        }
        let result: Result<()> = items.iter().try_for_each(|(key, item)| {
            let child = ser.unmarshal_child(state, PathSegment::Key((*key).clone()), item_type, item)?;
            shell.write().insert((*key).clone(), child);
            Ok(())
        });
        if prefix.is_some() {
            state.leave();
        }
        result.map(|_| value)
    }
}
