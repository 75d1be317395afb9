use serde_json::Value as JsonValue;

use dumborb_common::protocol::envelope::LIST_HINT;
use dumborb_common::{PathSegment, Result, Shared, SharedList, Type, TypeKey, Value};

use super::{hinted_object, mismatch, unexpected, Converter};
use crate::matching::Match;
use crate::serializer::{ScoreState, Serializer, ValueState};
use crate::state::MarshalState;

const LIST_KEY: &str = "list";

/// Elements of a sequence wire value, the key they are wrapped under (if
/// any), and the base score for that form.
fn elements(
    wire: &JsonValue,
    wrapped: Match,
    bare: Match,
) -> Option<(&[JsonValue], Option<&'static str>, Match)> {
    match wire {
        JsonValue::Array(items) => Some((items.as_slice(), None, bare)),
        JsonValue::Object(map) => map
            .get(LIST_KEY)
            .and_then(JsonValue::as_array)
            .map(|items| (items.as_slice(), Some(LIST_KEY), wrapped)),
        _ => None,
    }
}

fn element_type(target: &Type) -> Option<&Type> {
    match target {
        Type::Array(element) | Type::List(element) => Some(element.as_ref()),
        _ => None,
    }
}

fn marshal_items(ser: &Serializer, state: &mut MarshalState, items: &[Value]) -> Result<Vec<JsonValue>> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| ser.marshal_child(state, PathSegment::Index(i), item))
        .collect()
}

fn fill(
    ser: &Serializer,
    state: &mut ValueState,
    element: &Type,
    items: &[JsonValue],
    prefix: Option<&str>,
    shell: &SharedList,
) -> Result<()> {
    if let Some(key) = prefix {
        state.enter(PathSegment::from(key))?;
    }
    let result: Result<()> = items.iter().enumerate().try_for_each(|(i, item)| {
        let child = ser.unmarshal_child(state, PathSegment::Index(i), element, item)?;
        shell.write().push(child);
        Ok(())
    });
    if prefix.is_some() {
        state.leave();
    }
    result
}

fn score(
    ser: &Serializer,
    state: &mut ScoreState,
    element: &Type,
    items: &[JsonValue],
    prefix: Option<&str>,
) -> Result<Match> {
    if let Some(key) = prefix {
        state.enter(PathSegment::from(key))?;
    }
    let result: Result<Match> = items.iter().enumerate().try_fold(Match::OKAY, |worst, (i, item)| {
        ser.try_unmarshal_child(state, PathSegment::Index(i), element, item)
            .map(|m| worst.worse(m))
    });
    if prefix.is_some() {
        state.leave();
    }
    result
}

/// Fixed sequences, a bare JSON array on the wire.
///
/// A wrapped `{"list":[...]}` is accepted as `SIMILAR`.
pub struct ArrayConverter;

impl Converter for ArrayConverter {
    fn name(&self) -> &'static str {
        "array"
    }

    fn keys(&self) -> &'static [TypeKey] {
        &[TypeKey::Array]
    }

    fn can_marshal(&self, _ser: &Serializer, value: &Value) -> bool {
        matches!(value, Value::Array(_))
    }

    fn can_unmarshal(&self, _ser: &Serializer, target: &Type, _wire: &JsonValue) -> bool {
        matches!(target, Type::Array(_))
    }

    fn marshal(&self, ser: &Serializer, state: &mut MarshalState, value: &Value) -> Result<JsonValue> {
        let Value::Array(list) = value else {
            return Err(unexpected(self.name(), value));
        };
        marshal_items(ser, state, &list.snapshot()).map(JsonValue::Array)
    }

    fn try_unmarshal(
        &self,
        ser: &Serializer,
        state: &mut ScoreState,
        target: &Type,
        wire: &JsonValue,
    ) -> Result<Match> {
        let element = element_type(target).ok_or_else(|| mismatch(target, wire))?;
        let (items, prefix, base) =
            elements(wire, Match::SIMILAR, Match::OKAY).ok_or_else(|| mismatch(target, wire))?;
        score(ser, state, element, items, prefix).map(|m| m.worse(base))
    }

    fn unmarshal(
        &self,
        ser: &Serializer,
        state: &mut ValueState,
        target: &Type,
        wire: &JsonValue,
    ) -> Result<Value> {
        let element = element_type(target).ok_or_else(|| mismatch(target, wire))?;
        let (items, prefix, _) =
            elements(wire, Match::SIMILAR, Match::OKAY).ok_or_else(|| mismatch(target, wire))?;
        let shell: SharedList = Shared::new(Vec::with_capacity(items.len()));
        let value = Value::Array(shell.clone());
        state.mark_converted(value.clone());
        fill(ser, state, element, items, prefix, &shell)?;
        Ok(value)
    }
}

/// Growable sequences, `{"$type":"list","list":[...]}` on the wire.
///
/// A bare JSON array is accepted as `SIMILAR`.
pub struct ListConverter;

impl Converter for ListConverter {
    fn name(&self) -> &'static str {
        "list"
    }

    fn keys(&self) -> &'static [TypeKey] {
        &[TypeKey::List]
    }

    fn can_marshal(&self, _ser: &Serializer, value: &Value) -> bool {
        matches!(value, Value::List(_))
    }

    fn can_unmarshal(&self, _ser: &Serializer, target: &Type, _wire: &JsonValue) -> bool {
        matches!(target, Type::List(_))
    }

    fn marshal(&self, ser: &Serializer, state: &mut MarshalState, value: &Value) -> Result<JsonValue> {
        let Value::List(list) = value else {
            return Err(unexpected(self.name(), value));
        };
        let mut map = hinted_object(ser, LIST_HINT);
        state.enter(PathSegment::from(LIST_KEY))?;
        let items = marshal_items(ser, state, &list.snapshot());
        state.leave();
        map.insert(LIST_KEY.to_string(), JsonValue::Array(items?));
        Ok(JsonValue::Object(map))
    }

    fn try_unmarshal(
        &self,
        ser: &Serializer,
        state: &mut ScoreState,
        target: &Type,
        wire: &JsonValue,
    ) -> Result<Match> {
        let element = element_type(target).ok_or_else(|| mismatch(target, wire))?;
        let (items, prefix, base) =
            elements(wire, Match::OKAY, Match::SIMILAR).ok_or_else(|| mismatch(target, wire))?;
        score(ser, state, element, items, prefix).map(|m| m.worse(base))
    }

    fn unmarshal(
        &self,
        ser: &Serializer,
        state: &mut ValueState,
        target: &Type,
        wire: &JsonValue,
    ) -> Result<Value> {
        let element = element_type(target).ok_or_else(|| mismatch(target, wire))?;
        let (items, prefix, _) =
            elements(wire, Match::OKAY, Match::SIMILAR).ok_or_else(|| mismatch(target, wire))?;
        let shell: SharedList = Shared::new(Vec::with_capacity(items.len()));
        let value = Value::List(shell.clone());
        state.mark_converted(value.clone());
        fill(ser, state, element, items, prefix, &shell)?;
        Ok(value)
    }
}
