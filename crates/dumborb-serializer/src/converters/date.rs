use serde_json::Value as JsonValue;

use dumborb_common::protocol::envelope::DATE_HINT;
use dumborb_common::{Result, Type, TypeKey, Value};

use super::{hinted_object, mismatch, unexpected, Converter};
use crate::matching::Match;
use crate::serializer::{ScoreState, Serializer, ValueState};
use crate::state::MarshalState;

/// Dates as `{"$type":"date","time":<ms since epoch>}`.
///
/// A bare millisecond count is accepted as `ROUGHLY_SIMILAR`.
pub struct DateConverter;

impl DateConverter {
    fn coerce(target: &Type, wire: &JsonValue) -> Result<(Value, Match)> {
        match wire {
            JsonValue::Object(map) => map
                .get("time")
                .and_then(JsonValue::as_i64)
                .map(|ms| (Value::Date(ms), Match::OKAY))
                .ok_or_else(|| mismatch(target, wire)),
            JsonValue::Number(n) => n
                .as_i64()
                .map(|ms| (Value::Date(ms), Match::ROUGHLY_SIMILAR))
                .ok_or_else(|| mismatch(target, wire)),
            _ => Err(mismatch(target, wire)),
        }
    }
}

impl Converter for DateConverter {
    fn name(&self) -> &'static str {
        "date"
    }

    fn keys(&self) -> &'static [TypeKey] {
        &[TypeKey::Date]
    }

    fn can_marshal(&self, _ser: &Serializer, value: &Value) -> bool {
        matches!(value, Value::Date(_))
    }

    fn can_unmarshal(&self, _ser: &Serializer, target: &Type, _wire: &JsonValue) -> bool {
        matches!(target, Type::Date)
    }

    fn marshal(&self, ser: &Serializer, _state: &mut MarshalState, value: &Value) -> Result<JsonValue> {
        let Value::Date(ms) = value else {
            return Err(unexpected(self.name(), value));
        };
        let mut map = hinted_object(ser, DATE_HINT);
        map.insert("time".to_string(), JsonValue::from(*ms));
        Ok(JsonValue::Object(map))
    }

    fn try_unmarshal(
        &self,
        _ser: &Serializer,
        _state: &mut ScoreState,
        target: &Type,
        wire: &JsonValue,
    ) -> Result<Match> {
        Self::coerce(target, wire).map(|(_, score)| score)
    }

    fn unmarshal(
        &self,
        _ser: &Serializer,
        _state: &mut ValueState,
        target: &Type,
        wire: &JsonValue,
    ) -> Result<Value> {
        Self::coerce(target, wire).map(|(value, _)| value)
    }
}
