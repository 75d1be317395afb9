use serde_json::Value as JsonValue;

use dumborb_common::{Result, Type, TypeKey, Value};

use super::{unexpected, Converter};
use crate::matching::Match;
use crate::serializer::{ScoreState, Serializer, ValueState};
use crate::state::MarshalState;

/// JSON passed through untouched in both directions.
pub struct RawConverter;

impl Converter for RawConverter {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn keys(&self) -> &'static [TypeKey] {
        &[TypeKey::Raw]
    }

    fn can_marshal(&self, _ser: &Serializer, value: &Value) -> bool {
        matches!(value, Value::Raw(_))
    }

    fn can_unmarshal(&self, _ser: &Serializer, target: &Type, _wire: &JsonValue) -> bool {
        matches!(target, Type::Raw)
    }

    fn marshal(&self, _ser: &Serializer, _state: &mut MarshalState, value: &Value) -> Result<JsonValue> {
        match value {
            Value::Raw(json) => Ok(json.clone()),
            other => Err(unexpected(self.name(), other)),
        }
    }

    fn try_unmarshal(
        &self,
        _ser: &Serializer,
        _state: &mut ScoreState,
        _target: &Type,
        _wire: &JsonValue,
    ) -> Result<Match> {
        Ok(Match::OKAY)
    }

    fn unmarshal(
        &self,
        _ser: &Serializer,
        _state: &mut ValueState,
        _target: &Type,
        wire: &JsonValue,
    ) -> Result<Value> {
        Ok(Value::Raw(wire.clone()))
    }
}
