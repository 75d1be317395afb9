use serde_json::Value as JsonValue;

use dumborb_common::{DumborbError, Result, Type, TypeKey, Value};

use super::{mismatch, unexpected, Converter};
use crate::catalog::ClassKind;
use crate::matching::Match;
use crate::serializer::{ScoreState, Serializer, ValueState};
use crate::state::MarshalState;

/// Booleans, integers and floats.
///
/// Loosening: an integral float into an int is `SIMILAR`; a numeric or
/// boolean string is `ROUGHLY_SIMILAR`.
pub struct PrimitiveConverter;

impl PrimitiveConverter {
    fn coerce(target: &Type, wire: &JsonValue) -> Result<(Value, Match)> {
        match (target, wire) {
            (Type::Bool, JsonValue::Bool(b)) => Ok((Value::Bool(*b), Match::OKAY)),
            (Type::Bool, JsonValue::String(s)) => match s.as_str() {
                "true" => Ok((Value::Bool(true), Match::ROUGHLY_SIMILAR)),
                "false" => Ok((Value::Bool(false), Match::ROUGHLY_SIMILAR)),
                _ => Err(mismatch(target, wire)),
            },
            (Type::Int, JsonValue::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    return Ok((Value::Int(i), Match::OKAY));
                }
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                        Ok((Value::Int(f as i64), Match::SIMILAR))
                    }
                    _ => Err(DumborbError::Unmarshal(format!("{} is not an integer", n))),
                }
            }
            (Type::Int, JsonValue::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(|i| (Value::Int(i), Match::ROUGHLY_SIMILAR))
                .map_err(|_| mismatch(target, wire)),
            (Type::Float, JsonValue::Number(n)) => n
                .as_f64()
                .map(|f| (Value::Float(f), Match::OKAY))
                .ok_or_else(|| mismatch(target, wire)),
            (Type::Float, JsonValue::String(s)) => s
                .trim()
                .parse::<f64>()
                .map(|f| (Value::Float(f), Match::ROUGHLY_SIMILAR))
                .map_err(|_| mismatch(target, wire)),
            _ => Err(mismatch(target, wire)),
        }
    }
}

impl Converter for PrimitiveConverter {
    fn name(&self) -> &'static str {
        "primitive"
    }

    fn keys(&self) -> &'static [TypeKey] {
        &[TypeKey::Bool, TypeKey::Int, TypeKey::Float]
    }

    fn can_marshal(&self, _ser: &Serializer, value: &Value) -> bool {
        matches!(value, Value::Bool(_) | Value::Int(_) | Value::Float(_))
    }

    fn can_unmarshal(&self, _ser: &Serializer, target: &Type, _wire: &JsonValue) -> bool {
        matches!(target, Type::Bool | Type::Int | Type::Float)
    }

    fn marshal(&self, _ser: &Serializer, _state: &mut MarshalState, value: &Value) -> Result<JsonValue> {
        match value {
            Value::Bool(b) => Ok(JsonValue::Bool(*b)),
            Value::Int(i) => Ok(JsonValue::from(*i)),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .ok_or_else(|| DumborbError::Marshal(format!("{} is not a finite number", f))),
            other => Err(unexpected(self.name(), other)),
        }
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

/// Strings. Numbers and booleans are accepted as `ROUGHLY_SIMILAR`.
pub struct StringConverter;

impl StringConverter {
    fn coerce(target: &Type, wire: &JsonValue) -> Result<(Value, Match)> {
        match wire {
            JsonValue::String(s) => Ok((Value::Str(s.clone()), Match::OKAY)),
            JsonValue::Number(n) => Ok((Value::Str(n.to_string()), Match::ROUGHLY_SIMILAR)),
            JsonValue::Bool(b) => Ok((Value::Str(b.to_string()), Match::ROUGHLY_SIMILAR)),
            _ => Err(mismatch(target, wire)),
        }
    }
}

impl Converter for StringConverter {
    fn name(&self) -> &'static str {
        "string"
    }

    fn keys(&self) -> &'static [TypeKey] {
        &[TypeKey::Str]
    }

    fn can_marshal(&self, _ser: &Serializer, value: &Value) -> bool {
        matches!(value, Value::Str(_))
    }

    fn can_unmarshal(&self, _ser: &Serializer, target: &Type, _wire: &JsonValue) -> bool {
        matches!(target, Type::Str)
    }

    fn marshal(&self, _ser: &Serializer, _state: &mut MarshalState, value: &Value) -> Result<JsonValue> {
        match value {
            Value::Str(s) => Ok(JsonValue::String(s.clone())),
            other => Err(unexpected(self.name(), other)),
        }
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

/// Enum values, travelling as their variant name.
pub struct EnumConverter;

impl EnumConverter {
    fn coerce(ser: &Serializer, target: &Type, wire: &JsonValue) -> Result<Value> {
        let (Type::Enum(name), JsonValue::String(variant)) = (target, wire) else {
            return Err(mismatch(target, wire));
        };
        let descriptor = ser
            .catalog()
            .descriptor(name)
            .ok_or_else(|| DumborbError::Unmarshal(format!("unknown enum '{}'", name)))?;
        match descriptor.kind() {
            ClassKind::Enum(variants) if variants.iter().any(|v| v == variant) => {
                Ok(Value::enum_variant(name, variant))
            }
            ClassKind::Enum(_) => Err(DumborbError::Unmarshal(format!(
                "'{}' is not a variant of {}",
                variant, name
            ))),
            _ => Err(DumborbError::Unmarshal(format!("'{}' is not an enum", name))),
        }
    }
}

impl Converter for EnumConverter {
    fn name(&self) -> &'static str {
        "enum"
    }

    fn keys(&self) -> &'static [TypeKey] {
        &[TypeKey::Enum]
    }

    fn can_marshal(&self, _ser: &Serializer, value: &Value) -> bool {
        matches!(value, Value::Enum(_))
    }

    fn can_unmarshal(&self, _ser: &Serializer, target: &Type, _wire: &JsonValue) -> bool {
        matches!(target, Type::Enum(_))
    }

    fn marshal(&self, _ser: &Serializer, _state: &mut MarshalState, value: &Value) -> Result<JsonValue> {
        match value {
            Value::Enum(e) => Ok(JsonValue::String(e.variant.clone())),
            other => Err(unexpected(self.name(), other)),
        }
    }

    fn try_unmarshal(
        &self,
        ser: &Serializer,
        _state: &mut ScoreState,
        target: &Type,
        wire: &JsonValue,
    ) -> Result<Match> {
        Self::coerce(ser, target, wire).map(|_| Match::OKAY)
    }

    fn unmarshal(
        &self,
        ser: &Serializer,
        _state: &mut ValueState,
        target: &Type,
        wire: &JsonValue,
    ) -> Result<Value> {
        Self::coerce(ser, target, wire)
    }
}
