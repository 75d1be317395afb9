use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use dumborb_common::protocol::envelope::{REFERENCE_TAG, TYPE_HINT};
use dumborb_common::{Bean, DumborbError, PathSegment, Result, Type, Value};

use super::{hinted_object, mismatch, unexpected, Converter};
use crate::catalog::ClassKind;
use crate::matching::Match;
use crate::serializer::{ScoreState, Serializer, ValueState};
use crate::state::MarshalState;

/// Beans, field by field, as `{"$type":"Class", field: value, ...}`.
///
/// Field types come from the class descriptor and its bean supertypes. Wire keys that name no field
/// are ignored, but make the match `ROUGHLY_SIMILAR`. Null fields are only
/// emitted when `marshal_null_attributes` is set.
pub struct BeanConverter;

impl BeanConverter {
    fn fields(ser: &Serializer, target: &Type) -> Result<(Arc<str>, BTreeMap<String, Type>)> {
        let Type::Class(name) = target else {
            return Err(DumborbError::Unmarshal(format!("{} is not a bean type", target)));
        };
        ser.catalog()
            .bean_fields(name)
            .map(|fields| (Arc::clone(name), fields))
            .ok_or_else(|| DumborbError::Unmarshal(format!("{} is not a bean class", name)))
    }
}

impl Converter for BeanConverter {
    fn name(&self) -> &'static str {
        "bean"
    }

    fn can_marshal(&self, _ser: &Serializer, value: &Value) -> bool {
        matches!(value, Value::Bean(_))
    }

    fn can_unmarshal(&self, ser: &Serializer, target: &Type, _wire: &JsonValue) -> bool {
        match target {
            Type::Class(name) => ser
                .catalog()
                .descriptor(name)
                .is_some_and(|d| matches!(d.kind(), ClassKind::Bean(_))),
            _ => false,
        }
    }

    fn marshal(&self, ser: &Serializer, state: &mut MarshalState, value: &Value) -> Result<JsonValue> {
        let Value::Bean(bean) = value else {
            return Err(unexpected(self.name(), value));
        };
        let mut out = hinted_object(ser, bean.class());
        for (field, item) in bean.fields().snapshot() {
            if item.is_null() {
                if ser.config().marshal_null_attributes {
                    out.insert(field, JsonValue::Null);
                }
                continue;
            }
            let wire = ser.marshal_child(state, PathSegment::Key(field.clone()), &item)?;
            out.insert(field, wire);
        }
        Ok(JsonValue::Object(out))
    }

    fn try_unmarshal(
        &self,
        ser: &Serializer,
        state: &mut ScoreState,
        target: &Type,
        wire: &JsonValue,
    ) -> Result<Match> {
        let object = wire.as_object().ok_or_else(|| mismatch(target, wire))?;
        let (_, fields) = Self::fields(ser, target)?;
        let extra = object
            .keys()
            .any(|k| k != TYPE_HINT && k != REFERENCE_TAG && !fields.contains_key(k));
        let mut worst = if extra { Match::ROUGHLY_SIMILAR } else { Match::OKAY };
        for (field, ty) in &fields {
            if let Some(item) = object.get(field) {
                let score = ser.try_unmarshal_child(state, PathSegment::Key(field.clone()), ty, item)?;
                worst = worst.worse(score);
            }
        }
        Ok(worst)
    }

    fn unmarshal(
        &self,
        ser: &Serializer,
        state: &mut ValueState,
        target: &Type,
        wire: &JsonValue,
    ) -> Result<Value> {
        let object = wire.as_object().ok_or_else(|| mismatch(target, wire))?;
        let (class, fields) = Self::fields(ser, target)?;
        let bean = Bean::new(&class, BTreeMap::new());
        let value = Value::Bean(bean.clone());
        state.mark_converted(value.clone());
        for (field, ty) in &fields {
            if let Some(item) = object.get(field) {
                let child = ser.unmarshal_child(state, PathSegment::Key(field.clone()), ty, item)?;
                bean.set(field, child);
            }
        }
        Ok(value)
    }
}
