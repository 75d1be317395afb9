#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Value as JsonValue};

    use crate::catalog::{ClassCatalog, ClassDescriptor};
    use crate::converters::Converter;
    use crate::matching::Match;
    use crate::serializer::*;
    use crate::state::MarshalState;
    use dumborb_common::{DumborbError, Fixup, PathSegment, Result, Type, TypeKey, Value};

    fn catalog() -> Arc<ClassCatalog> {
        let catalog = ClassCatalog::new();
        catalog
            .register(
                ClassDescriptor::bean("Point")
                    .field("x", Type::Int)
                    .field("y", Type::Int),
            )
            .unwrap();
        catalog
            .register(
                ClassDescriptor::bean("Point3")
                    .extends("Point")
                    .field("z", Type::Int),
            )
            .unwrap();
        catalog
            .register(
                ClassDescriptor::bean("Node")
                    .field("name", Type::Str)
                    .field("next", Type::nullable(Type::class("Node"))),
            )
            .unwrap();
        catalog
            .register(ClassDescriptor::enumeration("Color", &["RED", "GREEN"]))
            .unwrap();
        Arc::new(catalog)
    }

    fn serializer() -> Serializer {
        Serializer::new(catalog(), SerializerConfig::default())
    }

    fn with_config(config: SerializerConfig) -> Serializer {
        Serializer::new(catalog(), config)
    }

    fn key(k: &str) -> PathSegment {
        PathSegment::Key(k.into())
    }

    fn entry(value: &Value, k: &str) -> Value {
        value.as_map().unwrap().read().get(k).cloned().unwrap()
    }

    // ========================================================================
    // Shapes
    // ========================================================================

    #[test]
    fn test_list_round_trip() {
        let ser = serializer();
        let list = Value::list(vec![Value::Int(1), Value::from("a"), Value::Float(2.5)]);
        let (wire, fixups) = ser.marshal_root(&list).unwrap();
        assert_eq!(wire, json!({"$type": "list", "list": [1, "a", 2.5]}));
        assert!(fixups.is_empty());

        let back = ser.unmarshal_root(&Type::list(Type::Any), &wire, &fixups).unwrap();
        assert_eq!(back, list);
    }

    #[test]
    fn test_array_is_bare() {
        let ser = serializer();
        let array = Value::array(vec![Value::Bool(true), Value::Null]);
        let (wire, _) = ser.marshal_root(&array).unwrap();
        assert_eq!(wire, json!([true, null]));
    }

    #[test]
    fn test_date_round_trip() {
        let ser = serializer();
        let (wire, _) = ser.marshal_root(&Value::date(1_000)).unwrap();
        assert_eq!(wire, json!({"$type": "date", "time": 1000}));
        assert_eq!(ser.unmarshal_root(&Type::Date, &wire, &[]).unwrap(), Value::date(1_000));
        assert_eq!(ser.unmarshal_root(&Type::Any, &wire, &[]).unwrap(), Value::date(1_000));
    }

    #[test]
    fn test_bean_round_trip() {
        let ser = serializer();
        let point = Value::bean("Point", [("x", Value::Int(1)), ("y", Value::Int(2))]);
        let (wire, _) = ser.marshal_root(&point).unwrap();
        assert_eq!(wire, json!({"$type": "Point", "x": 1, "y": 2}));

        let back = ser.unmarshal_root(&Type::class("Point"), &wire, &[]).unwrap();
        assert_eq!(back, point);
        let any = ser.unmarshal_root(&Type::Any, &wire, &[]).unwrap();
        assert_eq!(any.class_name(), Some("Point"));
    }

    #[test]
    fn test_enum_round_trip() {
        let ser = serializer();
        let red = Value::enum_variant("Color", "RED");
        let (wire, _) = ser.marshal_root(&red).unwrap();
        assert_eq!(wire, json!("RED"));
        assert_eq!(ser.unmarshal_root(&Type::enumeration("Color"), &wire, &[]).unwrap(), red);

        let err = ser
            .unmarshal_root(&Type::enumeration("Color"), &json!("BLUE"), &[])
            .unwrap_err();
        assert!(matches!(err, DumborbError::Unmarshal(_)));
    }

    #[test]
    fn test_hintless_object_into_any_is_map() {
        let ser = serializer();
        let back = ser.unmarshal_root(&Type::Any, &json!({"a": 1}), &[]).unwrap();
        assert_eq!(back, Value::map([("a", Value::Int(1))]));
    }

    #[test]
    fn test_unknown_hint_into_any_fails() {
        let ser = serializer();
        let err = ser
            .unmarshal_root(&Type::Any, &json!({"$type": "Nope"}), &[])
            .unwrap_err();
        assert!(matches!(err, DumborbError::Unmarshal(_)));
    }

    #[test]
    fn test_hint_overrides_declared_class() {
        let ser = serializer();
        let wire = json!({"$type": "Point3", "x": 1, "y": 2, "z": 3});
        let back = ser.unmarshal_root(&Type::class("Point"), &wire, &[]).unwrap();
        assert_eq!(back.class_name(), Some("Point3"));
        assert_eq!(back.as_bean().unwrap().get("z"), Some(Value::Int(3)));
    }

    #[test]
    fn test_subclass_bean_keeps_inherited_fields() {
        let ser = serializer();
        let point = Value::bean("Point3", [("x", Value::Int(1)), ("y", Value::Int(2)), ("z", Value::Int(3))]);
        let (wire, fixups) = ser.marshal_root(&point).unwrap();
        assert_eq!(wire, json!({"$type": "Point3", "x": 1, "y": 2, "z": 3}));

        let back = ser.unmarshal_root(&Type::class("Point"), &wire, &fixups).unwrap();
        let bean = back.as_bean().unwrap();
        assert_eq!(back.class_name(), Some("Point3"));
        assert_eq!(bean.get("x"), Some(Value::Int(1)));
        assert_eq!(bean.get("y"), Some(Value::Int(2)));
        assert_eq!(bean.get("z"), Some(Value::Int(3)));
    }

    #[test]
    fn test_unrelated_hint_is_ignored() {
        let ser = serializer();
        let wire = json!({"$type": "Node", "x": 1, "y": 2});
        let back = ser.unmarshal_root(&Type::class("Point"), &wire, &[]).unwrap();
        assert_eq!(back.class_name(), Some("Point"));
    }

    // ========================================================================
    // Nulls and Options
    // ========================================================================

    #[test]
    fn test_null_into_primitive_fails() {
        let ser = serializer();
        let err = ser.unmarshal_root(&Type::Int, &JsonValue::Null, &[]).unwrap_err();
        assert!(matches!(err, DumborbError::Unmarshal(_)));
        assert_eq!(
            ser.unmarshal_root(&Type::nullable(Type::Int), &JsonValue::Null, &[]).unwrap(),
            Value::Null
        );
        assert_eq!(ser.unmarshal_root(&Type::Str, &JsonValue::Null, &[]).unwrap(), Value::Null);
    }

    #[test]
    fn test_class_hints_can_be_disabled() {
        let ser = with_config(SerializerConfig {
            marshal_class_hints: false,
            ..SerializerConfig::default()
        });
        let list = Value::list(vec![Value::Int(1)]);
        let (wire, _) = ser.marshal_root(&list).unwrap();
        assert_eq!(wire, json!({"list": [1]}));
        assert_eq!(ser.unmarshal_root(&Type::list(Type::Int), &wire, &[]).unwrap(), list);
    }

    #[test]
    fn test_null_attributes() {
        let node = Value::bean("Node", [("name", Value::from("a")), ("next", Value::Null)]);

        let (wire, _) = serializer().marshal_root(&node).unwrap();
        assert_eq!(wire, json!({"$type": "Node", "name": "a"}));

        let ser = with_config(SerializerConfig {
            marshal_null_attributes: true,
            ..SerializerConfig::default()
        });
        let (wire, _) = ser.marshal_root(&node).unwrap();
        assert_eq!(wire, json!({"$type": "Node", "name": "a", "next": null}));
    }

    // ========================================================================
    // Fixups
    // ========================================================================

    #[test]
    fn test_self_reference_becomes_fixup() {
        let ser = serializer();
        let map = Value::map(Vec::<(&str, Value)>::new());
        map.as_map().unwrap().write().insert("self".into(), map.clone());

        let (wire, fixups) = ser.marshal_root(&map).unwrap();
        assert_eq!(wire, json!({"$type": "map", "map": {"self": null}}));
        assert_eq!(fixups, vec![Fixup::new(vec![key("map"), key("self")], vec![])]);

        let back = ser.unmarshal_root(&Type::Any, &wire, &fixups).unwrap();
        assert!(entry(&back, "self").same(&back));
    }

    #[test]
    fn test_duplicates_share_one_copy() {
        let ser = serializer();
        let shared = Value::map([("v", Value::Int(1))]);
        let list = Value::list(vec![shared.clone(), shared.clone(), shared]);

        let (wire, fixups) = ser.marshal_root(&list).unwrap();
        assert_eq!(
            wire,
            json!({"$type": "list", "list": [{"$type": "map", "map": {"v": 1}}, null, null]})
        );
        assert_eq!(
            fixups,
            vec![
                Fixup::new(vec![key("list"), 1.into()], vec![key("list"), 0.into()]),
                Fixup::new(vec![key("list"), 2.into()], vec![key("list"), 0.into()]),
            ]
        );

        let back = ser
            .unmarshal_root(&Type::list(Type::map(Type::Int)), &wire, &fixups)
            .unwrap();
        let items = back.as_seq().unwrap().snapshot();
        assert_eq!(items.len(), 3);
        assert!(items[0].same(&items[1]));
        assert!(items[0].same(&items[2]));
    }

    #[test]
    fn test_circular_only_repeats_duplicates() {
        let ser = with_config(SerializerConfig {
            fixup_policy: FixupPolicy::CircularOnly,
            ..SerializerConfig::default()
        });
        let shared = Value::array(vec![Value::Int(7)]);
        let outer = Value::array(vec![shared.clone(), shared]);
        let (wire, fixups) = ser.marshal_root(&outer).unwrap();
        assert_eq!(wire, json!([[7], [7]]));
        assert!(fixups.is_empty());

        let cyclic = Value::list(Vec::new());
        cyclic.as_seq().unwrap().write().push(cyclic.clone());
        let (_, fixups) = ser.marshal_root(&cyclic).unwrap();
        assert_eq!(fixups.len(), 1);
    }

    fn with_policy(fixup_policy: FixupPolicy) -> Serializer {
        with_config(SerializerConfig {
            fixup_policy,
            ..SerializerConfig::default()
        })
    }

    #[test]
    fn test_duplicates_only_does_not_break_cycles() {
        let ser = with_policy(FixupPolicy::DuplicatesOnly);
        let shared = Value::map([("v", Value::Int(1))]);
        let (wire, fixups) = ser.marshal_root(&Value::array(vec![shared.clone(), shared])).unwrap();
        assert_eq!(wire, json!([{"$type": "map", "map": {"v": 1}}, null]));
        assert_eq!(fixups, vec![Fixup::new(vec![1.into()], vec![0.into()])]);

        let cyclic = Value::list(Vec::new());
        cyclic.as_seq().unwrap().write().push(cyclic.clone());
        let err = ser.marshal_root(&cyclic).unwrap_err();
        assert!(matches!(err, DumborbError::Marshal(_)));
        cyclic.as_seq().unwrap().write().clear();
    }

    #[test]
    fn test_all_duplicates_fix_up_repeated_scalars() {
        let items = Value::array(vec![
            Value::from("abc"),
            Value::from("abc"),
            Value::Int(3),
            Value::Int(3),
            Value::from("xyz"),
        ]);

        let (wire, fixups) = serializer().marshal_root(&items).unwrap();
        assert_eq!(wire, json!(["abc", "abc", 3, 3, "xyz"]));
        assert!(fixups.is_empty());

        let ser = with_policy(FixupPolicy::CircularAndAllDuplicates);
        let (wire, fixups) = ser.marshal_root(&items).unwrap();
        assert_eq!(wire, json!(["abc", null, 3, null, "xyz"]));
        assert_eq!(
            fixups,
            vec![
                Fixup::new(vec![1.into()], vec![0.into()]),
                Fixup::new(vec![3.into()], vec![2.into()]),
            ]
        );
        let back = ser.unmarshal_root(&Type::array(Type::Any), &wire, &fixups).unwrap();
        let back = back.as_seq().unwrap().snapshot();
        assert_eq!(back[1], Value::from("abc"));
        assert_eq!(back[3], Value::Int(3));

        let ser = with_policy(FixupPolicy::AllDuplicatesOnly);
        assert_eq!(ser.marshal_root(&items).unwrap().1.len(), 2);
    }

    #[test]
    fn test_fixup_may_point_at_null() {
        let ser = serializer();
        let wire = json!([null, null]);
        let fixups = vec![Fixup::new(vec![1.into()], vec![0.into()])];
        let back = ser.unmarshal_root(&Type::array(Type::Any), &wire, &fixups).unwrap();
        assert_eq!(back.as_seq().unwrap().snapshot(), vec![Value::Null, Value::Null]);

        let root = Arc::new(wire);
        let mut state = ser.score_state(Arc::clone(&root), &fixups).unwrap();
        assert_eq!(ser.try_unmarshal(&mut state, &Type::array(Type::Any), &root).unwrap(), Match::OKAY);
    }

    // ========================================================================
    // Wire Formats
    // ========================================================================

    #[test]
    fn test_flat_encoding_round_trip() {
        let ser = with_config(SerializerConfig {
            wire_format: WireFormat::Flat,
            ..SerializerConfig::default()
        });
        let a = Value::bean("Node", [("name", Value::from("a"))]);
        let b = Value::bean("Node", [("name", Value::from("b")), ("next", a.clone())]);
        a.as_bean().unwrap().set("next", b.clone());

        let encoded = ser.encode_root(&a).unwrap();
        assert!(encoded.fixups.is_empty());
        assert_eq!(encoded.result, json!("_$Inx$_1"));
        assert_eq!(
            encoded.objects["_$Inx$_2"],
            json!({"$type": "Node", "name": "b", "next": "_$Inx$_1"})
        );

        let request = dumborb_common::Request::new("node.visit", vec![encoded.result])
            .with_objects(encoded.objects);
        let (params, fixups) = ser.decode_params(&request).unwrap();
        let root = Arc::new(JsonValue::Array(params));
        let mut state = ser.value_state(Arc::clone(&root), &fixups).unwrap();
        let back = ser
            .unmarshal_child(&mut state, 0.into(), &Type::class("Node"), &root[0])
            .unwrap();
        let next = back.as_bean().unwrap().get("next").unwrap();
        assert!(next.as_bean().unwrap().get("next").unwrap().same(&back));

        a.as_bean().unwrap().set("next", Value::Null);
    }

    #[test]
    fn test_nested_encoding_is_the_default() {
        let ser = serializer();
        let encoded = ser.encode_root(&Value::map([("v", Value::Int(1))])).unwrap();
        assert_eq!(encoded.result, json!({"$type": "map", "map": {"v": 1}}));
        assert!(encoded.objects.is_empty());

        let request = dumborb_common::Request::new("echo.echo", vec![json!(1)])
            .with_fixups(&[Fixup::new(vec![0.into()], vec![0.into()])]);
        let (params, fixups) = ser.decode_params(&request).unwrap();
        assert_eq!(params, vec![json!(1)]);
        assert_eq!(fixups.len(), 1);
    }

    #[test]
    fn test_disabled_tracking_hits_depth_limit_on_cycle() {
        let ser = with_config(SerializerConfig {
            fixup_policy: FixupPolicy::Disabled,
            max_depth: 8,
            ..SerializerConfig::default()
        });
        let map = Value::map(Vec::<(&str, Value)>::new());
        map.as_map().unwrap().write().insert("self".into(), map.clone());
        let err = ser.marshal_root(&map).unwrap_err();
        assert!(matches!(err, DumborbError::Marshal(_)));
        // Break the cycle so the test does not leak it.
        map.as_map().unwrap().write().clear();
    }

    #[test]
    fn test_forward_fixup_resolves_later_original() {
        let ser = serializer();
        let wire = json!([null, {"$type": "map", "map": {"k": 1}}]);
        let fixups = vec![Fixup::new(vec![0.into()], vec![1.into()])];
        let back = ser
            .unmarshal_root(&Type::array(Type::map(Type::Int)), &wire, &fixups)
            .unwrap();
        let items = back.as_seq().unwrap().snapshot();
        assert!(items[0].same(&items[1]));
        assert_eq!(entry(&items[0], "k"), Value::Int(1));
    }

    #[test]
    fn test_fixup_of_wrong_type_fails() {
        let ser = serializer();
        let wire = json!({"$type": "Node", "name": "a", "next": null});
        let fixups = vec![Fixup::new(vec![key("next")], vec![key("name")])];
        let err = ser
            .unmarshal_root(&Type::class("Node"), &wire, &fixups)
            .unwrap_err();
        assert!(matches!(err, DumborbError::Fixup(_)));
    }

    #[test]
    fn test_bean_cycle_round_trip() {
        let ser = serializer();
        let a = Value::bean("Node", [("name", Value::from("a"))]);
        let b = Value::bean("Node", [("name", Value::from("b")), ("next", a.clone())]);
        a.as_bean().unwrap().set("next", b.clone());

        let (wire, fixups) = ser.marshal_root(&a).unwrap();
        assert_eq!(fixups, vec![Fixup::new(vec![key("next"), key("next")], vec![])]);

        let back = ser.unmarshal_root(&Type::class("Node"), &wire, &fixups).unwrap();
        let next = back.as_bean().unwrap().get("next").unwrap();
        assert_eq!(next.as_bean().unwrap().get("name"), Some(Value::from("b")));
        assert!(next.as_bean().unwrap().get("next").unwrap().same(&back));

        a.as_bean().unwrap().set("next", Value::Null);
    }

    // ========================================================================
    // Scoring
    // ========================================================================

    fn score(ser: &Serializer, target: &Type, wire: JsonValue) -> Result<Match> {
        let root = Arc::new(wire);
        let mut state = ser.score_state(Arc::clone(&root), &[])?;
        ser.try_unmarshal(&mut state, target, &root)
    }

    #[test]
    fn test_scores() {
        let ser = serializer();
        assert_eq!(score(&ser, &Type::Int, json!(5)).unwrap(), Match::OKAY);
        assert_eq!(score(&ser, &Type::Any, json!(5)).unwrap(), Match::SIMILAR);
        assert_eq!(score(&ser, &Type::Int, json!("5")).unwrap(), Match::ROUGHLY_SIMILAR);
        assert_eq!(
            score(&ser, &Type::list(Type::Int), json!([1, "2"])).unwrap(),
            Match::ROUGHLY_SIMILAR
        );
        assert_eq!(
            score(&ser, &Type::class("Point"), json!({"$type": "Point3", "x": 1, "y": 2, "z": 3}))
                .unwrap(),
            Match::SIMILAR
        );
        assert!(score(&ser, &Type::Bool, json!([1])).is_err());
    }

    #[test]
    fn test_scoring_does_not_build_values() {
        let ser = serializer();
        let wire = json!({"$type": "map", "map": {"a": null}});
        let root = Arc::new(wire);
        let fixups = vec![Fixup::new(vec![key("map"), key("a")], vec![])];
        let mut state = ser.score_state(Arc::clone(&root), &fixups).unwrap();
        assert_eq!(ser.try_unmarshal(&mut state, &Type::map(Type::Any), &root).unwrap(), Match::OKAY);
    }

    // ========================================================================
    // Converter Registration
    // ========================================================================

    /// Dates as whole seconds.
    struct Seconds;

    impl Converter for Seconds {
        fn name(&self) -> &'static str {
            "seconds"
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

        fn marshal(&self, _ser: &Serializer, _state: &mut MarshalState, value: &Value) -> Result<JsonValue> {
            match value {
                Value::Date(ms) => Ok(json!(ms / 1000)),
                _ => Err(DumborbError::Marshal("not a date".into())),
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
            wire.as_i64()
                .map(|s| Value::date(s * 1000))
                .ok_or_else(|| DumborbError::Unmarshal("not seconds".into()))
        }
    }

    #[test]
    fn test_later_converter_takes_precedence() {
        let ser = serializer();
        ser.register_converter(Arc::new(Seconds));
        let (wire, _) = ser.marshal_root(&Value::date(5_000)).unwrap();
        assert_eq!(wire, json!(5));
        assert_eq!(ser.unmarshal_root(&Type::Date, &json!(7), &[]).unwrap(), Value::date(7_000));
    }

    #[test]
    fn test_unmarshal_errors_carry_types() {
        let ser = serializer();
        let err = ser.unmarshal_root(&Type::array(Type::Int), &json!({"a": 1}), &[]).unwrap_err();
        assert!(err.to_string().contains("int[]"));
    }
}
