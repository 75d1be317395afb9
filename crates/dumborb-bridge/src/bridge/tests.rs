#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use serde_json::{json, Value as JsonValue};

    use crate::*;
    use dumborb_common::{AppError, DumborbError, Response, Type, Value};
    use dumborb_serializer::{ClassCatalog, ClassDescriptor, Member, Param};

    struct Robot {
        name: String,
    }

    struct User(String);

    fn catalog() -> Arc<ClassCatalog> {
        let catalog = ClassCatalog::new();
        catalog
            .register(
                ClassDescriptor::interface("Greeter")
                    .method(Member::abstract_member("greet", vec![Type::Str])),
            )
            .unwrap();
        catalog
            .register(
                ClassDescriptor::opaque("Robot")
                    .extends("Greeter")
                    .method(Member::with_types("greet", vec![Type::Str], |inv| {
                        let robot = inv.this::<Robot>()?;
                        Ok(Value::from(format!("{} greets {}", robot.name, inv.get::<String>(0)?)))
                    }))
                    .method(Member::with_types("reboot", vec![], |_| Ok(Value::Bool(true))))
                    .method(Member::new("whoami", vec![Param::local("user")], |inv| {
                        Ok(inv.arg(0)?.clone())
                    })),
            )
            .unwrap();
        catalog
            .register(
                ClassDescriptor::opaque("Failing")
                    .static_method(Member::with_types("boom", vec![], |_| Err(AppError::new("kaput")))),
            )
            .unwrap();
        Arc::new(catalog)
    }

    fn robot() -> Value {
        Value::object(
            "Robot",
            Robot {
                name: "r2".into(),
            },
        )
    }

    fn call(bridge: &Bridge, ctx: &CallContext, method: &str, params: JsonValue) -> Response {
        bridge
            .call(ctx, &json!({"method": method, "params": params, "id": 1}))
            .unwrap()
    }

    fn code(response: &Response) -> Option<i32> {
        response.error.as_ref().map(|e| e.code)
    }

    // ========================================================================
    // Registration
    // ========================================================================

    #[test]
    fn test_interface_restricts_visible_members() {
        let bridge = Bridge::global(catalog(), BridgeConfig::default());
        bridge.register_object_as("g", robot(), "Greeter").unwrap();
        let ctx = CallContext::new();

        let greeted = call(&bridge, &ctx, "g.greet", json!(["you"]));
        assert_eq!(greeted.result, Some(json!("r2 greets you")));

        let hidden = call(&bridge, &ctx, "g.reboot", json!([]));
        assert_eq!(code(&hidden), Some(591));

        let names = bridge.list_methods();
        assert!(names.contains(&"g.greet".to_string()));
        assert!(!names.contains(&"g.reboot".to_string()));
    }

    #[test]
    fn test_register_object_as_requires_implementation() {
        let bridge = Bridge::global(catalog(), BridgeConfig::default());
        let err = bridge.register_object_as("g", robot(), "Failing").unwrap_err();
        assert!(matches!(err, DumborbError::Registration(_)));
    }

    #[test]
    fn test_register_rejects_unknown_classes_and_scalars() {
        let bridge = Bridge::global(catalog(), BridgeConfig::default());
        assert!(bridge.register_class("x", "Nope").is_err());
        assert!(bridge.register_object("x", Value::Int(1)).is_err());
        assert!(bridge.register_object("x", Value::object("Nope", ())).is_err());
    }

    #[test]
    fn test_scoped_tier_shadows_global() {
        let global = Bridge::global(catalog(), BridgeConfig::default());
        global.register_object("r", robot()).unwrap();
        let scope = Bridge::scoped(&global);
        let other = Value::object(
            "Robot",
            Robot {
                name: "c3".into(),
            },
        );
        scope.register_object("r", other).unwrap();

        let ctx = CallContext::new();
        assert_eq!(
            call(&scope, &ctx, "r.greet", json!(["x"])).result,
            Some(json!("c3 greets x"))
        );
        assert_eq!(
            call(&global, &ctx, "r.greet", json!(["x"])).result,
            Some(json!("r2 greets x"))
        );
        assert!(scope.unregister_object("r"));
        assert_eq!(
            call(&scope, &ctx, "r.greet", json!(["x"])).result,
            Some(json!("r2 greets x"))
        );
    }

    // ========================================================================
    // Local Arguments
    // ========================================================================

    #[test]
    fn test_local_args_come_from_context() {
        let global = Bridge::global(catalog(), BridgeConfig::default());
        global.register_local_arg_resolver(
            "user",
            Arc::new(|ctx: &CallContext| {
                ctx.get::<User>()
                    .map(|u| Value::from(u.0.as_str()))
                    .ok_or_else(|| AppError::new("no user"))
            }),
        );
        let scope = Bridge::scoped(&global);
        scope.register_object("r", robot()).unwrap();

        let ctx = CallContext::new().with(User("ada".into()));
        let response = call(&scope, &ctx, "r.whoami", json!([]));
        assert_eq!(response.result, Some(json!("ada")));

        let anonymous = call(&scope, &CallContext::new(), "r.whoami", json!([]));
        assert_eq!(code(&anonymous), Some(490));
    }

    #[test]
    fn test_unregistering_resolver_falls_back_then_fails() {
        let global = Bridge::global(catalog(), BridgeConfig::default());
        global.register_local_arg_resolver(
            "user",
            Arc::new(|_: &CallContext| Ok::<_, AppError>(Value::from("global"))),
        );
        let scope = Bridge::scoped(&global);
        scope.register_local_arg_resolver(
            "user",
            Arc::new(|_: &CallContext| Ok::<_, AppError>(Value::from("scoped"))),
        );
        scope.register_object("r", robot()).unwrap();
        let ctx = CallContext::new();

        assert_eq!(call(&scope, &ctx, "r.whoami", json!([])).result, Some(json!("scoped")));

        assert!(scope.unregister_local_arg_resolver("user"));
        assert!(!scope.unregister_local_arg_resolver("user"));
        assert_eq!(call(&scope, &ctx, "r.whoami", json!([])).result, Some(json!("global")));

        assert!(global.unregister_local_arg_resolver("user"));
        assert_eq!(code(&call(&scope, &ctx, "r.whoami", json!([]))), Some(490));
    }

    #[test]
    fn test_missing_resolver_is_application_error() {
        let bridge = Bridge::global(catalog(), BridgeConfig::default());
        bridge.register_object("r", robot()).unwrap();
        let response = call(&bridge, &CallContext::new(), "r.whoami", json!([]));
        assert_eq!(code(&response), Some(490));
        assert!(response.error.unwrap().message.contains("user"));
    }

    // ========================================================================
    // Exception Transformation
    // ========================================================================

    #[test]
    fn test_trace_is_gated_by_diagnostics() {
        let bridge = Bridge::global(catalog(), BridgeConfig::default());
        bridge.register_class("f", "Failing").unwrap();

        let quiet = call(&bridge, &CallContext::new(), "f.boom", json!([]));
        let error = quiet.error.unwrap();
        assert_eq!(error.code, 490);
        assert_eq!(error.message, "kaput");
        assert!(error.trace.is_none());

        let loud = call(&bridge, &CallContext::new().with_diagnostics(true), "f.boom", json!([]));
        assert!(loud.error.unwrap().trace.unwrap().contains("kaput"));

        let config = BridgeConfig {
            include_traces: true,
            ..BridgeConfig::default()
        };
        let always = Bridge::global(catalog(), config);
        always.register_class("f", "Failing").unwrap();
        let response = call(&always, &CallContext::new(), "f.boom", json!([]));
        assert!(response.error.unwrap().trace.is_some());
    }

    #[test]
    fn test_custom_transformer_is_inherited_by_scopes() {
        let global = Bridge::global(catalog(), BridgeConfig::default());
        global.register_class("f", "Failing").unwrap();
        global.set_exception_transformer(Arc::new(|error: &AppError| ErrorKind::Custom {
            code: 1234,
            message: "redacted".into(),
            data: Some(json!({"len": error.message().len()})),
        }));
        let scope = Bridge::scoped(&global);

        let response = call(&scope, &CallContext::new(), "f.boom", json!([]));
        let error = response.error.unwrap();
        assert_eq!(error.code, 1234);
        assert_eq!(error.message, "redacted");
        assert_eq!(error.data, Some(json!({"len": 5})));
    }

    #[test]
    fn test_permanent_errors_escape_as_transport_errors() {
        let bridge = Bridge::global(catalog(), BridgeConfig::default());
        bridge.register_class("f", "Failing").unwrap();
        bridge.set_exception_transformer(Arc::new(|_: &AppError| {
            ErrorKind::Permanent("session expired".into())
        }));
        let err = bridge
            .call(&CallContext::new(), &json!({"method": "f.boom", "params": []}))
            .unwrap_err();
        assert!(matches!(err, TransportError::Permanent(ref m) if m == "session expired"));
        assert!(err.to_response(JsonValue::Null).is_none());
    }

    // ========================================================================
    // Callbacks
    // ========================================================================

    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        veto: bool,
    }

    impl InvocationCallback for Recorder {
        fn pre_invoke(
            &self,
            _ctx: &CallContext,
            _receiver: Option<&Value>,
            member: &Member,
        ) -> Result<(), AppError> {
            self.log.lock().push(format!("{} pre {}", self.label, member.name()));
            if self.veto {
                return Err(AppError::new("vetoed"));
            }
            Ok(())
        }

        fn post_invoke(
            &self,
            _ctx: &CallContext,
            _receiver: Option<&Value>,
            member: &Member,
            _result: &Value,
        ) -> Result<(), AppError> {
            self.log.lock().push(format!("{} post {}", self.label, member.name()));
            Ok(())
        }
    }

    #[test]
    fn test_callbacks_run_around_invocation() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let global = Bridge::global(catalog(), BridgeConfig::default());
        global.register_object("r", robot()).unwrap();
        global.register_callback(Arc::new(Recorder {
            label: "global",
            log: Arc::clone(&log),
            veto: false,
        }));
        let scope = Bridge::scoped(&global);
        let scoped: Arc<dyn InvocationCallback> = Arc::new(Recorder {
            label: "scope",
            log: Arc::clone(&log),
            veto: false,
        });
        scope.register_callback(Arc::clone(&scoped));

        call(&scope, &CallContext::new(), "r.reboot", json!([]));
        assert_eq!(
            *log.lock(),
            vec!["global pre reboot", "scope pre reboot", "global post reboot", "scope post reboot"]
        );

        assert!(scope.unregister_callback(&scoped));
        assert!(!scope.unregister_callback(&scoped));
    }

    #[test]
    fn test_pre_invoke_can_veto() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let bridge = Bridge::global(catalog(), BridgeConfig::default());
        bridge.register_object("r", robot()).unwrap();
        bridge.register_callback(Arc::new(Recorder {
            label: "guard",
            log: Arc::clone(&log),
            veto: true,
        }));
        let response = call(&bridge, &CallContext::new(), "r.reboot", json!([]));
        assert_eq!(code(&response), Some(490));
        assert_eq!(*log.lock(), vec!["guard pre reboot"]);
    }

    // ========================================================================
    // Envelopes and Configuration
    // ========================================================================

    #[test]
    fn test_parse_errors_fail_fast() {
        let bridge = Bridge::global(catalog(), BridgeConfig::default());
        let err = bridge
            .call(&CallContext::new(), &json!({"params": [], "id": 9}))
            .unwrap_err();
        let response = err.to_response(json!(9)).unwrap();
        assert_eq!(response.error.unwrap().code, 590);
    }

    #[test]
    fn test_config_from_json() {
        let config = BridgeConfig::from_json_str(r#"{"include_traces": true}"#).unwrap();
        assert!(config.include_traces);
        assert_eq!(config.serializer, dumborb_serializer::SerializerConfig::default());
        assert!(BridgeConfig::from_json_str("[1]").is_err());
    }
}
