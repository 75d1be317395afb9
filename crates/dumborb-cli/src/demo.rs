//! Demo services
//!
//! The classes and endpoints the `dumborb` binary dispatches against.
//!
//! # Example
//!
//! ```rust
//! use dumborb_bridge::{BridgeConfig, CallContext};
//! use serde_json::json;
//!
//! let global = dumborb_cli::demo::global_bridge(BridgeConfig::default()).unwrap();
//! let session = dumborb_cli::demo::session(&global).unwrap();
//! let response = session
//!     .call(&CallContext::new(), &json!({"method": "hello.hello", "params": [false], "id": 1}))
//!     .unwrap();
//! assert_eq!(response.result, Some(json!("world")));
//! ```

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dumborb_bridge::{Bridge, BridgeConfig, CallContext};
use dumborb_common::{AppError, Result, Type, Value};
use dumborb_serializer::{ClassCatalog, ClassDescriptor, Invocation, Member, Param};

/// Name of the caller, put into the [`CallContext`] by the binary.
#[derive(Debug, Clone)]
pub struct User(pub String);

struct HelloService;

#[derive(Default)]
struct Counter(AtomicI64);

struct Counters {
    shared: Value,
}

fn shape(kind: &str, width: f64, height: f64) -> Value {
    Value::bean(
        "Shape",
        [
            ("kind", Value::from(kind)),
            ("width", Value::Float(width)),
            ("height", Value::Float(height)),
        ],
    )
}

fn counter(inv: &Invocation) -> std::result::Result<Arc<Counter>, AppError> {
    inv.this::<Counter>()
}

/// Describes every demo class.
pub fn catalog() -> Result<Arc<ClassCatalog>> {
    let catalog = ClassCatalog::new();

    catalog.register(
        ClassDescriptor::interface("DemoService")
            .method(Member::abstract_member("hello", vec![Type::Bool])),
    )?;
    catalog.register(
        ClassDescriptor::opaque("HelloService")
            .extends("DemoService")
            .method(Member::with_types("hello", vec![Type::Bool], |inv| {
                if inv.get::<bool>(0)? {
                    return Err(AppError::new("hello failed as requested"));
                }
                Ok(Value::from("world"))
            }))
            .method(Member::new("whoami", vec![Param::local("user")], |inv| {
                Ok(Value::from(format!("hello, {}", inv.get::<String>(0)?)))
            })),
    )?;

    catalog.register(
        ClassDescriptor::opaque("Calc")
            .static_method(Member::with_types("add", vec![Type::Int, Type::Int], |inv| {
                let (a, b) = (inv.get::<i64>(0)?, inv.get::<i64>(1)?);
                a.checked_add(b)
                    .map(Value::Int)
                    .ok_or_else(|| AppError::new("integer overflow"))
            }))
            .static_method(Member::with_types("add", vec![Type::Float, Type::Float], |inv| {
                Ok(Value::Float(inv.get::<f64>(0)? + inv.get::<f64>(1)?))
            }))
            .static_method(Member::with_types("add", vec![Type::Str, Type::Str], |inv| {
                Ok(Value::from(inv.get::<String>(0)? + &inv.get::<String>(1)?))
            }))
            .static_method(Member::with_types("sub", vec![Type::Int, Type::Int], |inv| {
                let (a, b) = (inv.get::<i64>(0)?, inv.get::<i64>(1)?);
                a.checked_sub(b)
                    .map(Value::Int)
                    .ok_or_else(|| AppError::new("integer overflow"))
            })),
    )?;

    catalog.register(
        ClassDescriptor::bean("Shape")
            .field("kind", Type::Str)
            .field("width", Type::Float)
            .field("height", Type::Float)
            .constructor(Member::with_types("$constructor", vec![Type::Int], |inv| {
                let side = inv.get::<f64>(0)?;
                Ok(shape("square", side, side))
            }))
            .constructor(Member::with_types("$constructor", vec![Type::Float], |inv| {
                let diameter = inv.get::<f64>(0)? * 2.0;
                Ok(shape("circle", diameter, diameter))
            }))
            .constructor(Member::with_types("$constructor", vec![Type::Int, Type::Int], |inv| {
                Ok(shape("rectangle", inv.get::<f64>(0)?, inv.get::<f64>(1)?))
            }))
            .constructor(Member::with_types("$constructor", vec![Type::Int, Type::Str], |inv| {
                let side = inv.get::<f64>(0)?;
                Ok(shape(&inv.get::<String>(1)?, side, side))
            })),
    )?;

    catalog.register(
        ClassDescriptor::opaque("Counter")
            .method(Member::with_types("inc", vec![], |inv| {
                Ok(Value::Int(counter(&inv)?.0.fetch_add(1, Ordering::SeqCst) + 1))
            }))
            .method(Member::with_types("add", vec![Type::Int], |inv| {
                let delta = inv.get::<i64>(0)?;
                Ok(Value::Int(counter(&inv)?.0.fetch_add(delta, Ordering::SeqCst) + delta))
            }))
            .method(Member::with_types("get", vec![], |inv| {
                Ok(Value::Int(counter(&inv)?.0.load(Ordering::SeqCst)))
            })),
    )?;
    catalog.register(
        ClassDescriptor::opaque("Counters")
            .method(Member::with_types("create", vec![], |_| {
                Ok(Value::object("Counter", Counter::default()))
            }))
            .method(Member::with_types("shared", vec![], |inv| {
                Ok(inv.this::<Counters>()?.shared.clone())
            })),
    )?;

    Ok(Arc::new(catalog))
}

fn resolve_user(ctx: &CallContext) -> std::result::Result<Value, AppError> {
    ctx.get::<User>()
        .map(|user| Value::from(user.0.as_str()))
        .ok_or_else(|| AppError::new("no user given (try --user)"))
}

/// Builds the global bridge with every demo endpoint registered.
///
/// # Errors
///
/// Returns an error if a demo class fails to register.
pub fn global_bridge(config: BridgeConfig) -> Result<Arc<Bridge>> {
    let global = Bridge::global(catalog()?, config);
    global.register_object_as("hello", Value::object("HelloService", HelloService), "DemoService")?;
    global.register_object("greeter", Value::object("HelloService", HelloService))?;
    global.register_class("calc", "Calc")?;
    global.register_class("shape", "Shape")?;
    global.register_object(
        "counters",
        Value::object(
            "Counters",
            Counters {
                shared: Value::object("Counter", Counter::default()),
            },
        ),
    )?;
    global.register_local_arg_resolver("user", Arc::new(resolve_user));
    Ok(global)
}

/// Opens a scope on `global` in which counters travel by callable reference.
///
/// # Errors
///
/// Returns an error if the reference registration fails.
pub fn session(global: &Arc<Bridge>) -> Result<Bridge> {
    let session = Bridge::scoped(global);
    session.register_callable_reference("Counter")?;
    Ok(session)
}
