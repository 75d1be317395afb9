use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use dumborb_common::protocol::envelope::{CONSTRUCTOR_FLAG, LIST_METHODS};
use dumborb_common::{AppError, DumborbError, ErrorObject, PathSegment, Request, Response, Value};
use dumborb_serializer::{Encoded, Invocation, Member, Param};

use super::Bridge;
use crate::context::CallContext;
use crate::error::TransportError;
use crate::hooks::ErrorKind;
use crate::resolver;

const OBJECT_PREFIX: &str = ".obj[";
const REF_PREFIX: &str = ".ref[";

/// What a method name addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target<'a> {
    ListMethods,
    Member { endpoint: &'a str, member: &'a str },
    Constructor { endpoint: &'a str },
    Callable { handle: u64, member: &'a str },
}

fn parse_method(method: &str) -> Result<Target<'_>, DumborbError> {
    if method == LIST_METHODS || method.ends_with(&format!(".{}", LIST_METHODS)) {
        return Ok(Target::ListMethods);
    }
    if let Some(rest) = method.strip_prefix(OBJECT_PREFIX) {
        let (handle, member) = rest
            .split_once("].")
            .ok_or_else(|| DumborbError::NoSuchMethod(method.to_string()))?;
        let handle = handle
            .parse::<u64>()
            .map_err(|_| DumborbError::NoSuchMethod(method.to_string()))?;
        return Ok(Target::Callable { handle, member });
    }
    match method.rsplit_once('.') {
        Some((endpoint, CONSTRUCTOR_FLAG)) if !endpoint.is_empty() => Ok(Target::Constructor { endpoint }),
        Some((endpoint, member)) if !endpoint.is_empty() && !member.is_empty() => {
            Ok(Target::Member { endpoint, member })
        }
        _ => Err(DumborbError::NoSuchMethod(method.to_string())),
    }
}

/// Why a call did not produce a result.
enum Failure {
    Envelope(ErrorObject),
    Permanent(String),
}

impl From<DumborbError> for Failure {
    fn from(error: DumborbError) -> Self {
        Failure::Envelope(ErrorObject::from(&error))
    }
}

/// The resolved target of a call.
struct Selection {
    receiver: Option<Value>,
    candidates: Vec<Member>,
    constructor: bool,
}

impl Bridge {
    /// Dispatches one call envelope.
    ///
    /// Every failure reachable from a well-formed envelope is answered with
    /// a failure envelope carrying the request id.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Parse` if `method` or `params` is missing or
    /// invalid, and `TransportError::Permanent` if the exception transformer
    /// classifies an application error as permanent.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use dumborb_bridge::{Bridge, BridgeConfig, CallContext};
    /// use dumborb_common::{Type, Value};
    /// use dumborb_serializer::{ClassCatalog, ClassDescriptor, Member};
    /// use serde_json::json;
    ///
    /// let catalog = Arc::new(ClassCatalog::new());
    /// catalog.register(ClassDescriptor::opaque("Calc").static_method(
    ///     Member::with_types("add", vec![Type::Int, Type::Int], |inv| {
    ///         Ok(Value::Int(inv.get::<i64>(0)? + inv.get::<i64>(1)?))
    ///     }),
    /// )).unwrap();
    ///
    /// let bridge = Bridge::global(catalog, BridgeConfig::default());
    /// bridge.register_class("calc", "Calc").unwrap();
    ///
    /// let response = bridge
    ///     .call(&CallContext::new(), &json!({"method": "calc.add", "params": [2, 3], "id": 1}))
    ///     .unwrap();
    /// assert_eq!(response.result, Some(json!(5)));
    /// ```
    pub fn call(&self, ctx: &CallContext, envelope: &JsonValue) -> Result<Response, TransportError> {
        let request = Request::parse(envelope).map_err(TransportError::Parse)?;
        tracing::debug!("dispatching {} with {} params", request.method, request.params.len());
        match self.dispatch(ctx, &request) {
            Ok(encoded) => Ok(Response::success(request.id, encoded.result)
                .with_fixups(encoded.fixups)
                .with_objects(encoded.objects)),
            Err(Failure::Envelope(error)) => {
                tracing::debug!("{} failed with code {}", request.method, error.code);
                Ok(Response::failure(request.id, error))
            }
            Err(Failure::Permanent(message)) => Err(TransportError::Permanent(message)),
        }
    }

    /// Every callable `endpoint.member` name visible from this bridge, plus
    /// `.ref[Class].member` for callable reference classes. Sorted, without
    /// duplicates.
    pub fn list_methods(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        self.collect_methods(&mut names);
        names.into_iter().collect()
    }

    fn collect_methods(&self, names: &mut BTreeSet<String>) {
        if let Some(parent) = &self.parent {
            parent.collect_methods(names);
        }
        for (name, binding) in self.registry.objects() {
            if let Some(data) = self.catalog.class_data(binding.visible_class()) {
                names.extend(data.method_names().map(|m| format!("{}.{}", name, m)));
            }
        }
        for (name, class) in self.registry.classes() {
            if let Some(data) = self.catalog.class_data(&class) {
                names.extend(data.static_method_names().map(|m| format!("{}.{}", name, m)));
            }
        }
        for class in self.policy.callable_classes() {
            if let Some(data) = self.catalog.class_data(&class) {
                names.extend(
                    data.method_names()
                        .map(|m| format!("{}{}].{}", REF_PREFIX, class, m)),
                );
            }
        }
    }

    fn dispatch(&self, ctx: &CallContext, request: &Request) -> Result<Encoded, Failure> {
        let target = parse_method(&request.method)?;
        if target == Target::ListMethods {
            return Ok(Encoded::plain(JsonValue::from(self.list_methods())));
        }
        let (params, fixups) = self.serializer.decode_params(request)?;
        let arity = params.len();
        let selection = self.select(&target, arity)?;
        if selection.candidates.is_empty() {
            return Err(not_found(selection.constructor, &request.method).into());
        }

        let root = Arc::new(JsonValue::Array(params));
        // Validates the fixups before any candidate is scored.
        let mut state = self.serializer.value_state(Arc::clone(&root), &fixups)?;
        let member = resolver::resolve(&self.serializer, &selection.candidates, &root, &fixups)
            .ok_or_else(|| not_found(selection.constructor, &request.method))?;
        tracing::debug!("{} resolved to {}", request.method, member.signature());

        let mut wire_args = Vec::with_capacity(arity);
        let wires = root.as_array().map(Vec::as_slice).unwrap_or(&[]);
        for (i, (ty, wire)) in member.wire_types().zip(wires).enumerate() {
            wire_args.push(self.serializer.unmarshal_child(&mut state, PathSegment::Index(i), ty, wire)?);
        }
        let args = self.with_locals(ctx, member, wire_args)?;

        let result = self.invoke(ctx, selection.receiver.as_ref(), member, args)?;
        Ok(self.serializer.encode_root(&result)?)
    }

    fn select(&self, target: &Target<'_>, arity: usize) -> Result<Selection, DumborbError> {
        match *target {
            Target::ListMethods => Ok(Selection {
                receiver: None,
                candidates: Vec::new(),
                constructor: false,
            }),
            Target::Member { endpoint, member } => {
                if let Some(binding) = self.lookup_object(endpoint) {
                    let data = self.class_data(binding.runtime_class())?;
                    let visible = if binding.is_restricted() {
                        Some(self.class_data(binding.visible_class())?)
                    } else {
                        None
                    };
                    let candidates = data
                        .methods(member, arity)
                        .iter()
                        .filter(|m| visible.as_ref().map_or(true, |v| v.declares(m)))
                        .cloned()
                        .collect();
                    return Ok(Selection {
                        receiver: Some(binding.value().clone()),
                        candidates,
                        constructor: false,
                    });
                }
                let class = self
                    .lookup_class(endpoint)
                    .ok_or_else(|| DumborbError::NoSuchMethod(endpoint.to_string()))?;
                let data = self.class_data(&class)?;
                Ok(Selection {
                    receiver: None,
                    candidates: data.static_methods(member, arity).to_vec(),
                    constructor: false,
                })
            }
            Target::Constructor { endpoint } => {
                let class = self
                    .lookup_class(endpoint)
                    .ok_or_else(|| DumborbError::NoSuchConstructor(endpoint.to_string()))?;
                let data = self.class_data(&class)?;
                Ok(Selection {
                    receiver: None,
                    candidates: data.constructors(arity).to_vec(),
                    constructor: true,
                })
            }
            Target::Callable { handle, member } => {
                let value = self.resolve_callable(handle)?;
                let class = value
                    .class_name()
                    .ok_or(DumborbError::NoSuchObject(handle))?
                    .to_string();
                let data = self.class_data(&class)?;
                Ok(Selection {
                    candidates: data.methods(member, arity).to_vec(),
                    receiver: Some(value),
                    constructor: false,
                })
            }
        }
    }

    fn class_data(&self, class: &str) -> Result<Arc<dumborb_serializer::ClassData>, DumborbError> {
        self.catalog
            .class_data(class)
            .ok_or_else(|| DumborbError::NoSuchMethod(format!("class {} is not registered", class)))
    }

    /// Resolves a callable reference handle in this scope or the ones above.
    fn resolve_callable(&self, handle: u64) -> Result<Value, DumborbError> {
        match self.references.resolve_callable(handle) {
            Ok(value) => Ok(value),
            Err(e) => match &self.parent {
                Some(parent) => parent.resolve_callable(handle),
                None => Err(e),
            },
        }
    }

    /// Interleaves local parameters, resolved from the context, with the
    /// unmarshalled wire arguments.
    fn with_locals(&self, ctx: &CallContext, member: &Member, wire_args: Vec<Value>) -> Result<Vec<Value>, Failure> {
        let mut wire_args = wire_args.into_iter();
        let mut args = Vec::with_capacity(member.params().len());
        for param in member.params() {
            match param {
                Param::Wire(_) => args.push(wire_args.next().unwrap_or(Value::Null)),
                Param::Local(name) => {
                    let resolver = self.resolver(name).ok_or_else(|| {
                        self.application_failure(
                            ctx,
                            AppError::new(format!("no resolver for local parameter '{}'", name)),
                        )
                    })?;
                    let value = resolver
                        .resolve(ctx)
                        .map_err(|e| self.application_failure(ctx, e))?;
                    args.push(value);
                }
            }
        }
        Ok(args)
    }

    fn invoke(
        &self,
        ctx: &CallContext,
        receiver: Option<&Value>,
        member: &Member,
        args: Vec<Value>,
    ) -> Result<Value, Failure> {
        let callbacks = self.callbacks();
        for callback in &callbacks {
            callback
                .pre_invoke(ctx, receiver, member)
                .map_err(|e| self.application_failure(ctx, e))?;
        }
        let result = member
            .invoke(Invocation::new(receiver.cloned(), args))
            .map_err(|e| self.application_failure(ctx, e))?;
        for callback in &callbacks {
            callback
                .post_invoke(ctx, receiver, member, &result)
                .map_err(|e| self.application_failure(ctx, e))?;
        }
        Ok(result)
    }

    fn application_failure(&self, ctx: &CallContext, error: AppError) -> Failure {
        tracing::warn!("application error: {}", error);
        match self.transformer().transform(&error) {
            ErrorKind::Application { message, trace } => {
                let trace = trace.filter(|_| ctx.diagnostics() || self.config.include_traces);
                Failure::Envelope(ErrorObject::application(message, trace))
            }
            ErrorKind::Custom { code, message, data } => {
                Failure::Envelope(ErrorObject::custom(code, message, data))
            }
            ErrorKind::Permanent(message) => Failure::Permanent(message),
        }
    }
}

fn not_found(constructor: bool, method: &str) -> DumborbError {
    if constructor {
        DumborbError::NoSuchConstructor(method.to_string())
    } else {
        DumborbError::NoSuchMethod(method.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_method_forms() {
        assert_eq!(parse_method("system.listMethods").unwrap(), Target::ListMethods);
        assert_eq!(parse_method("calc.system.listMethods").unwrap(), Target::ListMethods);
        assert_eq!(
            parse_method("calc.add").unwrap(),
            Target::Member { endpoint: "calc", member: "add" }
        );
        assert_eq!(
            parse_method("a.b.c").unwrap(),
            Target::Member { endpoint: "a.b", member: "c" }
        );
        assert_eq!(
            parse_method("Point.$constructor").unwrap(),
            Target::Constructor { endpoint: "Point" }
        );
        assert_eq!(
            parse_method(".obj[12].inc").unwrap(),
            Target::Callable { handle: 12, member: "inc" }
        );
    }

    #[test]
    fn test_parse_method_rejects_malformed_names() {
        for bad in ["nodot", ".obj[x].inc", ".obj[3]inc", "calc.", ".add"] {
            assert!(
                matches!(parse_method(bad), Err(DumborbError::NoSuchMethod(_))),
                "{} should not parse",
                bad
            );
        }
    }
}
