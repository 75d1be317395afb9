//! Embedder Hooks
//!
//! Extension points consulted while a call is dispatched:
//!
//! - [`ExceptionTransformer`]: maps an [`AppError`] raised by a member onto
//!   an [`ErrorKind`], e.g. to redact messages or attach custom error codes
//! - [`InvocationCallback`]: runs before and after every member invocation
//! - [`LocalArgResolver`]: supplies local parameters from the [`CallContext`]
//!
//! Closures implement the transformer and resolver traits directly.

use serde_json::Value as JsonValue;

use dumborb_common::{AppError, Value};
use dumborb_serializer::Member;

use crate::context::CallContext;

/// What an application error becomes on its way out of the bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    /// A 490 failure envelope. The trace is only sent to callers that asked
    /// for diagnostics, or when the bridge is configured to include traces.
    Application {
        message: String,
        trace: Option<String>,
    },
    /// A failure envelope with an embedder-chosen code and payload
    Custom {
        code: i32,
        message: String,
        data: Option<JsonValue>,
    },
    /// No envelope at all: `call` fails with `TransportError::Permanent`
    Permanent(String),
}

pub trait ExceptionTransformer: Send + Sync {
    fn transform(&self, error: &AppError) -> ErrorKind;
}

impl<F> ExceptionTransformer for F
where
    F: Fn(&AppError) -> ErrorKind + Send + Sync,
{
    fn transform(&self, error: &AppError) -> ErrorKind {
        self(error)
    }
}

/// Reports every error as an application error carrying its full trace.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTransformer;

impl ExceptionTransformer for DefaultTransformer {
    fn transform(&self, error: &AppError) -> ErrorKind {
        ErrorKind::Application {
            message: error.message().to_string(),
            trace: Some(error.trace()),
        }
    }
}

/// Hooks around member invocation.
///
/// An error from either hook fails the call like an error raised by the
/// member itself. `post_invoke` only runs after a successful invocation.
pub trait InvocationCallback: Send + Sync {
    fn pre_invoke(
        &self,
        _ctx: &CallContext,
        _receiver: Option<&Value>,
        _member: &Member,
    ) -> Result<(), AppError> {
        Ok(())
    }

    fn post_invoke(
        &self,
        _ctx: &CallContext,
        _receiver: Option<&Value>,
        _member: &Member,
        _result: &Value,
    ) -> Result<(), AppError> {
        Ok(())
    }
}

/// Produces the value of a local parameter for one call.
pub trait LocalArgResolver: Send + Sync {
    fn resolve(&self, ctx: &CallContext) -> Result<Value, AppError>;
}

impl<F> LocalArgResolver for F
where
    F: Fn(&CallContext) -> Result<Value, AppError> + Send + Sync,
{
    fn resolve(&self, ctx: &CallContext) -> Result<Value, AppError> {
        self(ctx)
    }
}
