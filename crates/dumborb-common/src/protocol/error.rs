use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;

use thiserror::Error;

use super::envelope::{
    FIXUP_ERROR, MARSHAL_ERROR, NO_CONSTRUCTOR_ERROR, NO_METHOD_ERROR, PARSE_ERROR,
    REMOTE_EXCEPTION, UNMARSHAL_ERROR,
};

/// Errors raised by the bridge machinery itself.
///
/// Application failures raised by invoked members travel separately as
/// [`AppError`]; this enum only covers protocol, conversion and
/// registration problems.
#[derive(Error, Debug)]
pub enum DumborbError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("method with the requested number of arguments not found: {0}")]
    NoSuchMethod(String),

    #[error("constructor not found: {0}")]
    NoSuchConstructor(String),

    #[error("object not found: {0}")]
    NoSuchObject(u64),

    #[error("Unmarshal error: {0}")]
    Unmarshal(String),

    #[error("Marshal error: {0}")]
    Marshal(String),

    #[error("invalid or unexpected data in fixups: {0}")]
    Fixup(String),

    #[error("Registration error: {0}")]
    Registration(String),

    #[error("Dependency error: {0}")]
    Dependency(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DumborbError {
    /// Wire error code used when this error is packaged into a failure envelope.
    ///
    /// Registration and dependency errors are raised at configuration time and
    /// never reach the wire in normal operation; they map to the generic
    /// application code.
    pub fn code(&self) -> i32 {
        match self {
            DumborbError::Parse(_) | DumborbError::Json(_) => PARSE_ERROR,
            DumborbError::NoSuchMethod(_) | DumborbError::NoSuchObject(_) => NO_METHOD_ERROR,
            DumborbError::NoSuchConstructor(_) => NO_CONSTRUCTOR_ERROR,
            DumborbError::Unmarshal(_) => UNMARSHAL_ERROR,
            DumborbError::Marshal(_) => MARSHAL_ERROR,
            DumborbError::Fixup(_) => FIXUP_ERROR,
            DumborbError::Registration(_) | DumborbError::Dependency(_) => REMOTE_EXCEPTION,
        }
    }
}

pub type Result<T> = std::result::Result<T, DumborbError>;

/// The raw error raised by an invoked member.
///
/// Carries a message, an optional source chain and a backtrace captured at
/// construction time (subject to `RUST_BACKTRACE`). The bridge hands it to the
/// exception transformer, which decides what reaches the wire.
pub struct AppError {
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    backtrace: Backtrace,
}

impl AppError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
            backtrace: Backtrace::capture(),
        }
    }

    /// Wraps an arbitrary error, keeping it as the source.
    pub fn from_error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: error.to_string(),
            source: Some(Box::new(error)),
            backtrace: Backtrace::capture(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Renders the message, every cause in the source chain and, if one was
    /// captured, the backtrace.
    pub fn trace(&self) -> String {
        let mut out = self.message.clone();
        let mut cause: Option<&(dyn std::error::Error + 'static)> = match &self.source {
            Some(source) => source.source(),
            None => None,
        };
        while let Some(err) = cause {
            out.push_str("\nCaused by: ");
            out.push_str(&err.to_string());
            cause = err.source();
        }
        if self.backtrace.status() == BacktraceStatus::Captured {
            out.push('\n');
            out.push_str(&self.backtrace.to_string());
        }
        out
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl fmt::Debug for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppError")
            .field("message", &self.message)
            .field("source", &self.source)
            .finish()
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<DumborbError> for AppError {
    fn from(error: DumborbError) -> Self {
        AppError::from_error(error)
    }
}

impl From<String> for AppError {
    fn from(message: String) -> Self {
        AppError::new(message)
    }
}

impl From<&str> for AppError {
    fn from(message: &str) -> Self {
        AppError::new(message)
    }
}
