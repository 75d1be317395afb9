use serde_json::Value as JsonValue;
use thiserror::Error;

use dumborb_common::{DumborbError, ErrorObject, Response};

/// Failures that `Bridge::call` reports to the transport instead of
/// answering with a failure envelope.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The envelope itself is malformed
    #[error("malformed envelope: {0}")]
    Parse(#[source] DumborbError),

    /// Retrying within the same scope cannot succeed, e.g. an expired session
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl TransportError {
    /// The failure envelope a transport may send for this error, if any.
    ///
    /// Parse errors become a 590 envelope. Permanent failures have no
    /// envelope; the transport maps them onto its own status.
    pub fn to_response(&self, id: JsonValue) -> Option<Response> {
        match self {
            TransportError::Parse(error) => Some(Response::failure(id, ErrorObject::from(error))),
            TransportError::Permanent(_) => None,
        }
    }
}
