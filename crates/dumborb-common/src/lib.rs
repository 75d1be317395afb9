//! dumborb Common Types
//!
//! This crate provides the protocol definitions and the in-process value model
//! shared by every dumborb component.
//!
//! # Overview
//!
//! dumborb is a JSON-RPC bridge: it exposes registered classes and objects as
//! callable endpoints and converts whole object graphs between JSON and typed
//! in-process values. This crate contains the pieces every layer agrees on:
//!
//! - **Protocol**: call envelopes, fixup paths, stable error codes and the
//!   [`DumborbError`] type
//! - **Values**: [`Value`], the dynamically typed object graph passed to and
//!   returned from registered members, with explicit identity
//! - **Types**: [`Type`], the declared types that drive unmarshalling
//!
//! # Components
//!
//! - [`protocol`] - Envelopes (Request, Response, ErrorObject) and errors
//! - [`value`] - Values, shared containers and identity
//! - [`types`] - Static types and converter cache keys
//!
//! # Example
//!
//! ```
//! use dumborb_common::{Request, Response, Value};
//! use serde_json::json;
//!
//! let request = Request::parse(&json!({
//!     "method": "calc.add",
//!     "params": [1, 2],
//!     "id": 1
//! })).unwrap();
//! assert_eq!(request.params.len(), 2);
//!
//! let response = Response::success(request.id, json!(3));
//! assert!(response.is_success());
//!
//! let point = Value::bean("Point", [("x", Value::Int(1)), ("y", Value::Int(2))]);
//! assert_eq!(point.class_name(), Some("Point"));
//! ```

pub mod protocol;
pub mod types;
pub mod value;

pub use protocol::*;
pub use types::{Type, TypeKey};
pub use value::{Bean, EnumValue, FromValue, Instance, ObjectId, Shared, SharedList, SharedMap, Value};
