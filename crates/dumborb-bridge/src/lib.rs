//! DumbORB Bridge
//!
//! Exposes registered classes and objects as JSON-RPC endpoints.
//!
//! # Overview
//!
//! A [`Bridge`] takes a call envelope such as
//!
//! ```json
//! {"method": "calc.add", "params": [1, 2], "id": 7}
//! ```
//!
//! finds the endpoint, picks the best-matching overload for the wire
//! arguments, unmarshals them, invokes the member and answers with a
//! success or failure envelope.
//!
//! # Components
//!
//! - [`bridge`] - Registration and dispatch, global and scoped tiers
//! - [`registry`] - Named class and object endpoints of one tier
//! - [`references`] - Pass-by-handle values and their handle tables
//! - [`hooks`] - Exception transformer, invocation callbacks and local
//!   argument resolvers
//! - [`context`] - The per-call [`CallContext`]
//!
//! # Method Names
//!
//! | Form | Meaning |
//! |------|---------|
//! | `endpoint.member` | Instance method of an object, static method of a class |
//! | `endpoint.$constructor` | Constructor of a class endpoint |
//! | `.obj[<handle>].member` | Method of a callable reference |
//! | `system.listMethods` | Every visible method name |

pub mod bridge;
pub mod config;
pub mod context;
pub mod error;
pub mod hooks;
pub mod references;
pub mod registry;
mod resolver;

pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use context::CallContext;
pub use error::TransportError;
pub use hooks::{DefaultTransformer, ErrorKind, ExceptionTransformer, InvocationCallback, LocalArgResolver};
pub use references::{ReferenceConverter, ReferenceKind, ReferencePolicy, ReferenceTable};
pub use registry::{ObjectBinding, Registry};
