//! DumbORB Serializer
//!
//! Type-directed conversion between in-memory [`Value`](dumborb_common::Value)
//! graphs and their JSON wire form.
//!
//! # Overview
//!
//! - [`ClassCatalog`]: registration-time descriptions of every class that can
//!   cross the wire, with cached member indexes
//! - [`Serializer`]: drives pluggable [`Converter`]s over whole graphs,
//!   resolving `$type` hints against declared types
//! - [`MarshalState`] / [`UnmarshalState`]: per-pass bookkeeping that turns
//!   shared and circular references into fixups
//! - [`flat`]: the flat envelope layout, where objects are hoisted into an
//!   indexed table instead of nested
//! - [`Match`]: scores produced by speculative unmarshalling, used to pick
//!   between overloads
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use dumborb_common::{Type, Value};
//! use dumborb_serializer::{ClassCatalog, Serializer, SerializerConfig};
//!
//! let serializer = Serializer::new(Arc::new(ClassCatalog::new()), SerializerConfig::default());
//!
//! let node = Value::map([("name", Value::from("loop"))]);
//! node.as_map().unwrap().write().insert("self".into(), node.clone());
//!
//! let (wire, fixups) = serializer.marshal_root(&node).unwrap();
//! assert_eq!(fixups.len(), 1);
//!
//! let back = serializer.unmarshal_root(&Type::Any, &wire, &fixups).unwrap();
//! let inner = back.as_map().unwrap().read().get("self").cloned().unwrap();
//! assert!(inner.same(&back));
//! ```

pub mod catalog;
pub mod converters;
pub mod flat;
pub mod matching;
pub mod serializer;
pub mod state;

pub use catalog::{ClassCatalog, ClassData, ClassDescriptor, ClassKind, Invocation, Invoker, Member, Param};
pub use converters::Converter;
pub use matching::Match;
pub use serializer::{Encoded, FixupPolicy, ScoreState, Serializer, SerializerConfig, ValueState, WireFormat};
pub use state::{MarshalState, Position, Sighting, UnmarshalState};
