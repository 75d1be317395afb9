pub mod envelope;
pub mod error;

#[cfg(test)]
mod tests;

pub use envelope::{ErrorObject, Fixup, FlatObjects, Path, PathSegment, Request, Response};
pub use error::{AppError, DumborbError, Result};
