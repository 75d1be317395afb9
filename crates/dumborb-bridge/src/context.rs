use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

/// Per-call context supplied by the transport.
///
/// A typed extension bag holding whatever the transport knows about the
/// call (request headers, the session, the authenticated user). Local
/// parameters of registered members are resolved from it and never appear
/// on the wire.
///
/// # Example
///
/// ```rust
/// use dumborb_bridge::CallContext;
///
/// struct User(String);
///
/// let ctx = CallContext::new()
///     .with(User("ada".into()))
///     .with_diagnostics(true);
/// assert_eq!(ctx.get::<User>().map(|u| u.0.as_str()), Some("ada"));
/// assert!(ctx.diagnostics());
/// ```
#[derive(Default)]
pub struct CallContext {
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    diagnostics: bool,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests diagnostic traces on application errors for this call.
    pub fn with_diagnostics(mut self, diagnostics: bool) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn diagnostics(&self) -> bool {
        self.diagnostics
    }

    /// Stores an extension, replacing any previous one of the same type.
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn with<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.insert(value);
        self
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<T>())
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("extensions", &self.extensions.len())
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}
