use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use dumborb_common::{DumborbError, Result, Value};

/// An object endpoint.
#[derive(Debug, Clone)]
pub struct ObjectBinding {
    value: Value,
    runtime: Arc<str>,
    visible: Arc<str>,
}

impl ObjectBinding {
    /// Binds `value`, whose class is `runtime`, exposing the members of
    /// `visible` (the runtime class itself, or an interface it implements).
    pub fn new(value: Value, runtime: &str, visible: &str) -> Self {
        Self {
            value,
            runtime: Arc::from(runtime),
            visible: Arc::from(visible),
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn runtime_class(&self) -> &str {
        &self.runtime
    }

    pub fn visible_class(&self) -> &str {
        &self.visible
    }

    /// True when only the members of an interface are exposed.
    pub fn is_restricted(&self) -> bool {
        self.runtime != self.visible
    }
}

/// One registry tier: named class and object endpoints.
///
/// Read on every call, written only while endpoints are set up.
#[derive(Debug, Default)]
pub struct Registry {
    classes: RwLock<HashMap<String, Arc<str>>>,
    objects: RwLock<HashMap<String, ObjectBinding>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name` to a class endpoint.
    ///
    /// # Errors
    ///
    /// Returns `DumborbError::Registration` if `name` is already bound to a
    /// different class. Binding the same class again is a no-op.
    pub fn register_class(&self, name: &str, class: &str) -> Result<()> {
        let mut classes = self.classes.write();
        match classes.get(name) {
            Some(existing) if &**existing == class => Ok(()),
            Some(existing) => Err(DumborbError::Registration(format!(
                "'{}' is bound to class {}, not {}",
                name, existing, class
            ))),
            None => {
                classes.insert(name.to_string(), Arc::from(class));
                Ok(())
            }
        }
    }

    /// Binds `name` to an object endpoint, returning the binding it replaces.
    pub fn register_object(&self, name: &str, binding: ObjectBinding) -> Option<ObjectBinding> {
        self.objects.write().insert(name.to_string(), binding)
    }

    pub fn unregister_class(&self, name: &str) -> bool {
        self.classes.write().remove(name).is_some()
    }

    pub fn unregister_object(&self, name: &str) -> bool {
        self.objects.write().remove(name).is_some()
    }

    pub fn class(&self, name: &str) -> Option<Arc<str>> {
        self.classes.read().get(name).cloned()
    }

    pub fn object(&self, name: &str) -> Option<ObjectBinding> {
        self.objects.read().get(name).cloned()
    }

    pub fn classes(&self) -> Vec<(String, Arc<str>)> {
        self.classes
            .read()
            .iter()
            .map(|(name, class)| (name.clone(), Arc::clone(class)))
            .collect()
    }

    pub fn objects(&self) -> Vec<(String, ObjectBinding)> {
        self.objects
            .read()
            .iter()
            .map(|(name, binding)| (name.clone(), binding.clone()))
            .collect()
    }
}
