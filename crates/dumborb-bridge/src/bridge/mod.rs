//! Bridge
//!
//! The registry and dispatcher facade.
//!
//! # Scopes
//!
//! There is no hidden global bridge. [`Bridge::global`] creates the
//! process-wide bridge; [`Bridge::scoped`] creates a bridge for one scope
//! (typically a session) that falls back on the global one. Each scope owns
//! its registry tier, its reference table and its serializer.
//!
//! Lookups check the scope first, then the global bridge: objects before
//! classes in each tier. Hooks (local argument resolvers, the exception
//! transformer) fall back the same way; invocation callbacks of both tiers
//! run, global ones first.
//!
//! # References
//!
//! References only make sense within a scope, so registering reference
//! classes on the global bridge fails. The first registration on a scope
//! installs the reference converter on that scope's serializer.

mod dispatch;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use dumborb_common::{DumborbError, Result, Value};
use dumborb_serializer::{ClassCatalog, Converter, Serializer};

use crate::config::BridgeConfig;
use crate::hooks::{DefaultTransformer, ExceptionTransformer, InvocationCallback, LocalArgResolver};
use crate::references::{ReferenceConverter, ReferenceKind, ReferencePolicy, ReferenceTable};
use crate::registry::{ObjectBinding, Registry};

/// Exposes registered classes and objects as JSON-RPC endpoints.
pub struct Bridge {
    parent: Option<Arc<Bridge>>,
    catalog: Arc<ClassCatalog>,
    config: BridgeConfig,
    serializer: Serializer,
    registry: Registry,
    references: Arc<ReferenceTable>,
    policy: Arc<ReferencePolicy>,
    references_enabled: AtomicBool,
    converters: RwLock<Vec<Arc<dyn Converter>>>,
    transformer: RwLock<Option<Arc<dyn ExceptionTransformer>>>,
    callbacks: RwLock<Vec<Arc<dyn InvocationCallback>>>,
    resolvers: RwLock<HashMap<String, Arc<dyn LocalArgResolver>>>,
}

impl Bridge {
    fn build(parent: Option<Arc<Bridge>>, catalog: Arc<ClassCatalog>, config: BridgeConfig) -> Self {
        let serializer = Serializer::new(Arc::clone(&catalog), config.serializer.clone());
        Self {
            parent,
            catalog,
            config,
            serializer,
            registry: Registry::new(),
            references: Arc::new(ReferenceTable::new()),
            policy: Arc::new(ReferencePolicy::default()),
            references_enabled: AtomicBool::new(false),
            converters: RwLock::new(Vec::new()),
            transformer: RwLock::new(None),
            callbacks: RwLock::new(Vec::new()),
            resolvers: RwLock::new(HashMap::new()),
        }
    }

    /// Creates the process-wide bridge.
    pub fn global(catalog: Arc<ClassCatalog>, config: BridgeConfig) -> Arc<Bridge> {
        tracing::info!("global bridge created");
        Arc::new(Self::build(None, catalog, config))
    }

    /// Creates a scope bridge falling back on `global`.
    ///
    /// Converters registered on `global` so far are registered on the new
    /// scope's serializer as well.
    pub fn scoped(global: &Arc<Bridge>) -> Bridge {
        let bridge = Self::build(
            Some(Arc::clone(global)),
            Arc::clone(&global.catalog),
            global.config.clone(),
        );
        for converter in global.converters.read().iter() {
            bridge.serializer.register_converter(Arc::clone(converter));
        }
        bridge
    }

    pub fn is_global(&self) -> bool {
        self.parent.is_none()
    }

    pub fn catalog(&self) -> &Arc<ClassCatalog> {
        &self.catalog
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn serializer(&self) -> &Serializer {
        &self.serializer
    }

    /// This scope's reference table.
    pub fn references(&self) -> &ReferenceTable {
        &self.references
    }

    // ========================================================================
    // Endpoints
    // ========================================================================

    /// Exposes the static methods and constructors of `class` as `name`.
    ///
    /// # Errors
    ///
    /// Returns `DumborbError::Registration` if `class` is not in the catalog
    /// or `name` is already bound to another class in this tier.
    pub fn register_class(&self, name: &str, class: &str) -> Result<()> {
        if !self.catalog.contains(class) {
            return Err(DumborbError::Registration(format!("unknown class {}", class)));
        }
        self.registry.register_class(name, class)?;
        tracing::info!("registered class {} as '{}'", class, name);
        Ok(())
    }

    /// Exposes the instance methods of `value` as `name`, replacing any
    /// object previously bound to `name` in this tier.
    ///
    /// # Errors
    ///
    /// Returns `DumborbError::Registration` if `value` is not an object or
    /// bean of a registered class.
    pub fn register_object(&self, name: &str, value: Value) -> Result<()> {
        let class = self.class_of(&value)?;
        self.bind(name, ObjectBinding::new(value, &class, &class));
        Ok(())
    }

    /// Exposes only the members `value` implements from `interface`.
    ///
    /// # Errors
    ///
    /// Returns `DumborbError::Registration` if `value` is not an object of a
    /// registered class, or that class is not assignable to `interface`.
    pub fn register_object_as(&self, name: &str, value: Value, interface: &str) -> Result<()> {
        let class = self.class_of(&value)?;
        if !self.catalog.contains(interface) || !self.catalog.is_assignable(&class, interface) {
            return Err(DumborbError::Registration(format!(
                "{} does not implement {}",
                class, interface
            )));
        }
        self.bind(name, ObjectBinding::new(value, &class, interface));
        Ok(())
    }

    fn class_of(&self, value: &Value) -> Result<String> {
        match value.class_name() {
            Some(class) if self.catalog.contains(class) => Ok(class.to_string()),
            Some(class) => Err(DumborbError::Registration(format!("unknown class {}", class))),
            None => Err(DumborbError::Registration(format!(
                "a {} cannot be registered as an object",
                value.kind_name()
            ))),
        }
    }

    fn bind(&self, name: &str, binding: ObjectBinding) {
        let visible = binding.visible_class().to_string();
        if self.registry.register_object(name, binding).is_some() {
            tracing::info!("replaced object '{}' ({})", name, visible);
        } else {
            tracing::info!("registered object '{}' ({})", name, visible);
        }
    }

    pub fn unregister_class(&self, name: &str) -> bool {
        self.registry.unregister_class(name)
    }

    pub fn unregister_object(&self, name: &str) -> bool {
        self.registry.unregister_object(name)
    }

    /// The class bound to `name` in this scope, else in the global bridge.
    pub fn lookup_class(&self, name: &str) -> Option<Arc<str>> {
        self.registry
            .class(name)
            .or_else(|| self.parent.as_ref().and_then(|p| p.lookup_class(name)))
    }

    /// The object bound to `name` in this scope, else in the global bridge.
    pub fn lookup_object(&self, name: &str) -> Option<ObjectBinding> {
        self.registry
            .object(name)
            .or_else(|| self.parent.as_ref().and_then(|p| p.lookup_object(name)))
    }

    // ========================================================================
    // References
    // ========================================================================

    /// Passes values of `class` and its subtypes by plain reference.
    ///
    /// # Errors
    ///
    /// Returns `DumborbError::Dependency` on the global bridge.
    pub fn register_reference(&self, class: &str) -> Result<()> {
        self.add_reference(class, ReferenceKind::Plain)
    }

    /// Passes values of `class` and its subtypes by callable reference.
    ///
    /// # Errors
    ///
    /// Returns `DumborbError::Dependency` on the global bridge.
    pub fn register_callable_reference(&self, class: &str) -> Result<()> {
        self.add_reference(class, ReferenceKind::Callable)
    }

    fn add_reference(&self, class: &str, kind: ReferenceKind) -> Result<()> {
        if self.is_global() {
            return Err(DumborbError::Dependency(format!(
                "cannot register {} as a reference on the global bridge",
                class
            )));
        }
        self.enable_references();
        self.policy.add(class, kind);
        tracing::info!("{} passed by {:?} reference", class, kind);
        Ok(())
    }

    fn enable_references(&self) {
        if !self.references_enabled.swap(true, Ordering::SeqCst) {
            let converter = ReferenceConverter::new(Arc::clone(&self.references), Arc::clone(&self.policy));
            self.serializer.register_converter(Arc::new(converter));
            tracing::info!("references enabled");
        }
    }

    // ========================================================================
    // Hooks
    // ========================================================================

    pub fn register_converter(&self, converter: Arc<dyn Converter>) {
        self.converters.write().push(Arc::clone(&converter));
        self.serializer.register_converter(converter);
    }

    pub fn set_exception_transformer(&self, transformer: Arc<dyn ExceptionTransformer>) {
        *self.transformer.write() = Some(transformer);
    }

    pub fn register_callback(&self, callback: Arc<dyn InvocationCallback>) {
        self.callbacks.write().push(callback);
    }

    /// Removes a callback registered on this bridge. Returns false if it was
    /// not registered.
    pub fn unregister_callback(&self, callback: &Arc<dyn InvocationCallback>) -> bool {
        let mut callbacks = self.callbacks.write();
        let before = callbacks.len();
        callbacks.retain(|c| !Arc::ptr_eq(c, callback));
        callbacks.len() != before
    }

    /// Registers the resolver for local parameters named `name`.
    pub fn register_local_arg_resolver(&self, name: &str, resolver: Arc<dyn LocalArgResolver>) {
        self.resolvers.write().insert(name.to_string(), resolver);
    }

    pub fn unregister_local_arg_resolver(&self, name: &str) -> bool {
        self.resolvers.write().remove(name).is_some()
    }

    fn transformer(&self) -> Arc<dyn ExceptionTransformer> {
        if let Some(transformer) = self.transformer.read().as_ref() {
            return Arc::clone(transformer);
        }
        match &self.parent {
            Some(parent) => parent.transformer(),
            None => Arc::new(DefaultTransformer),
        }
    }

    fn resolver(&self, name: &str) -> Option<Arc<dyn LocalArgResolver>> {
        self.resolvers
            .read()
            .get(name)
            .cloned()
            .or_else(|| self.parent.as_ref().and_then(|p| p.resolver(name)))
    }

    /// Callbacks of every tier, outermost first.
    fn callbacks(&self) -> Vec<Arc<dyn InvocationCallback>> {
        let mut callbacks = self
            .parent
            .as_ref()
            .map(|p| p.callbacks())
            .unwrap_or_default();
        callbacks.extend(self.callbacks.read().iter().cloned());
        callbacks
    }
}
