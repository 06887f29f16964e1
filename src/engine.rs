//! Engine facade and ambient application context.
//!
//! The engine ties the long-lived pieces together: configuration, the error
//! manager, the resolver registry, and the converter service. It is built
//! once at startup by the external wiring layer and shared read-only across
//! every request; `serve` is the per-request entry the transport layer calls
//! after route resolution.

use crate::binding::{BindRequest, ConverterService, SimpleConverter};
use crate::config::EngineConfig;
use crate::context::RequestContext;
use crate::error::DispatchError;
use crate::recovery::{ErrorHandler, ErrorManager};
use crate::resolver::{BindingResolver, ContextResolver, ParameterResolver, ResolverRegistry};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Process-wide application context available to handlers through parameter
/// resolution.
pub struct AppContext {
    name: String,
    attributes: RwLock<HashMap<String, String>>,
}

impl AppContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), attributes: RwLock::new(HashMap::new()) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn put_attribute(&self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.write().insert(key.into(), value.into());
    }

    pub fn attribute(&self, key: &str) -> Option<String> {
        self.attributes.read().get(key).cloned()
    }
}

/// Shared dispatch engine.
pub struct Engine {
    config: EngineConfig,
    errors: ErrorManager,
    resolvers: Arc<ResolverRegistry>,
    converter: Arc<dyn ConverterService>,
    app: Arc<AppContext>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn resolvers(&self) -> &Arc<ResolverRegistry> {
        &self.resolvers
    }

    pub fn app_context(&self) -> &Arc<AppContext> {
        &self.app
    }

    /// Allocate a context sized per configuration. Pool management is the
    /// caller's concern; the pool calls `prepare`/`reset` at checkout/return.
    pub fn new_context(&self) -> RequestContext {
        let mut ctx = RequestContext::with_attribute_capacity(self.config.attribute_capacity);
        ctx.set_converter(self.converter.clone());
        ctx
    }

    /// Run an activated context through its handler chain.
    pub fn serve(&self, ctx: &mut RequestContext) -> Result<(), DispatchError> {
        ctx.set_converter(self.converter.clone());
        ctx.set_response_content_type(self.config.default_media_type);
        ctx.attach_app_context(self.app.clone());
        debug!(context = %ctx.context_id(), "dispatching request");
        ctx.invoke(self.config.recovery, &self.errors)
    }
}

type BinderRegistration = fn(&mut BindingResolver);

/// Startup wiring for an [`Engine`].
pub struct EngineBuilder {
    config: EngineConfig,
    app_name: String,
    converter: Arc<dyn ConverterService>,
    bindables: Vec<BinderRegistration>,
    extra_resolvers: Vec<Box<dyn ParameterResolver>>,
    custom_error_handler: Option<Box<dyn ErrorHandler>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            app_name: "slipway".to_string(),
            converter: Arc::new(SimpleConverter),
            bindables: Vec::new(),
            extra_resolvers: Vec::new(),
            custom_error_handler: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Swap the type-conversion service used by structured binding.
    pub fn converter(mut self, converter: Arc<dyn ConverterService>) -> Self {
        self.converter = converter;
        self
    }

    /// Register a bindable target type with the binding resolver.
    pub fn bindable<T: BindRequest>(mut self) -> Self {
        self.bindables.push(|resolver| resolver.register::<T>());
        self
    }

    /// Add an application-supplied resolver. It is consulted after the
    /// context resolver and before the binding resolver.
    pub fn resolver(mut self, resolver: Box<dyn ParameterResolver>) -> Self {
        self.extra_resolvers.push(resolver);
        self
    }

    /// Install a custom error handler, superseding the default for all HTTP
    /// errors.
    pub fn error_handler(mut self, handler: Box<dyn ErrorHandler>) -> Self {
        self.custom_error_handler = Some(handler);
        self
    }

    pub fn build(self) -> Engine {
        let mut binding = BindingResolver::new(self.converter.clone());
        for register in self.bindables {
            register(&mut binding);
        }

        let mut registry = ResolverRegistry::new();
        registry.register(Box::new(ContextResolver));
        for resolver in self.extra_resolvers {
            registry.register(resolver);
        }
        registry.register(Box::new(binding));

        let errors = match self.custom_error_handler {
            Some(handler) => ErrorManager::new().with_custom_handler(handler),
            None => ErrorManager::new(),
        };

        Engine {
            config: self.config,
            errors,
            resolvers: Arc::new(registry),
            converter: self.converter,
            app: Arc::new(AppContext::new(self.app_name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_context_attributes() {
        let app = AppContext::new("orders");
        assert_eq!(app.name(), "orders");
        app.put_attribute("region", "eu-1");
        assert_eq!(app.attribute("region").as_deref(), Some("eu-1"));
        assert_eq!(app.attribute("missing"), None);
    }

    #[test]
    fn test_builder_registers_baseline_resolvers() {
        let engine = Engine::builder().build();
        // Context resolver plus binding resolver.
        assert_eq!(engine.resolvers().len(), 2);
    }
}
