//! Parameter resolution.
//!
//! Terminal handlers declare typed inputs; the resolver registry decides which
//! strategy produces each one. Selection is first-match-wins over the
//! registration order, memoized per parameter signature so repeat lookups are
//! O(1) and never rescan the list. Memoization is sound only because the
//! resolver set is fixed once the registry is shared; nothing here ever
//! invalidates a cache entry.

use crate::binding::{BindRequest, ConverterService, plan_of};
use crate::context::RequestContext;
use crate::engine::AppContext;
use crate::error::{BindError, HandlerResult, ResolveError};
use crate::request::Request;
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Hashable structural signature of a declared handler parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParameterSpec {
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl ParameterSpec {
    pub fn of<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }
}

/// A resolved parameter value, type-erased.
pub type BoxedValue = Box<dyn Any + Send>;

/// One resolution strategy.
pub trait ParameterResolver: Send + Sync {
    /// Whether this resolver claims the parameter.
    fn supports(&self, param: &ParameterSpec) -> bool;

    /// Produce a value for a claimed parameter.
    fn resolve(&self, param: &ParameterSpec, request: &Request) -> Result<BoxedValue, ResolveError>;
}

/// Ordered resolver list with a memoized signature-to-resolver cache.
pub struct ResolverRegistry {
    resolvers: Vec<Box<dyn ParameterResolver>>,
    // signature -> index into `resolvers`; guarded by one short-lived lock.
    cache: Mutex<HashMap<TypeId, usize>>,
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self { resolvers: Vec::new(), cache: Mutex::new(HashMap::new()) }
    }

    /// Append a resolver. Registration order is match order.
    pub fn register(&mut self, resolver: Box<dyn ParameterResolver>) {
        self.resolvers.push(resolver);
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    /// Whether some registered resolver claims the parameter.
    pub fn supports_parameter(&self, param: &ParameterSpec) -> bool {
        self.find(param).is_some()
    }

    /// Resolve a parameter through the first matching resolver.
    pub fn resolve_parameter(
        &self,
        param: &ParameterSpec,
        request: &Request,
    ) -> Result<BoxedValue, ResolveError> {
        let index = self.find(param).ok_or(ResolveError::NoResolver(param.type_name))?;
        self.resolvers[index].resolve(param, request)
    }

    /// Typed resolution with downcast.
    pub fn resolve_as<T: 'static>(&self, request: &Request) -> Result<T, ResolveError> {
        let spec = ParameterSpec::of::<T>();
        let value = self.resolve_parameter(&spec, request)?;
        value
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| ResolveError::TypeMismatch { expected: spec.type_name })
    }

    fn find(&self, param: &ParameterSpec) -> Option<usize> {
        if let Some(&index) = self.cache.lock().get(&param.type_id) {
            return Some(index);
        }
        let index = self.resolvers.iter().position(|r| r.supports(param))?;
        trace!(parameter = param.type_name, index, "caching resolver match");
        self.cache.lock().insert(param.type_id, index);
        Some(index)
    }
}

/// Adapt a typed handler into a chain step by resolving its extra parameter
/// through the registry at call time.
pub fn resolving_handler<T, F>(
    registry: Arc<ResolverRegistry>,
    handler: F,
) -> impl Fn(&mut RequestContext) -> HandlerResult + Send + Sync + 'static
where
    T: 'static,
    F: Fn(&mut RequestContext, T) -> HandlerResult + Send + Sync + 'static,
{
    move |ctx: &mut RequestContext| {
        let value = registry.resolve_as::<T>(ctx.request())?;
        handler(ctx, value)
    }
}

// ============================================================================
// Baseline resolvers
// ============================================================================

/// Supplies the ambient application context when the declared parameter type
/// is exactly `Arc<AppContext>`.
pub struct ContextResolver;

impl ParameterResolver for ContextResolver {
    fn supports(&self, param: &ParameterSpec) -> bool {
        param.type_id == TypeId::of::<Arc<AppContext>>()
    }

    fn resolve(&self, _param: &ParameterSpec, request: &Request) -> Result<BoxedValue, ResolveError> {
        let app = request.app_context().cloned().ok_or(ResolveError::NoContext)?;
        Ok(Box::new(app))
    }
}

/// Binder registration erased over the target type, so the resolver can
/// construct values from a runtime `ParameterSpec`.
struct ErasedBinder {
    bind: fn(&Request, &dyn ConverterService) -> Result<BoxedValue, BindError>,
}

fn bind_erased<T: BindRequest>(
    request: &Request,
    converter: &dyn ConverterService,
) -> Result<BoxedValue, BindError> {
    plan_of::<T>()
        .bind(request, converter)
        .map(|value| Box::new(value) as BoxedValue)
}

/// Resolves parameters whose types registered a binding plan, by executing
/// the plan against the request.
pub struct BindingResolver {
    converter: Arc<dyn ConverterService>,
    binders: HashMap<TypeId, ErasedBinder>,
}

impl BindingResolver {
    pub fn new(converter: Arc<dyn ConverterService>) -> Self {
        Self { converter, binders: HashMap::new() }
    }

    /// Register a bindable target type. Happens during startup wiring, before
    /// the registry is shared.
    pub fn register<T: BindRequest>(&mut self) {
        self.binders.insert(TypeId::of::<T>(), ErasedBinder { bind: bind_erased::<T> });
    }
}

impl ParameterResolver for BindingResolver {
    fn supports(&self, param: &ParameterSpec) -> bool {
        self.binders.contains_key(&param.type_id)
    }

    fn resolve(&self, param: &ParameterSpec, request: &Request) -> Result<BoxedValue, ResolveError> {
        let binder = self
            .binders
            .get(&param.type_id)
            .ok_or(ResolveError::NoResolver(param.type_name))?;
        (binder.bind)(request, self.converter.as_ref()).map_err(Into::into)
    }
}
