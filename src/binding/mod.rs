//! Structured request binding.
//!
//! Maps the heterogeneous sources of a request (path segments, query
//! parameters, headers, body) onto plain target types. There is no runtime
//! reflection here: each target type declares an explicit binding plan — a
//! list of (source, key, apply-fn) entries — once, via the [`bind_request!`]
//! macro or a manual [`BindRequest`] impl. Plans are cached process-wide by
//! `TypeId`, with no eviction: the set of bindable types is fixed by the
//! application's handler surface at startup.
//!
//! Field semantics follow the error taxonomy: a missing or unconvertible
//! path/query/header value leaves that field at its default (non-fatal); a
//! body deserialization failure fails the whole bind.

mod convert;

pub use convert::{ConvertError, ConverterService, SimpleConverter, convert_to};

use crate::error::BindError;
use crate::request::Request;
use dashmap::DashMap;
use lazy_static::lazy_static;
use std::any::{Any, TypeId};
use std::sync::Arc;
use tracing::debug;

/// Non-body sources a field can bind from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Path,
    Param,
    Header,
}

/// Apply a converted string value onto one field of the target.
pub type ValueApplyFn<T> = fn(&mut T, &str, &dyn ConverterService) -> Result<(), ConvertError>;

/// Deserialize the request body onto one field of the target.
pub type BodyApplyFn<T> = fn(&mut T, &Request) -> Result<(), BindError>;

/// One entry of a binding plan.
pub enum FieldBinding<T> {
    Value {
        source: ValueSource,
        key: &'static str,
        /// Alternate binding key tried when the primary key has no value.
        fallback: Option<&'static str>,
        apply: ValueApplyFn<T>,
    },
    Body {
        apply: BodyApplyFn<T>,
    },
}

impl<T> FieldBinding<T> {
    pub fn value(
        source: ValueSource,
        key: &'static str,
        fallback: Option<&'static str>,
        apply: ValueApplyFn<T>,
    ) -> Self {
        Self::Value { source, key, fallback, apply }
    }

    pub fn body(apply: BodyApplyFn<T>) -> Self {
        Self::Body { apply }
    }
}

/// Explicit, per-type plan for binding a request onto `T`.
pub struct BindingPlan<T> {
    fields: Vec<FieldBinding<T>>,
}

impl<T: BindRequest> BindingPlan<T> {
    pub fn new(fields: Vec<FieldBinding<T>>) -> Self {
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Execute the plan against a request.
    pub fn bind(&self, request: &Request, converter: &dyn ConverterService) -> Result<T, BindError> {
        let mut target = T::default();
        for field in &self.fields {
            match field {
                FieldBinding::Body { apply } => apply(&mut target, request)?,
                FieldBinding::Value { source, key, fallback, apply } => {
                    let Some(raw) = lookup(request, *source, key, *fallback) else {
                        continue;
                    };
                    if let Err(err) = apply(&mut target, raw, converter) {
                        // Non-fatal: the field keeps its default.
                        debug!(key, error = %err, "field conversion failed; keeping default");
                    }
                }
            }
        }
        Ok(target)
    }
}

fn lookup<'r>(
    request: &'r Request,
    source: ValueSource,
    key: &str,
    fallback: Option<&str>,
) -> Option<&'r str> {
    let by = |k: &str| match source {
        ValueSource::Path => request.path_variable(k),
        ValueSource::Param => request.query_parameter(k),
        ValueSource::Header => request.header(k),
    };
    by(key).or_else(|| fallback.and_then(by))
}

/// A type that can be bound from a request via a declared plan.
///
/// Usually implemented by the [`bind_request!`] macro.
pub trait BindRequest: Default + Send + 'static {
    fn binding_plan() -> BindingPlan<Self>
    where
        Self: Sized;
}

lazy_static! {
    // Process-wide plan cache. Entries are never invalidated: plans are pure
    // functions of the type declaration, fixed for the process lifetime.
    static ref PLAN_CACHE: DashMap<TypeId, Arc<dyn Any + Send + Sync>> = DashMap::new();
}

/// The cached binding plan for `T`, built on first use.
pub fn plan_of<T: BindRequest>() -> Arc<BindingPlan<T>> {
    let key = TypeId::of::<T>();
    if let Some(entry) = PLAN_CACHE.get(&key) {
        let plan = Arc::clone(entry.value());
        drop(entry);
        return plan
            .downcast::<BindingPlan<T>>()
            .expect("plan cache entry matches its TypeId key");
    }
    let plan: Arc<BindingPlan<T>> = Arc::new(T::binding_plan());
    PLAN_CACHE.insert(key, plan.clone());
    plan
}

/// Declare the binding plan for an existing `Default` type.
///
/// ```
/// use slipway::bind_request;
/// use serde::Deserialize;
///
/// #[derive(Debug, Default, Deserialize)]
/// struct Profile {
///     name: String,
/// }
///
/// #[derive(Debug, Default)]
/// struct UpdateProfile {
///     id: u64,
///     verbose: bool,
///     trace: String,
///     profile: Profile,
/// }
///
/// bind_request!(UpdateProfile {
///     path("id") => id,
///     param("verbose" | "v") => verbose,
///     header("X-Trace") => trace,
///     body => profile,
/// });
/// ```
#[macro_export]
macro_rules! bind_request {
    ($ty:ty { $($spec:tt)* }) => {
        impl $crate::binding::BindRequest for $ty {
            fn binding_plan() -> $crate::binding::BindingPlan<Self> {
                let mut fields = Vec::new();
                $crate::__bind_fields!(fields, $ty, $($spec)*);
                $crate::binding::BindingPlan::new(fields)
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __bind_fields {
    ($fields:ident, $ty:ty,) => {};
    ($fields:ident, $ty:ty, path($key:literal $(| $fallback:literal)?) => $field:ident $(, $($rest:tt)*)?) => {
        $crate::__bind_value!($fields, $ty, $crate::binding::ValueSource::Path, $key, ($($fallback)?), $field);
        $crate::__bind_fields!($fields, $ty, $($($rest)*)?);
    };
    ($fields:ident, $ty:ty, param($key:literal $(| $fallback:literal)?) => $field:ident $(, $($rest:tt)*)?) => {
        $crate::__bind_value!($fields, $ty, $crate::binding::ValueSource::Param, $key, ($($fallback)?), $field);
        $crate::__bind_fields!($fields, $ty, $($($rest)*)?);
    };
    ($fields:ident, $ty:ty, header($key:literal $(| $fallback:literal)?) => $field:ident $(, $($rest:tt)*)?) => {
        $crate::__bind_value!($fields, $ty, $crate::binding::ValueSource::Header, $key, ($($fallback)?), $field);
        $crate::__bind_fields!($fields, $ty, $($($rest)*)?);
    };
    ($fields:ident, $ty:ty, body => $field:ident $(, $($rest:tt)*)?) => {
        $fields.push($crate::binding::FieldBinding::body(
            |target: &mut $ty, request: &$crate::request::Request| {
                target.$field = request.deserialize_body()?;
                Ok(())
            },
        ));
        $crate::__bind_fields!($fields, $ty, $($($rest)*)?);
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __bind_value {
    ($fields:ident, $ty:ty, $source:expr, $key:literal, ($($fallback:literal)?), $field:ident) => {
        $fields.push($crate::binding::FieldBinding::value(
            $source,
            $key,
            $crate::__bind_fallback!($($fallback)?),
            |target: &mut $ty,
             raw: &str,
             converter: &dyn $crate::binding::ConverterService| {
                target.$field = $crate::binding::convert_to(converter, raw)?;
                Ok(())
            },
        ));
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __bind_fallback {
    () => {
        None
    };
    ($fallback:literal) => {
        Some($fallback)
    };
}
