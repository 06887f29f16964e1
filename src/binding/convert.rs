//! Pluggable string-to-value conversion.
//!
//! Field values arriving from path segments, query parameters, and headers
//! are always strings; the converter service turns them into the field's
//! declared type. The service is an external-collaborator seam: the engine
//! ships [`SimpleConverter`] for the scalar types, and applications can swap
//! in their own implementation.

use std::any::{Any, TypeId};
use thiserror::Error;

/// Conversion failures. Per-field, these are swallowed by the binding plan
/// (the field keeps its default); they only surface through direct use.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("no conversion available for target type {0}")]
    Unsupported(String),

    #[error("invalid value {value:?} for {target}")]
    Invalid { value: String, target: &'static str },
}

/// String-to-value conversion keyed by target type.
pub trait ConverterService: Send + Sync {
    /// Whether a string can be converted into the target type.
    fn can_convert(&self, target: TypeId) -> bool;

    /// Convert a raw string into a boxed value of the target type.
    fn convert(&self, value: &str, target: TypeId) -> Result<Box<dyn Any>, ConvertError>;
}

/// Typed front door over the erased service: checks support, converts, and
/// downcasts to the caller's type.
pub fn convert_to<F: 'static>(
    converter: &dyn ConverterService,
    raw: &str,
) -> Result<F, ConvertError> {
    let target = TypeId::of::<F>();
    if !converter.can_convert(target) {
        return Err(ConvertError::Unsupported(std::any::type_name::<F>().to_string()));
    }
    let value = converter.convert(raw, target)?;
    value
        .downcast::<F>()
        .map(|boxed| *boxed)
        .map_err(|_| ConvertError::Unsupported(std::any::type_name::<F>().to_string()))
}

macro_rules! scalar_conversions {
    ($($ty:ty),* $(,)?) => {
        fn can_convert(&self, target: TypeId) -> bool {
            $(target == TypeId::of::<$ty>() ||)* false
        }

        fn convert(&self, value: &str, target: TypeId) -> Result<Box<dyn Any>, ConvertError> {
            $(
                if target == TypeId::of::<$ty>() {
                    return value
                        .parse::<$ty>()
                        .map(|v| Box::new(v) as Box<dyn Any>)
                        .map_err(|_| ConvertError::Invalid {
                            value: value.to_string(),
                            target: std::any::type_name::<$ty>(),
                        });
                }
            )*
            Err(ConvertError::Unsupported(format!("{target:?}")))
        }
    };
}

/// Default converter covering `String`, `bool`, and the numeric scalars.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleConverter;

impl ConverterService for SimpleConverter {
    scalar_conversions!(
        String, bool, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
    );
}
