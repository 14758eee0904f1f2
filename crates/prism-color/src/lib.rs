//! Prism Color — pixel formats and color conversion.
//!
//! This crate owns everything about how a pixel's bytes map to color: component
//! types, color models, transfer curves, RGB color spaces, the process-wide
//! format registry, and conversion paths ("fishes") between formats.

mod colour;
mod component;
mod error;
mod fish;
mod format;
mod model;
mod registry;
mod space;
mod trc;

pub use colour::Colour;
pub use component::ComponentType;
pub use error::ColorError;
pub use fish::{ALPHA_FLOOR, ConversionFn, Fish, Precision};
pub use format::{Layout, PixelFormat};
pub use model::{AlphaMode, ColorModel, Encoding, ModelFamily, ModelFlags};
pub use space::{ACES_WHITE, Chromaticity, ColorSpace, D50, D65, SpaceParams};
pub use trc::{TransferFunction, Trc};

use registry::registry;

/// Register built-in conversions. Idempotent; lookups also do this lazily.
pub fn init() {
    registry::ensure_builtin_conversions();
    tracing::info!(
        "prism-color ready: {} color spaces",
        registry().space_names().len()
    );
}

/// Drop cached fishes. Formats and spaces stay interned for the process lifetime.
pub fn exit() {
    let dropped = registry().cached_fish_count();
    registry().clear_fishes();
    tracing::info!("prism-color shut down, dropped {dropped} cached conversions");
}

/// Resolve a format by name in the default (sRGB) space.
pub fn format(name: &str) -> Result<PixelFormat, ColorError> {
    registry().format(name)
}

/// Resolve a format by name with its nonlinear encoding bound to `space`.
pub fn format_with_space(name: &str, space: &ColorSpace) -> Result<PixelFormat, ColorError> {
    registry().format_with_space(name, space)
}

/// Whether `name` resolves to a format.
pub fn format_exists(name: &str) -> bool {
    registry().format_exists(name)
}

/// A format of `n` anonymous components.
pub fn format_n(ty: ComponentType, n: usize) -> Result<PixelFormat, ColorError> {
    if n == 0 {
        return Err(ColorError::InvalidFormatName(format!("format_n 0 {ty}")));
    }
    Ok(registry().intern_format(format::FormatKey {
        layout: Layout::Components(n),
        component_type: ty,
        space: registry().default_space(),
    }))
}

/// Register `name` as an alias for a layout and component type.
///
/// Re-registering the same description is a no-op; a different one is a
/// [`ColorError::FormatConflict`].
pub fn register_format(
    name: &str,
    layout: Layout,
    ty: ComponentType,
) -> Result<PixelFormat, ColorError> {
    registry().register_alias(name, layout, ty)
}

/// Look up a registered color space.
pub fn space(name: &str) -> Result<ColorSpace, ColorError> {
    registry().space(name)
}

/// Names of every registered color space, sorted.
pub fn space_names() -> Vec<String> {
    registry().space_names()
}

/// Exact conversion path from `source` to `destination`.
pub fn fish(source: &PixelFormat, destination: &PixelFormat) -> Result<Fish, ColorError> {
    registry().fish(source, destination, Precision::Exact)
}

/// Faster, single-precision conversion path.
pub fn fast_fish(source: &PixelFormat, destination: &PixelFormat) -> Result<Fish, ColorError> {
    registry().fish(source, destination, Precision::Fast)
}

/// Register a direct conversion. Returns `false` if one already exists for the pair.
///
/// Must be called before the pair's fish is first requested; cached fishes
/// are not rebuilt.
pub fn register_conversion(
    source: &PixelFormat,
    destination: &PixelFormat,
    convert: ConversionFn,
) -> bool {
    let added = registry().register_conversion(source, destination, convert);
    if added {
        tracing::debug!("registered direct conversion {source:?} -> {destination:?}");
    }
    added
}
