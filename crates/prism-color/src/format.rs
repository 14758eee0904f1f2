//! Pixel formats: a color model (or anonymous components), a component type,
//! and the color space the nonlinear encoding refers to.
//!
//! Formats are interned by the registry. Two formats compare equal only when
//! they are the same interned instance, which is the case exactly when their
//! descriptors match.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::component::ComponentType;
use crate::error::ColorError;
use crate::model::{ColorModel, ModelFlags};
use crate::space::ColorSpace;

/// Channel layout of a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    /// Channels described by a color model.
    Model(ColorModel),
    /// `n` anonymous components with no color meaning.
    Components(usize),
}

impl Layout {
    pub fn n_components(&self) -> usize {
        match self {
            Self::Model(model) => model.n_components(),
            Self::Components(n) => *n,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct FormatKey {
    pub(crate) layout: Layout,
    pub(crate) component_type: ComponentType,
    pub(crate) space: ColorSpace,
}

#[derive(Debug)]
pub(crate) struct FormatInner {
    pub(crate) id: u32,
    pub(crate) name: String,
    pub(crate) layout: Layout,
    pub(crate) component_type: ComponentType,
    pub(crate) space: ColorSpace,
}

/// An interned pixel format such as `R'G'B'A u8`.
#[derive(Clone)]
pub struct PixelFormat(pub(crate) Arc<FormatInner>);

impl PixelFormat {
    /// Resolve a format by name in the default space.
    pub fn named(name: &str) -> Result<Self, ColorError> {
        crate::registry::registry().format(name)
    }

    /// Resolve a format by name, bound to `space`.
    pub fn named_with_space(name: &str, space: &ColorSpace) -> Result<Self, ColorError> {
        crate::registry::registry().format_with_space(name, space)
    }

    /// The same layout and component type bound to another space.
    pub fn with_space(&self, space: &ColorSpace) -> Self {
        if &self.0.space == space {
            return self.clone();
        }
        crate::registry::registry().intern_format(FormatKey {
            layout: self.0.layout,
            component_type: self.0.component_type,
            space: space.clone(),
        })
    }

    /// Process-unique identifier of this interned format.
    pub fn id(&self) -> u32 {
        self.0.id
    }

    /// Encoding name, e.g. `"R'G'B'A u8"`. Does not include the space.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Alias of [`Self::name`]: the format's encoding without the space.
    pub fn encoding(&self) -> &str {
        &self.0.name
    }

    pub fn layout(&self) -> Layout {
        self.0.layout
    }

    /// Color model, or `None` for anonymous component formats.
    pub fn model(&self) -> Option<ColorModel> {
        match self.0.layout {
            Layout::Model(model) => Some(model),
            Layout::Components(_) => None,
        }
    }

    pub fn space(&self) -> &ColorSpace {
        &self.0.space
    }

    pub fn n_components(&self) -> usize {
        self.0.layout.n_components()
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.n_components() * self.0.component_type.bytes()
    }

    /// Component type of channel `index`; every channel of a format shares one type.
    pub fn component_type(&self, index: usize) -> Option<ComponentType> {
        (index < self.n_components()).then_some(self.0.component_type)
    }

    /// Component type shared by all channels.
    pub fn ty(&self) -> ComponentType {
        self.0.component_type
    }

    pub fn has_alpha(&self) -> bool {
        self.model().is_some_and(|m| m.has_alpha())
    }

    pub fn model_flags(&self) -> ModelFlags {
        self.model().map(|m| m.flags()).unwrap_or_default()
    }

    /// Whether this is an anonymous `format_n` format.
    pub fn is_format_n(&self) -> bool {
        matches!(self.0.layout, Layout::Components(_))
    }
}

impl PartialEq for PixelFormat {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for PixelFormat {}

impl Hash for PixelFormat {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PixelFormat({} @ {})", self.0.name, self.0.space.name())
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}

/// Canonical name for a layout and component type.
pub(crate) fn format_name(layout: Layout, ty: ComponentType) -> String {
    match layout {
        Layout::Model(model) => format!("{} {}", model.name(), ty.name()),
        Layout::Components(n) => format!("format_n {n} {}", ty.name()),
    }
}

/// Split a format name into its layout and component type.
///
/// Accepts `"<model> <type>"` and `"format_n <n> <type>"`.
pub(crate) fn parse_format_name(name: &str) -> Result<(Layout, ComponentType), ColorError> {
    let invalid = || ColorError::InvalidFormatName(name.to_string());
    let (head, ty) = name.trim().rsplit_once(' ').ok_or_else(invalid)?;
    let ty = ComponentType::from_name(ty).ok_or_else(|| ColorError::UnknownFormat(name.to_string()))?;

    if let Some(n) = head.strip_prefix("format_n ") {
        let n: usize = n.trim().parse().map_err(|_| invalid())?;
        if n == 0 {
            return Err(invalid());
        }
        return Ok((Layout::Components(n), ty));
    }

    let model =
        ColorModel::from_name(head.trim()).ok_or_else(|| ColorError::UnknownFormat(name.to_string()))?;
    Ok((Layout::Model(model), ty))
}
