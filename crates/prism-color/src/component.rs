//! Component storage types.
//!
//! A component type describes how a single channel value is laid out in memory.
//! Integer types are normalized to `[0, 1]`; float types are stored verbatim.
//! All types use native byte order.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage type of a single pixel component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentType {
    /// 8-bit unsigned integer.
    U8,
    /// 16-bit unsigned integer.
    U16,
    /// 32-bit unsigned integer.
    U32,
    /// 16-bit floating point.
    Half,
    /// 32-bit floating point.
    Float,
    /// 64-bit floating point.
    Double,
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl ComponentType {
    /// Every supported component type.
    pub fn all() -> &'static [Self] {
        const ALL: [ComponentType; 6] = [
            ComponentType::U8,
            ComponentType::U16,
            ComponentType::U32,
            ComponentType::Half,
            ComponentType::Float,
            ComponentType::Double,
        ];
        &ALL
    }

    /// Name used in format strings (`"u8"`, `"float"`, ...).
    pub const fn name(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::Half => "half",
            Self::Float => "float",
            Self::Double => "double",
        }
    }

    /// Parse a type name as it appears at the end of a format string.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|t| t.name() == name)
    }

    /// Size of one component in bytes.
    pub const fn bytes(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 | Self::Half => 2,
            Self::U32 | Self::Float => 4,
            Self::Double => 8,
        }
    }

    /// Whether values are quantized integers (and therefore clipped on encode).
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::U8 | Self::U16 | Self::U32)
    }

    /// Largest absolute error introduced by storing a value in `[0, 1]` with this type.
    pub fn precision(self) -> f64 {
        match self {
            Self::U8 => 0.5 / 255.0,
            Self::U16 => 0.5 / 65535.0,
            Self::U32 => 0.5 / 4_294_967_295.0,
            // 10 explicit mantissa bits, half an ulp at 1.0
            Self::Half => 1.0 / 2048.0,
            Self::Float => f64::from(f32::EPSILON),
            Self::Double => f64::EPSILON,
        }
    }

    /// Read one component from `bytes` as a normalized `f64`.
    ///
    /// `bytes` must hold at least [`Self::bytes`] bytes.
    pub fn decode(self, bytes: &[u8]) -> f64 {
        match self {
            Self::U8 => f64::from(bytes[0]) / 255.0,
            Self::U16 => f64::from(u16::from_ne_bytes([bytes[0], bytes[1]])) / 65535.0,
            Self::U32 => {
                f64::from(u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
                    / 4_294_967_295.0
            }
            Self::Half => f64::from(half::f16::from_ne_bytes([bytes[0], bytes[1]]).to_f32()),
            Self::Float => f64::from(f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
            Self::Double => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes[..8]);
                f64::from_ne_bytes(raw)
            }
        }
    }

    /// Write a normalized value into `out`.
    ///
    /// Integer types clip to `[0, 1]` and round to nearest; float types never clip.
    pub fn encode(self, value: f64, out: &mut [u8]) {
        match self {
            Self::U8 => out[0] = quantize(value, 255.0) as u8,
            Self::U16 => out[..2].copy_from_slice(&(quantize(value, 65535.0) as u16).to_ne_bytes()),
            Self::U32 => {
                out[..4].copy_from_slice(&(quantize(value, 4_294_967_295.0) as u32).to_ne_bytes())
            }
            Self::Half => out[..2].copy_from_slice(&half::f16::from_f64(value).to_ne_bytes()),
            Self::Float => out[..4].copy_from_slice(&(value as f32).to_ne_bytes()),
            Self::Double => out[..8].copy_from_slice(&value.to_ne_bytes()),
        }
    }
}

fn quantize(value: f64, max: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    (value.clamp(0.0, 1.0) * max).round()
}
