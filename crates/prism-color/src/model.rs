//! Color models: which channels a format carries and how they are encoded.

use std::fmt;
use std::ops::{BitAnd, BitOr};

/// Property bits describing a color model.
///
/// Bit values are stable and match the conventional model flag constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ModelFlags(u32);

impl ModelFlags {
    pub const NONE: Self = Self(0);
    pub const ALPHA: Self = Self(1 << 1);
    pub const ASSOCIATED: Self = Self(1 << 2);
    pub const INVERTED: Self = Self(1 << 3);
    pub const LINEAR: Self = Self(1 << 10);
    pub const NONLINEAR: Self = Self(1 << 11);
    pub const PERCEPTUAL: Self = Self(1 << 12);
    pub const GRAY: Self = Self(1 << 20);
    pub const RGB: Self = Self(1 << 21);
    pub const CIE: Self = Self(1 << 23);
    pub const CMYK: Self = Self(1 << 24);

    /// Raw bit value.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ModelFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for ModelFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

/// Channel family of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFamily {
    /// Red, green, blue in the format's color space.
    Rgb,
    /// Single luminance channel.
    Gray,
    /// CIE L*a*b* relative to D50.
    CieLab,
    /// CIE XYZ relative to D50.
    CieXyz,
}

/// How color channels are encoded relative to light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Linear light.
    Linear,
    /// Encoded with the color space's transfer curve (`'` in names).
    Nonlinear,
    /// Encoded with the sRGB curve regardless of space (`~` in names).
    Perceptual,
}

/// Alpha channel presence and association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlphaMode {
    /// No alpha channel.
    None,
    /// Alpha channel, color not premultiplied.
    Straight,
    /// Alpha channel, color premultiplied by alpha.
    Associated,
}

/// A color model such as `R'G'B'A` or `CIE Lab`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorModel {
    pub family: ModelFamily,
    pub encoding: Encoding,
    pub alpha: AlphaMode,
}

impl ColorModel {
    pub const fn new(family: ModelFamily, encoding: Encoding, alpha: AlphaMode) -> Self {
        Self {
            family,
            encoding,
            alpha,
        }
    }

    /// Linear RGBA with straight alpha; the reference model conversions pass through.
    pub const fn reference() -> Self {
        Self::new(ModelFamily::Rgb, Encoding::Linear, AlphaMode::Straight)
    }

    /// Parse a model name (`"R'G'B'A"`, `"YaA"`, `"CIE Lab alpha"`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "CIE Lab" => {
                return Some(Self::new(ModelFamily::CieLab, Encoding::Linear, AlphaMode::None));
            }
            "CIE Lab alpha" => {
                return Some(Self::new(
                    ModelFamily::CieLab,
                    Encoding::Linear,
                    AlphaMode::Straight,
                ));
            }
            "CIE XYZ" => {
                return Some(Self::new(ModelFamily::CieXyz, Encoding::Linear, AlphaMode::None));
            }
            "CIE XYZ alpha" => {
                return Some(Self::new(
                    ModelFamily::CieXyz,
                    Encoding::Linear,
                    AlphaMode::Straight,
                ));
            }
            _ => {}
        }

        let (family, rest) = if let Some(rest) = name.strip_prefix('Y') {
            (ModelFamily::Gray, rest)
        } else if name.starts_with('R') {
            (ModelFamily::Rgb, name)
        } else {
            return None;
        };

        let candidates = [Encoding::Linear, Encoding::Nonlinear, Encoding::Perceptual];
        let alphas = [AlphaMode::None, AlphaMode::Straight, AlphaMode::Associated];
        for encoding in candidates {
            for alpha in alphas {
                let model = Self::new(family, encoding, alpha);
                let full = model.name();
                let tail = match family {
                    ModelFamily::Gray => full.strip_prefix('Y').unwrap_or(&full).to_string(),
                    _ => full.clone(),
                };
                if tail == rest {
                    return Some(model);
                }
            }
        }
        None
    }

    /// Canonical model name.
    pub fn name(&self) -> String {
        let mark = match self.encoding {
            Encoding::Linear => "",
            Encoding::Nonlinear => "'",
            Encoding::Perceptual => "~",
        };
        match self.family {
            ModelFamily::Rgb => match self.alpha {
                AlphaMode::None => format!("R{mark}G{mark}B{mark}"),
                AlphaMode::Straight => format!("R{mark}G{mark}B{mark}A"),
                AlphaMode::Associated => format!("R{mark}aG{mark}aB{mark}aA"),
            },
            ModelFamily::Gray => match self.alpha {
                AlphaMode::None => format!("Y{mark}"),
                AlphaMode::Straight => format!("Y{mark}A"),
                AlphaMode::Associated => format!("Y{mark}aA"),
            },
            ModelFamily::CieLab => match self.alpha {
                AlphaMode::None => "CIE Lab".to_string(),
                _ => "CIE Lab alpha".to_string(),
            },
            ModelFamily::CieXyz => match self.alpha {
                AlphaMode::None => "CIE XYZ".to_string(),
                _ => "CIE XYZ alpha".to_string(),
            },
        }
    }

    /// Number of channels including alpha.
    pub const fn n_components(&self) -> usize {
        let color = match self.family {
            ModelFamily::Gray => 1,
            ModelFamily::Rgb | ModelFamily::CieLab | ModelFamily::CieXyz => 3,
        };
        match self.alpha {
            AlphaMode::None => color,
            AlphaMode::Straight | AlphaMode::Associated => color + 1,
        }
    }

    pub const fn has_alpha(&self) -> bool {
        !matches!(self.alpha, AlphaMode::None)
    }

    /// Flag bits for this model.
    pub fn flags(&self) -> ModelFlags {
        let mut flags = match self.family {
            ModelFamily::Rgb => ModelFlags::RGB,
            ModelFamily::Gray => ModelFlags::GRAY,
            ModelFamily::CieLab | ModelFamily::CieXyz => ModelFlags::CIE,
        };
        flags = flags
            | match (self.family, self.encoding) {
                (ModelFamily::CieLab, _) => ModelFlags::PERCEPTUAL,
                (_, Encoding::Linear) => ModelFlags::LINEAR,
                (_, Encoding::Nonlinear) => ModelFlags::NONLINEAR,
                (_, Encoding::Perceptual) => ModelFlags::PERCEPTUAL,
            };
        match self.alpha {
            AlphaMode::None => flags,
            AlphaMode::Straight => flags | ModelFlags::ALPHA,
            AlphaMode::Associated => flags | ModelFlags::ALPHA | ModelFlags::ASSOCIATED,
        }
    }
}

impl fmt::Display for ColorModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
