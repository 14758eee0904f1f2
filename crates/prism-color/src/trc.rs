//! Transfer curves (TRCs) between linear light and encoded values.
//!
//! Curves operate in `f64`; the fast conversion path evaluates them in `f32`
//! through [`TransferFunction::to_linear_f32`] / [`TransferFunction::to_encoded_f32`].

use crate::error::ColorError;

/// A transfer function that converts between linear and non-linear encodings.
pub trait TransferFunction: Send + Sync {
    /// Convert from non-linear (encoded) to linear light.
    fn to_linear(&self, encoded: f64) -> f64;

    /// Convert from linear light to non-linear (encoded).
    fn to_encoded(&self, linear: f64) -> f64;

    /// Single-precision variant of [`Self::to_linear`].
    fn to_linear_f32(&self, encoded: f32) -> f32 {
        self.to_linear(f64::from(encoded)) as f32
    }

    /// Single-precision variant of [`Self::to_encoded`].
    fn to_encoded_f32(&self, linear: f32) -> f32 {
        self.to_encoded(f64::from(linear)) as f32
    }
}

/// A tone reproduction curve attached to a color space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Trc {
    /// Identity curve.
    Linear,
    /// IEC 61966-2-1 sRGB curve.
    Srgb,
    /// Pure power law: `encoded = linear^(1/gamma)`.
    Gamma(f64),
    /// ACEScct log curve with linear toe (S-2016-001).
    AcesCct,
}

impl Trc {
    /// Look up a curve by name: `"linear"`, `"sRGB"`, `"ACEScct"`, or a gamma value such as `"2.2"`.
    pub fn named(name: &str) -> Result<Self, ColorError> {
        match name {
            "linear" => Ok(Self::Linear),
            "sRGB" => Ok(Self::Srgb),
            "ACEScct" => Ok(Self::AcesCct),
            other => match other.parse::<f64>() {
                Ok(g) if g > 0.0 && g.is_finite() => Ok(Self::gamma(g)),
                _ => Err(ColorError::UnknownTrc(name.to_string())),
            },
        }
    }

    /// Power-law curve; a gamma of 1.0 collapses to [`Trc::Linear`].
    pub fn gamma(gamma: f64) -> Self {
        if (gamma - 1.0).abs() < 1e-9 {
            Self::Linear
        } else {
            Self::Gamma(gamma)
        }
    }

    /// Canonical name used for interning and display.
    pub fn name(&self) -> String {
        match self {
            Self::Linear => "linear".to_string(),
            Self::Srgb => "sRGB".to_string(),
            Self::Gamma(g) => format!("{g}"),
            Self::AcesCct => "ACEScct".to_string(),
        }
    }

    /// Approximate gamma; 2.2 for sRGB, 1.0 for linear, 0.0 for log curves.
    pub fn approximate_gamma(&self) -> f64 {
        match self {
            Self::Linear => 1.0,
            Self::Srgb => 2.2,
            Self::Gamma(g) => *g,
            Self::AcesCct => 0.0,
        }
    }
}

impl TransferFunction for Trc {
    fn to_linear(&self, encoded: f64) -> f64 {
        match self {
            Self::Linear => encoded,
            Self::Srgb => srgb_to_linear(encoded),
            Self::Gamma(g) => signed_pow(encoded, *g),
            Self::AcesCct => acescct_to_linear(encoded),
        }
    }

    fn to_encoded(&self, linear: f64) -> f64 {
        match self {
            Self::Linear => linear,
            Self::Srgb => srgb_from_linear(linear),
            Self::Gamma(g) => signed_pow(linear, 1.0 / *g),
            Self::AcesCct => acescct_from_linear(linear),
        }
    }

    fn to_linear_f32(&self, encoded: f32) -> f32 {
        match self {
            Self::Linear => encoded,
            Self::Srgb => {
                if encoded <= 0.04045 {
                    encoded / 12.92
                } else {
                    ((encoded + 0.055) / 1.055).powf(2.4)
                }
            }
            Self::Gamma(g) => encoded.signum() * encoded.abs().powf(*g as f32),
            Self::AcesCct => acescct_to_linear(f64::from(encoded)) as f32,
        }
    }

    fn to_encoded_f32(&self, linear: f32) -> f32 {
        match self {
            Self::Linear => linear,
            Self::Srgb => {
                if linear <= 0.003_130_8 {
                    linear * 12.92
                } else {
                    1.055 * linear.powf(1.0 / 2.4) - 0.055
                }
            }
            Self::Gamma(g) => linear.signum() * linear.abs().powf(1.0 / *g as f32),
            Self::AcesCct => acescct_from_linear(f64::from(linear)) as f32,
        }
    }
}

/// Power that mirrors negative inputs instead of producing NaN.
fn signed_pow(v: f64, e: f64) -> f64 {
    v.signum() * v.abs().powf(e)
}

// ---------------------------------------------------------------------------
// sRGB (IEC 61966-2-1)
// ---------------------------------------------------------------------------

/// ```text
/// to_linear:   V <= 0.04045 → V / 12.92
///              V >  0.04045 → ((V + 0.055) / 1.055) ^ 2.4
/// ```
/// Negative values are mirrored so out-of-gamut data survives a roundtrip.
fn srgb_to_linear(encoded: f64) -> f64 {
    let v = encoded.abs();
    let lin = if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    };
    lin.copysign(encoded)
}

/// ```text
/// from_linear: L <= 0.0031308 → L × 12.92
///              L >  0.0031308 → 1.055 × L^(1/2.4) − 0.055
/// ```
fn srgb_from_linear(linear: f64) -> f64 {
    let v = linear.abs();
    let enc = if v <= 0.003_130_8 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    };
    enc.copysign(linear)
}

// ---------------------------------------------------------------------------
// ACEScct (logarithmic with toe, S-2016-001)
// ---------------------------------------------------------------------------

const ACESCCT_CUT: f64 = 0.0078125;
const ACESCCT_CUT_ENCODED: f64 = 0.155_251_141_552_511;
const ACESCCT_SLOPE: f64 = 10.540_237_741_654_5;
const ACESCCT_OFFSET: f64 = 0.072_905_534_195_835_5;

fn acescct_to_linear(encoded: f64) -> f64 {
    if encoded <= ACESCCT_CUT_ENCODED {
        (encoded - ACESCCT_OFFSET) / ACESCCT_SLOPE
    } else {
        2.0_f64.powf(encoded * 17.52 - 9.72)
    }
}

fn acescct_from_linear(linear: f64) -> f64 {
    if linear <= ACESCCT_CUT {
        ACESCCT_SLOPE * linear + ACESCCT_OFFSET
    } else {
        (linear.log2() + 9.72) / 17.52
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    fn assert_roundtrip(tf: &dyn TransferFunction, values: &[f64]) {
        for &v in values {
            let encoded = tf.to_encoded(v);
            let back = tf.to_linear(encoded);
            assert!(
                (v - back).abs() < EPSILON,
                "roundtrip failed for {v}: encoded={encoded}, back={back}"
            );
        }
    }

    #[test]
    fn test_srgb_roundtrip_preserves_values() {
        assert_roundtrip(&Trc::Srgb, &[0.0, 0.001, 0.01, 0.1, 0.5, 0.9, 1.0, 1.5, -0.2]);
    }

    #[test]
    fn test_srgb_known_values() {
        assert!((Trc::Srgb.to_linear(1.0) - 1.0).abs() < EPSILON);
        // Mid-gray sRGB ≈ 0.5 encodes ~0.214 linear
        assert!((Trc::Srgb.to_linear(0.5) - 0.214_041).abs() < 1e-4);
    }

    #[test]
    fn test_gamma_roundtrip_preserves_values() {
        assert_roundtrip(&Trc::gamma(2.2), &[0.0, 0.01, 0.18, 0.5, 1.0]);
        assert_roundtrip(&Trc::gamma(1.8), &[0.0, 0.01, 0.18, 0.5, 1.0]);
    }

    #[test]
    fn test_acescct_roundtrip_preserves_values() {
        assert_roundtrip(&Trc::AcesCct, &[0.001, 0.01, 0.1, 0.5, 1.0]);
    }

    #[test]
    fn test_named_lookup() {
        assert_eq!(Trc::named("linear").unwrap(), Trc::Linear);
        assert_eq!(Trc::named("sRGB").unwrap(), Trc::Srgb);
        assert_eq!(Trc::named("1.0").unwrap(), Trc::Linear);
        assert_eq!(Trc::named("2.2").unwrap(), Trc::Gamma(2.2));
        assert!(Trc::named("PQ").is_err());
        assert!(Trc::named("-1").is_err());
    }

    #[test]
    fn test_f32_path_tracks_f64_path() {
        for &v in &[0.0f32, 0.02, 0.2, 0.5, 0.8, 1.0] {
            let fast = Trc::Srgb.to_linear_f32(v);
            let exact = Trc::Srgb.to_linear(f64::from(v)) as f32;
            assert!((fast - exact).abs() < 1e-5);
        }
    }
}
