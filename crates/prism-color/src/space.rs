//! RGB color spaces defined by primaries, white point, and transfer curve.
//!
//! Every space derives a D50-adapted RGB→XYZ matrix at construction. D50 XYZ is
//! the profile connection space that all cross-space conversions pass through.
//!
//! # Reference
//! - Lindbloom, Bruce J. — RGB/XYZ matrices, Bradford chromatic adaptation

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use glam::{DMat3, DVec3};
use serde::{Deserialize, Serialize};

use crate::error::ColorError;
use crate::trc::Trc;

/// CIE 1931 xy chromaticity coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Chromaticity {
    pub x: f64,
    pub y: f64,
}

impl Chromaticity {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// XYZ with `Y = 1`.
    pub(crate) fn to_xyz(self) -> DVec3 {
        DVec3::new(self.x / self.y, 1.0, (1.0 - self.x - self.y) / self.y)
    }
}

/// D50 white, the reference white of the connection space.
pub const D50: Chromaticity = Chromaticity::new(0.3457, 0.3585);
/// D65 white.
pub const D65: Chromaticity = Chromaticity::new(0.3127, 0.3290);
/// ACES white (≈ D60).
pub const ACES_WHITE: Chromaticity = Chromaticity::new(0.32168, 0.33767);

/// The defining parameters of a color space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpaceParams {
    pub red: Chromaticity,
    pub green: Chromaticity,
    pub blue: Chromaticity,
    pub white: Chromaticity,
    pub trc: Trc,
}

impl SpaceParams {
    /// Bit-exact key used for interning.
    pub(crate) fn key(&self) -> SpaceKey {
        let c = |p: Chromaticity| [p.x.to_bits(), p.y.to_bits()];
        let [rx, ry] = c(self.red);
        let [gx, gy] = c(self.green);
        let [bx, by] = c(self.blue);
        let [wx, wy] = c(self.white);
        SpaceKey {
            coords: [rx, ry, gx, gy, bx, by, wx, wy],
            trc: self.trc.name(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct SpaceKey {
    coords: [u64; 8],
    trc: String,
}

#[derive(Debug)]
pub(crate) struct SpaceInner {
    pub(crate) name: String,
    pub(crate) params: SpaceParams,
    pub(crate) rgb_to_xyz: DMat3,
    pub(crate) xyz_to_rgb: DMat3,
}

/// An interned, immutable RGB color space.
///
/// Cloning is cheap; equality is identity of the interned instance.
#[derive(Clone)]
pub struct ColorSpace(pub(crate) Arc<SpaceInner>);

impl ColorSpace {
    /// Look up a registered space by name (`"sRGB"`, `"ACEScg"`, ...).
    pub fn named(name: &str) -> Result<Self, ColorError> {
        crate::registry::registry().space(name)
    }

    /// The default space (sRGB).
    pub fn srgb() -> Self {
        crate::registry::registry().default_space()
    }

    /// Create (or fetch the interned) space for the given chromaticities.
    ///
    /// The name is recorded only when the parameters are new.
    pub fn from_chromaticities(
        name: &str,
        white: Chromaticity,
        red: Chromaticity,
        green: Chromaticity,
        blue: Chromaticity,
        trc: Trc,
    ) -> Result<Self, ColorError> {
        let params = SpaceParams {
            red,
            green,
            blue,
            white,
            trc,
        };
        crate::registry::registry().intern_space(name, params)
    }

    /// Same primaries with a different transfer curve.
    pub fn with_trc(&self, trc: Trc) -> Self {
        if self.0.params.trc == trc {
            return self.clone();
        }
        let params = SpaceParams {
            trc,
            ..self.0.params
        };
        let name = format!("{} ({})", self.0.name, trc.name());
        // Primaries were already validated when `self` was built.
        crate::registry::registry()
            .intern_space(&name, params)
            .unwrap_or_else(|_| self.clone())
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn trc(&self) -> Trc {
        self.0.params.trc
    }

    pub fn params(&self) -> SpaceParams {
        self.0.params
    }

    pub fn white_point(&self) -> Chromaticity {
        self.0.params.white
    }

    /// Approximate gamma of the transfer curve.
    pub fn gamma(&self) -> f64 {
        self.0.params.trc.approximate_gamma()
    }

    /// D50-adapted linear RGB → XYZ matrix.
    pub fn rgb_to_xyz(&self) -> DMat3 {
        self.0.rgb_to_xyz
    }

    /// XYZ (D50) → linear RGB matrix.
    pub fn xyz_to_rgb(&self) -> DMat3 {
        self.0.xyz_to_rgb
    }

    /// Relative luminance weights of the linear R, G, B channels.
    pub fn rgb_luminance(&self) -> [f64; 3] {
        let m = self.0.rgb_to_xyz;
        [m.x_axis.y, m.y_axis.y, m.z_axis.y]
    }

    /// Matrix taking linear RGB in `self` to linear RGB in `target`.
    pub fn matrix_to(&self, target: &ColorSpace) -> DMat3 {
        if self == target {
            return DMat3::IDENTITY;
        }
        target.0.xyz_to_rgb * self.0.rgb_to_xyz
    }

    /// Spaces are always RGB here; gray is a model, not a space.
    pub fn is_gray(&self) -> bool {
        false
    }

    /// CMYK spaces are not modelled.
    pub fn is_cmyk(&self) -> bool {
        false
    }
}

impl PartialEq for ColorSpace {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ColorSpace {}

impl Hash for ColorSpace {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.0), state);
    }
}

impl fmt::Debug for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ColorSpace").field(&self.0.name).finish()
    }
}

/// Derive the matrices for a set of parameters.
pub(crate) fn build_space(name: &str, params: SpaceParams) -> Result<SpaceInner, ColorError> {
    let degenerate = || ColorError::DegenerateSpace(name.to_string());
    for c in [params.red, params.green, params.blue, params.white] {
        if !(c.x.is_finite() && c.y.is_finite()) || c.y.abs() < 1e-12 {
            return Err(degenerate());
        }
    }

    let primaries = DMat3::from_cols(
        params.red.to_xyz(),
        params.green.to_xyz(),
        params.blue.to_xyz(),
    );
    if primaries.determinant().abs() < 1e-12 {
        return Err(degenerate());
    }
    let scale = primaries.inverse() * params.white.to_xyz();
    let native = primaries * DMat3::from_diagonal(scale);
    let rgb_to_xyz = bradford(params.white, D50) * native;
    if rgb_to_xyz.determinant().abs() < 1e-12 {
        return Err(degenerate());
    }

    Ok(SpaceInner {
        name: name.to_string(),
        params,
        rgb_to_xyz,
        xyz_to_rgb: rgb_to_xyz.inverse(),
    })
}

/// Bradford adaptation matrix from white `src` to white `dst`.
///
/// Computes `M_INV * diag(dst_cone / src_cone) * M`.
fn bradford(src: Chromaticity, dst: Chromaticity) -> DMat3 {
    // Bradford cone response matrix, column-major
    let m = DMat3::from_cols(
        DVec3::new(0.8951, -0.7502, 0.0389),
        DVec3::new(0.2664, 1.7135, -0.0685),
        DVec3::new(-0.1614, 0.0367, 1.0296),
    );
    let src_cone = m * src.to_xyz();
    let dst_cone = m * dst.to_xyz();
    m.inverse() * DMat3::from_diagonal(dst_cone / src_cone) * m
}

/// Built-in spaces registered at startup: `(name, params)`.
pub(crate) fn builtin_spaces() -> Vec<(&'static str, SpaceParams)> {
    let p = |red: (f64, f64), green: (f64, f64), blue: (f64, f64), white, trc| SpaceParams {
        red: Chromaticity::new(red.0, red.1),
        green: Chromaticity::new(green.0, green.1),
        blue: Chromaticity::new(blue.0, blue.1),
        white,
        trc,
    };
    vec![
        ("sRGB", p((0.64, 0.33), (0.30, 0.60), (0.15, 0.06), D65, Trc::Srgb)),
        ("Rec2020", p((0.708, 0.292), (0.170, 0.797), (0.131, 0.046), D65, Trc::Linear)),
        ("ACEScg", p((0.713, 0.293), (0.165, 0.830), (0.128, 0.044), ACES_WHITE, Trc::Linear)),
        (
            "ACES2065-1",
            p((0.7347, 0.2653), (0.0, 1.0), (0.0001, -0.0770), ACES_WHITE, Trc::Linear),
        ),
        ("Display P3", p((0.680, 0.320), (0.265, 0.690), (0.150, 0.060), D65, Trc::Srgb)),
        ("ProPhoto", p((0.7347, 0.2653), (0.1596, 0.8404), (0.0366, 0.0001), D50, Trc::Gamma(1.8))),
        ("Adobish", p((0.64, 0.33), (0.21, 0.71), (0.15, 0.06), D65, Trc::Gamma(2.2))),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-3;

    fn srgb_inner() -> SpaceInner {
        let (name, params) = builtin_spaces()[0];
        build_space(name, params).unwrap()
    }

    #[test]
    fn test_srgb_matrix_matches_published_d50_values() {
        // Lindbloom sRGB → XYZ (D50, Bradford)
        let m = srgb_inner().rgb_to_xyz;
        assert!((m.x_axis.x - 0.436_074_7).abs() < EPSILON);
        assert!((m.y_axis.x - 0.385_064_9).abs() < EPSILON);
        assert!((m.z_axis.x - 0.143_080_4).abs() < EPSILON);
        assert!((m.x_axis.y - 0.222_504_5).abs() < EPSILON);
        assert!((m.y_axis.y - 0.716_878_6).abs() < EPSILON);
    }

    #[test]
    fn test_white_maps_to_d50() {
        for (name, params) in builtin_spaces() {
            let inner = build_space(name, params).unwrap();
            let xyz = inner.rgb_to_xyz * DVec3::ONE;
            let d50 = D50.to_xyz();
            assert!((xyz - d50).abs().max_element() < 1e-3, "{name}: {xyz:?}");
        }
    }

    #[test]
    fn test_degenerate_primaries_are_rejected() {
        let params = SpaceParams {
            red: Chromaticity::new(0.3, 0.3),
            green: Chromaticity::new(0.3, 0.3),
            blue: Chromaticity::new(0.3, 0.3),
            white: D65,
            trc: Trc::Linear,
        };
        assert!(build_space("broken", params).is_err());
    }

    #[test]
    fn test_bradford_identity_for_same_white() {
        let m = bradford(D65, D65);
        assert!(m.abs_diff_eq(DMat3::IDENTITY, 1e-12));
    }
}
