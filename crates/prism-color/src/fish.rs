//! Conversion paths ("fishes") between two pixel formats.
//!
//! A fish is resolved once per (source, destination, precision) and cached by
//! the registry. Resolution order:
//!
//! 1. identical formats → byte copy
//! 2. a registered direct conversion
//! 3. `format_n` → `format_n` with equal component count → per-component retyping
//! 4. model → model through the reference path
//!
//! The reference path decodes to linear light with straight alpha, moves
//! through D50 XYZ when the two sides do not share a connection space, and
//! encodes. Values are only clipped by the final integer encode.

use std::fmt;
use std::sync::Arc;

use glam::{DMat3, DVec3};

use crate::component::ComponentType;
use crate::error::ColorError;
use crate::format::{Layout, PixelFormat};
use crate::model::{AlphaMode, ColorModel, Encoding, ModelFamily};
use crate::space::D50;
use crate::trc::{TransferFunction, Trc};

/// Smallest alpha magnitude used when un-premultiplying or premultiplying.
///
/// Keeps the color of fully transparent pixels recoverable through associated
/// alpha formats.
pub const ALPHA_FLOOR: f64 = 1.0 / 65536.0;

/// A registered direct conversion: `(src, dst, n_pixels)`.
pub type ConversionFn = Arc<dyn Fn(&[u8], &mut [u8], usize) + Send + Sync>;

/// Accuracy requested from a fish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    /// Double-precision math; the default.
    Exact,
    /// Single-precision curves and an 8-bit decode table.
    Fast,
}

enum FishKind {
    Identity,
    Direct(ConversionFn),
    Components { n: usize },
    Reference(Box<ReferencePath>),
}

impl FishKind {
    fn name(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Direct(_) => "direct",
            Self::Components { .. } => "components",
            Self::Reference(_) => "reference",
        }
    }
}

struct FishInner {
    source: PixelFormat,
    destination: PixelFormat,
    precision: Precision,
    kind: FishKind,
}

/// A resolved conversion from one pixel format to another.
#[derive(Clone)]
pub struct Fish(Arc<FishInner>);

impl Fish {
    pub(crate) fn build(
        source: &PixelFormat,
        destination: &PixelFormat,
        precision: Precision,
        direct: Option<ConversionFn>,
    ) -> Result<Self, ColorError> {
        let no_path = || ColorError::NoConversion {
            from: format!("{source:?}"),
            to: format!("{destination:?}"),
        };

        let kind = if source == destination {
            FishKind::Identity
        } else if let Some(convert) = direct {
            FishKind::Direct(convert)
        } else {
            match (source.layout(), destination.layout()) {
                (Layout::Components(a), Layout::Components(b)) if a == b => {
                    FishKind::Components { n: a }
                }
                (Layout::Model(_), Layout::Model(_)) => FishKind::Reference(Box::new(
                    ReferencePath::new(source, destination, precision).ok_or_else(no_path)?,
                )),
                _ => return Err(no_path()),
            }
        };

        Ok(Self(Arc::new(FishInner {
            source: source.clone(),
            destination: destination.clone(),
            precision,
            kind,
        })))
    }

    pub fn source(&self) -> &PixelFormat {
        &self.0.source
    }

    pub fn destination(&self) -> &PixelFormat {
        &self.0.destination
    }

    pub fn precision(&self) -> Precision {
        self.0.precision
    }

    pub fn is_identity(&self) -> bool {
        matches!(self.0.kind, FishKind::Identity)
    }

    /// `"identity"`, `"direct"`, `"components"` or `"reference"`.
    pub fn kind_name(&self) -> &'static str {
        self.0.kind.name()
    }

    /// Upper bound on the absolute error this fish adds on `[0, 1]` data,
    /// excluding what the source format had already lost.
    pub fn declared_error(&self) -> f64 {
        if self.is_identity() {
            return 0.0;
        }
        let math = match self.0.precision {
            Precision::Exact => 1e-9,
            Precision::Fast => 1e-5,
        };
        self.0.destination.ty().precision() + math
    }

    /// Convert `n_pixels` packed pixels from `src` into `dst`.
    pub fn process(&self, src: &[u8], dst: &mut [u8], n_pixels: usize) -> Result<(), ColorError> {
        let src_bpp = self.0.source.bytes_per_pixel();
        let dst_bpp = self.0.destination.bytes_per_pixel();
        check_len(src, n_pixels * src_bpp)?;
        check_len(dst, n_pixels * dst_bpp)?;
        if n_pixels == 0 {
            return Ok(());
        }
        let src = &src[..n_pixels * src_bpp];
        let dst = &mut dst[..n_pixels * dst_bpp];

        match &self.0.kind {
            FishKind::Identity => dst.copy_from_slice(src),
            FishKind::Direct(convert) => convert(src, dst, n_pixels),
            FishKind::Components { n } => {
                let (from, to) = (self.0.source.ty(), self.0.destination.ty());
                let (fs, ts) = (from.bytes(), to.bytes());
                for (s, d) in src.chunks_exact(fs).zip(dst.chunks_exact_mut(ts)).take(n * n_pixels) {
                    to.encode(from.decode(s), d);
                }
            }
            FishKind::Reference(path) => {
                for (s, d) in src.chunks_exact(src_bpp).zip(dst.chunks_exact_mut(dst_bpp)) {
                    path.convert_pixel(s, d);
                }
            }
        }
        Ok(())
    }

    /// Convert a strided block of `rows` rows of `width` pixels.
    pub fn process_rows(
        &self,
        src: &[u8],
        src_stride: usize,
        dst: &mut [u8],
        dst_stride: usize,
        width: usize,
        rows: usize,
    ) -> Result<(), ColorError> {
        if rows == 0 || width == 0 {
            return Ok(());
        }
        let src_row = width * self.0.source.bytes_per_pixel();
        let dst_row = width * self.0.destination.bytes_per_pixel();
        check_len(src, (rows - 1) * src_stride + src_row)?;
        check_len(dst, (rows - 1) * dst_stride + dst_row)?;

        for row in 0..rows {
            let s = &src[row * src_stride..row * src_stride + src_row];
            let d = &mut dst[row * dst_stride..row * dst_stride + dst_row];
            self.process(s, d, width)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fish {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Fish({:?} -> {:?}, {}, {:?})",
            self.0.source,
            self.0.destination,
            self.0.kind.name(),
            self.0.precision
        )
    }
}

fn check_len(buf: &[u8], needed: usize) -> Result<(), ColorError> {
    if buf.len() < needed {
        return Err(ColorError::BufferSize {
            needed,
            actual: buf.len(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Reference path
// ---------------------------------------------------------------------------

/// One side of a reference conversion.
struct Codec {
    model: ColorModel,
    ty: ComponentType,
    trc: Trc,
    fast: bool,
    /// Linear value for each 8-bit code; only for fast 8-bit RGB/gray sources.
    lut: Option<Box<[f64; 256]>>,
}

impl Codec {
    fn new(format: &PixelFormat, model: ColorModel, precision: Precision) -> Self {
        let trc = match (model.family, model.encoding) {
            (ModelFamily::CieLab | ModelFamily::CieXyz, _) | (_, Encoding::Linear) => Trc::Linear,
            (_, Encoding::Nonlinear) => format.space().trc(),
            (_, Encoding::Perceptual) => Trc::Srgb,
        };
        let fast = precision == Precision::Fast;
        let lut = (fast
            && format.ty() == ComponentType::U8
            && matches!(model.family, ModelFamily::Rgb | ModelFamily::Gray))
        .then(|| {
            let mut table = Box::new([0.0; 256]);
            for (code, slot) in table.iter_mut().enumerate() {
                *slot = f64::from(trc.to_linear_f32(code as f32 / 255.0));
            }
            table
        });
        Self {
            model,
            ty: format.ty(),
            trc,
            fast,
            lut,
        }
    }

    fn color_components(&self) -> usize {
        self.model.n_components() - usize::from(self.model.has_alpha())
    }

    fn to_linear(&self, v: f64) -> f64 {
        if self.fast {
            f64::from(self.trc.to_linear_f32(v as f32))
        } else {
            self.trc.to_linear(v)
        }
    }

    fn to_encoded(&self, v: f64) -> f64 {
        if self.fast {
            f64::from(self.trc.to_encoded_f32(v as f32))
        } else {
            self.trc.to_encoded(v)
        }
    }

    /// Decode one pixel to linear color in the connection space plus straight alpha.
    fn decode(&self, px: &[u8]) -> [f64; 4] {
        let size = self.ty.bytes();
        let color_n = self.color_components();
        let mut raw = [0.0f64; 4];
        for (i, slot) in raw.iter_mut().enumerate().take(self.model.n_components()) {
            *slot = self.ty.decode(&px[i * size..]);
        }
        let alpha = if self.model.has_alpha() { raw[color_n] } else { 1.0 };

        let associated = self.model.alpha == AlphaMode::Associated;
        if associated {
            let a = floor_alpha(alpha);
            for c in &mut raw[..color_n] {
                *c /= a;
            }
        }

        let linear = |i: usize| match (&self.lut, associated) {
            (Some(lut), false) => lut[usize::from(px[i])],
            _ => self.to_linear(raw[i]),
        };

        match self.model.family {
            ModelFamily::Rgb => [linear(0), linear(1), linear(2), alpha],
            ModelFamily::Gray => {
                let y = linear(0);
                [y, y, y, alpha]
            }
            ModelFamily::CieXyz => [raw[0], raw[1], raw[2], alpha],
            ModelFamily::CieLab => {
                let lab = if self.ty.is_integer() {
                    DVec3::new(raw[0] * 100.0, raw[1] * 255.0 - 128.0, raw[2] * 255.0 - 128.0)
                } else {
                    DVec3::new(raw[0], raw[1], raw[2])
                };
                let xyz = lab_to_xyz(lab);
                [xyz.x, xyz.y, xyz.z, alpha]
            }
        }
    }

    /// Encode linear color in the connection space plus straight alpha.
    fn encode(&self, v: [f64; 4], luminance: DVec3, out: &mut [u8]) {
        let color_n = self.color_components();
        let mut raw = [0.0f64; 4];
        match self.model.family {
            ModelFamily::Rgb => {
                for i in 0..3 {
                    raw[i] = self.to_encoded(v[i]);
                }
            }
            ModelFamily::Gray => {
                let y = luminance.dot(DVec3::new(v[0], v[1], v[2]));
                raw[0] = self.to_encoded(y);
            }
            ModelFamily::CieXyz => raw[..3].copy_from_slice(&v[..3]),
            ModelFamily::CieLab => {
                let lab = xyz_to_lab(DVec3::new(v[0], v[1], v[2]));
                let lab = if self.ty.is_integer() {
                    [lab.x / 100.0, (lab.y + 128.0) / 255.0, (lab.z + 128.0) / 255.0]
                } else {
                    lab.to_array()
                };
                raw[..3].copy_from_slice(&lab);
            }
        }

        if self.model.has_alpha() {
            raw[color_n] = v[3];
            if self.model.alpha == AlphaMode::Associated {
                let a = floor_alpha(v[3]);
                for c in &mut raw[..color_n] {
                    *c *= a;
                }
            }
        }

        let size = self.ty.bytes();
        for (i, value) in raw.iter().enumerate().take(self.model.n_components()) {
            self.ty.encode(*value, &mut out[i * size..]);
        }
    }
}

struct ReferencePath {
    source: Codec,
    destination: Codec,
    /// `None` when both sides share a connection space.
    matrix: Option<DMat3>,
    luminance: DVec3,
}

impl ReferencePath {
    fn new(source: &PixelFormat, destination: &PixelFormat, precision: Precision) -> Option<Self> {
        let src_model = source.model()?;
        let dst_model = destination.model()?;

        let is_rgb = |m: ColorModel| matches!(m.family, ModelFamily::Rgb | ModelFamily::Gray);
        let to_xyz = is_rgb(src_model).then(|| source.space().rgb_to_xyz());
        let from_xyz = is_rgb(dst_model).then(|| destination.space().xyz_to_rgb());
        let matrix = match (to_xyz, from_xyz) {
            (Some(_), Some(_)) if source.space() == destination.space() => None,
            (None, None) => None,
            (Some(a), Some(b)) => Some(b * a),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
        };
        let [lr, lg, lb] = destination.space().rgb_luminance();

        Some(Self {
            source: Codec::new(source, src_model, precision),
            destination: Codec::new(destination, dst_model, precision),
            matrix,
            luminance: DVec3::new(lr, lg, lb),
        })
    }

    fn convert_pixel(&self, src: &[u8], dst: &mut [u8]) {
        let mut v = self.source.decode(src);
        if let Some(m) = self.matrix {
            let c = m * DVec3::new(v[0], v[1], v[2]);
            v = [c.x, c.y, c.z, v[3]];
        }
        self.destination.encode(v, self.luminance, dst);
    }
}

fn floor_alpha(alpha: f64) -> f64 {
    if alpha.abs() < ALPHA_FLOOR {
        ALPHA_FLOOR.copysign(alpha)
    } else {
        alpha
    }
}

// ---------------------------------------------------------------------------
// CIE L*a*b* (D50)
// ---------------------------------------------------------------------------

const LAB_EPSILON: f64 = 216.0 / 24389.0;
const LAB_KAPPA: f64 = 24389.0 / 27.0;

fn xyz_to_lab(xyz: DVec3) -> DVec3 {
    let r = xyz / D50.to_xyz();
    let f = |t: f64| {
        if t > LAB_EPSILON {
            t.cbrt()
        } else {
            (LAB_KAPPA * t + 16.0) / 116.0
        }
    };
    let (fx, fy, fz) = (f(r.x), f(r.y), f(r.z));
    DVec3::new(116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz))
}

fn lab_to_xyz(lab: DVec3) -> DVec3 {
    let fy = (lab.x + 16.0) / 116.0;
    let fx = lab.y / 500.0 + fy;
    let fz = fy - lab.z / 200.0;
    let inv = |f: f64| {
        let cube = f * f * f;
        if cube > LAB_EPSILON {
            cube
        } else {
            (116.0 * f - 16.0) / LAB_KAPPA
        }
    };
    let yr = if lab.x > LAB_KAPPA * LAB_EPSILON {
        fy * fy * fy
    } else {
        lab.x / LAB_KAPPA
    };
    DVec3::new(inv(fx), yr, inv(fz)) * D50.to_xyz()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::registry;

    const EPSILON: f64 = 1e-6;

    fn fish(from: &str, to: &str) -> Fish {
        let reg = registry();
        reg.fish(&reg.format(from).unwrap(), &reg.format(to).unwrap(), Precision::Exact)
            .unwrap()
    }

    fn floats(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    fn float_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_ne_bytes()).collect()
    }

    #[test]
    fn test_identity_fish_copies_bytes() {
        let f = fish("R'G'B'A u8", "R'G'B'A u8");
        assert!(f.is_identity());
        let src = [1u8, 2, 3, 4, 250, 251, 252, 253];
        let mut dst = [0u8; 8];
        f.process(&src, &mut dst, 2).unwrap();
        assert_eq!(src, dst);
    }

    #[test]
    fn test_builtin_direct_conversion_adds_opaque_alpha() {
        let f = fish("R'G'B' u8", "R'G'B'A u8");
        assert_eq!(f.kind_name(), "direct");
        let mut dst = [0u8; 4];
        f.process(&[10, 20, 30], &mut dst, 1).unwrap();
        assert_eq!(dst, [10, 20, 30, 255]);
    }

    #[test]
    fn test_srgb_u8_to_linear_float() {
        let f = fish("R'G'B'A u8", "RGBA float");
        let mut dst = [0u8; 16];
        f.process(&[255, 128, 0, 255], &mut dst, 1).unwrap();
        let v = floats(&dst);
        assert!((v[0] - 1.0).abs() < 1e-6);
        assert!((f64::from(v[1]) - Trc::Srgb.to_linear(128.0 / 255.0)).abs() < EPSILON);
        assert_eq!(v[2], 0.0);
        assert_eq!(v[3], 1.0);
    }

    #[test]
    fn test_float_values_are_not_clipped_mid_pipeline() {
        let f = fish("RGBA float", "R'G'B'A float");
        let back = fish("R'G'B'A float", "RGBA float");
        let src = float_bytes(&[2.0, -0.5, 0.25, 1.0]);
        let mut mid = vec![0u8; 16];
        let mut out = vec![0u8; 16];
        f.process(&src, &mut mid, 1).unwrap();
        back.process(&mid, &mut out, 1).unwrap();
        let v = floats(&out);
        assert!((v[0] - 2.0).abs() < 1e-5);
        assert!((v[1] + 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_premultiplied_roundtrip_keeps_transparent_color() {
        let to = fish("RGBA float", "RaGaBaA float");
        let from = fish("RaGaBaA float", "RGBA float");
        let src = float_bytes(&[0.8, 0.4, 0.2, 0.0]);
        let mut mid = vec![0u8; 16];
        let mut out = vec![0u8; 16];
        to.process(&src, &mut mid, 1).unwrap();
        from.process(&mid, &mut out, 1).unwrap();
        let v = floats(&out);
        assert!((v[0] - 0.8).abs() < 1e-5);
        assert_eq!(v[3], 0.0);
    }

    #[test]
    fn test_gray_preserves_luminance_of_white() {
        let f = fish("RGB float", "Y float");
        let mut dst = [0u8; 4];
        f.process(&float_bytes(&[1.0, 1.0, 1.0]), &mut dst, 1).unwrap();
        assert!((floats(&dst)[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_lab_white_and_black() {
        let f = fish("RGB double", "CIE Lab double");
        let mut dst = [0u8; 24];
        let src: Vec<u8> = [1.0f64, 1.0, 1.0].iter().flat_map(|v| v.to_ne_bytes()).collect();
        f.process(&src, &mut dst, 1).unwrap();
        let l = ComponentType::Double.decode(&dst[0..8]);
        let a = ComponentType::Double.decode(&dst[8..16]);
        assert!((l - 100.0).abs() < 1e-3, "L = {l}");
        assert!(a.abs() < 1e-3);
    }

    #[test]
    fn test_lab_xyz_inverse() {
        let xyz = DVec3::new(0.3, 0.4, 0.2);
        assert!(lab_to_xyz(xyz_to_lab(xyz)).abs_diff_eq(xyz, 1e-9));
        let dark = DVec3::new(0.001, 0.002, 0.001);
        assert!(lab_to_xyz(xyz_to_lab(dark)).abs_diff_eq(dark, 1e-9));
    }

    #[test]
    fn test_format_n_cannot_reach_model_formats() {
        let reg = registry();
        let n = reg.format("format_n 3 float").unwrap();
        let rgb = reg.format("RGB float").unwrap();
        assert!(matches!(
            reg.fish(&n, &rgb, Precision::Exact),
            Err(ColorError::NoConversion { .. })
        ));
        let n2 = reg.format("format_n 2 u8").unwrap();
        assert!(reg.fish(&n, &n2, Precision::Exact).is_err());
    }

    #[test]
    fn test_format_n_retypes_components() {
        let f = fish("format_n 2 float", "format_n 2 u8");
        assert_eq!(f.kind_name(), "components");
        let mut dst = [0u8; 2];
        f.process(&float_bytes(&[1.0, 0.5]), &mut dst, 1).unwrap();
        assert_eq!(dst, [255, 128]);
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        let f = fish("RGBA float", "R'G'B'A u8");
        let mut dst = [0u8; 4];
        let err = f.process(&[0u8; 8], &mut dst, 1);
        assert!(matches!(err, Err(ColorError::BufferSize { needed: 16, actual: 8 })));
    }

    #[test]
    fn test_process_rows_honours_strides() {
        let f = fish("R'G'B'A u8", "R'G'B' u8");
        let src = [1u8, 2, 3, 4, 99, 99, 5, 6, 7, 8, 99, 99];
        let mut dst = [0u8; 8];
        f.process_rows(&src, 6, &mut dst, 4, 1, 2).unwrap();
        assert_eq!(dst, [1, 2, 3, 0, 5, 6, 7, 0]);
    }

    #[test]
    fn test_fast_fish_tracks_exact_fish() {
        let reg = registry();
        let src_fmt = reg.format("R'G'B'A u8").unwrap();
        let dst_fmt = reg.format("RGBA float").unwrap();
        let exact = reg.fish(&src_fmt, &dst_fmt, Precision::Exact).unwrap();
        let fast = reg.fish(&src_fmt, &dst_fmt, Precision::Fast).unwrap();
        let src: Vec<u8> = (0..=255u8).flat_map(|v| [v, v, v, 255]).collect();
        let mut a = vec![0u8; 256 * 16];
        let mut b = vec![0u8; 256 * 16];
        exact.process(&src, &mut a, 256).unwrap();
        fast.process(&src, &mut b, 256).unwrap();
        for (x, y) in floats(&a).iter().zip(floats(&b)) {
            assert!((x - y).abs() < 1e-5);
        }
    }
}
