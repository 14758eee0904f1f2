//! Interpolated point sampling.
//!
//! Samplers interpolate premultiplied linear RGBA (`RaGaBaA float` in the
//! buffer's space) so transparent neighbours do not bleed color. Pixel centers
//! sit at half-integer coordinates.

use prism_color::{Fish, PixelFormat};

use super::{AbyssPolicy, Buffer};
use crate::error::PrismResult;
use crate::rect::Rect;

/// Interpolation kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum SamplerKind {
    Nearest,
    #[default]
    Linear,
    /// Catmull-Rom cubic.
    Cubic,
    /// Lanczos-3.
    HighQuality,
}

impl SamplerKind {
    /// Kernel half-width in pixels.
    fn radius(self) -> i32 {
        match self {
            Self::Nearest => 0,
            Self::Linear => 1,
            Self::Cubic => 2,
            Self::HighQuality => 3,
        }
    }

    /// Pixels read around the sample point, relative to the pixel containing it.
    pub fn context_rect(self) -> Rect {
        match self.radius() {
            0 => Rect::new(0, 0, 1, 1),
            r => Rect::new(-r, -r, 2 * r + 1, 2 * r + 1),
        }
    }

    fn weight(self, d: f64) -> f64 {
        let d = d.abs();
        match self {
            Self::Nearest => f64::from(d < 0.5),
            Self::Linear => (1.0 - d).max(0.0),
            Self::Cubic => {
                const A: f64 = -0.5;
                if d <= 1.0 {
                    (A + 2.0) * d * d * d - (A + 3.0) * d * d + 1.0
                } else if d < 2.0 {
                    A * d * d * d - 5.0 * A * d * d + 8.0 * A * d - 4.0 * A
                } else {
                    0.0
                }
            }
            Self::HighQuality => {
                if d < 1e-12 {
                    1.0
                } else if d < 3.0 {
                    let pd = std::f64::consts::PI * d;
                    3.0 * pd.sin() * (pd / 3.0).sin() / (pd * pd)
                } else {
                    0.0
                }
            }
        }
    }
}

/// Samples one buffer into one output format.
pub struct Sampler {
    kind: SamplerKind,
    buffer: Buffer,
    abyss: AbyssPolicy,
    interpolation: PixelFormat,
    to_output: Fish,
    output: PixelFormat,
}

impl Sampler {
    pub fn new(
        buffer: &Buffer,
        format: &PixelFormat,
        kind: SamplerKind,
        abyss: AbyssPolicy,
    ) -> PrismResult<Self> {
        let space = buffer.format().space().clone();
        let interpolation = prism_color::format_with_space("RaGaBaA float", &space)?;
        // Validates the read path up front.
        prism_color::fish(&buffer.format(), &interpolation)?;
        let to_output = prism_color::fish(&interpolation, format)?;
        Ok(Self {
            kind,
            buffer: buffer.clone(),
            abyss,
            interpolation,
            to_output,
            output: format.clone(),
        })
    }

    pub fn kind(&self) -> SamplerKind {
        self.kind
    }

    pub fn context_rect(&self) -> Rect {
        self.kind.context_rect()
    }

    /// Sample at `(x, y)` and return one pixel in the output format.
    pub fn get(&self, x: f64, y: f64) -> PrismResult<Vec<u8>> {
        let mut out = vec![0u8; self.output.bytes_per_pixel()];
        self.get_into(x, y, &mut out)?;
        Ok(out)
    }

    pub fn get_into(&self, x: f64, y: f64, out: &mut [u8]) -> PrismResult<()> {
        let value = self.interpolate(x, y)?;
        self.to_output
            .process(bytemuck::cast_slice(&value), out, 1)?;
        Ok(())
    }

    fn interpolate(&self, x: f64, y: f64) -> PrismResult<[f32; 4]> {
        if self.kind == SamplerKind::Nearest {
            let rect = Rect::new(x.floor() as i32, y.floor() as i32, 1, 1);
            let px = self.read(rect)?;
            return Ok([px[0], px[1], px[2], px[3]]);
        }

        // Interpolate between pixel centers.
        let (u, v) = (x - 0.5, y - 0.5);
        let (ix, iy) = (u.floor() as i32, v.floor() as i32);
        let r = self.kind.radius();
        let rect = Rect::new(ix - (r - 1), iy - (r - 1), 2 * r, 2 * r);
        let pixels = self.read(rect)?;

        let weights = |origin: i32, pos: f64| -> Vec<f64> {
            let w: Vec<f64> = (0..2 * r)
                .map(|i| self.kind.weight(pos - f64::from(origin + i)))
                .collect();
            let sum: f64 = w.iter().sum();
            if sum.abs() > 1e-12 {
                w.iter().map(|v| v / sum).collect()
            } else {
                w
            }
        };
        let wx = weights(rect.x, u);
        let wy = weights(rect.y, v);

        let mut acc = [0.0f64; 4];
        let side = (2 * r) as usize;
        for (j, wyj) in wy.iter().enumerate() {
            for (i, wxi) in wx.iter().enumerate() {
                let w = wxi * wyj;
                let at = (j * side + i) * 4;
                for (c, slot) in acc.iter_mut().enumerate() {
                    *slot += w * f64::from(pixels[at + c]);
                }
            }
        }
        Ok(acc.map(|v| v as f32))
    }

    fn read(&self, rect: Rect) -> PrismResult<Vec<f32>> {
        let bytes = self
            .buffer
            .read_converted(rect, 1.0, &self.interpolation, self.abyss)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    fn ramp() -> Buffer {
        // 4×1 linear ramp 0, 1/3, 2/3, 1 in RGBA float
        let format = prism_color::format("RGBA float").unwrap();
        let values: Vec<f32> = (0..4).flat_map(|i| [i as f32 / 3.0, 0.0, 0.0, 1.0]).collect();
        Buffer::from_bytes(Rect::new(0, 0, 4, 1), &format, bytemuck::cast_slice(&values)).unwrap()
    }

    fn red(buffer: &Buffer, x: f64, kind: SamplerKind) -> f32 {
        let format = prism_color::format("RGBA float").unwrap();
        let px = buffer.sample(x, 0.5, &format, kind, AbyssPolicy::Clamp).unwrap();
        f32::from_ne_bytes([px[0], px[1], px[2], px[3]])
    }

    #[test]
    fn test_sampler_nearest_picks_containing_pixel() {
        let b = ramp();
        assert!((red(&b, 1.9, SamplerKind::Nearest) - 1.0 / 3.0).abs() < EPSILON);
    }

    #[test]
    fn test_sampler_linear_midpoint() {
        let b = ramp();
        assert!((red(&b, 2.0, SamplerKind::Linear) - 0.5).abs() < EPSILON);
        // pixel centers reproduce exactly
        assert!((red(&b, 1.5, SamplerKind::Linear) - 1.0 / 3.0).abs() < EPSILON);
    }

    #[test]
    fn test_sampler_kernels_interpolate_pixel_centers() {
        let b = ramp();
        for kind in [SamplerKind::Cubic, SamplerKind::HighQuality] {
            assert!((red(&b, 2.5, kind) - 2.0 / 3.0).abs() < 1e-4, "{kind:?}");
        }
    }

    #[test]
    fn test_sampler_context_rect() {
        assert_eq!(SamplerKind::Nearest.context_rect(), Rect::new(0, 0, 1, 1));
        assert_eq!(SamplerKind::Cubic.context_rect(), Rect::new(-2, -2, 5, 5));
    }
}
