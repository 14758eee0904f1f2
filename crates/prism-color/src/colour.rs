//! A single color value: linear-light RGBA with straight alpha in sRGB primaries.
//!
//! Parsed from CSS-like strings. Hex codes and color names are sRGB-encoded
//! 8-bit values and are linearized; `rgb()`/`rgba()` take linear floats as-is.

use std::fmt;
use std::str::FromStr;

use palette::Srgb;
use serde::{Deserialize, Serialize};

use crate::error::ColorError;
use crate::fish::Precision;
use crate::format::PixelFormat;
use crate::registry::registry;

/// Linear RGBA color, straight alpha.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Colour {
    rgba: [f64; 4],
}

impl Default for Colour {
    /// Opaque black.
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }
}

impl Colour {
    pub const fn new(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { rgba: [r, g, b, a] }
    }

    pub const TRANSPARENT: Self = Self::new(0.0, 0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    /// Parse `"#rgb"`, `"#rgba"`, `"#rrggbb"`, `"#rrggbbaa"`, a CSS color name,
    /// `"transparent"`, `"rgb(r, g, b)"` or `"rgba(r, g, b, a)"`.
    pub fn parse(text: &str) -> Result<Self, ColorError> {
        let invalid = || ColorError::InvalidColour(text.to_string());
        let s = text.trim();

        if let Some(hex) = s.strip_prefix('#') {
            return parse_hex(hex).ok_or_else(invalid);
        }
        if let Some(args) = function_args(s, "rgba") {
            return match parse_floats(args).as_deref() {
                Some([r, g, b, a]) => Ok(Self::new(*r, *g, *b, *a)),
                _ => Err(invalid()),
            };
        }
        if let Some(args) = function_args(s, "rgb") {
            return match parse_floats(args).as_deref() {
                Some([r, g, b]) => Ok(Self::new(*r, *g, *b, 1.0)),
                _ => Err(invalid()),
            };
        }

        let lower = s.to_ascii_lowercase();
        if lower == "transparent" {
            return Ok(Self::TRANSPARENT);
        }
        palette::named::from_str(&lower)
            .map(|rgb| Self::from_srgb8(rgb, u8::MAX))
            .ok_or_else(invalid)
    }

    fn from_srgb8(rgb: Srgb<u8>, alpha: u8) -> Self {
        let linear: palette::LinSrgb<f64> = rgb.into_format::<f64>().into_linear();
        Self::new(
            linear.red,
            linear.green,
            linear.blue,
            f64::from(alpha) / 255.0,
        )
    }

    pub fn rgba(&self) -> [f64; 4] {
        self.rgba
    }

    pub fn set_rgba(&mut self, r: f64, g: f64, b: f64, a: f64) {
        self.rgba = [r, g, b, a];
    }

    pub fn alpha(&self) -> f64 {
        self.rgba[3]
    }

    /// Set the color from one pixel encoded in `format`.
    pub fn set_pixel(&mut self, format: &PixelFormat, pixel: &[u8]) -> Result<(), ColorError> {
        let reference = registry().format("RGBA double")?;
        let fish = registry().fish(format, &reference, Precision::Exact)?;
        let mut out = [0u8; 32];
        fish.process(pixel, &mut out, 1)?;
        for (slot, bytes) in self.rgba.iter_mut().zip(out.chunks_exact(8)) {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(bytes);
            *slot = f64::from_ne_bytes(raw);
        }
        Ok(())
    }

    /// Encode the color as one pixel of `format`.
    pub fn get_pixel(&self, format: &PixelFormat) -> Result<Vec<u8>, ColorError> {
        let reference = registry().format("RGBA double")?;
        let fish = registry().fish(&reference, format, Precision::Exact)?;
        let src: Vec<u8> = self.rgba.iter().flat_map(|v| v.to_ne_bytes()).collect();
        let mut out = vec![0u8; format.bytes_per_pixel()];
        fish.process(&src, &mut out, 1)?;
        Ok(out)
    }

    /// An independent copy.
    pub fn duplicate(&self) -> Self {
        *self
    }

    /// `rgba(r, g, b, a)` with linear components; parses back to the same value.
    pub fn to_css_string(&self) -> String {
        let [r, g, b, a] = self.rgba;
        format!("rgba({r}, {g}, {b}, {a})")
    }
}

impl FromStr for Colour {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Colour {
    type Error = ColorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Colour> for String {
    fn from(colour: Colour) -> Self {
        colour.to_css_string()
    }
}

impl fmt::Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_css_string())
    }
}

fn parse_hex(hex: &str) -> Option<Colour> {
    let (rgb, alpha) = match hex.len() {
        3 | 6 => (hex, None),
        4 => (&hex[..3], Some(hex[3..].repeat(2))),
        8 => (&hex[..6], Some(hex[6..].to_string())),
        _ => return None,
    };
    let rgb: Srgb<u8> = rgb.parse().ok()?;
    let alpha = match alpha {
        Some(a) => u8::from_str_radix(&a, 16).ok()?,
        None => u8::MAX,
    };
    Some(Colour::from_srgb8(rgb, alpha))
}

fn function_args<'a>(s: &'a str, name: &str) -> Option<&'a str> {
    s.strip_prefix(name)?
        .trim_start()
        .strip_prefix('(')?
        .strip_suffix(')')
}

fn parse_floats(args: &str) -> Option<Vec<f64>> {
    args.split(',')
        .map(|v| v.trim().parse::<f64>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn test_parse_hex_linearizes() {
        let c = Colour::parse("#ff8000").unwrap();
        let [r, g, b, a] = c.rgba();
        assert!((r - 1.0).abs() < EPSILON);
        assert!((g - 0.215_860_500_113_794_5).abs() < 1e-6);
        assert_eq!(b, 0.0);
        assert_eq!(a, 1.0);
    }

    #[test]
    fn test_parse_short_hex_with_alpha() {
        let c = Colour::parse("#f008").unwrap();
        assert!((c.rgba()[0] - 1.0).abs() < EPSILON);
        assert!((c.alpha() - 136.0 / 255.0).abs() < EPSILON);
    }

    #[test]
    fn test_parse_named_and_transparent() {
        let white = Colour::parse("white").unwrap().rgba();
        let black = Colour::parse("Black").unwrap().rgba();
        for i in 0..4 {
            assert!((white[i] - Colour::WHITE.rgba()[i]).abs() < EPSILON);
            assert!((black[i] - Colour::BLACK.rgba()[i]).abs() < EPSILON);
        }
        assert_eq!(Colour::parse("transparent").unwrap(), Colour::TRANSPARENT);
    }

    #[test]
    fn test_parse_functional_forms_are_linear() {
        let c: Colour = "rgb(0.5, 0.25, 0)".parse().unwrap();
        assert_eq!(c.rgba(), [0.5, 0.25, 0.0, 1.0]);
        let c: Colour = "rgba(1, 0, 0, 0.5)".parse().unwrap();
        assert_eq!(c.rgba(), [1.0, 0.0, 0.0, 0.5]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "#12", "rgb(1, 2)", "rgba(a, b, c, d)", "notacolour", "#gggggg"] {
            assert!(Colour::parse(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_css_string_roundtrip() {
        let c = Colour::new(0.1, 0.2, 0.3, 0.4);
        assert_eq!(Colour::parse(&c.to_css_string()).unwrap(), c);
    }

    #[test]
    fn test_get_pixel_encodes_srgb_u8() {
        let c = Colour::parse("#336699").unwrap();
        let format = PixelFormat::named("R'G'B'A u8").unwrap();
        assert_eq!(c.get_pixel(&format).unwrap(), vec![0x33, 0x66, 0x99, 0xff]);
    }

    #[test]
    fn test_set_pixel_decodes() {
        let format = PixelFormat::named("R'G'B'A u8").unwrap();
        let mut c = Colour::default();
        c.set_pixel(&format, &[255, 255, 255, 0]).unwrap();
        let [r, _, _, a] = c.rgba();
        assert!((r - 1.0).abs() < EPSILON);
        assert_eq!(a, 0.0);
    }

    #[test]
    fn test_string_form_is_css() {
        let c = Colour::new(1.0, 0.0, 0.0, 1.0);
        assert_eq!(String::from(c), "rgba(1, 0, 0, 1)");
        assert_eq!(Colour::try_from("rgba(1, 0, 0, 1)".to_string()).unwrap(), c);
    }
}
