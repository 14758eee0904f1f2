//! Point and area filters.

use prism_color::PixelFormat;

use super::{Operation, OperationCategory, OperationClass, PadMap, Properties, PropertySpec, working_format};
use crate::buffer::{AbyssPolicy, Buffer};
use crate::engine::OperationContext;
use crate::error::PrismResult;
use crate::graph::ValueKind;
use crate::rect::Rect;

pub(super) fn classes() -> Vec<OperationClass> {
    vec![
        OperationClass::new("prism:nop", OperationCategory::PointFilter, Nop)
            .title("No Operation")
            .description("Passes its input through unchanged"),
        OperationClass::new("prism:invert-linear", OperationCategory::PointFilter, InvertLinear)
            .title("Invert")
            .description("Inverts the linear RGB components, keeping alpha"),
        OperationClass::new("prism:brightness-contrast", OperationCategory::PointFilter, BrightnessContrast)
            .title("Brightness Contrast")
            .description("Scales around mid-grey, then offsets")
            .property(PropertySpec::new("contrast", 1.0).range(-5.0, 5.0))
            .property(PropertySpec::new("brightness", 0.0).range(-3.0, 3.0)),
        OperationClass::new("prism:opacity", OperationCategory::PointFilter, Opacity)
            .title("Opacity")
            .description("Multiplies alpha by a constant")
            .property(PropertySpec::new("value", 1.0).range(-10.0, 10.0)),
        OperationClass::new("prism:convert-format", OperationCategory::PointFilter, ConvertFormat)
            .title("Convert Format")
            .description("Stores its input in the given pixel format")
            .property(
                PropertySpec::unset("format", ValueKind::Format)
                    .describe("Target format; unset passes the input format through"),
            ),
        OperationClass::new("prism:translate", OperationCategory::AreaFilter, Translate)
            .title("Translate")
            .description("Moves the input by whole pixels")
            .property(PropertySpec::new("x", 0).key("unit", "pixel-distance").key("axis", "x"))
            .property(PropertySpec::new("y", 0).key("unit", "pixel-distance").key("axis", "y")),
        OperationClass::new("prism:crop", OperationCategory::AreaFilter, Crop)
            .title("Crop")
            .description("Restricts the input to a rectangle")
            .property(PropertySpec::new("x", 0))
            .property(PropertySpec::new("y", 0))
            .property(PropertySpec::new("width", 0).range(0.0, f64::from(i32::MAX)))
            .property(PropertySpec::new("height", 0).range(0.0, f64::from(i32::MAX))),
        OperationClass::new("prism:box-blur", OperationCategory::AreaFilter, BoxBlur)
            .title("Box Blur")
            .description("Separable box blur on premultiplied pixels")
            .property(
                PropertySpec::new("radius", 4)
                    .range(0.0, 1000.0)
                    .key("unit", "pixel-distance")
                    .describe("Half-width of the box"),
            ),
    ]
}

/// Input format, or `RGBA float` when nothing is connected.
fn passthrough_format(inputs: &PadMap<PixelFormat>) -> PrismResult<PixelFormat> {
    match inputs.get("input") {
        Some(format) => Ok(format.clone()),
        None => working_format("RGBA float", inputs),
    }
}

fn copy_input(ctx: &OperationContext<'_>, from: Rect, to: Rect) -> PrismResult<()> {
    match ctx.input("input") {
        Some(input) => Buffer::copy(input, from, AbyssPolicy::None, ctx.output(), to),
        None => Ok(()),
    }
}

// ── Point filters ────────────────────────────────────────────────

struct Nop;

impl Operation for Nop {
    fn prepare(&self, _properties: &Properties, inputs: &PadMap<PixelFormat>) -> PrismResult<PixelFormat> {
        passthrough_format(inputs)
    }

    fn process(&self, ctx: &mut OperationContext<'_>) -> PrismResult<()> {
        let rect = ctx.result_rect();
        copy_input(ctx, rect, rect)
    }
}

/// Apply `f` to every pixel of `ctx.result_rect()` in the four-float output format.
fn map_pixels(ctx: &OperationContext<'_>, f: impl Fn(&mut [f32])) -> PrismResult<()> {
    let rect = ctx.result_rect();
    let format = ctx.output_format();
    let mut px = ctx.read_input_f32("input", rect, &format)?;
    for p in px.chunks_exact_mut(4) {
        f(p);
    }
    ctx.write_output_f32(rect, &format, &px)
}

struct InvertLinear;

impl Operation for InvertLinear {
    fn process(&self, ctx: &mut OperationContext<'_>) -> PrismResult<()> {
        map_pixels(ctx, |p| {
            for c in &mut p[..3] {
                *c = 1.0 - *c;
            }
        })
    }
}

struct BrightnessContrast;

impl Operation for BrightnessContrast {
    fn process(&self, ctx: &mut OperationContext<'_>) -> PrismResult<()> {
        let contrast = ctx.properties().double("contrast") as f32;
        let brightness = ctx.properties().double("brightness") as f32;
        map_pixels(ctx, |p| {
            for c in &mut p[..3] {
                *c = (*c - 0.5) * contrast + brightness + 0.5;
            }
        })
    }
}

struct Opacity;

impl Operation for Opacity {
    fn prepare(&self, _properties: &Properties, inputs: &PadMap<PixelFormat>) -> PrismResult<PixelFormat> {
        working_format("RaGaBaA float", inputs)
    }

    fn process(&self, ctx: &mut OperationContext<'_>) -> PrismResult<()> {
        let value = ctx.properties().double("value") as f32;
        map_pixels(ctx, |p| {
            for c in p.iter_mut() {
                *c *= value;
            }
        })
    }
}

struct ConvertFormat;

impl Operation for ConvertFormat {
    fn prepare(&self, properties: &Properties, inputs: &PadMap<PixelFormat>) -> PrismResult<PixelFormat> {
        match properties.format("format") {
            Some(format) => Ok(format),
            None => passthrough_format(inputs),
        }
    }

    fn process(&self, ctx: &mut OperationContext<'_>) -> PrismResult<()> {
        let rect = ctx.result_rect();
        copy_input(ctx, rect, rect)
    }
}

// ── Area filters ─────────────────────────────────────────────────

struct Translate;

impl Translate {
    fn offset(properties: &Properties) -> (i32, i32) {
        (properties.int32("x"), properties.int32("y"))
    }
}

impl Operation for Translate {
    fn prepare(&self, _properties: &Properties, inputs: &PadMap<PixelFormat>) -> PrismResult<PixelFormat> {
        passthrough_format(inputs)
    }

    fn bounding_box(&self, properties: &Properties, inputs: &PadMap<Rect>) -> Rect {
        let (dx, dy) = Self::offset(properties);
        match inputs.get("input") {
            Some(r) if r.is_infinite() => *r,
            Some(r) => r.translate(dx, dy),
            None => Rect::default(),
        }
    }

    fn required_for_output(&self, properties: &Properties, _input_pad: &str, roi: &Rect) -> Rect {
        let (dx, dy) = Self::offset(properties);
        roi.translate(-dx, -dy)
    }

    fn invalidated_by_change(&self, properties: &Properties, _input_pad: &str, rect: &Rect) -> Rect {
        let (dx, dy) = Self::offset(properties);
        rect.translate(dx, dy)
    }

    fn process(&self, ctx: &mut OperationContext<'_>) -> PrismResult<()> {
        let (dx, dy) = Self::offset(ctx.properties());
        let rect = ctx.result_rect();
        copy_input(ctx, rect.translate(-dx, -dy), rect)
    }
}

struct Crop;

impl Crop {
    fn window(properties: &Properties) -> Rect {
        Rect::new(
            properties.int32("x"),
            properties.int32("y"),
            properties.int32("width"),
            properties.int32("height"),
        )
    }
}

impl Operation for Crop {
    fn prepare(&self, _properties: &Properties, inputs: &PadMap<PixelFormat>) -> PrismResult<PixelFormat> {
        passthrough_format(inputs)
    }

    fn bounding_box(&self, properties: &Properties, inputs: &PadMap<Rect>) -> Rect {
        inputs
            .get("input")
            .map(|r| r.intersect(&Self::window(properties)))
            .unwrap_or_default()
    }

    fn required_for_output(&self, properties: &Properties, _input_pad: &str, roi: &Rect) -> Rect {
        roi.intersect(&Self::window(properties))
    }

    fn invalidated_by_change(&self, properties: &Properties, _input_pad: &str, rect: &Rect) -> Rect {
        rect.intersect(&Self::window(properties))
    }

    fn process(&self, ctx: &mut OperationContext<'_>) -> PrismResult<()> {
        let rect = ctx.result_rect().intersect(&Self::window(ctx.properties()));
        copy_input(ctx, rect, rect)
    }
}

struct BoxBlur;

impl BoxBlur {
    fn radius(properties: &Properties) -> i32 {
        properties.int32("radius").max(0)
    }
}

impl Operation for BoxBlur {
    fn prepare(&self, _properties: &Properties, inputs: &PadMap<PixelFormat>) -> PrismResult<PixelFormat> {
        working_format("RaGaBaA float", inputs)
    }

    fn bounding_box(&self, properties: &Properties, inputs: &PadMap<Rect>) -> Rect {
        let r = Self::radius(properties);
        inputs
            .get("input")
            .map(|b| b.grow(r, r, r, r))
            .unwrap_or_default()
    }

    fn required_for_output(&self, properties: &Properties, _input_pad: &str, roi: &Rect) -> Rect {
        let r = Self::radius(properties);
        roi.grow(r, r, r, r)
    }

    fn invalidated_by_change(&self, properties: &Properties, _input_pad: &str, rect: &Rect) -> Rect {
        let r = Self::radius(properties);
        rect.grow(r, r, r, r)
    }

    fn process(&self, ctx: &mut OperationContext<'_>) -> PrismResult<()> {
        let r = Self::radius(ctx.properties());
        let rect = ctx.result_rect();
        let format = ctx.output_format();
        let src_rect = rect.grow(r, r, r, r);
        let src = ctx.read_input_f32("input", src_rect, &format)?;

        let (w, h) = (rect.width as usize, rect.height as usize);
        let (sw, sh) = (src_rect.width as usize, src_rect.height as usize);
        let r = r as usize;
        let norm = 1.0 / (2 * r + 1) as f32;

        // Horizontal: sh rows of w pixels, sliding window sums.
        let mut horizontal = vec![0.0f32; sh * w * 4];
        for row in 0..sh {
            let line = &src[row * sw * 4..(row + 1) * sw * 4];
            let mut acc = [0.0f32; 4];
            for px in line[..(2 * r + 1) * 4].chunks_exact(4) {
                for c in 0..4 {
                    acc[c] += px[c];
                }
            }
            for x in 0..w {
                let out = &mut horizontal[(row * w + x) * 4..(row * w + x + 1) * 4];
                for c in 0..4 {
                    out[c] = acc[c] * norm;
                }
                if x + 1 < w {
                    for c in 0..4 {
                        acc[c] += line[(x + 2 * r + 1) * 4 + c] - line[x * 4 + c];
                    }
                }
            }
        }

        // Vertical: h rows of w pixels.
        let mut out = vec![0.0f32; h * w * 4];
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for row in 0..=2 * r {
                for c in 0..4 {
                    acc[c] += horizontal[(row * w + x) * 4 + c];
                }
            }
            for y in 0..h {
                for c in 0..4 {
                    out[(y * w + x) * 4 + c] = acc[c] * norm;
                }
                if y + 1 < h {
                    for c in 0..4 {
                        acc[c] += horizontal[((y + 2 * r + 1) * w + x) * 4 + c]
                            - horizontal[(y * w + x) * 4 + c];
                    }
                }
            }
        }
        ctx.write_output_f32(rect, &format, &out)
    }
}
