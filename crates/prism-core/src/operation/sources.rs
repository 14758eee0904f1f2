//! Source operations: no inputs, one output.

use prism_color::{Colour, PixelFormat};

use super::{Operation, OperationCategory, OperationClass, PadMap, Properties, PropertySpec};
use crate::buffer::{AbyssPolicy, Buffer};
use crate::engine::OperationContext;
use crate::error::PrismResult;
use crate::graph::ValueKind;
use crate::rect::Rect;

pub(super) fn classes() -> Vec<OperationClass> {
    vec![
        OperationClass::new("prism:color", OperationCategory::Source, Fill)
            .title("Color")
            .description("Infinite plane of one colour")
            .property(PropertySpec::new("value", Colour::BLACK).describe("Fill colour")),
        OperationClass::new("prism:rectangle", OperationCategory::Source, Rectangle)
            .title("Rectangle")
            .description("Axis-aligned rectangle of one colour on transparency")
            .property(PropertySpec::new("x", 0.0).key("axis", "x"))
            .property(PropertySpec::new("y", 0.0).key("axis", "y"))
            .property(PropertySpec::new("width", 0.0).range(0.0, f64::from(i32::MAX)))
            .property(PropertySpec::new("height", 0.0).range(0.0, f64::from(i32::MAX)))
            .property(PropertySpec::new("color", Colour::BLACK)),
        OperationClass::new("prism:checkerboard", OperationCategory::Source, Checkerboard)
            .title("Checkerboard")
            .description("Infinite two-colour checkerboard")
            .property(
                PropertySpec::new("size", 16)
                    .range(1.0, 65536.0)
                    .key("unit", "pixel-distance")
                    .describe("Edge of one square"),
            )
            .property(PropertySpec::new("x-offset", 0))
            .property(PropertySpec::new("y-offset", 0))
            .property(PropertySpec::new("color1", Colour::new(0.25, 0.25, 0.25, 1.0)))
            .property(PropertySpec::new("color2", Colour::new(0.75, 0.75, 0.75, 1.0))),
        OperationClass::new("prism:buffer-source", OperationCategory::Source, BufferSource)
            .title("Buffer Source")
            .description("Reads pixels from a buffer")
            .property(PropertySpec::unset("buffer", ValueKind::Buffer)),
    ]
}

// ── color ────────────────────────────────────────────────────────

struct Fill;

impl Operation for Fill {
    fn bounding_box(&self, _properties: &Properties, _inputs: &PadMap<Rect>) -> Rect {
        Rect::infinite()
    }

    fn process(&self, ctx: &mut OperationContext<'_>) -> PrismResult<()> {
        let colour = ctx.properties().colour("value");
        ctx.output().set_color(ctx.result_rect(), &colour)
    }
}

// ── rectangle ────────────────────────────────────────────────────

struct Rectangle;

impl Rectangle {
    /// Covered pixels: every pixel the rectangle overlaps at all.
    fn covered(properties: &Properties) -> Rect {
        let (x, y) = (properties.double("x"), properties.double("y"));
        let (w, h) = (properties.double("width"), properties.double("height"));
        if w <= 0.0 || h <= 0.0 {
            return Rect::default();
        }
        let (x0, y0) = (x.floor(), y.floor());
        let (x1, y1) = ((x + w).ceil(), (y + h).ceil());
        Rect::new(x0 as i32, y0 as i32, (x1 - x0) as i32, (y1 - y0) as i32)
    }
}

impl Operation for Rectangle {
    fn bounding_box(&self, properties: &Properties, _inputs: &PadMap<Rect>) -> Rect {
        Self::covered(properties)
    }

    fn process(&self, ctx: &mut OperationContext<'_>) -> PrismResult<()> {
        let rect = ctx.result_rect().intersect(&Self::covered(ctx.properties()));
        let colour = ctx.properties().colour("color");
        ctx.output().set_color(rect, &colour)
    }
}

// ── checkerboard ─────────────────────────────────────────────────

struct Checkerboard;

impl Operation for Checkerboard {
    fn bounding_box(&self, _properties: &Properties, _inputs: &PadMap<Rect>) -> Rect {
        Rect::infinite()
    }

    fn process(&self, ctx: &mut OperationContext<'_>) -> PrismResult<()> {
        let props = ctx.properties();
        let size = props.int("size").max(1);
        let (off_x, off_y) = (props.int("x-offset"), props.int("y-offset"));
        let colours = [props.colour("color1").rgba(), props.colour("color2").rgba()];
        let rect = ctx.result_rect();
        let format = prism_color::format("RGBA float")?;

        let mut data = Vec::with_capacity(rect.area() as usize * 4);
        for y in rect.y..rect.y + rect.height {
            let row = (i64::from(y) - off_y).div_euclid(size);
            for x in rect.x..rect.x + rect.width {
                let col = (i64::from(x) - off_x).div_euclid(size);
                let c = colours[((row + col) & 1) as usize];
                data.extend(c.iter().map(|&v| v as f32));
            }
        }
        ctx.write_output_f32(rect, &format, &data)
    }
}

// ── buffer-source ────────────────────────────────────────────────

struct BufferSource;

impl Operation for BufferSource {
    fn prepare(&self, properties: &Properties, _inputs: &PadMap<PixelFormat>) -> PrismResult<PixelFormat> {
        match properties.buffer("buffer") {
            Some(buffer) => Ok(buffer.format()),
            None => Ok(prism_color::format("RGBA float")?),
        }
    }

    fn bounding_box(&self, properties: &Properties, _inputs: &PadMap<Rect>) -> Rect {
        properties
            .buffer("buffer")
            .map(|b| b.extent())
            .unwrap_or_default()
    }

    fn process(&self, ctx: &mut OperationContext<'_>) -> PrismResult<()> {
        let Some(source) = ctx.properties().buffer("buffer") else {
            return Ok(());
        };
        let rect = ctx.result_rect().intersect(&source.extent());
        Buffer::copy(&source, rect, AbyssPolicy::None, ctx.output(), rect)
    }
}
