//! Sinks: consume an input and write outside the graph.

use prism_color::PixelFormat;

use super::{Operation, OperationCategory, OperationClass, PadMap, Properties, PropertySpec, working_format};
use crate::buffer::{AbyssPolicy, Buffer};
use crate::engine::OperationContext;
use crate::error::PrismResult;
use crate::graph::ValueKind;
use crate::rect::Rect;

pub(super) fn classes() -> Vec<OperationClass> {
    vec![
        OperationClass::new("prism:write-buffer", OperationCategory::Sink, WriteBuffer)
            .title("Write Buffer")
            .description("Writes its input into a buffer, clipped to the buffer's extent")
            .property(PropertySpec::unset("buffer", ValueKind::Buffer)),
    ]
}

struct WriteBuffer;

impl Operation for WriteBuffer {
    fn prepare(&self, properties: &Properties, inputs: &PadMap<PixelFormat>) -> PrismResult<PixelFormat> {
        match properties.buffer("buffer") {
            Some(buffer) => Ok(buffer.format()),
            None => working_format("RGBA float", inputs),
        }
    }

    /// The region a sink writes: its input clipped to the target buffer.
    fn bounding_box(&self, properties: &Properties, inputs: &PadMap<Rect>) -> Rect {
        match (properties.buffer("buffer"), inputs.get("input")) {
            (Some(buffer), Some(input)) => input.intersect(&buffer.extent()),
            _ => Rect::default(),
        }
    }

    fn process(&self, ctx: &mut OperationContext<'_>) -> PrismResult<()> {
        let Some(target) = ctx.properties().buffer("buffer") else {
            return Err(ctx.fail("no target buffer set"));
        };
        let Some(input) = ctx.input("input") else {
            return Ok(());
        };
        let rect = ctx.result_rect().intersect(&target.extent());
        Buffer::copy(input, rect, AbyssPolicy::None, &target, rect)
    }
}
