//! Composers: `input` (background) and `aux` (foreground) to one output.

use prism_color::PixelFormat;

use super::{Operation, OperationCategory, OperationClass, PadMap, Properties, working_format};
use crate::engine::OperationContext;
use crate::error::PrismResult;

pub(super) fn classes() -> Vec<OperationClass> {
    vec![
        OperationClass::new("prism:over", OperationCategory::PointComposer, Over)
            .title("Normal compositing")
            .description("Porter-Duff over: aux on top of input"),
    ]
}

struct Over;

impl Operation for Over {
    fn prepare(&self, _properties: &Properties, inputs: &PadMap<PixelFormat>) -> PrismResult<PixelFormat> {
        working_format("RaGaBaA float", inputs)
    }

    fn process(&self, ctx: &mut OperationContext<'_>) -> PrismResult<()> {
        let rect = ctx.result_rect();
        let format = ctx.output_format();
        let mut dst = ctx.read_input_f32("input", rect, &format)?;
        if ctx.input("aux").is_some() {
            let src = ctx.read_input_f32("aux", rect, &format)?;
            for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
                let keep = 1.0 - s[3];
                for c in 0..4 {
                    d[c] = s[c] + d[c] * keep;
                }
            }
        }
        ctx.write_output_f32(rect, &format, &dst)
    }
}
