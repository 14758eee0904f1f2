//! Graph nodes and their boundary proxies.
//!
//! These classes only carry pads. Evaluation resolves connections through
//! them, so their `process` is never reached.

use super::{Operation, OperationCategory, OperationClass};
use crate::engine::OperationContext;
use crate::error::PrismResult;

pub(crate) const GRAPH_OPERATION: &str = "prism:graph";
pub(crate) const INPUT_PROXY_OPERATION: &str = "prism:input-proxy";
pub(crate) const OUTPUT_PROXY_OPERATION: &str = "prism:output-proxy";

pub(super) fn classes() -> Vec<OperationClass> {
    vec![
        OperationClass::new(GRAPH_OPERATION, OperationCategory::Meta, Wiring)
            .title("Graph")
            .description("Encapsulates child nodes behind input and output pads"),
        OperationClass::new(INPUT_PROXY_OPERATION, OperationCategory::Meta, Wiring)
            .title("Graph input")
            .with_pads(&[], &["output"]),
        OperationClass::new(OUTPUT_PROXY_OPERATION, OperationCategory::Meta, Wiring)
            .title("Graph output"),
    ]
}

struct Wiring;

impl Operation for Wiring {
    fn process(&self, ctx: &mut OperationContext<'_>) -> PrismResult<()> {
        Err(ctx.fail("graph wiring nodes are not evaluated"))
    }
}
