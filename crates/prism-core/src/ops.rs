//! One-shot helpers that run a single operation over buffers.
//!
//! Each call builds a throwaway graph around the operation, evaluates it
//! with the process-wide configuration, and drops the graph.

use crate::buffer::Buffer;
use crate::engine::Engine;
use crate::error::PrismResult;
use crate::graph::{Graph, NodeId, NodeSpec, Value};
use crate::operation;

/// Run `operation` over `buffer` and write the result back into it.
pub fn apply_op(buffer: &Buffer, operation: &str, properties: Vec<(&str, Value)>) -> PrismResult<()> {
    render_op(buffer, buffer, operation, properties)
}

/// Run `operation` over `source` and return the result as a new buffer.
///
/// The result covers the operation's bounding box, or `source`'s extent when
/// that box is infinite.
pub fn filter_op(source: &Buffer, operation: &str, properties: Vec<(&str, Value)>) -> PrismResult<Buffer> {
    let mut graph = Graph::new();
    let node = chain(&mut graph, source, operation, properties)?;
    let bbox = graph.bounding_box(node)?;
    let rect = if bbox.is_infinite() { source.extent() } else { bbox };
    tracing::debug!("filter_op {operation} over {rect}");
    Engine::new()?.render(&graph, node, rect, None)
}

/// Run `operation` over `source` and write the result into `target`,
/// clipped to `target`'s extent.
pub fn render_op(
    source: &Buffer,
    target: &Buffer,
    operation: &str,
    properties: Vec<(&str, Value)>,
) -> PrismResult<()> {
    let mut graph = Graph::new();
    let node = chain(&mut graph, source, operation, properties)?;
    let sink = graph.create_node(NodeSpec::new("prism:write-buffer").with("buffer", target.clone()))?;
    graph.connect(node, "output", sink, "input")?;
    Engine::new()?.process(&graph, sink, None)
}

/// `buffer-source(source) -> operation`; sources ignore the buffer.
fn chain(
    graph: &mut Graph,
    source: &Buffer,
    operation: &str,
    properties: Vec<(&str, Value)>,
) -> PrismResult<NodeId> {
    let class = operation::lookup(operation)?;
    let spec = properties
        .into_iter()
        .fold(NodeSpec::new(operation), |spec, (name, value)| spec.with(name, value));
    let node = graph.create_node(spec)?;
    if class.input_pads().iter().any(|p| p == "input") {
        let input = graph.create_node(NodeSpec::new("prism:buffer-source").with("buffer", source.clone()))?;
        graph.connect(input, "output", node, "input")?;
    }
    Ok(node)
}
