//! Per-call state handed to [`Operation::process`](crate::operation::Operation::process).

use std::collections::BTreeMap;

use prism_color::PixelFormat;

use crate::buffer::{AbyssPolicy, Buffer, alloc_bytes};
use crate::error::{GraphError, PrismError, PrismResult};
use crate::graph::NodeId;
use crate::operation::Properties;
use crate::rect::Rect;

/// Inputs, output and temporaries for one operation call.
///
/// Temporaries are released when the context is dropped, after `process`
/// returns.
pub struct OperationContext<'a> {
    node: NodeId,
    operation: &'a str,
    properties: &'a Properties,
    inputs: BTreeMap<String, Buffer>,
    output: Buffer,
    result: Rect,
    level: u32,
    temporaries: Vec<Buffer>,
}

impl<'a> OperationContext<'a> {
    pub(crate) fn new(
        node: NodeId,
        operation: &'a str,
        properties: &'a Properties,
        inputs: BTreeMap<String, Buffer>,
        output: Buffer,
        result: Rect,
        level: u32,
    ) -> Self {
        Self {
            node,
            operation,
            properties,
            inputs,
            output,
            result,
            level,
            temporaries: Vec::new(),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn properties(&self) -> &Properties {
        self.properties
    }

    /// The buffer produced upstream of `pad`, if it is connected.
    pub fn input(&self, pad: &str) -> Option<&Buffer> {
        self.inputs.get(pad)
    }

    pub fn output(&self) -> &Buffer {
        &self.output
    }

    pub fn output_format(&self) -> PixelFormat {
        self.output.format()
    }

    /// The region this call must fill.
    pub fn result_rect(&self) -> Rect {
        self.result
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    /// A scratch buffer that lives until this call returns.
    pub fn temporary(&mut self, rect: Rect, format: &PixelFormat) -> PrismResult<Buffer> {
        let buffer = Buffer::new(rect, format)?;
        self.temporaries.push(buffer.clone());
        Ok(buffer)
    }

    /// Read `rect` of `pad` in `format`. Unconnected pads and pixels outside
    /// the producer's extent read as zeros.
    pub fn read_input(&self, pad: &str, rect: Rect, format: &PixelFormat) -> PrismResult<Vec<u8>> {
        match self.inputs.get(pad) {
            Some(buffer) => buffer.read_converted(rect, 1.0, format, AbyssPolicy::None),
            None => Ok(alloc_bytes(rect.area() as usize * format.bytes_per_pixel())?),
        }
    }

    /// [`Self::read_input`] for float formats, as `f32` components.
    pub fn read_input_f32(&self, pad: &str, rect: Rect, format: &PixelFormat) -> PrismResult<Vec<f32>> {
        let bytes = self.read_input(pad, rect, format)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Write packed `f32` components of `format` into `rect` of the output.
    pub fn write_output_f32(&self, rect: Rect, format: &PixelFormat, data: &[f32]) -> PrismResult<()> {
        self.output.set(rect, 0, format, bytemuck::cast_slice(data), None)
    }

    /// A processing failure attributed to this node.
    pub fn fail(&self, message: impl Into<String>) -> PrismError {
        GraphError::Process {
            node: self.node,
            operation: self.operation.to_string(),
            message: message.into(),
        }
        .into()
    }
}

impl Drop for OperationContext<'_> {
    fn drop(&mut self) {
        if !self.temporaries.is_empty() {
            tracing::trace!(
                "releasing {} temporaries of node {}",
                self.temporaries.len(),
                self.node
            );
        }
    }
}
