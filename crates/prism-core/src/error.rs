use prism_color::ColorError;

use crate::graph::NodeId;
use crate::rect::Rect;

/// Result alias used throughout the crate.
pub type PrismResult<T> = Result<T, PrismError>;

/// Top-level error. Every failure is local to the call that produced it.
#[derive(Debug, thiserror::Error)]
pub enum PrismError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("conversion error: {0}")]
    Conversion(ColorError),
    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),
    #[error("rectangle {rect} lies entirely outside abyss {abyss}")]
    OutOfRange { rect: Rect, abyss: Rect },
    #[error("render cancelled")]
    Cancelled,
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ColorError> for PrismError {
    fn from(e: ColorError) -> Self {
        if e.is_lookup() {
            Self::Configuration(ConfigurationError::Color(e))
        } else {
            Self::Conversion(e)
        }
    }
}

/// Unknown names and rejected values. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
    #[error("operation {0} is already registered")]
    DuplicateOperation(String),
    #[error("operation {operation} has no property {property}")]
    UnknownProperty { operation: String, property: String },
    #[error("property {property} expects {expected}, got {found}")]
    PropertyType {
        property: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("property {property} value {value} outside [{min}, {max}]")]
    PropertyRange {
        property: String,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("stale node handle {0}")]
    StaleNode(NodeId),
    #[error("node {0} is not a graph node")]
    NotAGraph(NodeId),
    #[error("{0}")]
    Color(ColorError),
    #[error("invalid value for {name}: {value}")]
    InvalidSetting { name: &'static str, value: String },
    #[error("{0}")]
    Invalid(String),
}

/// Rejected pad connections. The graph is unchanged when one is returned.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("node {node} has no pad {pad}")]
    NoSuchPad { node: NodeId, pad: String },
    #[error("input pad {pad} of node {node} already has a producer")]
    AlreadyConnected { node: NodeId, pad: String },
    #[error("connecting {producer} to {consumer} would create a cycle")]
    Cycle { producer: NodeId, consumer: NodeId },
    #[error("nodes {0} and {1} belong to different graphs")]
    DifferentParents(NodeId, NodeId),
}

/// Fatal for one render; the graph stays usable.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("cycle through node {0}")]
    Cycle(NodeId),
    #[error("node {node} has no producer on required pad {pad}")]
    MissingInput { node: NodeId, pad: String },
    #[error("operation {operation} failed on node {node}: {message}")]
    Process {
        node: NodeId,
        operation: String,
        message: String,
    },
    #[error("node {0} has no output pad")]
    NoOutput(NodeId),
}

/// Allocation failures. No partial buffer is ever returned.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("failed to allocate {bytes} bytes")]
    Allocation { bytes: usize },
    #[error("extent {0} is too large to address")]
    ExtentTooLarge(Rect),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_lookup_errors_map_to_configuration() {
        let err: PrismError = ColorError::UnknownFormat("X u8".into()).into();
        assert!(matches!(err, PrismError::Configuration(ConfigurationError::Color(_))));

        let err: PrismError = ColorError::NoConversion {
            from: "a".into(),
            to: "b".into(),
        }
        .into();
        assert!(matches!(err, PrismError::Conversion(_)));
    }
}
