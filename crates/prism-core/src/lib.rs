//! Prism Core — lazy, region-driven image processing graphs.
//!
//! Nodes wrap operations and are wired pad to pad inside a [`Graph`]. Nothing
//! is computed until an [`Engine`] is asked for a rectangle of some node's
//! output; then only the pixels that rectangle depends on are produced, and
//! each node keeps what it computed until an edit invalidates it.

pub mod buffer;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod operation;
pub mod ops;
pub mod rect;
pub mod region;

// Re-exports for convenience.
pub use buffer::{AbyssPolicy, Buffer, HandlerId, Sampler, SamplerKind};
pub use config::{EngineConfig, config, exit, init};
pub use engine::{BlitFlags, CancelToken, Engine, NodeState, OperationContext};
pub use error::{
    ConfigurationError, ConnectionError, GraphError, PrismError, PrismResult, ResourceError,
};
pub use graph::{
    EdgeDescription, Endpoint, Graph, GraphDescription, NodeDescription, NodeId, NodeSpec, Value,
    ValueKind,
};
pub use operation::{
    Operation, OperationCategory, OperationClass, PadMap, Properties, PropertySpec,
    get_key, get_property_key, has_operation, list_keys, list_operations, list_properties,
    list_property_keys, lookup, register_operation, working_format,
};
pub use ops::{apply_op, filter_op, render_op};
pub use rect::Rect;
pub use region::Region;

pub use prism_color::{ColorError, ColorSpace, Colour, PixelFormat};
