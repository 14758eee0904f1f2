//! Operations: the pluggable behaviour behind every node.
//!
//! An [`OperationClass`] pairs a name and property schema with an
//! [`Operation`] implementation. Classes live in a process-wide registry and
//! nodes refer to them by name (`prism:over`, `prism:box-blur`, ...).

mod compose;
mod filters;
mod meta;
mod registry;
mod schema;
mod sinks;
mod sources;

use std::collections::BTreeMap;
use std::sync::Arc;

use prism_color::PixelFormat;

use crate::engine::OperationContext;
use crate::error::PrismResult;
use crate::rect::Rect;

pub use registry::{
    get_key, get_property_key, has_operation, list_keys, list_operations, list_properties,
    list_property_keys, lookup, register_operation,
};
pub use schema::{Properties, PropertySpec};

pub(crate) use meta::{GRAPH_OPERATION, INPUT_PROXY_OPERATION, OUTPUT_PROXY_OPERATION};

/// Per-pad values handed to the negotiation hooks.
pub type PadMap<T> = BTreeMap<String, T>;

/// Shape of an operation; fixes its pads and hook defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationCategory {
    /// No inputs; one `output`.
    Source,
    /// `input` → `output`, each output pixel depends on the same input pixel.
    PointFilter,
    /// `input` → `output` with a neighbourhood.
    AreaFilter,
    /// `input` + `aux` → `output`, per pixel.
    PointComposer,
    /// `input` + `aux` → `output` with a neighbourhood.
    Composer,
    /// `input` only; writes somewhere outside the graph.
    Sink,
    /// Graph nodes and their proxies. Never evaluated.
    Meta,
}

impl OperationCategory {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::PointFilter => "point-filter",
            Self::AreaFilter => "area-filter",
            Self::PointComposer => "point-composer",
            Self::Composer => "composer",
            Self::Sink => "sink",
            Self::Meta => "meta",
        }
    }

    fn input_pads(self) -> &'static [&'static str] {
        match self {
            Self::Source => &[],
            Self::PointFilter | Self::AreaFilter | Self::Sink => &["input"],
            Self::PointComposer | Self::Composer => &["input", "aux"],
            Self::Meta => &["input"],
        }
    }

    fn output_pads(self) -> &'static [&'static str] {
        match self {
            Self::Sink => &[],
            _ => &["output"],
        }
    }
}

/// Behaviour of an operation class.
///
/// All hooks receive the node's validated properties. Negotiation hooks get
/// one entry per connected input pad.
pub trait Operation: Send + Sync {
    /// Called once when a node of this class is inserted into a graph.
    fn attach(&self, _properties: &Properties) {}

    /// Output format given the formats of connected inputs.
    fn prepare(&self, _properties: &Properties, inputs: &PadMap<PixelFormat>) -> PrismResult<PixelFormat> {
        working_format("RGBA float", inputs)
    }

    /// Region with defined output. Defaults to the union of the inputs.
    fn bounding_box(&self, _properties: &Properties, inputs: &PadMap<Rect>) -> Rect {
        inputs.values().fold(Rect::default(), |acc, r| acc.union(r))
    }

    /// Input region needed on `input_pad` to produce `roi`.
    fn required_for_output(&self, _properties: &Properties, _input_pad: &str, roi: &Rect) -> Rect {
        *roi
    }

    /// Output region affected when `rect` of `input_pad` changes.
    fn invalidated_by_change(&self, _properties: &Properties, _input_pad: &str, rect: &Rect) -> Rect {
        *rect
    }

    /// Fill `ctx.result_rect()` of the output. The output starts transparent there.
    fn process(&self, ctx: &mut OperationContext<'_>) -> PrismResult<()>;
}

/// `name` bound to the space of the `input` pad's format, when there is one.
pub fn working_format(name: &str, inputs: &PadMap<PixelFormat>) -> PrismResult<PixelFormat> {
    let first = inputs.get("input").or_else(|| inputs.values().next());
    Ok(match first {
        Some(format) => prism_color::format_with_space(name, format.space())?,
        None => prism_color::format(name)?,
    })
}

/// A named operation: pads, property schema, metadata keys and behaviour.
pub struct OperationClass {
    name: String,
    category: OperationCategory,
    inputs: Vec<String>,
    outputs: Vec<String>,
    properties: Vec<PropertySpec>,
    keys: BTreeMap<String, String>,
    behaviour: Arc<dyn Operation>,
}

impl OperationClass {
    pub fn new(name: &str, category: OperationCategory, behaviour: impl Operation + 'static) -> Self {
        let mut keys = BTreeMap::new();
        keys.insert("categories".to_string(), category.name().to_string());
        Self {
            name: name.to_string(),
            category,
            inputs: category.input_pads().iter().map(|s| s.to_string()).collect(),
            outputs: category.output_pads().iter().map(|s| s.to_string()).collect(),
            properties: Vec::new(),
            keys,
            behaviour: Arc::new(behaviour),
        }
    }

    pub fn property(mut self, spec: PropertySpec) -> Self {
        self.properties.push(spec);
        self
    }

    /// Replace the pads implied by the category.
    pub fn with_pads(mut self, inputs: &[&str], outputs: &[&str]) -> Self {
        self.inputs = inputs.iter().map(|s| s.to_string()).collect();
        self.outputs = outputs.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn key(mut self, key: &str, value: &str) -> Self {
        self.keys.insert(key.to_string(), value.to_string());
        self
    }

    pub fn title(self, title: &str) -> Self {
        self.key("title", title)
    }

    pub fn description(self, text: &str) -> Self {
        self.key("description", text)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> OperationCategory {
        self.category
    }

    pub fn input_pads(&self) -> &[String] {
        &self.inputs
    }

    pub fn output_pads(&self) -> &[String] {
        &self.outputs
    }

    /// `aux` is optional; every other input pad must be connected to evaluate.
    pub fn requires_input(&self, pad: &str) -> bool {
        pad != "aux" && self.inputs.iter().any(|p| p == pad)
    }

    pub fn properties(&self) -> &[PropertySpec] {
        &self.properties
    }

    pub fn find_property(&self, name: &str) -> Option<&PropertySpec> {
        self.properties.iter().find(|p| p.name() == name)
    }

    pub fn keys(&self) -> &BTreeMap<String, String> {
        &self.keys
    }

    pub fn behaviour(&self) -> &dyn Operation {
        self.behaviour.as_ref()
    }

    /// Schema defaults for every property that has one.
    pub(crate) fn default_properties(&self) -> Properties {
        let mut props = Properties::default();
        for spec in &self.properties {
            if let Some(v) = spec.default_value() {
                props.insert(spec.name(), v.clone());
            }
        }
        props
    }
}

impl std::fmt::Debug for OperationClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationClass")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("properties", &self.properties.len())
            .finish()
    }
}
