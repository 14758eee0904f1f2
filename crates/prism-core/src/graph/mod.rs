//! Node graph: an arena of nodes connected pad to pad.
//!
//! Nodes are addressed by generational [`NodeId`]s; a handle to a removed
//! node is rejected instead of aliasing whatever reuses its slot. Every
//! mutation either succeeds completely or leaves the graph unchanged.
//!
//! Graph nodes ([`Graph::create_graph`]) encapsulate children behind an input
//! proxy and an output proxy. Evaluation and invalidation look through the
//! proxies, so they never hold pixels of their own.

mod description;
mod value;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::buffer::{Buffer, HandlerId};
use crate::engine::{NodeRuntime, NodeState};
use crate::error::{ConfigurationError, ConnectionError, GraphError, PrismResult};
use crate::operation::{
    self, GRAPH_OPERATION, INPUT_PROXY_OPERATION, OUTPUT_PROXY_OPERATION, OperationCategory,
    OperationClass, PadMap, Properties,
};
use crate::rect::Rect;
use crate::region::Region;

pub use description::{EdgeDescription, GraphDescription, NodeDescription};
pub use value::{Value, ValueKind};

/// Generational handle to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// One end of an edge: a node and one of its pads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub node: NodeId,
    pub pad: String,
}

impl Endpoint {
    fn new(node: NodeId, pad: &str) -> Self {
        Self {
            node,
            pad: pad.to_string(),
        }
    }
}

/// Operation name plus initial properties for a new node.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    operation: String,
    name: Option<String>,
    properties: Vec<(String, Value)>,
}

impl NodeSpec {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            name: None,
            properties: Vec::new(),
        }
    }

    pub fn with(mut self, property: &str, value: impl Into<Value>) -> Self {
        self.properties.push((property.to_string(), value.into()));
        self
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Plain,
    Graph { input: NodeId, output: NodeId },
    InputProxy,
    OutputProxy,
}

pub(crate) struct Node {
    pub(crate) class: Arc<OperationClass>,
    pub(crate) properties: Properties,
    name: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    inputs: BTreeMap<String, Option<Endpoint>>,
    outputs: BTreeMap<String, Vec<Endpoint>>,
    role: Role,
    /// Creation order; later nodes win `detect` ties.
    pub(crate) order: u64,
    pub(crate) runtime: Arc<Mutex<NodeRuntime>>,
    watches: Vec<Watch>,
}

/// Change subscription on a buffer-valued property. Writes to the buffer
/// accumulate in `pending` until the graph folds them into an invalidation.
struct Watch {
    buffer: Buffer,
    handler: HandlerId,
    pending: Arc<Mutex<Region>>,
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena of nodes and the edges between their pads.
#[derive(Default)]
pub struct Graph {
    slots: Vec<Slot>,
    free: Vec<u32>,
    next_order: u64,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes, proxies included.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_ok()
    }

    /// Live node handles in slot order.
    pub fn nodes(&self) -> Vec<NodeId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.node.is_some())
            .map(|(i, s)| NodeId {
                index: i as u32,
                generation: s.generation,
            })
            .collect()
    }

    pub(crate) fn node(&self, id: NodeId) -> PrismResult<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_ref())
            .ok_or_else(|| ConfigurationError::StaleNode(id).into())
    }

    fn node_mut(&mut self, id: NodeId) -> PrismResult<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_mut())
            .ok_or_else(|| ConfigurationError::StaleNode(id).into())
    }

    // ── Creation and removal ─────────────────────────────────────

    /// Create a top-level node.
    pub fn create_node(&mut self, spec: NodeSpec) -> PrismResult<NodeId> {
        self.create_in(None, spec)
    }

    /// Create a node inside the graph node `parent`.
    pub fn create_child(&mut self, parent: NodeId, spec: NodeSpec) -> PrismResult<NodeId> {
        self.expect_graph(parent)?;
        self.create_in(Some(parent), spec)
    }

    fn create_in(&mut self, parent: Option<NodeId>, spec: NodeSpec) -> PrismResult<NodeId> {
        let class = operation::lookup(&spec.operation)?;
        if class.category() == OperationCategory::Meta {
            return Err(ConfigurationError::Invalid(format!(
                "{} cannot be instantiated directly",
                class.name()
            ))
            .into());
        }
        let mut properties = class.default_properties();
        for (name, value) in spec.properties {
            let validated = validate(&class, &name, value)?;
            properties.insert(&name, validated);
        }
        let id = self.insert(class, properties, spec.name, parent, Role::Plain);
        if let Some(parent) = parent {
            self.node_mut(parent)?.children.push(id);
        }
        self.watch_buffers(id)?;
        Ok(id)
    }

    /// Create a graph node with its input and output proxies.
    ///
    /// Connect the graph's `input` pad from outside, the input proxy's `output`
    /// to the first child, and the last child to the output proxy's `input`.
    pub fn create_graph(&mut self, parent: Option<NodeId>) -> PrismResult<NodeId> {
        if let Some(parent) = parent {
            self.expect_graph(parent)?;
        }
        let graph_class = operation::lookup(GRAPH_OPERATION)?;
        let input_class = operation::lookup(INPUT_PROXY_OPERATION)?;
        let output_class = operation::lookup(OUTPUT_PROXY_OPERATION)?;

        let graph = self.insert(graph_class, Properties::default(), None, parent, Role::Plain);
        let input = self.insert(input_class, Properties::default(), None, Some(graph), Role::InputProxy);
        let output = self.insert(output_class, Properties::default(), None, Some(graph), Role::OutputProxy);
        {
            let node = self.node_mut(graph)?;
            node.role = Role::Graph { input, output };
            node.children = vec![input, output];
        }
        if let Some(parent) = parent {
            self.node_mut(parent)?.children.push(graph);
        }
        Ok(graph)
    }

    fn insert(
        &mut self,
        class: Arc<OperationClass>,
        properties: Properties,
        name: Option<String>,
        parent: Option<NodeId>,
        role: Role,
    ) -> NodeId {
        let inputs = class.input_pads().iter().map(|p| (p.clone(), None)).collect();
        let outputs = class.output_pads().iter().map(|p| (p.clone(), Vec::new())).collect();
        let runtime = Arc::new(Mutex::new(NodeRuntime::new()));

        class.behaviour().attach(&properties);
        runtime.lock().state = NodeState::Attached;

        let order = self.next_order;
        self.next_order += 1;
        let node = Node {
            class,
            properties,
            name,
            parent,
            children: Vec::new(),
            inputs,
            outputs,
            role,
            order,
            runtime,
            watches: Vec::new(),
        };

        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeId {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        };
        tracing::debug!("created node {id}");
        id
    }

    /// Remove a node, its children and every edge touching them.
    ///
    /// Consumers lose their producer and their cached output.
    pub fn remove_node(&mut self, id: NodeId) -> PrismResult<()> {
        let node = self.node(id)?;
        if matches!(node.role, Role::InputProxy | Role::OutputProxy) {
            return Err(ConfigurationError::Invalid(format!(
                "proxy {id} is removed together with its graph"
            ))
            .into());
        }
        if let Some(parent) = node.parent {
            self.node_mut(parent)?.children.retain(|c| *c != id);
        }
        self.remove_tree(id)
    }

    fn remove_tree(&mut self, id: NodeId) -> PrismResult<()> {
        let children = self.node(id)?.children.clone();
        for child in children {
            self.remove_tree(child)?;
        }

        let (inputs, outputs) = {
            let node = self.node(id)?;
            let inputs: Vec<(String, Endpoint)> = node
                .inputs
                .iter()
                .filter_map(|(pad, p)| p.clone().map(|p| (pad.clone(), p)))
                .collect();
            let outputs: Vec<Endpoint> = node.outputs.values().flatten().cloned().collect();
            (inputs, outputs)
        };
        for (pad, producer) in inputs {
            if let Ok(p) = self.node_mut(producer.node) {
                if let Some(list) = p.outputs.get_mut(&producer.pad) {
                    list.retain(|c| !(c.node == id && c.pad == pad));
                }
            }
        }
        for consumer in outputs {
            if !self.contains(consumer.node) {
                continue;
            }
            self.input_changed(consumer.node)?;
            if let Ok(c) = self.node_mut(consumer.node) {
                c.inputs.insert(consumer.pad.clone(), None);
            }
        }

        for watch in std::mem::take(&mut self.node_mut(id)?.watches) {
            watch.buffer.disconnect(watch.handler);
        }
        let slot = &mut self.slots[id.index as usize];
        slot.node = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        tracing::debug!("removed node {id}");
        Ok(())
    }

    fn expect_graph(&self, id: NodeId) -> PrismResult<(NodeId, NodeId)> {
        match self.node(id)?.role {
            Role::Graph { input, output } => Ok((input, output)),
            _ => Err(ConfigurationError::NotAGraph(id).into()),
        }
    }

    /// The child that forwards the graph's `input` pad.
    pub fn input_proxy(&self, graph: NodeId) -> PrismResult<NodeId> {
        Ok(self.expect_graph(graph)?.0)
    }

    /// The child whose `input` becomes the graph's `output`.
    pub fn output_proxy(&self, graph: NodeId) -> PrismResult<NodeId> {
        Ok(self.expect_graph(graph)?.1)
    }

    // ── Connections ──────────────────────────────────────────────

    /// Connect `producer.out_pad` to `consumer.in_pad`.
    pub fn connect(
        &mut self,
        producer: NodeId,
        out_pad: &str,
        consumer: NodeId,
        in_pad: &str,
    ) -> PrismResult<()> {
        let p = self.node(producer)?;
        let c = self.node(consumer)?;
        if !p.outputs.contains_key(out_pad) {
            return Err(no_such_pad(producer, out_pad));
        }
        match c.inputs.get(in_pad) {
            None => return Err(no_such_pad(consumer, in_pad)),
            Some(Some(_)) => {
                return Err(ConnectionError::AlreadyConnected {
                    node: consumer,
                    pad: in_pad.to_string(),
                }
                .into());
            }
            Some(None) => {}
        }
        if p.parent != c.parent {
            return Err(ConnectionError::DifferentParents(producer, consumer).into());
        }
        if producer == consumer || self.reachable(consumer, producer)? {
            return Err(ConnectionError::Cycle { producer, consumer }.into());
        }

        self.node_mut(consumer)?
            .inputs
            .insert(in_pad.to_string(), Some(Endpoint::new(producer, out_pad)));
        if let Some(list) = self.node_mut(producer)?.outputs.get_mut(out_pad) {
            list.push(Endpoint::new(consumer, in_pad));
        }
        tracing::debug!("connected {producer}.{out_pad} -> {consumer}.{in_pad}");
        self.input_changed(consumer)
    }

    /// [`Self::connect`] with the consumer first.
    pub fn connect_from(
        &mut self,
        consumer: NodeId,
        in_pad: &str,
        producer: NodeId,
        out_pad: &str,
    ) -> PrismResult<()> {
        self.connect(producer, out_pad, consumer, in_pad)
    }

    /// [`Self::connect`] with the producer first.
    pub fn connect_to(
        &mut self,
        producer: NodeId,
        out_pad: &str,
        consumer: NodeId,
        in_pad: &str,
    ) -> PrismResult<()> {
        self.connect(producer, out_pad, consumer, in_pad)
    }

    /// Remove the edge into `consumer.in_pad`. Returns `false` when it had none.
    pub fn disconnect(&mut self, consumer: NodeId, in_pad: &str) -> PrismResult<bool> {
        let producer = match self.node(consumer)?.inputs.get(in_pad) {
            None => return Err(no_such_pad(consumer, in_pad)),
            Some(None) => return Ok(false),
            Some(Some(p)) => p.clone(),
        };
        self.input_changed(consumer)?;
        self.node_mut(consumer)?.inputs.insert(in_pad.to_string(), None);
        if let Some(list) = self.node_mut(producer.node)?.outputs.get_mut(&producer.pad) {
            list.retain(|e| !(e.node == consumer && e.pad == in_pad));
        }
        tracing::debug!("disconnected {}.{} -> {consumer}.{in_pad}", producer.node, producer.pad);
        Ok(true)
    }

    /// Chain `output` → `input` through `nodes` in order.
    pub fn link(&mut self, nodes: &[NodeId]) -> PrismResult<()> {
        for pair in nodes.windows(2) {
            self.connect(pair[0], "output", pair[1], "input")?;
        }
        Ok(())
    }

    /// A producer was attached to or detached from one of `consumer`'s pads.
    fn input_changed(&self, consumer: NodeId) -> PrismResult<()> {
        let start = match self.node(consumer)?.role {
            Role::Graph { input, .. } => input,
            _ => consumer,
        };
        self.invalidate(start, Rect::infinite())
    }

    /// Nodes fed directly by `id`, including the implicit proxy edges.
    fn successors(&self, id: NodeId) -> PrismResult<Vec<NodeId>> {
        let node = self.node(id)?;
        let mut out: Vec<NodeId> = node.outputs.values().flatten().map(|e| e.node).collect();
        match node.role {
            Role::Graph { input, .. } => out.push(input),
            Role::OutputProxy => out.extend(node.parent),
            _ => {}
        }
        Ok(out)
    }

    fn reachable(&self, from: NodeId, to: NodeId) -> PrismResult<bool> {
        let mut seen = HashSet::new();
        let mut stack = vec![from];
        while let Some(n) = stack.pop() {
            if n == to {
                return Ok(true);
            }
            if seen.insert(n) {
                stack.extend(self.successors(n)?);
            }
        }
        Ok(false)
    }

    // ── Properties ───────────────────────────────────────────────

    pub fn set_property(&mut self, id: NodeId, name: &str, value: impl Into<Value>) -> PrismResult<()> {
        self.set_properties(id, vec![(name.to_string(), value.into())])
    }

    /// Validate every value first; apply all of them or none.
    pub fn set_properties(&mut self, id: NodeId, values: Vec<(String, Value)>) -> PrismResult<()> {
        let class = self.node(id)?.class.clone();
        let validated = values
            .into_iter()
            .map(|(name, value)| validate(&class, &name, value).map(|v| (name, v)))
            .collect::<Result<Vec<_>, _>>()?;

        let before = self.bounding_box(id).unwrap_or_else(|_| Rect::infinite());
        {
            let node = self.node_mut(id)?;
            for (name, value) in validated {
                node.properties.insert(&name, value);
            }
        }
        let after = self.bounding_box(id).unwrap_or_else(|_| Rect::infinite());
        self.watch_buffers(id)?;
        self.invalidate(id, before.union(&after))
    }

    /// Subscribe to writes on the node's buffer-valued properties, replacing
    /// earlier subscriptions. Sinks write their buffers and are not watched.
    fn watch_buffers(&mut self, id: NodeId) -> PrismResult<()> {
        let node = self.node_mut(id)?;
        for watch in node.watches.drain(..) {
            watch.buffer.disconnect(watch.handler);
        }
        if node.class.category() == OperationCategory::Sink {
            return Ok(());
        }
        let buffers: Vec<Buffer> = node
            .properties
            .iter()
            .filter_map(|(_, value)| value.as_buffer().cloned())
            .collect();
        for buffer in buffers {
            let pending = Arc::new(Mutex::new(Region::new()));
            let sink = pending.clone();
            let handler = buffer.connect_changed(move |rect| sink.lock().union_rect(rect));
            node.watches.push(Watch {
                buffer,
                handler,
                pending,
            });
        }
        Ok(())
    }

    /// Invalidate whatever was written to the node's watched buffers since
    /// the last call.
    pub(crate) fn sync_buffer_changes(&self, id: NodeId) -> PrismResult<()> {
        let changed: Vec<Rect> = self
            .node(id)?
            .watches
            .iter()
            .flat_map(|w| std::mem::take(&mut *w.pending.lock()).rects().to_vec())
            .collect();
        for rect in changed {
            tracing::trace!("buffer behind node {id} changed in {rect}");
            self.invalidate(id, rect)?;
        }
        Ok(())
    }

    /// Current value, or `None` for a declared property that has no value.
    pub fn get_property(&self, id: NodeId, name: &str) -> PrismResult<Option<Value>> {
        let node = self.node(id)?;
        if node.class.find_property(name).is_none() {
            return Err(ConfigurationError::UnknownProperty {
                operation: node.class.name().to_string(),
                property: name.to_string(),
            }
            .into());
        }
        Ok(node.properties.get(name).cloned())
    }

    pub fn properties(&self, id: NodeId) -> PrismResult<&Properties> {
        Ok(&self.node(id)?.properties)
    }

    // ── Introspection ────────────────────────────────────────────

    pub fn operation(&self, id: NodeId) -> PrismResult<&str> {
        Ok(self.node(id)?.class.name())
    }

    pub fn name(&self, id: NodeId) -> PrismResult<Option<&str>> {
        Ok(self.node(id)?.name.as_deref())
    }

    pub fn set_name(&mut self, id: NodeId, name: &str) -> PrismResult<()> {
        self.node_mut(id)?.name = Some(name.to_string());
        Ok(())
    }

    pub fn parent(&self, id: NodeId) -> PrismResult<Option<NodeId>> {
        Ok(self.node(id)?.parent)
    }

    pub fn children(&self, id: NodeId) -> PrismResult<Vec<NodeId>> {
        Ok(self.node(id)?.children.clone())
    }

    pub fn input_pads(&self, id: NodeId) -> PrismResult<Vec<String>> {
        Ok(self.node(id)?.inputs.keys().cloned().collect())
    }

    pub fn output_pads(&self, id: NodeId) -> PrismResult<Vec<String>> {
        Ok(self.node(id)?.outputs.keys().cloned().collect())
    }

    /// The producer connected to `pad`, as wired (proxies are not resolved).
    pub fn producer(&self, id: NodeId, pad: &str) -> PrismResult<Option<Endpoint>> {
        match self.node(id)?.inputs.get(pad) {
            Some(p) => Ok(p.clone()),
            None => Err(no_such_pad(id, pad)),
        }
    }

    pub fn consumers(&self, id: NodeId, pad: &str) -> PrismResult<Vec<Endpoint>> {
        match self.node(id)?.outputs.get(pad) {
            Some(list) => Ok(list.clone()),
            None => Err(no_such_pad(id, pad)),
        }
    }

    pub fn state(&self, id: NodeId) -> PrismResult<NodeState> {
        Ok(self.node(id)?.runtime.lock().state)
    }

    /// Region of the node's output currently held in its cache.
    pub fn cached_region(&self, id: NodeId) -> PrismResult<Region> {
        let id = self.resolve_target(id)?.unwrap_or(id);
        for node in self.nodes() {
            self.sync_buffer_changes(node)?;
        }
        Ok(self.node(id)?.runtime.lock().valid_region())
    }

    /// Drop the node's cached output.
    pub fn clear_cache(&self, id: NodeId) -> PrismResult<()> {
        self.node(id)?.runtime.lock().clear();
        Ok(())
    }

    // ── Resolution through graph boundaries ──────────────────────

    /// The node whose output `id` stands for: itself for plain nodes, the
    /// node feeding the output proxy for graph nodes. `None` when a graph's
    /// output is unconnected.
    pub(crate) fn resolve_target(&self, id: NodeId) -> PrismResult<Option<NodeId>> {
        match self.node(id)?.role {
            Role::Plain => Ok(Some(id)),
            Role::Graph { output, .. } => Ok(self.resolve_producer(output, "input")?.map(|e| e.node)),
            Role::OutputProxy => Ok(self.resolve_producer(id, "input")?.map(|e| e.node)),
            Role::InputProxy => match self.node(id)?.parent {
                Some(graph) => Ok(self.resolve_producer(graph, "input")?.map(|e| e.node)),
                None => Ok(None),
            },
        }
    }

    /// The plain node and pad that ultimately feed `id.pad`.
    pub(crate) fn resolve_producer(&self, id: NodeId, pad: &str) -> PrismResult<Option<Endpoint>> {
        let mut current = self.producer(id, pad)?;
        // Every hop enters a different proxy; more hops than nodes means a loop.
        for _ in 0..=self.slots.len() {
            let Some(ep) = current else {
                return Ok(None);
            };
            let node = self.node(ep.node)?;
            current = match node.role {
                Role::Plain => return Ok(Some(ep)),
                Role::Graph { output, .. } => self.producer(output, "input")?,
                Role::OutputProxy => self.producer(ep.node, "input")?,
                Role::InputProxy => match node.parent {
                    Some(graph) => self.producer(graph, "input")?,
                    None => None,
                },
            };
        }
        Err(GraphError::Cycle(id).into())
    }

    /// Plain consumers of `id`'s outputs, looking through graph boundaries.
    fn resolved_consumers(&self, id: NodeId) -> PrismResult<Vec<Endpoint>> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            if !seen.insert(n) {
                continue;
            }
            let node = self.node(n)?;
            if node.role == Role::OutputProxy {
                stack.extend(node.parent);
            }
            for ep in node.outputs.values().flatten() {
                let consumer = self.node(ep.node)?;
                match consumer.role {
                    Role::Graph { input, .. } => stack.push(input),
                    Role::OutputProxy => stack.extend(consumer.parent),
                    Role::Plain | Role::InputProxy => out.push(ep.clone()),
                }
            }
        }
        Ok(out)
    }

    // ── Regions ──────────────────────────────────────────────────

    /// Region of `id`'s output that has defined content.
    pub fn bounding_box(&self, id: NodeId) -> PrismResult<Rect> {
        let mut memo = HashMap::new();
        let mut visiting = HashSet::new();
        self.bounding_box_inner(id, &mut memo, &mut visiting)
    }

    fn bounding_box_inner(
        &self,
        id: NodeId,
        memo: &mut HashMap<NodeId, Rect>,
        visiting: &mut HashSet<NodeId>,
    ) -> PrismResult<Rect> {
        let Some(id) = self.resolve_target(id)? else {
            return Ok(Rect::default());
        };
        if let Some(r) = memo.get(&id) {
            return Ok(*r);
        }
        if !visiting.insert(id) {
            return Err(GraphError::Cycle(id).into());
        }
        let node = self.node(id)?;
        let mut inputs = PadMap::new();
        for pad in node.class.input_pads() {
            if let Some(ep) = self.resolve_producer(id, pad)? {
                inputs.insert(pad.clone(), self.bounding_box_inner(ep.node, memo, visiting)?);
            }
        }
        let rect = node.class.behaviour().bounding_box(&node.properties, &inputs);
        visiting.remove(&id);
        memo.insert(id, rect);
        Ok(rect)
    }

    /// Discard cached output of `id` inside `rect` and everything downstream
    /// that depends on it.
    pub fn invalidate(&self, id: NodeId, rect: Rect) -> PrismResult<()> {
        let mut work = vec![(id, rect)];
        while let Some((n, r)) = work.pop() {
            if r.is_empty() {
                continue;
            }
            self.node(n)?.runtime.lock().invalidate(&r);
            tracing::trace!("invalidated {r} of node {n}");
            for ep in self.resolved_consumers(n)? {
                let consumer = self.node(ep.node)?;
                let affected = consumer
                    .class
                    .behaviour()
                    .invalidated_by_change(&consumer.properties, &ep.pad, &r);
                work.push((ep.node, affected));
            }
        }
        Ok(())
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        for slot in &mut self.slots {
            if let Some(node) = &mut slot.node {
                for watch in node.watches.drain(..) {
                    watch.buffer.disconnect(watch.handler);
                }
            }
        }
    }
}

fn validate(class: &OperationClass, name: &str, value: Value) -> PrismResult<Value> {
    let spec = class
        .find_property(name)
        .ok_or_else(|| ConfigurationError::UnknownProperty {
            operation: class.name().to_string(),
            property: name.to_string(),
        })?;
    Ok(spec.validate(value)?)
}

fn no_such_pad(node: NodeId, pad: &str) -> crate::error::PrismError {
    ConnectionError::NoSuchPad {
        node,
        pad: pad.to_string(),
    }
    .into()
}
