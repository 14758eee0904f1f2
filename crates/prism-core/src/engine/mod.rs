//! Demand-driven evaluation of node graphs.
//!
//! A request names a node and a region of interest. The engine walks upstream
//! once to negotiate formats and bounding boxes, walks back down to work out
//! which region every node must produce, then evaluates producers before
//! consumers. Only the parts of each request missing from a node's cache are
//! computed.

mod cache;
mod context;
mod scheduler;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::BitOr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use prism_color::PixelFormat;
use rayon::prelude::*;

use crate::buffer::{AbyssPolicy, Buffer, source_rect};
use crate::config::EngineConfig;
use crate::error::{ConfigurationError, GraphError, PrismError, PrismResult};
use crate::graph::{Graph, NodeId};
use crate::operation::{OperationCategory, OperationClass, PadMap, Properties};
use crate::rect::Rect;

pub use cache::NodeState;
pub(crate) use cache::NodeRuntime;
pub use context::OperationContext;
use scheduler::DagScheduler;

/// Shared flag that abandons a render in progress.
///
/// Checked before each node is evaluated and before each cache commit.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// How [`Engine::blit`] treats node caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlitFlags(u8);

impl BlitFlags {
    /// Compute what is missing; caches follow the engine configuration.
    pub const DEFAULT: Self = Self(0);
    /// Compute what is missing and keep results cached regardless of configuration.
    pub const CACHE: Self = Self(1);
    /// Return whatever the target's cache holds without computing anything.
    pub const DIRTY: Self = Self(2);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for BlitFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

struct PlanNode {
    id: NodeId,
    class: Arc<OperationClass>,
    properties: Properties,
    /// `(input pad, plan index of its producer)`.
    inputs: Vec<(String, usize)>,
    format: PixelFormat,
    bbox: Rect,
    runtime: Arc<Mutex<NodeRuntime>>,
}

/// Nodes upstream of a target in post-order: producers before consumers,
/// the target last.
struct Plan {
    nodes: Vec<PlanNode>,
}

impl Plan {
    fn build(graph: &Graph, target: NodeId) -> PrismResult<Self> {
        let mut plan = Plan { nodes: Vec::new() };
        let mut index = HashMap::new();
        let mut visiting = HashSet::new();
        plan.visit(graph, target, &mut index, &mut visiting)?;
        Ok(plan)
    }

    fn visit(
        &mut self,
        graph: &Graph,
        id: NodeId,
        index: &mut HashMap<NodeId, usize>,
        visiting: &mut HashSet<NodeId>,
    ) -> PrismResult<usize> {
        if let Some(&i) = index.get(&id) {
            return Ok(i);
        }
        if !visiting.insert(id) {
            return Err(GraphError::Cycle(id).into());
        }
        graph.sync_buffer_changes(id)?;
        let node = graph.node(id)?;
        let class = node.class.clone();

        let mut inputs = Vec::new();
        for pad in class.input_pads() {
            match graph.resolve_producer(id, pad)? {
                Some(producer) => {
                    let i = self.visit(graph, producer.node, index, visiting)?;
                    inputs.push((pad.clone(), i));
                }
                None if class.requires_input(pad) => {
                    return Err(GraphError::MissingInput {
                        node: id,
                        pad: pad.clone(),
                    }
                    .into());
                }
                None => {}
            }
        }

        let formats: PadMap<PixelFormat> = inputs
            .iter()
            .map(|(pad, i)| (pad.clone(), self.nodes[*i].format.clone()))
            .collect();
        let boxes: PadMap<Rect> = inputs
            .iter()
            .map(|(pad, i)| (pad.clone(), self.nodes[*i].bbox))
            .collect();
        let behaviour = class.behaviour();
        let format = behaviour.prepare(&node.properties, &formats)?;
        let bbox = behaviour.bounding_box(&node.properties, &boxes);
        let pad = class.output_pads().first().cloned().unwrap_or_default();
        node.runtime.lock().prepared(&pad, &format);

        visiting.remove(&id);
        self.nodes.push(PlanNode {
            id,
            class,
            properties: node.properties.clone(),
            inputs,
            format,
            bbox,
            runtime: node.runtime.clone(),
        });
        let i = self.nodes.len() - 1;
        index.insert(id, i);
        Ok(i)
    }

    fn target(&self) -> &PlanNode {
        &self.nodes[self.nodes.len() - 1]
    }

    /// Region each node must produce so the target can produce `roi`.
    fn needs(&self, roi: Rect) -> Vec<Rect> {
        let mut need = vec![Rect::default(); self.nodes.len()];
        let last = self.nodes.len() - 1;
        need[last] = roi.intersect(&self.nodes[last].bbox);
        for i in (0..self.nodes.len()).rev() {
            if need[i].is_empty() {
                continue;
            }
            let node = &self.nodes[i];
            for (pad, j) in &node.inputs {
                let wanted = node
                    .class
                    .behaviour()
                    .required_for_output(&node.properties, pad, &need[i])
                    .intersect(&self.nodes[*j].bbox);
                need[*j] = need[*j].union(&wanted);
            }
        }
        need
    }
}

/// Evaluates graphs. Cheap to keep around; owns the worker pool.
pub struct Engine {
    config: EngineConfig,
    pool: Option<rayon::ThreadPool>,
}

impl Engine {
    /// An engine using the process-wide configuration.
    pub fn new() -> PrismResult<Self> {
        Self::with_config(crate::config::config())
    }

    pub fn with_config(config: EngineConfig) -> PrismResult<Self> {
        config.validate()?;
        let pool = if config.threads > 1 {
            Some(build_thread_pool(config.threads)?)
        } else {
            None
        };
        Ok(Self { config, pool })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Compute `rect` of `node`'s output into a new buffer with that extent.
    ///
    /// Pixels outside the node's bounding box are transparent.
    pub fn render(
        &self,
        graph: &Graph,
        node: NodeId,
        rect: Rect,
        cancel: Option<&CancelToken>,
    ) -> PrismResult<Buffer> {
        let plan = self.plan_for_output(graph, node)?;
        let output = self.evaluate(&plan, rect, 0, self.config.cache, cancel)?;
        let result = Buffer::new(rect, &plan.target().format)?;
        Buffer::copy(&output, rect, AbyssPolicy::None, &result, rect)?;
        Ok(result)
    }

    /// Render `rect` (in coordinates scaled by `scale`) of `node` into `dst`
    /// as `format`, rows `stride` bytes apart.
    #[allow(clippy::too_many_arguments)]
    pub fn blit(
        &self,
        graph: &Graph,
        node: NodeId,
        scale: f64,
        rect: Rect,
        format: &PixelFormat,
        dst: &mut [u8],
        stride: Option<usize>,
        flags: BlitFlags,
        cancel: Option<&CancelToken>,
    ) -> PrismResult<()> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(ConfigurationError::Invalid(format!("scale must be positive, got {scale}")).into());
        }
        if rect.is_empty() {
            return Ok(());
        }
        let row_bytes = rect.width as usize * format.bytes_per_pixel();
        let stride = stride.unwrap_or(row_bytes);
        let needed = stride * (rect.height as usize - 1) + row_bytes;
        if dst.len() < needed {
            return Err(PrismError::Conversion(prism_color::ColorError::BufferSize {
                needed,
                actual: dst.len(),
            }));
        }

        let output = if flags.contains(BlitFlags::DIRTY) {
            let target = graph
                .resolve_target(node)?
                .ok_or(GraphError::NoOutput(node))?;
            graph.node(target)?.runtime.lock().cached_buffer()
        } else {
            let plan = self.plan_for_output(graph, node)?;
            let level = mipmap_level(scale);
            let use_cache = flags.contains(BlitFlags::CACHE) || self.config.cache;
            Some(self.evaluate(&plan, source_rect(rect, scale), level, use_cache, cancel)?)
        };

        match output {
            Some(buffer) => match buffer.get_into(rect, scale, format, dst, Some(stride), AbyssPolicy::None) {
                Err(PrismError::OutOfRange { .. }) => zero_rows(dst, rect, row_bytes, stride),
                other => other,
            },
            None => zero_rows(dst, rect, row_bytes, stride),
        }
    }

    /// Compute the whole bounding box of `node`. For sinks this performs the write.
    pub fn process(&self, graph: &Graph, node: NodeId, cancel: Option<&CancelToken>) -> PrismResult<()> {
        let target = graph
            .resolve_target(node)?
            .ok_or(GraphError::NoOutput(node))?;
        let plan = Plan::build(graph, target)?;
        let bbox = plan.target().bbox;
        if bbox.is_infinite() {
            return Err(ConfigurationError::Invalid(format!(
                "node {node} has an infinite bounding box; render a region instead"
            ))
            .into());
        }
        tracing::debug!("processing node {node} over {bbox}");
        self.evaluate(&plan, bbox, 0, self.config.cache, cancel)?;
        Ok(())
    }

    /// The most specific node upstream of `node` with visible content at
    /// `(x, y)`. Foreground (`aux`) inputs and later-created producers are
    /// searched first.
    pub fn detect(&self, graph: &Graph, node: NodeId, x: i32, y: i32) -> PrismResult<Option<NodeId>> {
        let mut visiting = HashSet::new();
        self.detect_in(graph, node, x, y, &mut visiting)
    }

    fn detect_in(
        &self,
        graph: &Graph,
        node: NodeId,
        x: i32,
        y: i32,
        visiting: &mut HashSet<NodeId>,
    ) -> PrismResult<Option<NodeId>> {
        let Some(target) = graph.resolve_target(node)? else {
            return Ok(None);
        };
        if !visiting.insert(target) {
            return Err(GraphError::Cycle(target).into());
        }
        if !graph.bounding_box(target)?.contains_point(x, y) {
            return Ok(None);
        }
        let class = graph.node(target)?.class.clone();
        let mut producers = Vec::new();
        for pad in class.input_pads() {
            if let Some(ep) = graph.resolve_producer(target, pad)? {
                let order = graph.node(ep.node)?.order;
                producers.push((pad.as_str() != "aux", std::cmp::Reverse(order), ep.node));
            }
        }
        producers.sort_by_key(|&(background, order, _)| (background, order));
        for (_, _, producer) in producers {
            if let Some(hit) = self.detect_in(graph, producer, x, y, visiting)? {
                return Ok(Some(hit));
            }
        }
        visiting.remove(&target);

        if class.output_pads().is_empty() {
            return Ok(None);
        }
        let rgba = prism_color::format("RGBA float")?;
        let sample = self.render(graph, target, Rect::new(x, y, 1, 1), None)?;
        let px = sample.get(Rect::new(x, y, 1, 1), 1.0, &rgba, AbyssPolicy::None)?;
        let alpha = f32::from_ne_bytes([px[12], px[13], px[14], px[15]]);
        Ok((alpha > 0.0).then_some(target))
    }

    fn plan_for_output(&self, graph: &Graph, node: NodeId) -> PrismResult<Plan> {
        let target = graph
            .resolve_target(node)?
            .ok_or(GraphError::NoOutput(node))?;
        let plan = Plan::build(graph, target)?;
        if plan.target().class.output_pads().is_empty() {
            return Err(GraphError::NoOutput(node).into());
        }
        Ok(plan)
    }

    /// Evaluate `plan` for `roi` and return the target's output buffer.
    fn evaluate(
        &self,
        plan: &Plan,
        roi: Rect,
        level: u32,
        use_cache: bool,
        cancel: Option<&CancelToken>,
    ) -> PrismResult<Buffer> {
        let needs = plan.needs(roi);
        let deps: Vec<Vec<usize>> = plan
            .nodes
            .iter()
            .map(|n| n.inputs.iter().map(|(_, j)| *j).collect())
            .collect();
        let mut sched = DagScheduler::new(&deps);
        let mut results: Vec<Option<Buffer>> = vec![None; plan.nodes.len()];

        while sched.remaining() > 0 {
            let batch = match &self.pool {
                Some(_) => sched.pop_ready_batch(plan.nodes.len()),
                None => sched.pop_ready().into_iter().collect(),
            };
            if batch.is_empty() {
                // Unreachable for a plan built by post-order walk.
                return Err(GraphError::Cycle(plan.target().id).into());
            }
            let outputs: Vec<(usize, PrismResult<Buffer>)> = match &self.pool {
                Some(pool) if batch.len() > 1 => pool.install(|| {
                    batch
                        .par_iter()
                        .map(|&i| (i, self.run_node(plan, i, &needs, &results, level, use_cache, cancel)))
                        .collect()
                }),
                _ => batch
                    .iter()
                    .map(|&i| (i, self.run_node(plan, i, &needs, &results, level, use_cache, cancel)))
                    .collect(),
            };
            for (i, output) in outputs {
                results[i] = Some(output?);
                sched.mark_done(i);
            }
        }

        let last = plan.nodes.len() - 1;
        results[last]
            .take()
            .ok_or_else(|| GraphError::NoOutput(plan.target().id).into())
    }

    #[allow(clippy::too_many_arguments)]
    fn run_node(
        &self,
        plan: &Plan,
        i: usize,
        needs: &[Rect],
        results: &[Option<Buffer>],
        level: u32,
        use_cache: bool,
        cancel: Option<&CancelToken>,
    ) -> PrismResult<Buffer> {
        check_cancel(cancel)?;
        let node = &plan.nodes[i];
        let need = needs[i];
        if need.is_empty() {
            return Buffer::new(Rect::default(), &node.format);
        }

        let inputs: BTreeMap<String, Buffer> = node
            .inputs
            .iter()
            .filter_map(|(pad, j)| results[*j].clone().map(|b| (pad.clone(), b)))
            .collect();
        let pad = node.class.output_pads().first().cloned().unwrap_or_default();

        // Held for the whole computation: one computation per node at a time.
        let mut runtime = node.runtime.lock();

        if node.class.category() == OperationCategory::Sink {
            let placeholder = Buffer::new(Rect::default(), &node.format)?;
            self.compute(node, inputs, placeholder.clone(), need, level)?;
            runtime.mark_processed();
            return Ok(placeholder);
        }

        if !use_cache {
            let output = Buffer::new(need, &node.format)?;
            self.compute(node, inputs, output.clone(), need, level)?;
            runtime.mark_processed();
            return Ok(output);
        }

        if let Some(hit) = runtime.hit(&need) {
            tracing::trace!("cache hit for node {} over {need}", node.id);
            return Ok(hit);
        }
        let output = runtime.buffer_for(&pad, &node.format, &need)?;
        let missing = runtime.missing(&need);
        tracing::debug!(
            "cache miss for node {}: computing {} pixel(s) in {} rect(s)",
            node.id,
            missing.area(),
            missing.rects().len()
        );
        for rect in missing.rects() {
            self.compute(node, inputs.clone(), output.clone(), *rect, level)?;
            check_cancel(cancel)?;
            runtime.commit(rect);
        }
        Ok(output)
    }

    fn compute(
        &self,
        node: &PlanNode,
        inputs: BTreeMap<String, Buffer>,
        output: Buffer,
        rect: Rect,
        level: u32,
    ) -> PrismResult<()> {
        output.clear(rect);
        let mut ctx = OperationContext::new(
            node.id,
            node.class.name(),
            &node.properties,
            inputs,
            output,
            rect,
            level,
        );
        node.class.behaviour().process(&mut ctx).inspect_err(|e| {
            tracing::warn!("{} failed on node {} over {rect}: {e}", node.class.name(), node.id);
        })
    }
}

fn build_thread_pool(threads: usize) -> PrismResult<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| ConfigurationError::Invalid(format!("failed to build rayon thread pool: {e}")).into())
}

fn check_cancel(cancel: Option<&CancelToken>) -> PrismResult<()> {
    if cancel.is_some_and(CancelToken::is_cancelled) {
        tracing::warn!("render cancelled");
        return Err(PrismError::Cancelled);
    }
    Ok(())
}

/// Mipmap level advertised to operations for a downscaled blit.
fn mipmap_level(scale: f64) -> u32 {
    if scale >= 1.0 {
        0
    } else {
        ((1.0 / scale).log2().floor() as u32).min(16)
    }
}

fn zero_rows(dst: &mut [u8], rect: Rect, row_bytes: usize, stride: usize) -> PrismResult<()> {
    for row in 0..rect.height as usize {
        dst[row * stride..row * stride + row_bytes].fill(0);
    }
    Ok(())
}
