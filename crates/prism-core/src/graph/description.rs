//! JSON description of a node chain.
//!
//! A description lists the nodes upstream of one output node, producers
//! before consumers, with edges referring to list positions. Buffer-valued
//! properties have no textual form and are left out.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::{Graph, NodeId, NodeSpec, Role, Value};
use crate::error::{ConfigurationError, PrismError, PrismResult};
use crate::operation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDescription {
    pub nodes: Vec<NodeDescription>,
    #[serde(default)]
    pub edges: Vec<EdgeDescription>,
    /// Index into `nodes` of the output node.
    pub output: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescription {
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDescription {
    pub from: usize,
    #[serde(default = "default_output_pad")]
    pub from_pad: String,
    pub to: usize,
    #[serde(default = "default_input_pad")]
    pub to_pad: String,
}

fn default_output_pad() -> String {
    "output".to_string()
}

fn default_input_pad() -> String {
    "input".to_string()
}

impl Graph {
    /// Describe `output` and everything upstream of it.
    pub fn describe(&self, output: NodeId) -> PrismResult<GraphDescription> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        self.collect_upstream(output, &mut order, &mut seen)?;
        let index: HashMap<NodeId, usize> = order.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let mut nodes = Vec::with_capacity(order.len());
        let mut edges = Vec::new();
        for (i, id) in order.iter().enumerate() {
            let node = self.node(*id)?;
            let mut properties = BTreeMap::new();
            for (name, value) in node.properties.iter() {
                match value.to_json() {
                    Some(json) => {
                        properties.insert(name.to_string(), json);
                    }
                    None => tracing::warn!(
                        "property {name} of node {id} has no text form; left out of description"
                    ),
                }
            }
            nodes.push(NodeDescription {
                operation: node.class.name().to_string(),
                name: node.name.clone(),
                properties,
            });
            for (pad, producer) in &node.inputs {
                if let Some(p) = producer {
                    edges.push(EdgeDescription {
                        from: index[&p.node],
                        from_pad: p.pad.clone(),
                        to: i,
                        to_pad: pad.clone(),
                    });
                }
            }
        }
        Ok(GraphDescription {
            nodes,
            edges,
            output: order.len().saturating_sub(1),
        })
    }

    fn collect_upstream(
        &self,
        id: NodeId,
        order: &mut Vec<NodeId>,
        seen: &mut HashSet<NodeId>,
    ) -> PrismResult<()> {
        if !seen.insert(id) {
            return Ok(());
        }
        let node = self.node(id)?;
        if node.role != Role::Plain || node.parent.is_some() {
            return Err(ConfigurationError::Invalid(format!(
                "node {id} belongs to a graph node; only top-level chains can be described"
            ))
            .into());
        }
        let producers: Vec<NodeId> = node.inputs.values().flatten().map(|e| e.node).collect();
        for p in producers {
            self.collect_upstream(p, order, seen)?;
        }
        order.push(id);
        Ok(())
    }

    pub fn to_json(&self, output: NodeId) -> PrismResult<String> {
        Ok(serde_json::to_string_pretty(&self.describe(output)?)?)
    }

    /// Create the described nodes and edges; returns the output node.
    ///
    /// On failure every node created so far is removed again.
    pub fn instantiate(&mut self, description: &GraphDescription) -> PrismResult<NodeId> {
        if description.output >= description.nodes.len() {
            return Err(ConfigurationError::Invalid(format!(
                "output index {} out of range",
                description.output
            ))
            .into());
        }
        let mut created = Vec::with_capacity(description.nodes.len());
        let result = self.instantiate_into(description, &mut created);
        if result.is_err() {
            for id in created.into_iter().rev() {
                if let Err(e) = self.remove_node(id) {
                    tracing::warn!("rollback of node {id} failed: {e}");
                }
            }
        }
        result
    }

    fn instantiate_into(
        &mut self,
        description: &GraphDescription,
        created: &mut Vec<NodeId>,
    ) -> PrismResult<NodeId> {
        for node in &description.nodes {
            let class = operation::lookup(&node.operation)?;
            let mut spec = NodeSpec::new(&node.operation);
            if let Some(name) = &node.name {
                spec = spec.named(name);
            }
            for (property, json) in &node.properties {
                let kind = class
                    .find_property(property)
                    .ok_or_else(|| ConfigurationError::UnknownProperty {
                        operation: node.operation.clone(),
                        property: property.clone(),
                    })?
                    .kind();
                let value = Value::from_json(kind, property, json)?;
                spec = spec.with(property, value);
            }
            created.push(self.create_node(spec)?);
        }
        for edge in &description.edges {
            let (Some(from), Some(to)) = (created.get(edge.from), created.get(edge.to)) else {
                return Err(ConfigurationError::Invalid(format!(
                    "edge {} -> {} refers to a missing node",
                    edge.from, edge.to
                ))
                .into());
            };
            self.connect(*from, &edge.from_pad, *to, &edge.to_pad)?;
        }
        Ok(created[description.output])
    }

    /// Build a new graph from a JSON description; returns it with its output node.
    pub fn from_json(json: &str) -> PrismResult<(Graph, NodeId)> {
        let description: GraphDescription = serde_json::from_str(json).map_err(PrismError::from)?;
        let mut graph = Graph::new();
        let output = graph.instantiate(&description)?;
        Ok((graph, output))
    }
}
