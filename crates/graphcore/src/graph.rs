use crate::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub type WorkflowId = Uuid;

/// Complete workflow definition: typed nodes plus directed edges.
///
/// Node and edge declaration order is significant: the scheduler breaks
/// ordering ties by node declaration order, and a node's inputs arrive in
/// the order its incoming edges were declared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    pub description: Option<String>,
    pub nodes: Vec<NodeSpec>,
    pub edges: Vec<Edge>,
    /// Read-mostly constants visible to template interpolation
    #[serde(default)]
    pub constants: HashMap<String, Value>,
    #[serde(default)]
    pub settings: RunSettings,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            nodes: Vec::new(),
            edges: Vec::new(),
            constants: HashMap::new(),
            settings: RunSettings::default(),
        }
    }

    pub fn add_node(&mut self, node: NodeSpec) -> String {
        let id = node.id.clone();
        self.nodes.push(node);
        id
    }

    /// Connect producer output to consumer input
    pub fn connect(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.edges.push(Edge {
            from: from.into(),
            to: to.into(),
            branch: None,
        });
    }

    /// Connect along a branch label; the edge only activates when the
    /// producer (a switch node) selects that branch.
    pub fn connect_branch(
        &mut self,
        from: impl Into<String>,
        branch: impl Into<String>,
        to: impl Into<String>,
    ) {
        self.edges.push(Edge {
            from: from.into(),
            to: to.into(),
            branch: Some(branch.into()),
        });
    }

    pub fn set_constant(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.constants.insert(name.into(), value.into());
    }

    pub fn find_node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Incoming edges of a node, in declaration order
    pub fn edges_into<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> {
        self.edges.iter().filter(move |e| e.to == id)
    }
}

/// Node declaration in a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    pub node_type: String,
    pub name: Option<String>,
    #[serde(default)]
    pub config: HashMap<String, Value>,
}

impl NodeSpec {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            name: None,
            config: HashMap::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Directed edge: producer result feeds consumer input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    /// Branch label for conditional activation (switch outputs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// Run-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    pub max_parallel_nodes: usize,
    /// Wall-clock cap per node execution, in milliseconds
    pub max_node_time_ms: Option<u64>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_parallel_nodes: 10,
            max_node_time_ms: None,
        }
    }
}
