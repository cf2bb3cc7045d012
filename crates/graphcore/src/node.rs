use crate::{events::EventEmitter, ExecutionState, NodeError, NodeSpec, Value};
use async_trait::async_trait;
use std::collections::HashMap;

/// Core trait every node type implements.
///
/// `validate` runs once at workflow compile time against the declared
/// configuration and must not touch execution state. `execute` runs once
/// per node per run; all side effects go through the context's state
/// accessors.
#[async_trait]
pub trait Node: Send + Sync {
    /// Unique type tag (e.g. "transform.chunk", "control.loop")
    fn node_type(&self) -> &str;

    /// Reject structurally invalid configuration at compile time
    fn validate(&self, _spec: &NodeSpec) -> Result<(), NodeError> {
        Ok(())
    }

    /// Execute the node against its inputs and the shared run state
    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError>;
}

/// Run-scoped façade handed to each node invocation.
///
/// Nodes read their predecessor results from `inputs` and reach shared
/// run state only through `state`; neither the scheduler nor other nodes
/// are visible from here.
#[derive(Clone)]
pub struct NodeContext {
    /// Id of the node being executed
    pub node_id: String,

    /// Results of this node's producers, in incoming-edge declaration order
    pub inputs: Vec<Value>,

    /// Static configuration from the node spec
    pub config: HashMap<String, Value>,

    /// Shared per-run execution state
    pub state: ExecutionState,

    /// Event emitter for real-time updates
    pub events: EventEmitter,

    /// Cancellation token for the whole run
    pub cancellation: tokio_util::sync::CancellationToken,
}

impl NodeContext {
    /// First input, or an error when the node has none
    pub fn require_input(&self) -> Result<&Value, NodeError> {
        self.inputs
            .first()
            .ok_or_else(|| NodeError::MissingInput("input".to_string()))
    }

    /// Get config value or return error
    pub fn require_config(&self, name: &str) -> Result<&Value, NodeError> {
        self.config
            .get(name)
            .ok_or_else(|| NodeError::Configuration(format!("missing config: {}", name)))
    }

    /// Get config with default
    pub fn get_config_or(&self, name: &str, default: Value) -> Value {
        self.config.get(name).cloned().unwrap_or(default)
    }

    /// Config string with `{{name}}` placeholders substituted
    pub fn config_template(&self, name: &str) -> Result<String, NodeError> {
        let raw = self
            .require_config(name)?
            .as_str()
            .ok_or_else(|| NodeError::InvalidInputType {
                field: name.to_string(),
                expected: "string".to_string(),
                actual: self.config[name].type_name().to_string(),
            })?;
        Ok(self.state.interpolate(raw))
    }
}

/// Output from node execution
#[derive(Debug, Clone)]
pub struct NodeOutput {
    /// The produced value, recorded under the node's id
    pub value: Value,

    /// Branch selected by a switch node; edges carrying other labels are
    /// skipped downstream
    pub selected_branch: Option<String>,

    /// Error reported alongside a partial result. The scheduler records
    /// the value for diagnostics and then fails the run.
    pub partial_error: Option<NodeError>,
}

impl NodeOutput {
    pub fn value(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            selected_branch: None,
            partial_error: None,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.selected_branch = Some(branch.into());
        self
    }

    pub fn with_partial_error(mut self, error: NodeError) -> Self {
        self.partial_error = Some(error);
        self
    }
}
