use thiserror::Error;

/// Top-level error for a workflow run
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Node '{node_id}' failed: {source}")]
    NodeFailed {
        node_id: String,
        #[source]
        source: NodeError,
    },

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Id of the node the run failed on, if any
    pub fn failing_node(&self) -> Option<&str> {
        match self {
            EngineError::NodeFailed { node_id, .. } => Some(node_id),
            _ => None,
        }
    }
}

/// Errors produced by node validation and execution
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Field not found: {0}")]
    FieldNotFound(String),

    #[error("Undefined variable: {0}")]
    UndefinedVariable(String),

    #[error("Loop exceeded maximum of {limit} iterations")]
    IterationLimit { limit: u64 },

    #[error("Timed out: execution took {elapsed_ms}ms, limit is {limit_ms}ms")]
    Timeout { elapsed_ms: u64, limit_ms: u64 },

    #[error("Cancelled")]
    Cancelled,
}

/// Structural errors detected when compiling a workflow
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Workflow not found: {0}")]
    NotFound(String),

    #[error("Invalid workflow: {0}")]
    Invalid(String),

    #[error("Cyclic dependency detected")]
    CyclicDependency,

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Duplicate node id: {0}")]
    DuplicateNodeId(String),

    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("Invalid edge: {0}")]
    InvalidEdge(String),

    #[error("Invalid configuration for node '{node_id}': {source}")]
    NodeConfig {
        node_id: String,
        #[source]
        source: NodeError,
    },
}
