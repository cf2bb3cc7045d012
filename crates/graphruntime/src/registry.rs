use graphcore::{Node, NodeError, Value, WorkflowError};
use std::collections::HashMap;
use std::sync::Arc;

/// Factory trait for creating node executor instances
pub trait NodeFactory: Send + Sync {
    /// Create a new executor for the given configuration
    fn create(&self, config: &HashMap<String, Value>) -> Result<Arc<dyn Node>, NodeError>;

    /// Node type tag this factory produces
    fn node_type(&self) -> &str;

    /// Optional: description shown by tooling
    fn metadata(&self) -> NodeTypeInfo {
        NodeTypeInfo::default()
    }
}

/// Descriptive metadata about a node type
#[derive(Debug, Clone)]
pub struct NodeTypeInfo {
    pub description: String,
    pub category: String,
}

impl Default for NodeTypeInfo {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
        }
    }
}

/// Registry mapping node-type tags to their factories
pub struct NodeRegistry {
    factories: HashMap<String, Arc<dyn NodeFactory>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a node factory
    pub fn register(&mut self, factory: Arc<dyn NodeFactory>) {
        let node_type = factory.node_type().to_string();
        tracing::debug!("Registering node type: {}", node_type);
        self.factories.insert(node_type, factory);
    }

    /// Create an executor instance for a node type
    pub fn create_node(
        &self,
        node_type: &str,
        config: &HashMap<String, Value>,
    ) -> Result<Arc<dyn Node>, WorkflowError> {
        let factory = self
            .factories
            .get(node_type)
            .ok_or_else(|| WorkflowError::UnknownNodeType(node_type.to_string()))?;

        factory
            .create(config)
            .map_err(|e| WorkflowError::Invalid(format!("failed to create node: {}", e)))
    }

    /// All registered node types, sorted
    pub fn list_node_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn get_metadata(&self, node_type: &str) -> Option<NodeTypeInfo> {
        self.factories.get(node_type).map(|f| f.metadata())
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
