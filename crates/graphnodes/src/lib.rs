//! Standard node library
//!
//! Leaf executors (inputs, transforms, visualization) and the control-flow
//! nodes (switch, bounded loop, timeout wrapper, TTL cache).

pub mod condition;
mod control;
mod input;
mod transform;
mod visualize;

pub use condition::{ComparisonOperator, Condition};
pub use control::{CacheNode, SwitchNode, TimeoutNode, WhileLoopNode};
pub use input::{DateInputNode, TextInputNode};
pub use transform::{ChunkNode, ExtractNode, ReverseNode};
pub use visualize::VisualizationNode;

use graphruntime::NodeRegistry;
use std::sync::Arc;

/// Register all standard nodes with a registry
pub fn register_all(registry: &mut NodeRegistry) {
    registry.register(Arc::new(input::TextInputNodeFactory));
    registry.register(Arc::new(input::DateInputNodeFactory));
    registry.register(Arc::new(transform::ChunkNodeFactory));
    registry.register(Arc::new(transform::ReverseNodeFactory));
    registry.register(Arc::new(transform::ExtractNodeFactory));
    registry.register(Arc::new(visualize::VisualizationNodeFactory));
    registry.register(Arc::new(control::SwitchNodeFactory));
    registry.register(Arc::new(control::WhileLoopNodeFactory));
    registry.register(Arc::new(control::TimeoutNodeFactory));
    registry.register(Arc::new(control::CacheNodeFactory));
}

#[cfg(test)]
pub(crate) mod testing {
    use graphcore::{EventBus, ExecutionState, NodeContext, Value};
    use std::collections::HashMap;

    /// Build a context around a fresh run state for node unit tests
    pub fn test_context(config: HashMap<String, Value>, inputs: Vec<Value>) -> NodeContext {
        let bus = EventBus::new(100);
        let execution_id = uuid::Uuid::new_v4();
        NodeContext {
            node_id: "test-node".to_string(),
            inputs,
            config,
            state: ExecutionState::new(HashMap::new(), HashMap::new()),
            events: bus.create_emitter(execution_id, "test-node"),
            cancellation: tokio_util::sync::CancellationToken::new(),
        }
    }
}
