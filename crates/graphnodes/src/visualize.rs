use async_trait::async_trait;
use graphcore::{Node, NodeContext, NodeError, NodeOutput, Value};
use graphruntime::{NodeFactory, NodeTypeInfo};
use std::collections::HashMap;
use std::sync::Arc;

/// Pass-through terminal for rendering surfaces. Requires at least one
/// input and forwards the first unchanged.
pub struct VisualizationNode;

#[async_trait]
impl Node for VisualizationNode {
    fn node_type(&self) -> &str {
        "visualize.passthrough"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let input = ctx.require_input()?;
        Ok(NodeOutput::value(input.clone()))
    }
}

pub struct VisualizationNodeFactory;

impl NodeFactory for VisualizationNodeFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Arc<dyn Node>, NodeError> {
        Ok(Arc::new(VisualizationNode))
    }

    fn node_type(&self) -> &str {
        "visualize.passthrough"
    }

    fn metadata(&self) -> NodeTypeInfo {
        NodeTypeInfo {
            description: "Identity pass-through for rendering".to_string(),
            category: "visualize".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_context;

    #[tokio::test]
    async fn passes_first_input_through() {
        let ctx = test_context(
            HashMap::new(),
            vec![Value::String("shown".into()), Value::Number(2.0)],
        );
        let output = VisualizationNode.execute(ctx).await.unwrap();
        assert_eq!(output.value, Value::String("shown".into()));
    }

    #[tokio::test]
    async fn requires_an_input() {
        let ctx = test_context(HashMap::new(), vec![]);
        assert!(matches!(
            VisualizationNode.execute(ctx).await,
            Err(NodeError::MissingInput(_))
        ));
    }
}
