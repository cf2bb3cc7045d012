use async_trait::async_trait;
use graphcore::{Node, NodeContext, NodeError, NodeOutput, NodeSpec, Value};
use graphruntime::{NodeFactory, NodeTypeInfo};
use std::collections::HashMap;
use std::sync::Arc;

fn require_array(ctx: &NodeContext) -> Result<&[Value], NodeError> {
    let input = ctx.require_input()?;
    input.as_array().ok_or_else(|| NodeError::InvalidInputType {
        field: "input".to_string(),
        expected: "array".to_string(),
        actual: input.type_name().to_string(),
    })
}

fn require_object(ctx: &NodeContext) -> Result<&HashMap<String, Value>, NodeError> {
    let input = ctx.require_input()?;
    input.as_object().ok_or_else(|| NodeError::InvalidInputType {
        field: "input".to_string(),
        expected: "object".to_string(),
        actual: input.type_name().to_string(),
    })
}

fn positive_int_config(spec: &NodeSpec, name: &str) -> Result<usize, NodeError> {
    let raw = spec.config.get(name).ok_or_else(|| {
        NodeError::Configuration(format!("missing config: {}", name))
    })?;
    match raw.as_f64() {
        Some(n) if n > 0.0 && n.fract() == 0.0 => Ok(n as usize),
        Some(n) => Err(NodeError::Configuration(format!(
            "'{}' must be a positive integer, got {}",
            name, n
        ))),
        None => Err(NodeError::InvalidInputType {
            field: name.to_string(),
            expected: "number".to_string(),
            actual: raw.type_name().to_string(),
        }),
    }
}

/// Split an array into fixed-size sub-arrays
pub struct ChunkNode;

#[async_trait]
impl Node for ChunkNode {
    fn node_type(&self) -> &str {
        "transform.chunk"
    }

    fn validate(&self, spec: &NodeSpec) -> Result<(), NodeError> {
        positive_int_config(spec, "size").map(|_| ())
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let items = require_array(&ctx)?;
        let size = ctx
            .require_config("size")?
            .as_f64()
            .filter(|n| *n > 0.0 && n.fract() == 0.0)
            .ok_or_else(|| NodeError::Configuration("'size' must be a positive integer".to_string()))?
            as usize;

        let chunks: Vec<Value> = items
            .chunks(size)
            .map(|chunk| Value::Array(chunk.to_vec()))
            .collect();

        let mut out = HashMap::new();
        out.insert("chunk_count".to_string(), Value::Number(chunks.len() as f64));
        out.insert("chunk_size".to_string(), Value::Number(size as f64));
        out.insert("chunks".to_string(), Value::Array(chunks));
        Ok(NodeOutput::value(Value::Object(out)))
    }
}

pub struct ChunkNodeFactory;

impl NodeFactory for ChunkNodeFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Arc<dyn Node>, NodeError> {
        Ok(Arc::new(ChunkNode))
    }

    fn node_type(&self) -> &str {
        "transform.chunk"
    }

    fn metadata(&self) -> NodeTypeInfo {
        NodeTypeInfo {
            description: "Split an array into fixed-size chunks".to_string(),
            category: "transform".to_string(),
        }
    }
}

/// Reverse array order
pub struct ReverseNode;

#[async_trait]
impl Node for ReverseNode {
    fn node_type(&self) -> &str {
        "transform.reverse"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let items = require_array(&ctx)?;
        let reversed: Vec<Value> = items.iter().rev().cloned().collect();
        Ok(NodeOutput::value(Value::Array(reversed)))
    }
}

pub struct ReverseNodeFactory;

impl NodeFactory for ReverseNodeFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Arc<dyn Node>, NodeError> {
        Ok(Arc::new(ReverseNode))
    }

    fn node_type(&self) -> &str {
        "transform.reverse"
    }

    fn metadata(&self) -> NodeTypeInfo {
        NodeTypeInfo {
            description: "Reverse an array".to_string(),
            category: "transform".to_string(),
        }
    }
}

/// Extract a single named field, or a filtered subset of fields, from an
/// object input.
///
/// With `field`, a non-object input or an absent field is a hard
/// `FieldNotFound` naming the field. With `fields`, missing names are
/// silently omitted from the subset.
pub struct ExtractNode;

#[async_trait]
impl Node for ExtractNode {
    fn node_type(&self) -> &str {
        "transform.extract"
    }

    fn validate(&self, spec: &NodeSpec) -> Result<(), NodeError> {
        let field = spec.config.get("field");
        let fields = spec.config.get("fields");
        match (field, fields) {
            (Some(_), Some(_)) => Err(NodeError::Configuration(
                "specify either 'field' or 'fields', not both".to_string(),
            )),
            (None, None) => Err(NodeError::Configuration(
                "extract requires 'field' or 'fields'".to_string(),
            )),
            (Some(f), None) => match f {
                Value::String(_) => Ok(()),
                other => Err(NodeError::InvalidInputType {
                    field: "field".to_string(),
                    expected: "string".to_string(),
                    actual: other.type_name().to_string(),
                }),
            },
            (None, Some(fs)) => {
                let names = fs.as_array().ok_or_else(|| NodeError::InvalidInputType {
                    field: "fields".to_string(),
                    expected: "array".to_string(),
                    actual: fs.type_name().to_string(),
                })?;
                if names.is_empty() {
                    return Err(NodeError::Configuration(
                        "'fields' must name at least one field".to_string(),
                    ));
                }
                for name in names {
                    if name.as_str().is_none() {
                        return Err(NodeError::Configuration(
                            "'fields' entries must be strings".to_string(),
                        ));
                    }
                }
                Ok(())
            }
        }
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        if let Some(field) = ctx.config.get("field").and_then(Value::as_str) {
            // Anything without the field, object or not, reports the
            // field by name.
            let value = ctx
                .require_input()?
                .as_object()
                .and_then(|obj| obj.get(field))
                .cloned()
                .ok_or_else(|| NodeError::FieldNotFound(field.to_string()))?;
            let mut out = HashMap::new();
            out.insert(field.to_string(), value);
            return Ok(NodeOutput::value(Value::Object(out)));
        }

        let object = require_object(&ctx)?;
        let names = ctx
            .require_config("fields")?
            .as_array()
            .ok_or_else(|| NodeError::Configuration("'fields' must be an array".to_string()))?;
        let mut out = HashMap::new();
        for name in names {
            if let Some(name) = name.as_str() {
                if let Some(value) = object.get(name) {
                    out.insert(name.to_string(), value.clone());
                }
            }
        }
        Ok(NodeOutput::value(Value::Object(out)))
    }
}

pub struct ExtractNodeFactory;

impl NodeFactory for ExtractNodeFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Arc<dyn Node>, NodeError> {
        Ok(Arc::new(ExtractNode))
    }

    fn node_type(&self) -> &str {
        "transform.extract"
    }

    fn metadata(&self) -> NodeTypeInfo {
        NodeTypeInfo {
            description: "Extract a field or subset of fields from an object".to_string(),
            category: "transform".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_context;

    fn number_array(range: std::ops::Range<i64>) -> Value {
        Value::Array(range.map(|n| Value::Number(n as f64)).collect())
    }

    #[tokio::test]
    async fn chunking_preserves_order_and_counts() {
        let mut config = HashMap::new();
        config.insert("size".to_string(), Value::Number(10.0));
        let ctx = test_context(config, vec![number_array(1..26)]);

        let output = ChunkNode.execute(ctx).await.unwrap();
        let object = output.value.as_object().unwrap();
        assert_eq!(object["chunk_count"], Value::Number(3.0));
        assert_eq!(object["chunk_size"], Value::Number(10.0));

        let chunks = object["chunks"].as_array().unwrap();
        let sizes: Vec<usize> = chunks
            .iter()
            .map(|c| c.as_array().unwrap().len())
            .collect();
        assert_eq!(sizes, vec![10, 10, 5]);

        // Concatenating the chunks reconstructs the input.
        let rejoined: Vec<Value> = chunks
            .iter()
            .flat_map(|c| c.as_array().unwrap().iter().cloned())
            .collect();
        assert_eq!(Value::Array(rejoined), number_array(1..26));
    }

    #[test]
    fn chunk_rejects_non_positive_size() {
        let spec = NodeSpec::new("c", "transform.chunk").with_config("size", 0i64);
        assert!(ChunkNode.validate(&spec).is_err());
        let spec = NodeSpec::new("c", "transform.chunk").with_config("size", -3i64);
        assert!(ChunkNode.validate(&spec).is_err());
        let spec = NodeSpec::new("c", "transform.chunk").with_config("size", 2.5);
        assert!(ChunkNode.validate(&spec).is_err());
        let spec = NodeSpec::new("c", "transform.chunk").with_config("size", 4i64);
        assert!(ChunkNode.validate(&spec).is_ok());
    }

    #[tokio::test]
    async fn chunk_rejects_non_array_input() {
        let mut config = HashMap::new();
        config.insert("size".to_string(), Value::Number(2.0));
        let ctx = test_context(config, vec![Value::String("not an array".into())]);
        assert!(matches!(
            ChunkNode.execute(ctx).await,
            Err(NodeError::InvalidInputType { .. })
        ));
    }

    #[tokio::test]
    async fn reverse_is_an_involution() {
        let input = number_array(1..6);
        let ctx = test_context(HashMap::new(), vec![input.clone()]);
        let once = ReverseNode.execute(ctx).await.unwrap().value;
        assert_ne!(once, input);

        let ctx = test_context(HashMap::new(), vec![once]);
        let twice = ReverseNode.execute(ctx).await.unwrap().value;
        assert_eq!(twice, input);
    }

    #[tokio::test]
    async fn extract_single_field() {
        let mut obj = HashMap::new();
        obj.insert("name".to_string(), Value::String("ada".into()));
        obj.insert("age".to_string(), Value::Number(36.0));

        let mut config = HashMap::new();
        config.insert("field".to_string(), Value::String("name".into()));
        let ctx = test_context(config, vec![Value::Object(obj)]);

        let output = ExtractNode.execute(ctx).await.unwrap();
        let out = output.value.as_object().unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out["name"], Value::String("ada".into()));
    }

    #[tokio::test]
    async fn extract_missing_field_is_an_error() {
        let mut config = HashMap::new();
        config.insert("field".to_string(), Value::String("x".into()));
        let ctx = test_context(config, vec![Value::Object(HashMap::new())]);

        assert_eq!(
            ExtractNode.execute(ctx).await.unwrap_err(),
            NodeError::FieldNotFound("x".into())
        );
    }

    #[tokio::test]
    async fn extract_single_field_from_non_object_names_the_field() {
        let mut config = HashMap::new();
        config.insert("field".to_string(), Value::String("x".into()));
        let ctx = test_context(config, vec![Value::String("hello".into())]);

        assert_eq!(
            ExtractNode.execute(ctx).await.unwrap_err(),
            NodeError::FieldNotFound("x".into())
        );
    }

    #[tokio::test]
    async fn extract_field_subset_omits_missing_names() {
        let mut obj = HashMap::new();
        obj.insert("a".to_string(), Value::Number(1.0));
        obj.insert("b".to_string(), Value::Number(2.0));

        let mut config = HashMap::new();
        config.insert(
            "fields".to_string(),
            Value::Array(vec![Value::String("a".into()), Value::String("missing".into())]),
        );
        let ctx = test_context(config, vec![Value::Object(obj)]);

        let output = ExtractNode.execute(ctx).await.unwrap();
        let out = output.value.as_object().unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out["a"], Value::Number(1.0));
    }

    #[test]
    fn extract_validation() {
        let spec = NodeSpec::new("e", "transform.extract");
        assert!(ExtractNode.validate(&spec).is_err());

        let spec = NodeSpec::new("e", "transform.extract")
            .with_config("field", "a")
            .with_config("fields", Value::Array(vec![Value::String("b".into())]));
        assert!(ExtractNode.validate(&spec).is_err());

        let spec = NodeSpec::new("e", "transform.extract")
            .with_config("fields", Value::Array(vec![]));
        assert!(ExtractNode.validate(&spec).is_err());

        let spec = NodeSpec::new("e", "transform.extract").with_config("field", "a");
        assert!(ExtractNode.validate(&spec).is_ok());
    }
}
