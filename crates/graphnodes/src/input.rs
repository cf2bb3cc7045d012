use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use graphcore::{Node, NodeContext, NodeError, NodeOutput, NodeSpec, Value};
use graphruntime::{NodeFactory, NodeTypeInfo};
use std::collections::HashMap;
use std::sync::Arc;

const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Source node producing a configured text literal.
///
/// The literal is template-interpolated, so `{{name}}` placeholders pick up
/// workflow constants and run variables.
pub struct TextInputNode;

#[async_trait]
impl Node for TextInputNode {
    fn node_type(&self) -> &str {
        "input.text"
    }

    fn validate(&self, spec: &NodeSpec) -> Result<(), NodeError> {
        match spec.config.get("value") {
            Some(Value::String(_)) => Ok(()),
            Some(other) => Err(NodeError::InvalidInputType {
                field: "value".to_string(),
                expected: "string".to_string(),
                actual: other.type_name().to_string(),
            }),
            None => Err(NodeError::Configuration(
                "text input requires a 'value'".to_string(),
            )),
        }
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let text = ctx.config_template("value")?;
        Ok(NodeOutput::value(text))
    }
}

pub struct TextInputNodeFactory;

impl NodeFactory for TextInputNodeFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Arc<dyn Node>, NodeError> {
        Ok(Arc::new(TextInputNode))
    }

    fn node_type(&self) -> &str {
        "input.text"
    }

    fn metadata(&self) -> NodeTypeInfo {
        NodeTypeInfo {
            description: "Configured text literal with template interpolation".to_string(),
            category: "input".to_string(),
        }
    }
}

/// Source node producing a configured date, rendered with a chrono format.
///
/// `value` is either `"now"` or a `%Y-%m-%d` date literal.
pub struct DateInputNode;

#[async_trait]
impl Node for DateInputNode {
    fn node_type(&self) -> &str {
        "input.date"
    }

    fn validate(&self, spec: &NodeSpec) -> Result<(), NodeError> {
        let value = spec
            .config
            .get("value")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                NodeError::Configuration("date input requires a 'value'".to_string())
            })?;
        if value != "now" && NaiveDate::parse_from_str(value, DEFAULT_DATE_FORMAT).is_err() {
            return Err(NodeError::Configuration(format!(
                "date input 'value' must be \"now\" or a {} date, got '{}'",
                DEFAULT_DATE_FORMAT, value
            )));
        }
        Ok(())
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let value = ctx
            .require_config("value")?
            .as_str()
            .ok_or_else(|| NodeError::Configuration("date 'value' must be a string".to_string()))?
            .to_string();
        let format = ctx
            .get_config_or("format", Value::String(DEFAULT_DATE_FORMAT.to_string()))
            .as_str()
            .unwrap_or(DEFAULT_DATE_FORMAT)
            .to_string();

        let date = if value == "now" {
            Utc::now().date_naive()
        } else {
            NaiveDate::parse_from_str(&value, DEFAULT_DATE_FORMAT)
                .map_err(|e| NodeError::Configuration(format!("invalid date '{}': {}", value, e)))?
        };
        Ok(NodeOutput::value(date.format(&format).to_string()))
    }
}

pub struct DateInputNodeFactory;

impl NodeFactory for DateInputNodeFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Arc<dyn Node>, NodeError> {
        Ok(Arc::new(DateInputNode))
    }

    fn node_type(&self) -> &str {
        "input.date"
    }

    fn metadata(&self) -> NodeTypeInfo {
        NodeTypeInfo {
            description: "Configured date literal ('now' or YYYY-MM-DD)".to_string(),
            category: "input".to_string(),
        }
    }
}
