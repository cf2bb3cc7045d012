use async_trait::async_trait;
use graphcore::{Node, NodeContext, NodeError, NodeOutput, NodeSpec, Value};
use graphruntime::{NodeFactory, NodeTypeInfo};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_DURATION: &str = "30s";

/// Parse a duration string such as "500ms", "30s" or "2m"
pub(crate) fn parse_duration(raw: &str) -> Result<Duration, NodeError> {
    let raw = raw.trim();
    let (digits, unit) = raw
        .find(|c: char| !c.is_ascii_digit())
        .map(|idx| raw.split_at(idx))
        .ok_or_else(|| {
            NodeError::Configuration(format!("duration '{}' is missing a unit (ms/s/m)", raw))
        })?;
    let amount: u64 = digits
        .parse()
        .map_err(|_| NodeError::Configuration(format!("invalid duration: '{}'", raw)))?;
    match unit {
        "ms" => Ok(Duration::from_millis(amount)),
        "s" => Ok(Duration::from_secs(amount)),
        "m" => Ok(Duration::from_secs(amount * 60)),
        other => Err(NodeError::Configuration(format!(
            "unknown duration unit '{}' in '{}'",
            other, raw
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OverflowAction {
    Error,
    ContinueWithPartial,
}

impl OverflowAction {
    fn from_config(config: &HashMap<String, Value>) -> Result<Self, NodeError> {
        match config.get("on_timeout").and_then(Value::as_str) {
            None | Some("error") => Ok(Self::Error),
            Some("continue_with_partial") => Ok(Self::ContinueWithPartial),
            Some(other) => Err(NodeError::Configuration(format!(
                "'on_timeout' must be 'error' or 'continue_with_partial', got '{}'",
                other
            ))),
        }
    }
}

fn configured_duration(config: &HashMap<String, Value>) -> Result<Duration, NodeError> {
    let raw = config
        .get("duration")
        .map(|v| {
            v.as_str().ok_or_else(|| NodeError::InvalidInputType {
                field: "duration".to_string(),
                expected: "string".to_string(),
                actual: v.type_name().to_string(),
            })
        })
        .transpose()?
        .unwrap_or(DEFAULT_DURATION);
    parse_duration(raw)
}

/// Wraps an upstream value with an execution-time bound.
///
/// The wrapped span is taken from an `execution_time_ms` field on the
/// input (the run-level wall-clock cap in `RunSettings` bounds real
/// execution). Over the bound, the configured overflow action decides
/// between a hard failure (partial result kept for diagnostics) and
/// continuing with the partial result.
pub struct TimeoutNode;

#[async_trait]
impl Node for TimeoutNode {
    fn node_type(&self) -> &str {
        "control.timeout"
    }

    fn validate(&self, spec: &NodeSpec) -> Result<(), NodeError> {
        configured_duration(&spec.config)?;
        OverflowAction::from_config(&spec.config)?;
        Ok(())
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let limit = configured_duration(&ctx.config)?;
        let action = OverflowAction::from_config(&ctx.config)?;
        let input = ctx.require_input()?.clone();

        let elapsed_ms = input
            .as_object()
            .and_then(|obj| obj.get("execution_time_ms"))
            .and_then(Value::as_f64)
            .unwrap_or(0.0) as u64;
        let limit_ms = limit.as_millis() as u64;

        if elapsed_ms <= limit_ms {
            return Ok(NodeOutput::value(input));
        }

        let mut partial = HashMap::new();
        partial.insert("value".to_string(), input);
        partial.insert("timed_out".to_string(), Value::Bool(true));
        partial.insert("partial_result".to_string(), Value::Bool(true));
        let partial = Value::Object(partial);

        match action {
            OverflowAction::Error => Ok(NodeOutput::value(partial).with_partial_error(
                NodeError::Timeout {
                    elapsed_ms,
                    limit_ms,
                },
            )),
            OverflowAction::ContinueWithPartial => {
                ctx.events
                    .warn(format!("timed out after {}ms, continuing with partial result", limit_ms));
                Ok(NodeOutput::value(partial))
            }
        }
    }
}

pub struct TimeoutNodeFactory;

impl NodeFactory for TimeoutNodeFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Arc<dyn Node>, NodeError> {
        Ok(Arc::new(TimeoutNode))
    }

    fn node_type(&self) -> &str {
        "control.timeout"
    }

    fn metadata(&self) -> NodeTypeInfo {
        NodeTypeInfo {
            description: "Bound execution time with a configurable overflow action".to_string(),
            category: "control".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_context;

    fn slow_input(elapsed_ms: f64) -> Value {
        let mut obj = HashMap::new();
        obj.insert("execution_time_ms".to_string(), Value::Number(elapsed_ms));
        obj.insert("data".to_string(), Value::String("partial".into()));
        Value::Object(obj)
    }

    #[test]
    fn duration_parsing() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("5h").is_err());
    }

    #[tokio::test]
    async fn within_bound_passes_through() {
        let mut config = HashMap::new();
        config.insert("duration".to_string(), Value::String("1s".into()));
        let ctx = test_context(config, vec![slow_input(100.0)]);

        let output = TimeoutNode.execute(ctx).await.unwrap();
        assert!(output.partial_error.is_none());
        assert_eq!(output.value, slow_input(100.0));
    }

    #[tokio::test]
    async fn overflow_with_error_reports_both_durations() {
        let mut config = HashMap::new();
        config.insert("duration".to_string(), Value::String("1s".into()));
        let ctx = test_context(config, vec![slow_input(2500.0)]);

        let output = TimeoutNode.execute(ctx).await.unwrap();
        assert_eq!(
            output.partial_error,
            Some(NodeError::Timeout {
                elapsed_ms: 2500,
                limit_ms: 1000,
            })
        );
        // Partial result kept for diagnostics.
        let out = output.value.as_object().unwrap();
        assert_eq!(out["timed_out"], Value::Bool(true));
    }

    #[tokio::test]
    async fn overflow_with_continue_flags_partial_result() {
        let mut config = HashMap::new();
        config.insert("duration".to_string(), Value::String("1s".into()));
        config.insert(
            "on_timeout".to_string(),
            Value::String("continue_with_partial".into()),
        );
        let ctx = test_context(config, vec![slow_input(2500.0)]);

        let output = TimeoutNode.execute(ctx).await.unwrap();
        assert!(output.partial_error.is_none());
        let out = output.value.as_object().unwrap();
        assert_eq!(out["timed_out"], Value::Bool(true));
        assert_eq!(out["partial_result"], Value::Bool(true));
    }

    #[test]
    fn validation_rejects_unknown_action() {
        let spec = NodeSpec::new("t", "control.timeout").with_config("on_timeout", "explode");
        assert!(TimeoutNode.validate(&spec).is_err());

        let spec = NodeSpec::new("t", "control.timeout");
        assert!(TimeoutNode.validate(&spec).is_ok());
    }
}
