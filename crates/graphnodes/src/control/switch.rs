use crate::condition::Condition;
use async_trait::async_trait;
use graphcore::{Node, NodeContext, NodeError, NodeOutput, NodeSpec, Value};
use graphruntime::{NodeFactory, NodeTypeInfo};
use std::collections::HashMap;
use std::sync::Arc;

const DEFAULT_BRANCH: &str = "default";

struct SwitchCase {
    branch: String,
    condition: Condition,
}

fn parse_cases(config: &HashMap<String, Value>) -> Result<Vec<SwitchCase>, NodeError> {
    let cases = config
        .get("cases")
        .ok_or_else(|| NodeError::Configuration("switch requires 'cases'".to_string()))?
        .as_array()
        .ok_or_else(|| NodeError::Configuration("'cases' must be an array".to_string()))?;
    if cases.is_empty() {
        return Err(NodeError::Configuration(
            "switch requires at least one case".to_string(),
        ));
    }

    cases
        .iter()
        .map(|case| {
            let obj = case
                .as_object()
                .ok_or_else(|| NodeError::Configuration("each case must be an object".to_string()))?;
            let branch = obj
                .get("branch")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    NodeError::Configuration("each case requires a 'branch' label".to_string())
                })?
                .to_string();
            let condition = Condition::from_config(obj.get("condition").ok_or_else(|| {
                NodeError::Configuration(format!("case '{}' requires a 'condition'", branch))
            })?)?;
            Ok(SwitchCase { branch, condition })
        })
        .collect()
}

/// Evaluates its cases in order against the input and selects exactly one
/// branch; downstream subgraphs on other branch labels are skipped by the
/// scheduler, not executed.
pub struct SwitchNode;

#[async_trait]
impl Node for SwitchNode {
    fn node_type(&self) -> &str {
        "control.switch"
    }

    fn validate(&self, spec: &NodeSpec) -> Result<(), NodeError> {
        parse_cases(&spec.config).map(|_| ())
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let cases = parse_cases(&ctx.config)?;
        let input = ctx.require_input()?;

        let selected = cases
            .iter()
            .find(|case| case.condition.evaluate(input))
            .map(|case| case.branch.clone())
            .unwrap_or_else(|| {
                ctx.get_config_or("default_branch", Value::String(DEFAULT_BRANCH.to_string()))
                    .as_str()
                    .unwrap_or(DEFAULT_BRANCH)
                    .to_string()
            });

        ctx.events.info(format!("selected branch '{}'", selected));
        Ok(NodeOutput::value(input.clone()).with_branch(selected))
    }
}

pub struct SwitchNodeFactory;

impl NodeFactory for SwitchNodeFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Arc<dyn Node>, NodeError> {
        Ok(Arc::new(SwitchNode))
    }

    fn node_type(&self) -> &str {
        "control.switch"
    }

    fn metadata(&self) -> NodeTypeInfo {
        NodeTypeInfo {
            description: "Select one downstream branch by predicate".to_string(),
            category: "control".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_context;

    fn switch_config() -> HashMap<String, Value> {
        let case = |branch: &str, operator: &str, value: f64| {
            let mut cond = HashMap::new();
            cond.insert("operator".to_string(), Value::String(operator.into()));
            cond.insert("value".to_string(), Value::Number(value));
            let mut obj = HashMap::new();
            obj.insert("branch".to_string(), Value::String(branch.into()));
            obj.insert("condition".to_string(), Value::Object(cond));
            Value::Object(obj)
        };
        let mut config = HashMap::new();
        config.insert(
            "cases".to_string(),
            Value::Array(vec![
                case("low", "less_than", 10.0),
                case("high", "greater_or_equal", 10.0),
            ]),
        );
        config
    }

    #[tokio::test]
    async fn selects_first_matching_case() {
        let ctx = test_context(switch_config(), vec![Value::Number(3.0)]);
        let output = SwitchNode.execute(ctx).await.unwrap();
        assert_eq!(output.selected_branch.as_deref(), Some("low"));
        assert_eq!(output.value, Value::Number(3.0));

        let ctx = test_context(switch_config(), vec![Value::Number(42.0)]);
        let output = SwitchNode.execute(ctx).await.unwrap();
        assert_eq!(output.selected_branch.as_deref(), Some("high"));
    }

    #[tokio::test]
    async fn falls_back_to_default_branch() {
        let mut config = switch_config();
        // A value no numeric case matches.
        let ctx = test_context(config.clone(), vec![Value::String("nan".into())]);
        let output = SwitchNode.execute(ctx).await.unwrap();
        assert_eq!(output.selected_branch.as_deref(), Some("default"));

        config.insert("default_branch".to_string(), Value::String("other".into()));
        let ctx = test_context(config, vec![Value::String("nan".into())]);
        let output = SwitchNode.execute(ctx).await.unwrap();
        assert_eq!(output.selected_branch.as_deref(), Some("other"));
    }

    #[test]
    fn rejects_empty_cases() {
        let spec = NodeSpec::new("sw", "control.switch").with_config("cases", Value::Array(vec![]));
        assert!(SwitchNode.validate(&spec).is_err());
        let spec = NodeSpec::new("sw", "control.switch");
        assert!(SwitchNode.validate(&spec).is_err());
    }
}
