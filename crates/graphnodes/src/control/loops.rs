use crate::condition::Condition;
use async_trait::async_trait;
use graphcore::{Node, NodeContext, NodeError, NodeOutput, NodeSpec, Value};
use graphruntime::{NodeFactory, NodeTypeInfo};
use std::collections::HashMap;
use std::sync::Arc;

const DEFAULT_MAX_ITERATIONS: u64 = 100;

#[derive(Debug, Clone, Copy)]
enum StepOp {
    Increment,
    Decrement,
    Multiply,
}

/// Loop body advancing the value each iteration
#[derive(Debug, Clone, Copy)]
struct Step {
    op: StepOp,
    by: f64,
}

impl Step {
    fn from_config(config: &Value) -> Result<Self, NodeError> {
        let obj = config
            .as_object()
            .ok_or_else(|| NodeError::Configuration("'step' must be an object".to_string()))?;
        let op = match obj.get("op").and_then(Value::as_str) {
            Some("increment") => StepOp::Increment,
            Some("decrement") => StepOp::Decrement,
            Some("multiply") => StepOp::Multiply,
            Some(other) => {
                return Err(NodeError::Configuration(format!(
                    "unknown step op: {}",
                    other
                )))
            }
            None => {
                return Err(NodeError::Configuration(
                    "'step' requires an 'op'".to_string(),
                ))
            }
        };
        let by = obj.get("by").and_then(Value::as_f64).unwrap_or(1.0);
        Ok(Self { op, by })
    }

    fn apply(&self, value: &Value) -> Result<Value, NodeError> {
        let n = value.as_f64().ok_or_else(|| NodeError::InvalidInputType {
            field: "input".to_string(),
            expected: "number".to_string(),
            actual: value.type_name().to_string(),
        })?;
        let next = match self.op {
            StepOp::Increment => n + self.by,
            StepOp::Decrement => n - self.by,
            StepOp::Multiply => n * self.by,
        };
        Ok(Value::Number(next))
    }
}

fn max_iterations(config: &HashMap<String, Value>) -> Result<u64, NodeError> {
    match config.get("max_iterations") {
        None => Ok(DEFAULT_MAX_ITERATIONS),
        Some(raw) => match raw.as_f64() {
            Some(n) if n > 0.0 && n.fract() == 0.0 => Ok(n as u64),
            _ => Err(NodeError::Configuration(
                "'max_iterations' must be a positive integer".to_string(),
            )),
        },
    }
}

/// Bounded while-loop over its input value.
///
/// Each true condition evaluation counts one iteration, bounded by
/// `max_iterations` to guarantee termination; exceeding the bound is a
/// hard error naming the limit. The optional `step` advances the value
/// between iterations; without it the loop is value-preserving.
pub struct WhileLoopNode;

#[async_trait]
impl Node for WhileLoopNode {
    fn node_type(&self) -> &str {
        "control.loop"
    }

    fn validate(&self, spec: &NodeSpec) -> Result<(), NodeError> {
        let condition = spec
            .config
            .get("condition")
            .ok_or_else(|| NodeError::Configuration("loop requires a 'condition'".to_string()))?;
        Condition::from_config(condition)?;
        max_iterations(&spec.config)?;
        if let Some(step) = spec.config.get("step") {
            Step::from_config(step)?;
        }
        Ok(())
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let condition = Condition::from_config(ctx.require_config("condition")?)?;
        let limit = max_iterations(&ctx.config)?;
        let step = match ctx.config.get("step") {
            Some(raw) => Some(Step::from_config(raw)?),
            None => None,
        };

        let mut value = ctx.require_input()?.clone();
        let mut iterations: u64 = 0;

        loop {
            if ctx.cancellation.is_cancelled() {
                return Err(NodeError::Cancelled);
            }
            if !condition.evaluate(&value) {
                break;
            }
            if iterations == limit {
                return Err(NodeError::IterationLimit { limit });
            }
            iterations += 1;
            if let Some(step) = &step {
                value = step.apply(&value)?;
            }
        }

        // Iteration bookkeeping shared with downstream nodes.
        ctx.state.set_counter(iterations as f64);

        let mut out = HashMap::new();
        out.insert("final_value".to_string(), value);
        out.insert("iterations".to_string(), Value::Number(iterations as f64));
        out.insert(
            "condition".to_string(),
            Value::String(condition.describe()),
        );
        Ok(NodeOutput::value(Value::Object(out)))
    }
}

pub struct WhileLoopNodeFactory;

impl NodeFactory for WhileLoopNodeFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Arc<dyn Node>, NodeError> {
        Ok(Arc::new(WhileLoopNode))
    }

    fn node_type(&self) -> &str {
        "control.loop"
    }

    fn metadata(&self) -> NodeTypeInfo {
        NodeTypeInfo {
            description: "Bounded while-loop with a configurable step".to_string(),
            category: "control".to_string(),
        }
    }
}
