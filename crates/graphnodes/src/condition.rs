use graphcore::{NodeError, Value};

/// Comparison applied by switch cases and loop conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    AlwaysTrue,
    AlwaysFalse,
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    Contains,
    IsEmpty,
    NotEmpty,
}

impl ComparisonOperator {
    fn parse(tag: &str) -> Result<Self, NodeError> {
        Ok(match tag {
            "always_true" => Self::AlwaysTrue,
            "always_false" => Self::AlwaysFalse,
            "equals" => Self::Equals,
            "not_equals" => Self::NotEquals,
            "greater_than" => Self::GreaterThan,
            "less_than" => Self::LessThan,
            "greater_or_equal" => Self::GreaterOrEqual,
            "less_or_equal" => Self::LessOrEqual,
            "contains" => Self::Contains,
            "is_empty" => Self::IsEmpty,
            "not_empty" => Self::NotEmpty,
            other => {
                return Err(NodeError::Configuration(format!(
                    "unknown comparison operator: {}",
                    other
                )))
            }
        })
    }

    fn tag(&self) -> &'static str {
        match self {
            Self::AlwaysTrue => "always_true",
            Self::AlwaysFalse => "always_false",
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
            Self::GreaterOrEqual => "greater_or_equal",
            Self::LessOrEqual => "less_or_equal",
            Self::Contains => "contains",
            Self::IsEmpty => "is_empty",
            Self::NotEmpty => "not_empty",
        }
    }

    fn needs_operand(&self) -> bool {
        matches!(
            self,
            Self::Equals
                | Self::NotEquals
                | Self::GreaterThan
                | Self::LessThan
                | Self::GreaterOrEqual
                | Self::LessOrEqual
                | Self::Contains
        )
    }
}

/// Small typed predicate evaluated against a single value
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub operator: ComparisonOperator,
    pub operand: Option<Value>,
}

impl Condition {
    /// Parse from a node config payload: `{ "operator": ..., "value": ... }`
    pub fn from_config(config: &Value) -> Result<Self, NodeError> {
        let obj = config.as_object().ok_or_else(|| {
            NodeError::Configuration("condition must be an object".to_string())
        })?;
        let tag = obj
            .get("operator")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                NodeError::Configuration("condition requires an 'operator' string".to_string())
            })?;
        let operator = ComparisonOperator::parse(tag)?;
        let operand = obj.get("value").cloned();
        if operator.needs_operand() && operand.is_none() {
            return Err(NodeError::Configuration(format!(
                "operator '{}' requires a 'value'",
                tag
            )));
        }
        Ok(Self { operator, operand })
    }

    pub fn evaluate(&self, actual: &Value) -> bool {
        let operand = self.operand.as_ref();
        match self.operator {
            ComparisonOperator::AlwaysTrue => true,
            ComparisonOperator::AlwaysFalse => false,
            ComparisonOperator::Equals => operand.map_or(false, |v| values_equal(actual, v)),
            ComparisonOperator::NotEquals => operand.map_or(true, |v| !values_equal(actual, v)),
            ComparisonOperator::GreaterThan => numeric_cmp(actual, operand, |a, b| a > b),
            ComparisonOperator::LessThan => numeric_cmp(actual, operand, |a, b| a < b),
            ComparisonOperator::GreaterOrEqual => numeric_cmp(actual, operand, |a, b| a >= b),
            ComparisonOperator::LessOrEqual => numeric_cmp(actual, operand, |a, b| a <= b),
            ComparisonOperator::Contains => operand.map_or(false, |v| contains(actual, v)),
            ComparisonOperator::IsEmpty => is_empty(actual),
            ComparisonOperator::NotEmpty => !is_empty(actual),
        }
    }

    /// Human-readable form, reported in loop outcomes and errors
    pub fn describe(&self) -> String {
        match &self.operand {
            Some(operand) => format!("{} {}", self.operator.tag(), operand.to_display_string()),
            None => self.operator.tag().to_string(),
        }
    }
}

fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => Some(*n),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn numeric_cmp(actual: &Value, operand: Option<&Value>, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (coerce_f64(actual), operand.and_then(coerce_f64)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    // Numbers compare numerically even when one side arrives as a string.
    if let (Some(x), Some(y)) = (coerce_f64(a), coerce_f64(b)) {
        return (x - y).abs() < f64::EPSILON;
    }
    a == b
}

fn contains(actual: &Value, needle: &Value) -> bool {
    match actual {
        Value::String(s) => needle.as_str().map_or(false, |n| s.contains(n)),
        Value::Array(items) => items.iter().any(|item| values_equal(item, needle)),
        Value::Object(map) => needle.as_str().map_or(false, |n| map.contains_key(n)),
        _ => false,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
