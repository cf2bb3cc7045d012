use crate::control::timeout::parse_duration;
use async_trait::async_trait;
use graphcore::{Node, NodeContext, NodeError, NodeOutput, NodeSpec, Value};
use graphruntime::{NodeFactory, NodeTypeInfo};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TTL: &str = "60s";

fn configured_ttl(config: &HashMap<String, Value>) -> Result<Duration, NodeError> {
    match config.get("ttl") {
        None => parse_duration(DEFAULT_TTL),
        Some(raw) => {
            let raw = raw.as_str().ok_or_else(|| NodeError::InvalidInputType {
                field: "ttl".to_string(),
                expected: "string".to_string(),
                actual: raw.type_name().to_string(),
            })?;
            parse_duration(raw)
        }
    }
}

/// TTL cache over its upstream computation.
///
/// The key is template-interpolated from config. A hit returns the stored
/// value without recomputing; a miss stores the input under the key with
/// the configured TTL. Concurrent misses on one key fill at most once via
/// the state's per-key in-flight guard.
pub struct CacheNode;

#[async_trait]
impl Node for CacheNode {
    fn node_type(&self) -> &str {
        "control.cache"
    }

    fn validate(&self, spec: &NodeSpec) -> Result<(), NodeError> {
        match spec.config.get("key") {
            Some(Value::String(_)) => {}
            Some(other) => {
                return Err(NodeError::InvalidInputType {
                    field: "key".to_string(),
                    expected: "string".to_string(),
                    actual: other.type_name().to_string(),
                })
            }
            None => {
                return Err(NodeError::Configuration(
                    "cache requires a 'key'".to_string(),
                ))
            }
        }
        configured_ttl(&spec.config).map(|_| ())
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let key = ctx.config_template("key")?;
        let ttl = configured_ttl(&ctx.config)?;
        let input = ctx.require_input()?.clone();

        let (value, hit) = ctx
            .state
            .get_or_fill(&key, ttl, move || async move { Ok(input) })
            .await?;
        if hit {
            ctx.events.info(format!("cache hit for '{}'", key));
        } else {
            ctx.events.info(format!("cache miss for '{}', stored with ttl {:?}", key, ttl));
        }
        Ok(NodeOutput::value(value))
    }
}

pub struct CacheNodeFactory;

impl NodeFactory for CacheNodeFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Arc<dyn Node>, NodeError> {
        Ok(Arc::new(CacheNode))
    }

    fn node_type(&self) -> &str {
        "control.cache"
    }

    fn metadata(&self) -> NodeTypeInfo {
        NodeTypeInfo {
            description: "Cache the upstream result under a key with a TTL".to_string(),
            category: "control".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_context;

    fn cache_config(key: &str, ttl: &str) -> HashMap<String, Value> {
        let mut config = HashMap::new();
        config.insert("key".to_string(), Value::String(key.into()));
        config.insert("ttl".to_string(), Value::String(ttl.into()));
        config
    }

    #[tokio::test]
    async fn hit_returns_stored_value_ignoring_new_input() {
        let ctx = test_context(cache_config("k", "60s"), vec![Value::String("first".into())]);
        let state = ctx.state.clone();
        let events = ctx.events.clone();

        let output = CacheNode.execute(ctx).await.unwrap();
        assert_eq!(output.value, Value::String("first".into()));

        // Same key, different upstream value: the stored value wins.
        let ctx = graphcore::NodeContext {
            node_id: "cache".to_string(),
            inputs: vec![Value::String("second".into())],
            config: cache_config("k", "60s"),
            state,
            events,
            cancellation: tokio_util::sync::CancellationToken::new(),
        };
        let output = CacheNode.execute(ctx).await.unwrap();
        assert_eq!(output.value, Value::String("first".into()));
    }

    #[tokio::test]
    async fn expired_entry_is_recomputed() {
        let ctx = test_context(cache_config("k", "10ms"), vec![Value::Number(1.0)]);
        let state = ctx.state.clone();
        let events = ctx.events.clone();
        CacheNode.execute(ctx).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        let ctx = graphcore::NodeContext {
            node_id: "cache".to_string(),
            inputs: vec![Value::Number(2.0)],
            config: cache_config("k", "60s"),
            state,
            events,
            cancellation: tokio_util::sync::CancellationToken::new(),
        };
        let output = CacheNode.execute(ctx).await.unwrap();
        assert_eq!(output.value, Value::Number(2.0));
    }

    #[tokio::test]
    async fn key_is_template_interpolated() {
        let ctx = test_context(
            cache_config("user:{{user_id}}", "60s"),
            vec![Value::String("profile".into())],
        );
        ctx.state.set_variable("user_id", Value::Number(7.0));
        let state = ctx.state.clone();

        CacheNode.execute(ctx).await.unwrap();
        assert_eq!(state.cache_get("user:7"), Some(Value::String("profile".into())));
    }

    #[test]
    fn validation_requires_key_and_sane_ttl() {
        let spec = NodeSpec::new("c", "control.cache");
        assert!(CacheNode.validate(&spec).is_err());

        let spec = NodeSpec::new("c", "control.cache")
            .with_config("key", "k")
            .with_config("ttl", "soon");
        assert!(CacheNode.validate(&spec).is_err());

        let spec = NodeSpec::new("c", "control.cache").with_config("key", "k");
        assert!(CacheNode.validate(&spec).is_ok());
    }
}
