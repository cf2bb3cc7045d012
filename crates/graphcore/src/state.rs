use crate::{EngineError, NodeError, Value};
use regex::Regex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.-]+)\s*\}\}").expect("placeholder regex"))
}

/// Cached value plus its expiry instant
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub expires_at: Instant,
}

#[derive(Debug, Default)]
struct SharedState {
    results: HashMap<String, Value>,
    variables: HashMap<String, Value>,
    accumulator: Value,
    counter: f64,
    cache: HashMap<String, CacheEntry>,
    constants: HashMap<String, Value>,
    context_vars: HashMap<String, Value>,
}

struct StateInner {
    shared: Mutex<SharedState>,
    /// Per-key guards serializing concurrent cache fills
    fills: tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Run-scoped execution state shared by every node in a run.
///
/// One instance is created per run and handed to each node through its
/// context. All mutation goes through these accessors; the inner lock is
/// never held across an await point.
#[derive(Clone)]
pub struct ExecutionState {
    inner: Arc<StateInner>,
}

impl ExecutionState {
    pub fn new(constants: HashMap<String, Value>, variables: HashMap<String, Value>) -> Self {
        Self {
            inner: Arc::new(StateInner {
                shared: Mutex::new(SharedState {
                    constants,
                    variables,
                    ..SharedState::default()
                }),
                fills: tokio::sync::Mutex::new(HashMap::new()),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SharedState> {
        // A poisoned lock means a panicking node; the state itself is
        // still structurally sound, so keep going with the inner value.
        self.inner.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    // --- node results (write-once per node per run) ---

    pub fn record_result(&self, node_id: &str, value: Value) -> Result<(), EngineError> {
        let mut shared = self.lock();
        if shared.results.contains_key(node_id) {
            return Err(EngineError::Execution(format!(
                "result for node '{}' already recorded",
                node_id
            )));
        }
        shared.results.insert(node_id.to_string(), value);
        Ok(())
    }

    pub fn result(&self, node_id: &str) -> Option<Value> {
        self.lock().results.get(node_id).cloned()
    }

    pub fn results(&self) -> HashMap<String, Value> {
        self.lock().results.clone()
    }

    // --- variables (last-writer-wins) ---

    pub fn variable(&self, name: &str) -> Option<Value> {
        self.lock().variables.get(name).cloned()
    }

    pub fn require_variable(&self, name: &str) -> Result<Value, NodeError> {
        self.variable(name)
            .ok_or_else(|| NodeError::UndefinedVariable(name.to_string()))
    }

    pub fn set_variable(&self, name: impl Into<String>, value: Value) {
        self.lock().variables.insert(name.into(), value);
    }

    // --- accumulator / counter ---

    pub fn accumulator(&self) -> Value {
        self.lock().accumulator.clone()
    }

    pub fn set_accumulator(&self, value: Value) {
        self.lock().accumulator = value;
    }

    pub fn counter(&self) -> f64 {
        self.lock().counter
    }

    pub fn set_counter(&self, value: f64) {
        self.lock().counter = value;
    }

    pub fn increment_counter(&self, by: f64) -> f64 {
        let mut shared = self.lock();
        shared.counter += by;
        shared.counter
    }

    // --- workflow constants and context variables ---

    pub fn constant(&self, name: &str) -> Option<Value> {
        self.lock().constants.get(name).cloned()
    }

    pub fn context_var(&self, name: &str) -> Option<Value> {
        self.lock().context_vars.get(name).cloned()
    }

    pub fn set_context_var(&self, name: impl Into<String>, value: Value) {
        self.lock().context_vars.insert(name.into(), value);
    }

    // --- TTL cache ---

    /// Look up a cache entry; expired entries read as absent.
    pub fn cache_get(&self, key: &str) -> Option<Value> {
        let mut shared = self.lock();
        match shared.cache.get(key) {
            Some(entry) if Instant::now() < entry.expires_at => Some(entry.value.clone()),
            Some(_) => {
                shared.cache.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn cache_set(&self, key: impl Into<String>, value: Value, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.lock().cache.insert(key.into(), entry);
    }

    /// Return the cached value for `key`, or run `fill` and store its result.
    ///
    /// Concurrent callers missing on the same key serialize on a per-key
    /// guard: exactly one runs the fill, the rest reuse the stored result.
    /// A failed fill leaves the key unpopulated and surfaces the error.
    /// The boolean is true on a cache hit.
    pub async fn get_or_fill<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fill: F,
    ) -> Result<(Value, bool), NodeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, NodeError>>,
    {
        if let Some(value) = self.cache_get(key) {
            return Ok((value, true));
        }

        let guard = {
            let mut fills = self.inner.fills.lock().await;
            fills
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        let _filling = guard.lock().await;

        // Another caller may have completed the fill while we waited.
        if let Some(value) = self.cache_get(key) {
            return Ok((value, true));
        }

        let value = fill().await?;
        tracing::debug!(key, ttl_ms = ttl.as_millis() as u64, "cache fill");
        self.cache_set(key, value.clone(), ttl);
        Ok((value, false))
    }

    // --- template interpolation ---

    /// Substitute `{{name}}` placeholders from workflow constants, context
    /// variables and run variables, in increasing priority. Unresolved
    /// placeholders are left verbatim.
    pub fn interpolate(&self, template: &str) -> String {
        placeholder_regex().replace_all(template, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            let shared = self.lock();
            shared
                .variables
                .get(name)
                .or_else(|| shared.context_vars.get(name))
                .or_else(|| shared.constants.get(name))
                .map(Value::to_display_string)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn empty_state() -> ExecutionState {
        ExecutionState::new(HashMap::new(), HashMap::new())
    }

    #[test]
    fn results_are_write_once() {
        let state = empty_state();
        state.record_result("a", Value::Number(1.0)).unwrap();
        assert!(state.record_result("a", Value::Number(2.0)).is_err());
        assert_eq!(state.result("a"), Some(Value::Number(1.0)));
    }

    #[test]
    fn variables_last_writer_wins() {
        let state = empty_state();
        state.set_variable("x", Value::Number(1.0));
        state.set_variable("x", Value::Number(2.0));
        assert_eq!(state.variable("x"), Some(Value::Number(2.0)));
        assert_eq!(
            state.require_variable("missing"),
            Err(NodeError::UndefinedVariable("missing".into()))
        );
    }

    #[test]
    fn counter_increments() {
        let state = empty_state();
        assert_eq!(state.increment_counter(2.0), 2.0);
        assert_eq!(state.increment_counter(3.0), 5.0);
        state.set_counter(0.0);
        assert_eq!(state.counter(), 0.0);
    }

    #[test]
    fn accumulator_holds_one_value() {
        let state = empty_state();
        assert_eq!(state.accumulator(), Value::Null);
        state.set_accumulator(Value::Array(vec![Value::Number(1.0)]));
        state.set_accumulator(Value::Array(vec![Value::Number(2.0)]));
        assert_eq!(state.accumulator(), Value::Array(vec![Value::Number(2.0)]));
    }

    #[test]
    fn cache_expiry_reads_as_absent() {
        let state = empty_state();
        state.cache_set("k", Value::Number(1.0), Duration::from_secs(60));
        assert_eq!(state.cache_get("k"), Some(Value::Number(1.0)));

        state.cache_set("gone", Value::Number(2.0), Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(state.cache_get("gone"), None);
    }

    #[tokio::test]
    async fn fill_runs_once_within_ttl() {
        let state = empty_state();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let (value, _) = state
                .get_or_fill("k", Duration::from_secs(60), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::String("computed".into()))
                })
                .await
                .unwrap();
            assert_eq!(value, Value::String("computed".into()));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entry_refills_once() {
        let state = empty_state();
        let calls = AtomicUsize::new(0);
        let fill = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Number(7.0))
        };

        state.get_or_fill("k", Duration::from_millis(10), fill).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let (_, hit) = state
            .get_or_fill("k", Duration::from_secs(60), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Number(7.0))
            })
            .await
            .unwrap();
        assert!(!hit);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_fill_once() {
        let state = empty_state();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let state = state.clone();
            let calls = calls.clone();
            tasks.push(tokio::spawn(async move {
                state
                    .get_or_fill("shared", Duration::from_secs(60), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Ok(Value::String("once".into()))
                    })
                    .await
                    .unwrap()
                    .0
            }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap(), Value::String("once".into()));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_fill_leaves_key_absent() {
        let state = empty_state();
        let err = state
            .get_or_fill("k", Duration::from_secs(60), || async {
                Err(NodeError::ExecutionFailed("fill broke".into()))
            })
            .await
            .unwrap_err();
        assert_eq!(err, NodeError::ExecutionFailed("fill broke".into()));
        assert_eq!(state.cache_get("k"), None);

        // Key is still fillable after a failure.
        let (value, hit) = state
            .get_or_fill("k", Duration::from_secs(60), || async {
                Ok(Value::Number(1.0))
            })
            .await
            .unwrap();
        assert!(!hit);
        assert_eq!(value, Value::Number(1.0));
    }

    #[test]
    fn interpolation_priority_and_verbatim_unresolved() {
        let mut constants = HashMap::new();
        constants.insert("greeting".to_string(), Value::String("hi".into()));
        constants.insert("who".to_string(), Value::String("const".into()));
        let state = ExecutionState::new(constants, HashMap::new());

        state.set_context_var("who", Value::String("ctx".into()));
        assert_eq!(state.interpolate("{{greeting}} {{who}}"), "hi ctx");

        // Run variables take priority over context vars and constants.
        state.set_variable("who", Value::String("var".into()));
        assert_eq!(state.interpolate("{{greeting}} {{who}}"), "hi var");

        assert_eq!(state.interpolate("{{ unknown }} stays"), "{{ unknown }} stays");
    }
}
