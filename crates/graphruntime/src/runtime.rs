use crate::{registry::NodeRegistry, RunResult, WorkflowExecutor};
use graphcore::{EngineError, EventBus, Value, Workflow, WorkflowError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Main entry point for compiling and running workflows
pub struct GraphRuntime {
    registry: Arc<NodeRegistry>,
    executor: Arc<WorkflowExecutor>,
    event_bus: Arc<EventBus>,
    workflows: Arc<RwLock<HashMap<uuid::Uuid, Workflow>>>,
}

impl GraphRuntime {
    /// Create a new runtime with default settings
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::with_registry(Arc::new(NodeRegistry::new()), config)
    }

    /// Create a runtime around a pre-configured registry
    pub fn with_registry(registry: Arc<NodeRegistry>, config: RuntimeConfig) -> Self {
        let executor = Arc::new(WorkflowExecutor::new(config.max_parallel_nodes));
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));

        Self {
            registry,
            executor,
            event_bus,
            workflows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Node registry, for registering node types
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Validate a workflow against the registered node types
    pub fn validate(&self, workflow: &Workflow) -> Result<(), WorkflowError> {
        self.executor.validate(workflow, &self.registry)
    }

    /// Register a workflow for execution by id
    pub async fn register_workflow(&self, workflow: Workflow) {
        let mut workflows = self.workflows.write().await;
        workflows.insert(workflow.id, workflow);
    }

    /// Execute a previously registered workflow
    pub async fn execute_workflow(
        &self,
        workflow_id: uuid::Uuid,
        variables: HashMap<String, Value>,
    ) -> Result<RunResult, EngineError> {
        let workflows = self.workflows.read().await;
        let workflow = workflows
            .get(&workflow_id)
            .ok_or_else(|| EngineError::Workflow(WorkflowError::NotFound(workflow_id.to_string())))?;

        self.executor
            .execute(
                workflow,
                &self.registry,
                &self.event_bus,
                variables,
                CancellationToken::new(),
            )
            .await
    }

    /// Execute a workflow directly, without registration
    pub async fn execute(
        &self,
        workflow: &Workflow,
        variables: HashMap<String, Value>,
    ) -> Result<RunResult, EngineError> {
        self.execute_cancellable(workflow, variables, CancellationToken::new())
            .await
    }

    /// Execute with an externally-owned cancellation token. Cancellation is
    /// observed before each node starts.
    pub async fn execute_cancellable(
        &self,
        workflow: &Workflow,
        variables: HashMap<String, Value>,
        cancel: CancellationToken,
    ) -> Result<RunResult, EngineError> {
        self.executor
            .execute(workflow, &self.registry, &self.event_bus, variables, cancel)
            .await
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<graphcore::ExecutionEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

impl Default for GraphRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub max_parallel_nodes: usize,
    pub event_buffer_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_parallel_nodes: 10,
            event_buffer_size: 1000,
        }
    }
}
