use crate::registry::NodeRegistry;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use graphcore::{
    EngineError, EventBus, ExecutionId, ExecutionState, Node, NodeContext, NodeError, NodeOutput,
    Value, Workflow, WorkflowError,
};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Compiled form of a workflow: executor instances plus a deterministic
/// dependency order (ties broken by node declaration order).
pub struct ExecutionPlan {
    order: Vec<String>,
    nodes: HashMap<String, Arc<dyn Node>>,
}

impl ExecutionPlan {
    /// Node ids in execution order
    pub fn order(&self) -> &[String] {
        &self.order
    }
}

/// Executes workflows as DAGs with bounded parallelism and conditional
/// branch activation.
pub struct WorkflowExecutor {
    max_parallel: usize,
}

impl WorkflowExecutor {
    pub fn new(max_parallel: usize) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
        }
    }

    /// Validate a workflow without running it
    pub fn validate(&self, workflow: &Workflow, registry: &NodeRegistry) -> Result<(), WorkflowError> {
        self.compile(workflow, registry).map(|_| ())
    }

    /// Compile a workflow: structural checks, per-node config validation,
    /// cycle detection, and the dependency order.
    pub fn compile(
        &self,
        workflow: &Workflow,
        registry: &NodeRegistry,
    ) -> Result<ExecutionPlan, WorkflowError> {
        let mut nodes: HashMap<String, Arc<dyn Node>> = HashMap::new();
        for spec in &workflow.nodes {
            if nodes.contains_key(&spec.id) {
                return Err(WorkflowError::DuplicateNodeId(spec.id.clone()));
            }
            let node = registry.create_node(&spec.node_type, &spec.config)?;
            node.validate(spec).map_err(|source| WorkflowError::NodeConfig {
                node_id: spec.id.clone(),
                source,
            })?;
            nodes.insert(spec.id.clone(), node);
        }

        for edge in &workflow.edges {
            for endpoint in [&edge.from, &edge.to] {
                if !nodes.contains_key(endpoint) {
                    return Err(WorkflowError::InvalidEdge(format!(
                        "unknown node '{}' in edge {} -> {}",
                        endpoint, edge.from, edge.to
                    )));
                }
            }
        }

        // Cycle check over the raw edge set
        let mut graph = DiGraph::<&str, ()>::new();
        let mut indices = HashMap::new();
        for spec in &workflow.nodes {
            indices.insert(spec.id.as_str(), graph.add_node(spec.id.as_str()));
        }
        for edge in &workflow.edges {
            graph.add_edge(indices[edge.from.as_str()], indices[edge.to.as_str()], ());
        }
        if toposort(&graph, None).is_err() {
            return Err(WorkflowError::CyclicDependency);
        }

        Ok(ExecutionPlan {
            order: declaration_order_toposort(workflow),
            nodes,
        })
    }

    /// Execute a workflow and return the run result.
    ///
    /// A fresh [`ExecutionState`] is created per run, seeded with the
    /// workflow constants and the caller's initial variables.
    pub async fn execute(
        &self,
        workflow: &Workflow,
        registry: &NodeRegistry,
        event_bus: &EventBus,
        initial_variables: HashMap<String, Value>,
        cancel: CancellationToken,
    ) -> Result<RunResult, EngineError> {
        let plan = self.compile(workflow, registry)?;
        let execution_id = Uuid::new_v4();
        let start_time = Instant::now();

        event_bus.emit(graphcore::ExecutionEvent::WorkflowStarted {
            execution_id,
            workflow_id: workflow.id,
            timestamp: Utc::now(),
        });
        tracing::info!(workflow = %workflow.name, %execution_id, "starting workflow run");

        let state = ExecutionState::new(workflow.constants.clone(), initial_variables);
        let result = self
            .run_plan(workflow, &plan, &state, event_bus, execution_id, cancel)
            .await;

        let duration_ms = start_time.elapsed().as_millis() as u64;
        event_bus.emit(graphcore::ExecutionEvent::WorkflowCompleted {
            execution_id,
            success: result.is_ok(),
            duration_ms,
            timestamp: Utc::now(),
        });

        result
    }

    async fn run_plan(
        &self,
        workflow: &Workflow,
        plan: &ExecutionPlan,
        state: &ExecutionState,
        event_bus: &EventBus,
        execution_id: ExecutionId,
        cancel: CancellationToken,
    ) -> Result<RunResult, EngineError> {
        let mut completed: HashSet<String> = HashSet::new();
        let mut skipped: HashSet<String> = HashSet::new();
        let mut in_flight: HashSet<String> = HashSet::new();
        let mut branch_selected: HashMap<String, String> = HashMap::new();
        let mut running = FuturesUnordered::new();

        loop {
            self.propagate_skips(
                workflow,
                plan,
                &mut skipped,
                &completed,
                &in_flight,
                &branch_selected,
                event_bus,
                execution_id,
            );

            let ready = self.find_ready_nodes(
                workflow,
                plan,
                &completed,
                &skipped,
                &in_flight,
                &branch_selected,
            );

            for node_id in ready {
                if running.len() >= self.max_parallel {
                    break;
                }
                // Cancellation is observed at the node boundary: nothing
                // new starts once the token fires.
                if cancel.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }

                let spec = workflow
                    .find_node(&node_id)
                    .ok_or_else(|| WorkflowError::NodeNotFound(node_id.clone()))?;
                let node = plan.nodes[&node_id].clone();

                let inputs =
                    collect_inputs(workflow, &node_id, state, &completed, &branch_selected);
                let ctx = NodeContext {
                    node_id: node_id.clone(),
                    inputs,
                    config: spec.config.clone(),
                    state: state.clone(),
                    events: event_bus.create_emitter(execution_id, node_id.clone()),
                    cancellation: cancel.clone(),
                };

                event_bus.emit(graphcore::ExecutionEvent::NodeStarted {
                    execution_id,
                    node_id: node_id.clone(),
                    node_type: spec.node_type.clone(),
                    timestamp: Utc::now(),
                });
                in_flight.insert(node_id.clone());

                let node_time_cap = workflow.settings.max_node_time_ms;
                let task = async move {
                    let start = Instant::now();
                    let result = match node_time_cap {
                        Some(cap_ms) => {
                            match timeout(Duration::from_millis(cap_ms), node.execute(ctx)).await {
                                Ok(result) => result,
                                Err(_) => Err(NodeError::Timeout {
                                    elapsed_ms: cap_ms,
                                    limit_ms: cap_ms,
                                }),
                            }
                        }
                        None => node.execute(ctx).await,
                    };
                    let duration_ms = start.elapsed().as_millis() as u64;
                    (node_id, result, duration_ms)
                };
                running.push(tokio::spawn(task));
            }

            if running.is_empty() {
                break;
            }

            if let Some(joined) = running.next().await {
                let (node_id, exec_result, duration_ms) = joined
                    .map_err(|e| EngineError::Execution(format!("task join error: {}", e)))?;
                in_flight.remove(&node_id);

                match exec_result {
                    Ok(output) => {
                        let NodeOutput {
                            value,
                            selected_branch,
                            partial_error,
                        } = output;
                        state.record_result(&node_id, value.clone())?;
                        if let Some(branch) = selected_branch {
                            branch_selected.insert(node_id.clone(), branch);
                        }
                        completed.insert(node_id.clone());

                        if let Some(error) = partial_error {
                            // Partial result recorded for diagnostics, but
                            // the node's policy does not allow continuation.
                            tracing::error!(node = %node_id, %error, "node failed with partial result");
                            event_bus.emit(graphcore::ExecutionEvent::NodeFailed {
                                execution_id,
                                node_id: node_id.clone(),
                                error: error.to_string(),
                                timestamp: Utc::now(),
                            });
                            return Err(EngineError::NodeFailed {
                                node_id,
                                source: error,
                            });
                        }

                        tracing::info!(node = %node_id, duration_ms, "node completed");
                        event_bus.emit(graphcore::ExecutionEvent::NodeCompleted {
                            execution_id,
                            node_id,
                            value,
                            duration_ms,
                            timestamp: Utc::now(),
                        });
                    }
                    Err(error) => {
                        tracing::error!(node = %node_id, %error, "node failed");
                        event_bus.emit(graphcore::ExecutionEvent::NodeFailed {
                            execution_id,
                            node_id: node_id.clone(),
                            error: error.to_string(),
                            timestamp: Utc::now(),
                        });
                        return Err(EngineError::NodeFailed {
                            node_id,
                            source: error,
                        });
                    }
                }
            }
        }

        let mut skipped: Vec<String> = skipped.into_iter().collect();
        skipped.sort();
        Ok(RunResult {
            execution_id,
            outputs: state.results(),
            completed_nodes: completed.len(),
            total_nodes: workflow.nodes.len(),
            skipped,
        })
    }

    /// Transitively mark nodes whose every activation path is gone.
    ///
    /// A node is skipped once all of its producers are resolved and no
    /// incoming edge is active (producer completed and, for branch edges,
    /// its label was the one selected).
    #[allow(clippy::too_many_arguments)]
    fn propagate_skips(
        &self,
        workflow: &Workflow,
        plan: &ExecutionPlan,
        skipped: &mut HashSet<String>,
        completed: &HashSet<String>,
        in_flight: &HashSet<String>,
        branch_selected: &HashMap<String, String>,
        event_bus: &EventBus,
        execution_id: ExecutionId,
    ) {
        loop {
            let mut changed = false;
            for node_id in &plan.order {
                if completed.contains(node_id)
                    || skipped.contains(node_id)
                    || in_flight.contains(node_id)
                {
                    continue;
                }
                let incoming: Vec<_> = workflow.edges_into(node_id).collect();
                if incoming.is_empty() {
                    continue;
                }
                let all_resolved = incoming
                    .iter()
                    .all(|e| completed.contains(&e.from) || skipped.contains(&e.from));
                if !all_resolved {
                    continue;
                }
                let any_active = incoming
                    .iter()
                    .any(|e| edge_active(e, completed, branch_selected));
                if !any_active {
                    skipped.insert(node_id.clone());
                    tracing::debug!(node = %node_id, "skipping node on unselected branch");
                    event_bus.emit(graphcore::ExecutionEvent::NodeSkipped {
                        execution_id,
                        node_id: node_id.clone(),
                        timestamp: Utc::now(),
                    });
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }

    /// Nodes whose dependencies are fully resolved and that still have an
    /// active path, in plan order.
    fn find_ready_nodes(
        &self,
        workflow: &Workflow,
        plan: &ExecutionPlan,
        completed: &HashSet<String>,
        skipped: &HashSet<String>,
        in_flight: &HashSet<String>,
        branch_selected: &HashMap<String, String>,
    ) -> Vec<String> {
        plan.order
            .iter()
            .filter(|node_id| {
                !completed.contains(*node_id)
                    && !skipped.contains(*node_id)
                    && !in_flight.contains(*node_id)
            })
            .filter(|node_id| {
                let incoming: Vec<_> = workflow.edges_into(node_id).collect();
                if incoming.is_empty() {
                    return true;
                }
                let all_resolved = incoming
                    .iter()
                    .all(|e| completed.contains(&e.from) || skipped.contains(&e.from));
                all_resolved
                    && incoming
                        .iter()
                        .any(|e| edge_active(e, completed, branch_selected))
            })
            .cloned()
            .collect()
    }
}

fn edge_active(
    edge: &graphcore::Edge,
    completed: &HashSet<String>,
    branch_selected: &HashMap<String, String>,
) -> bool {
    if !completed.contains(&edge.from) {
        return false;
    }
    match &edge.branch {
        None => true,
        Some(label) => branch_selected.get(&edge.from) == Some(label),
    }
}

/// Assemble a node's inputs from its active incoming edges, in edge
/// declaration order.
fn collect_inputs(
    workflow: &Workflow,
    node_id: &str,
    state: &ExecutionState,
    completed: &HashSet<String>,
    branch_selected: &HashMap<String, String>,
) -> Vec<Value> {
    workflow
        .edges_into(node_id)
        .filter(|e| edge_active(e, completed, branch_selected))
        .filter_map(|e| state.result(&e.from))
        .collect()
}

/// Kahn's algorithm with ties broken by node declaration order, so
/// independently-ready nodes always schedule deterministically.
fn declaration_order_toposort(workflow: &Workflow) -> Vec<String> {
    let mut indegree: HashMap<&str, usize> = workflow
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), 0))
        .collect();
    for edge in &workflow.edges {
        if let Some(count) = indegree.get_mut(edge.to.as_str()) {
            *count += 1;
        }
    }

    let mut order = Vec::with_capacity(workflow.nodes.len());
    let mut placed: HashSet<&str> = HashSet::new();
    while order.len() < workflow.nodes.len() {
        let next = workflow
            .nodes
            .iter()
            .map(|n| n.id.as_str())
            .find(|id| !placed.contains(id) && indegree[id] == 0);
        let Some(id) = next else { break };
        placed.insert(id);
        order.push(id.to_string());
        for edge in &workflow.edges {
            if edge.from == id {
                if let Some(count) = indegree.get_mut(edge.to.as_str()) {
                    *count = count.saturating_sub(1);
                }
            }
        }
    }
    order
}

/// Result of a successful workflow run
#[derive(Debug, Clone)]
pub struct RunResult {
    pub execution_id: ExecutionId,
    /// Node id -> produced value
    pub outputs: HashMap<String, Value>,
    pub completed_nodes: usize,
    pub total_nodes: usize,
    /// Nodes bypassed by branch selection
    pub skipped: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphcore::NodeSpec;

    fn linear_workflow(ids: &[&str]) -> Workflow {
        let mut wf = Workflow::new("linear");
        for id in ids {
            wf.add_node(NodeSpec::new(*id, "test.noop"));
        }
        for pair in ids.windows(2) {
            wf.connect(pair[0], pair[1]);
        }
        wf
    }

    #[test]
    fn toposort_respects_dependencies() {
        let order = declaration_order_toposort(&linear_workflow(&["a", "b", "c"]));
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn toposort_breaks_ties_by_declaration_order() {
        let mut wf = Workflow::new("diamond");
        // Declared out of dependency order on purpose.
        wf.add_node(NodeSpec::new("sink", "test.noop"));
        wf.add_node(NodeSpec::new("left", "test.noop"));
        wf.add_node(NodeSpec::new("right", "test.noop"));
        wf.add_node(NodeSpec::new("source", "test.noop"));
        wf.connect("source", "left");
        wf.connect("source", "right");
        wf.connect("left", "sink");
        wf.connect("right", "sink");

        let order = declaration_order_toposort(&wf);
        assert_eq!(order, vec!["source", "left", "right", "sink"]);
    }

    #[test]
    fn branch_edges_only_activate_on_selection() {
        let mut wf = Workflow::new("branching");
        wf.add_node(NodeSpec::new("sw", "test.switch"));
        wf.add_node(NodeSpec::new("yes", "test.noop"));
        wf.connect_branch("sw", "high", "yes");

        let edge = &wf.edges[0];
        let mut completed = HashSet::new();
        let mut branches = HashMap::new();
        assert!(!edge_active(edge, &completed, &branches));

        completed.insert("sw".to_string());
        assert!(!edge_active(edge, &completed, &branches));

        branches.insert("sw".to_string(), "low".to_string());
        assert!(!edge_active(edge, &completed, &branches));

        branches.insert("sw".to_string(), "high".to_string());
        assert!(edge_active(edge, &completed, &branches));
    }
}
