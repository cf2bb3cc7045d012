//! Workflow execution runtime
//!
//! This crate provides the scheduler that walks a compiled workflow in
//! dependency order, the node-type registry it dispatches through, and the
//! `GraphRuntime` front object embedding both.

mod executor;
mod registry;
mod runtime;

pub use executor::{ExecutionPlan, RunResult, WorkflowExecutor};
pub use registry::{NodeFactory, NodeRegistry, NodeTypeInfo};
pub use runtime::{GraphRuntime, RuntimeConfig};
