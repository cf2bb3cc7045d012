//! Core abstractions for the workflow graph engine
//!
//! This crate provides the fundamental types and traits that all other
//! components depend on: the dynamic value model, the node contract, the
//! workflow graph definition, and the shared per-run execution state.

mod error;
pub mod events;
mod graph;
mod node;
mod state;
mod value;

pub use error::{EngineError, NodeError, WorkflowError};
pub use events::{EventBus, EventEmitter, ExecutionEvent, ExecutionId, NodeEvent};
pub use graph::{Edge, NodeSpec, RunSettings, Workflow, WorkflowId};
pub use node::{Node, NodeContext, NodeOutput};
pub use state::{CacheEntry, ExecutionState};
pub use value::Value;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
