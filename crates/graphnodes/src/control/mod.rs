//! Control-flow node semantics: conditional branching, bounded loops,
//! timeout wrapping, and TTL caching.

mod cache;
mod loops;
mod switch;
mod timeout;

pub use cache::{CacheNode, CacheNodeFactory};
pub use loops::{WhileLoopNode, WhileLoopNodeFactory};
pub use switch::{SwitchNode, SwitchNodeFactory};
pub use timeout::{TimeoutNode, TimeoutNodeFactory};
