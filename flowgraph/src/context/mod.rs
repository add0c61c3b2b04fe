//! Execution context: scoped, synchronized key/value state for one run.

mod execution_context;
mod merge_error;

pub use execution_context::{ExecutionContext, DEFAULT_TRACE_CAP};
pub use merge_error::ContextMergeConflict;
