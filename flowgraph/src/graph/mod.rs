//! Workflow graph model: nodes, edges, builder, validation.
//!
//! Build with `GraphBuilder` (add nodes/edges, then `build()`), which
//! validates acyclicity, reachability, and per-node configuration; the
//! resulting `Graph` is immutable and shared read-only by the scheduler.

mod builder;
mod edge;
#[allow(clippy::module_inception)]
mod graph;
mod node;
mod validation_error;

pub use builder::GraphBuilder;
pub use edge::Edge;
pub use graph::Graph;
pub use node::{ActionConfig, LoopConfig, Node, NodeKind};
pub use validation_error::GraphValidationError;
