//! Node execution: kind dispatch, the action-invoker seam, typed errors.

mod error;
mod invoker;
mod mock;
mod node_executor;

pub use error::{InvokeError, NodeErrorKind, NodeExecutionError};
pub use invoker::{ActionInvoker, ActionOutcome};
pub use mock::MockInvoker;
pub use node_executor::{NodeExecutor, NodeOutcome, SubgraphRunner};
