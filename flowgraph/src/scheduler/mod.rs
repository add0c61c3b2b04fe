//! Generation-based scheduling: frontier tracking, run options, the engine.

mod cancel;
mod engine;
mod frontier;
mod options;

pub use cancel::CancelToken;
pub use engine::Engine;
pub use frontier::Frontier;
pub use options::{JoinPolicy, RunOptions};
