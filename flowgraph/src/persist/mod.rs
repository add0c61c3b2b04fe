//! Run-state persistence for suspend/resume.
//!
//! The engine saves a [`RunSnapshot`] when a run suspends and loads one to
//! resume; the [`RunStore`] trait is the only contract with storage.

mod memory;
mod snapshot;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::InMemoryRunStore;
pub use snapshot::RunSnapshot;

/// Error from a [`RunStore`] implementation.
#[derive(Debug, Clone, Error)]
pub enum PersistError {
    #[error("no saved state for run: {0}")]
    NotFound(String),

    #[error("run-state storage failed: {0}")]
    Storage(String),
}

/// Storage collaborator for suspended run state.
///
/// Called only at suspend/resume boundaries, never during normal waves.
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn save_run_state(&self, snapshot: &RunSnapshot) -> Result<(), PersistError>;
    async fn load_run_state(&self, run_id: &str) -> Result<RunSnapshot, PersistError>;
}
