//! In-memory run-state store, for tests and single-process embedding.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{PersistError, RunSnapshot, RunStore};

/// [`RunStore`] backed by a process-local map.
#[derive(Default)]
pub struct InMemoryRunStore {
    snapshots: Mutex<HashMap<String, RunSnapshot>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn save_run_state(&self, snapshot: &RunSnapshot) -> Result<(), PersistError> {
        self.snapshots
            .lock()
            .await
            .insert(snapshot.run_id.clone(), snapshot.clone());
        Ok(())
    }

    async fn load_run_state(&self, run_id: &str) -> Result<RunSnapshot, PersistError> {
        self.snapshots
            .lock()
            .await
            .get(run_id)
            .cloned()
            .ok_or_else(|| PersistError::NotFound(run_id.to_string()))
    }
}
