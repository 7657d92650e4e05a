//! Registry of runs, keyed by run id.
//!
//! Active runs carry a handle the controller coordinates through; finished
//! runs are remembered by final status so a run id cannot be executed twice.

use crate::context::ExecutionContext;
use dashmap::DashMap;
use std::sync::Arc;
use taskflow_core::{Error, ExecutionPlan, Result, RunId, RunStatus, StepId, Task, TaskMetadata};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// A run stopped at a group boundary, waiting for `resume`.
pub struct ParkedRun {
    pub task: Task,
    pub plan: Arc<ExecutionPlan>,
    pub groups: Vec<Vec<StepId>>,
    pub ctx: ExecutionContext,
    /// Alternative plan id, when this is a fallback run.
    pub fallback: Option<String>,
}

pub struct HandleState {
    pub status: RunStatus,
    pub parked: Option<ParkedRun>,
    /// Progress as of the last group boundary.
    pub progress: TaskMetadata,
}

pub struct RunHandle {
    pub id: RunId,
    pub task_id: String,
    /// Checked at group boundaries only.
    pub cancel: CancellationToken,
    pub state: Mutex<HandleState>,
}

impl RunHandle {
    fn new(id: RunId, task_id: String) -> Self {
        Self {
            id,
            task_id,
            cancel: CancellationToken::new(),
            state: Mutex::new(HandleState {
                status: RunStatus::NotStarted,
                parked: None,
                progress: TaskMetadata::default(),
            }),
        }
    }

    pub async fn status(&self) -> RunStatus {
        self.state.lock().await.status
    }
}

#[derive(Default)]
pub struct RunRegistry {
    active: DashMap<RunId, Arc<RunHandle>>,
    finished: DashMap<RunId, RunStatus>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new run. Fails if the id is active or already finished.
    pub fn insert(&self, id: RunId, task_id: impl Into<String>) -> Result<Arc<RunHandle>> {
        if self.finished.contains_key(&id) {
            return Err(Error::RunExists(id.to_string()));
        }
        match self.active.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(Error::RunExists(id.to_string())),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let handle = Arc::new(RunHandle::new(id, task_id.into()));
                slot.insert(handle.clone());
                Ok(handle)
            }
        }
    }

    pub fn get(&self, id: &RunId) -> Result<Arc<RunHandle>> {
        self.active
            .get(id)
            .map(|h| h.value().clone())
            .ok_or_else(|| Error::RunNotFound(id.to_string()))
    }

    /// Move a run from active to finished.
    pub fn finish(&self, id: &RunId, status: RunStatus) {
        self.finished.insert(id.clone(), status);
        self.active.remove(id);
    }

    pub fn finished_status(&self, id: &RunId) -> Option<RunStatus> {
        self.finished.get(id).map(|s| *s.value())
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn list_active(&self) -> Vec<RunId> {
        let mut ids: Vec<RunId> = self.active.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_rejects_active_and_finished() {
        let registry = RunRegistry::new();
        let id = RunId::new("r1");
        registry.insert(id.clone(), "t").unwrap();
        assert!(matches!(registry.insert(id.clone(), "t"), Err(Error::RunExists(_))));

        registry.finish(&id, RunStatus::Completed);
        assert_eq!(registry.active_count(), 0);
        assert!(matches!(registry.get(&id), Err(Error::RunNotFound(_))));
        assert!(matches!(registry.insert(id.clone(), "t"), Err(Error::RunExists(_))));
        assert_eq!(registry.finished_status(&id), Some(RunStatus::Completed));
    }
}
