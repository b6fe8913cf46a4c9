//! Job registry
//!
//! Maps download ids to their current status record. Each id is written by
//! exactly one worker and read by any number of status pollers.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::DownloadJob;

/// Registry errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Download not found: {0}")]
    NotFound(Uuid),

    #[error("Download id already registered: {0}")]
    Duplicate(Uuid),

    #[error("Download already finished: {0}")]
    Terminal(Uuid),
}

/// Process-wide job registry
///
/// Cloning is cheap; clones share the same map. No capacity limit and no
/// eviction: records live for the process lifetime.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<Uuid, DownloadJob>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new job in the Queued state
    pub async fn create(&self, id: Uuid) -> Result<(), RegistryError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        jobs.insert(id, DownloadJob::queued());
        Ok(())
    }

    /// Apply `mutate` to a non-terminal job
    ///
    /// Terminal records are never touched again.
    pub async fn update<F>(&self, id: Uuid, mutate: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&mut DownloadJob),
    {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(RegistryError::NotFound(id))?;
        if job.is_terminal() {
            return Err(RegistryError::Terminal(id));
        }
        mutate(job);
        Ok(())
    }

    /// Snapshot of a job's current record
    pub async fn get(&self, id: Uuid) -> Result<DownloadJob, RegistryError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(RegistryError::NotFound(id))
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}
