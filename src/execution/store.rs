use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::{FlowtrackError, Result};
use crate::execution::record::ExecutionRecord;

/// In-memory registry of execution records, one per remote run.
///
/// Each record sits behind its own mutex, so every mutation is an atomic
/// read-modify-write under a per-id lock. The polling loop and the webhook
/// dispatcher may drive the same record concurrently; the lock is what keeps
/// a last-writer-wins race from corrupting the progress list or resurrecting
/// a terminal record.
#[derive(Debug, Clone, Default)]
pub struct ExecutionStore {
    records: Arc<RwLock<HashMap<String, Arc<Mutex<ExecutionRecord>>>>>,
}

impl ExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new record. `workflow_id` is unique across the store.
    pub async fn insert(&self, record: ExecutionRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.workflow_id) {
            return Err(FlowtrackError::DuplicateWorkflow(record.workflow_id));
        }
        debug!(workflow_id = %record.workflow_id, "tracking new workflow run");
        records.insert(record.workflow_id.clone(), Arc::new(Mutex::new(record)));
        Ok(())
    }

    /// Snapshot of a record, or `None` if the id is not tracked.
    pub async fn get(&self, workflow_id: &str) -> Option<ExecutionRecord> {
        let handle = self.records.read().await.get(workflow_id).cloned()?;
        let record = handle.lock().await;
        Some(record.clone())
    }

    /// Apply a mutation atomically under the record's lock.
    ///
    /// The version counter is bumped on every write, so snapshots taken
    /// before the mutation are detectably stale. Returns `None` when the id
    /// is not tracked.
    pub async fn update<F, T>(&self, workflow_id: &str, mutate: F) -> Option<T>
    where
        F: FnOnce(&mut ExecutionRecord) -> T,
    {
        let handle = self.records.read().await.get(workflow_id).cloned()?;
        let mut record = handle.lock().await;
        let out = mutate(&mut record);
        record.version += 1;
        Some(out)
    }

    /// Administrative purge: drop the record entirely.
    pub async fn remove(&self, workflow_id: &str) -> Option<ExecutionRecord> {
        let handle = self.records.write().await.remove(workflow_id)?;
        let record = handle.lock().await;
        Some(record.clone())
    }

    /// Records still pending or running.
    pub async fn active(&self) -> Vec<ExecutionRecord> {
        self.filtered(|record| record.is_active()).await
    }

    /// Records that reached completed or failed.
    pub async fn terminal(&self) -> Vec<ExecutionRecord> {
        self.filtered(|record| record.is_terminal()).await
    }

    /// Records for a given workflow name.
    pub async fn for_workflow(&self, workflow_name: &str) -> Vec<ExecutionRecord> {
        self.filtered(|record| record.workflow_name == workflow_name)
            .await
    }

    /// Delete terminal records created more than `age` ago. Returns the
    /// number purged.
    pub async fn purge_old(&self, age: Duration) -> usize {
        let cutoff = chrono::Utc::now() - age;
        let mut records = self.records.write().await;
        let mut stale = Vec::new();
        for (id, handle) in records.iter() {
            let record = handle.lock().await;
            if record.is_terminal() && record.created_at < cutoff {
                stale.push(id.clone());
            }
        }
        for id in &stale {
            records.remove(id);
        }
        if !stale.is_empty() {
            debug!(purged = stale.len(), "purged old terminal records");
        }
        stale.len()
    }

    async fn filtered<F>(&self, predicate: F) -> Vec<ExecutionRecord>
    where
        F: Fn(&ExecutionRecord) -> bool,
    {
        let handles: Vec<_> = self.records.read().await.values().cloned().collect();
        let mut matches = Vec::new();
        for handle in handles {
            let record = handle.lock().await;
            if predicate(&record) {
                matches.push(record.clone());
            }
        }
        matches
    }
}
