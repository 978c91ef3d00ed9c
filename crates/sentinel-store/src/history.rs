//! Execution history — bounded ring of workflow run snapshots, newest first.

use crate::collection::{load_list, save_list, CollectionStore};
use sentinel_core::{Error, Result, WorkflowRun};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub const HISTORY_COLLECTION: &str = "sentinel.history";
pub const DEFAULT_CAPACITY: usize = 20;

pub struct HistoryStore {
    store: Arc<dyn CollectionStore>,
    capacity: usize,
    runs: RwLock<VecDeque<WorkflowRun>>,
}

impl HistoryStore {
    /// Open the history collection, trimming anything beyond `capacity`.
    pub async fn open(store: Arc<dyn CollectionStore>, capacity: usize) -> Result<Self> {
        let capacity = capacity.max(1);
        let mut runs: VecDeque<WorkflowRun> =
            load_list::<WorkflowRun>(store.as_ref(), HISTORY_COLLECTION).await?.into();
        if runs.len() > capacity {
            warn!(
                "history holds {} snapshots, trimming to {}",
                runs.len(),
                capacity
            );
            runs.truncate(capacity);
        }
        info!("history opened: {} snapshots at {}", runs.len(), store.location(HISTORY_COLLECTION));
        Ok(Self {
            store,
            capacity,
            runs: RwLock::new(runs),
        })
    }

    /// Add a snapshot at the front. Returns the evicted snapshot when full.
    pub async fn append(&self, run: WorkflowRun) -> Result<Option<WorkflowRun>> {
        let mut runs = self.runs.write().await;
        let mut next = runs.clone();
        next.push_front(run);
        let evicted = if next.len() > self.capacity {
            next.pop_back()
        } else {
            None
        };

        let records: Vec<&WorkflowRun> = next.iter().collect();
        save_list(self.store.as_ref(), HISTORY_COLLECTION, &records).await?;
        *runs = next;

        if let Some(old) = &evicted {
            info!(run_id = %old.run_id, "evicted oldest snapshot");
        }
        Ok(evicted)
    }

    /// Snapshots, newest first.
    pub async fn list(&self) -> Vec<WorkflowRun> {
        self.runs.read().await.iter().cloned().collect()
    }

    pub async fn lookup(&self, run_id: &str) -> Result<WorkflowRun> {
        self.runs
            .read()
            .await
            .iter()
            .find(|r| r.run_id == run_id)
            .cloned()
            .ok_or_else(|| Error::RunNotFound(run_id.to_string()))
    }

    pub async fn latest(&self) -> Option<WorkflowRun> {
        self.runs.read().await.front().cloned()
    }

    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
