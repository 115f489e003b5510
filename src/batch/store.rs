//! Batch state storage.
//!
//! The orchestrator only talks to the [`BatchStore`] trait. Records are
//! whole-value snapshots: readers get a clone, writers replace the record.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::debug;

use super::{Batch, BatchParams};
use crate::error::CertError;

#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Register a new pending batch under a fresh id.
    async fn create(&self, params: BatchParams) -> Result<Batch, CertError>;

    async fn get(&self, id: &str) -> Result<Option<Batch>, CertError>;

    /// Insert or fully overwrite the record with `batch.id`.
    async fn put(&self, batch: Batch) -> Result<(), CertError>;
}

#[derive(Debug, Default)]
struct Records {
    batches: HashMap<String, Batch>,
    /// Insertion order, oldest first.
    order: VecDeque<String>,
}

/// Process-lifetime batch registry.
#[derive(Debug, Default)]
pub struct InMemoryBatchStore {
    records: RwLock<Records>,
    capacity: Option<usize>,
}

impl InMemoryBatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that evicts the oldest terminal batch once more than `capacity`
    /// records are held. Batches still running are never evicted.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: RwLock::new(Records::default()),
            capacity: Some(capacity),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.batches.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn evict(&self, records: &mut Records) {
        let Some(capacity) = self.capacity else {
            return;
        };
        while records.batches.len() > capacity {
            let victim = records.order.iter().position(|id| {
                records
                    .batches
                    .get(id)
                    .is_some_and(|batch| batch.status.is_terminal())
            });
            let Some(position) = victim else {
                break;
            };
            if let Some(id) = records.order.remove(position) {
                records.batches.remove(&id);
                debug!(batch_id = %id, "evicted batch record");
            }
        }
    }
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

#[async_trait]
impl BatchStore for InMemoryBatchStore {
    async fn create(&self, params: BatchParams) -> Result<Batch, CertError> {
        let mut records = self.records.write().await;
        let mut millis = now_millis();
        let id = loop {
            let candidate = format!("batch_{}", millis);
            if !records.batches.contains_key(&candidate) {
                break candidate;
            }
            millis += 1;
        };

        let batch = Batch::with_params(id.clone(), params);
        records.order.push_back(id.clone());
        records.batches.insert(id, batch.clone());
        self.evict(&mut records);
        Ok(batch)
    }

    async fn get(&self, id: &str) -> Result<Option<Batch>, CertError> {
        Ok(self.records.read().await.batches.get(id).cloned())
    }

    async fn put(&self, batch: Batch) -> Result<(), CertError> {
        let mut records = self.records.write().await;
        if !records.batches.contains_key(&batch.id) {
            records.order.push_back(batch.id.clone());
        }
        records.batches.insert(batch.id.clone(), batch);
        self.evict(&mut records);
        Ok(())
    }
}
