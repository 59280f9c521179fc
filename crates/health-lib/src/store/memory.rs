//! In-process record store
//!
//! Same contract as the SQLite store without durability across restarts.

use super::{RecordFilter, RecordStore};
use crate::error::StoreError;
use crate::models::{AnalysisRecord, PendingRecord};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct MemoryState {
    last_id: i64,
    records: BTreeMap<i64, AnalysisRecord>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert(&self, record: PendingRecord) -> Result<i64, StoreError> {
        let mut state = self.state.write().await;
        state.last_id += 1;
        let id = state.last_id;
        state
            .records
            .insert(id, AnalysisRecord::from_pending(id, record));
        Ok(id)
    }

    async fn list(&self, filter: &RecordFilter) -> Result<Vec<AnalysisRecord>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .records
            .values()
            .rev()
            .filter(|r| filter.matches(r))
            .take(filter.effective_limit())
            .cloned()
            .collect())
    }

    async fn get(&self, id: i64) -> Result<Option<AnalysisRecord>, StoreError> {
        Ok(self.state.read().await.records.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::healthy_sample;
    use crate::models::Classification;
    use chrono::Utc;

    fn pending(class: u32) -> PendingRecord {
        PendingRecord {
            sample: healthy_sample(),
            classification: Classification {
                predicted_class: class,
                recommendation: String::new(),
            },
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_memory_store_contract() {
        let store = MemoryStore::new();
        assert!(store.is_empty().await);

        let a = store.insert(pending(1)).await.unwrap();
        let b = store.insert(pending(2)).await.unwrap();
        assert!(b > a);

        let listed = store.list(&RecordFilter::default()).await.unwrap();
        assert_eq!(listed.iter().map(|r| r.id).collect::<Vec<_>>(), vec![b, a]);

        let filtered = store
            .list(&RecordFilter {
                predicted_class: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, a);

        assert!(store.get(a).await.unwrap().is_some());
        assert!(store.get(99).await.unwrap().is_none());
    }
}
