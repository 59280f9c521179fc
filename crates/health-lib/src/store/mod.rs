//! Record store for analysis results
//!
//! Append-only storage of [`AnalysisRecord`]s. Ids are assigned by the
//! store on insert, strictly increase, and are never reused. An insert
//! either commits the whole record or nothing.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use crate::models::{AnalysisRecord, PendingRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Page size when the caller gives none
pub const DEFAULT_LIST_LIMIT: usize = 100;
/// Largest page a caller may ask for
pub const MAX_LIST_LIMIT: usize = 1000;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Commit one record and return its id
    async fn insert(&self, record: PendingRecord) -> Result<i64, StoreError>;

    /// Records matching `filter`, newest first
    async fn list(&self, filter: &RecordFilter) -> Result<Vec<AnalysisRecord>, StoreError>;

    async fn get(&self, id: i64) -> Result<Option<AnalysisRecord>, StoreError>;
}

/// Query over stored records.
///
/// Paging is by id: pass the smallest id of the previous page as
/// `before_id` to get the next one.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RecordFilter {
    pub predicted_class: Option<u32>,
    /// Only records received at or after this instant
    pub since: Option<DateTime<Utc>>,
    pub before_id: Option<i64>,
    pub limit: Option<usize>,
}

impl RecordFilter {
    /// Limit clamped to `1..=MAX_LIST_LIMIT`
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT)
    }

    pub fn matches(&self, record: &AnalysisRecord) -> bool {
        self.predicted_class
            .map_or(true, |c| record.classification.predicted_class == c)
            && self.since.map_or(true, |t| record.received_at >= t)
            && self.before_id.map_or(true, |id| record.id < id)
    }
}
