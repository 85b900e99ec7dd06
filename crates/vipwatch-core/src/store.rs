//! Contract for the profile and detection-log store.

use crate::types::{AnalyticsSummary, DetectionEvent, Profile};
use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The secondary index that analytics queries rely on does not exist.
    #[error("required index '{0}' does not exist on the detection log")]
    IndexMissing(String),
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("store call timed out")]
    Timeout,
}

/// VIP profile CRUD plus the append-only detection log.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, face_id: &str) -> Result<Option<Profile>, StoreError>;

    /// All profiles, sorted by display name.
    async fn list(&self) -> Result<Vec<Profile>, StoreError>;

    async fn upsert(&self, profile: &Profile) -> Result<(), StoreError>;

    async fn delete(&self, face_id: &str) -> Result<(), StoreError>;

    /// Set `lastVisit` without reading the record back.
    async fn touch_last_visit(&self, face_id: &str, timestamp: &str) -> Result<(), StoreError>;

    async fn append_log(&self, event: &DetectionEvent) -> Result<(), StoreError>;

    /// Roll up every event logged on `date`, read through the date index.
    async fn aggregate(&self, date: NaiveDate) -> Result<AnalyticsSummary, StoreError>;

    /// Short backend name for status reporting.
    fn backend(&self) -> &'static str;
}
