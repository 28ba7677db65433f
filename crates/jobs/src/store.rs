//! Persistence trait for job records.

use async_trait::async_trait;

use crate::{
    error::Result,
    types::{JobRecord, Transition},
};

/// Backend holding job records. Records are never deleted.
///
/// Transition validation lives in [`JobRecord::apply`]; stores call it under
/// whatever exclusion they use so a record has exactly one writer at a time.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new record. Fails if the id is already present.
    async fn insert(&self, record: JobRecord) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<JobRecord>>;

    /// Apply `transition` to the record and return the updated copy.
    async fn transition(&self, id: &str, transition: Transition) -> Result<JobRecord>;

    /// Up to `limit` records, newest first.
    async fn list(&self, limit: usize) -> Result<Vec<JobRecord>>;
}
