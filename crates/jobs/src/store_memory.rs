//! In-memory job store backed by `DashMap`.

use std::sync::RwLock;

use {
    async_trait::async_trait,
    dashmap::{DashMap, mapref::entry::Entry},
};

use crate::{
    error::{Error, Result},
    store::JobStore,
    types::{JobRecord, Transition},
};

/// Jobs live for the lifetime of the process.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: DashMap<String, JobRecord>,
    /// Insertion order, for newest-first listing.
    order: RwLock<Vec<String>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, record: JobRecord) -> Result<()> {
        let id = record.id.clone();
        match self.jobs.entry(id.clone()) {
            Entry::Occupied(_) => return Err(Error::Duplicate { id }),
            Entry::Vacant(slot) => {
                slot.insert(record);
            },
        }
        self.order
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(id);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<JobRecord>> {
        Ok(self.jobs.get(id).map(|r| r.clone()))
    }

    async fn transition(&self, id: &str, transition: Transition) -> Result<JobRecord> {
        let mut record = self.jobs.get_mut(id).ok_or_else(|| Error::not_found(id))?;
        record.apply(transition)?;
        Ok(record.clone())
    }

    async fn list(&self, limit: usize) -> Result<Vec<JobRecord>> {
        let order = self.order.read().unwrap_or_else(|e| e.into_inner());
        Ok(order
            .iter()
            .rev()
            .filter_map(|id| self.jobs.get(id).map(|r| r.clone()))
            .take(limit)
            .collect())
    }
}
