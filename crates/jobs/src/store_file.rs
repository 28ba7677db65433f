//! JSON file-backed job store with atomic writes.

use std::path::{Path, PathBuf};

use {
    async_trait::async_trait,
    tokio::{fs, sync::Mutex},
    tracing::debug,
};

use crate::{
    error::{Context, Error, Result},
    store::JobStore,
    types::{JobRecord, Transition},
};

/// All records in one JSON array, oldest first.
///
/// Every mutation is a read-modify-write under a process-local mutex, then
/// written to a temp file and renamed over the target. The previous file is
/// kept as `.bak`.
pub struct FileJobStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileJobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<JobRecord>> {
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        let data = fs::read_to_string(&self.path).await?;
        if data.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&data)
            .with_context(|| format!("failed to parse {}", self.path.display()))
    }

    async fn atomic_write(&self, jobs: &[JobRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(jobs)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json.as_bytes()).await?;

        if fs::try_exists(&self.path).await.unwrap_or(false) {
            let bak = self.path.with_extension("json.bak");
            if let Err(e) = fs::copy(&self.path, &bak).await {
                debug!(path = %bak.display(), error = %e, "could not refresh job store backup");
            }
        }

        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn insert(&self, record: JobRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut jobs = self.load().await?;
        if jobs.iter().any(|j| j.id == record.id) {
            return Err(Error::Duplicate { id: record.id });
        }
        jobs.push(record);
        self.atomic_write(&jobs).await
    }

    async fn get(&self, id: &str) -> Result<Option<JobRecord>> {
        let _guard = self.write_lock.lock().await;
        Ok(self.load().await?.into_iter().find(|j| j.id == id))
    }

    async fn transition(&self, id: &str, transition: Transition) -> Result<JobRecord> {
        let _guard = self.write_lock.lock().await;
        let mut jobs = self.load().await?;
        let record = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| Error::not_found(id))?;
        record.apply(transition)?;
        let updated = record.clone();
        self.atomic_write(&jobs).await?;
        Ok(updated)
    }

    async fn list(&self, limit: usize) -> Result<Vec<JobRecord>> {
        let _guard = self.write_lock.lock().await;
        let jobs = self.load().await?;
        Ok(jobs.into_iter().rev().take(limit).collect())
    }
}
