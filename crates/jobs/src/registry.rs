use std::{
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use {
    dashmap::DashMap,
    futures::FutureExt,
    sandbar_common::JobKind,
    sandbar_config::SandbarConfig,
    sandbar_context::ContextStore,
    sandbar_dispatch::Dispatcher,
    sandbar_sandbox::SandboxManager,
    tokio::sync::{Semaphore, broadcast, watch},
    tokio_util::task::TaskTracker,
    tracing::{debug, error, info, warn},
};

use crate::{
    error::{Error, Result},
    store::JobStore,
    store_file::FileJobStore,
    store_memory::InMemoryJobStore,
    types::{JobEvent, JobRecord, JobState, JobStatus, Transition},
};

const EVENT_CAPACITY: usize = 256;

/// Schedules jobs and runs them out-of-band on a bounded pool.
///
/// Cloning is cheap; clones share the same store, pool and event stream.
#[derive(Clone)]
pub struct JobRegistry {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn JobStore>,
    dispatcher: Arc<Dispatcher>,
    sandboxes: Arc<SandboxManager>,
    context: Option<ContextStore>,
    permits: Arc<Semaphore>,
    workers: usize,
    tracker: TaskTracker,
    events: broadcast::Sender<JobEvent>,
    completions: DashMap<String, watch::Sender<Option<JobRecord>>>,
    accepting: AtomicBool,
}

pub struct JobRegistryBuilder {
    dispatcher: Arc<Dispatcher>,
    sandboxes: Arc<SandboxManager>,
    store: Arc<dyn JobStore>,
    context: Option<ContextStore>,
    workers: usize,
}

impl JobRegistryBuilder {
    #[must_use]
    pub fn store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = store;
        self
    }

    #[must_use]
    pub fn context(mut self, context: ContextStore) -> Self {
        self.context = Some(context);
        self
    }

    /// Maximum number of jobs executing at once. Clamped to at least 1.
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn build(self) -> JobRegistry {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        JobRegistry {
            inner: Arc::new(Inner {
                store: self.store,
                dispatcher: self.dispatcher,
                sandboxes: self.sandboxes,
                context: self.context,
                permits: Arc::new(Semaphore::new(self.workers)),
                workers: self.workers,
                tracker: TaskTracker::new(),
                events,
                completions: DashMap::new(),
                accepting: AtomicBool::new(true),
            }),
        }
    }
}

impl JobRegistry {
    pub fn builder(dispatcher: Arc<Dispatcher>, sandboxes: Arc<SandboxManager>) -> JobRegistryBuilder {
        JobRegistryBuilder {
            dispatcher,
            sandboxes,
            store: Arc::new(InMemoryJobStore::new()),
            context: None,
            workers: 4,
        }
    }

    /// Wire up the store, dispatcher, sandbox manager and context log named
    /// by `config`.
    pub async fn from_config(config: &SandbarConfig) -> Result<Self> {
        let store: Arc<dyn JobStore> = match config.jobs.store.as_str() {
            "file" => {
                let path = config
                    .jobs
                    .store_path
                    .clone()
                    .unwrap_or_else(|| sandbar_config::data_dir().join("jobs.json"));
                info!(path = %path.display(), "job store: file");
                Arc::new(FileJobStore::new(path))
            },
            _ => Arc::new(InMemoryJobStore::new()),
        };

        let registry = Self::builder(
            Arc::new(Dispatcher::from_config(&config.dispatch)),
            Arc::new(SandboxManager::from_config(&config.sandbox).await),
        )
        .store(store)
        .context(ContextStore::from_config(&config.context))
        .workers(config.jobs.workers)
        .build();

        registry.recover_interrupted().await?;
        Ok(registry)
    }

    pub fn workers(&self) -> usize {
        self.inner.workers
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn context(&self) -> Option<&ContextStore> {
        self.inner.context.as_ref()
    }

    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::SeqCst)
    }

    /// Validate `kind`, record the job as `queued`, and hand it to the pool.
    ///
    /// Returns once the record exists; never waits for a sandbox or for the
    /// snippet.
    pub async fn schedule(&self, kind: &str, code: &str) -> Result<String> {
        if !self.is_accepting() {
            return Err(Error::ShuttingDown);
        }
        let kind = self
            .inner
            .dispatcher
            .check_kind(kind)
            .map_err(|e| match e {
                sandbar_dispatch::Error::UnsupportedKind(unsupported) => {
                    Error::UnsupportedKind(unsupported)
                },
                other => Error::Dispatch(other),
            })?;

        let record = JobRecord::new(kind, code);
        let job_id = record.id.clone();
        // Tracked before it becomes visible, so `wait` never sees an
        // untracked non-terminal record of ours.
        let (done, _) = watch::channel(None);
        self.inner.completions.insert(job_id.clone(), done);
        if let Err(e) = self.inner.store.insert(record).await {
            self.inner.completions.remove(&job_id);
            return Err(e);
        }
        self.inner.publish(&job_id, JobState::Queued);
        info!(job_id = %job_id, kind = %kind, "job scheduled");

        self.inner
            .note("user", format!("Scheduled {kind} job {job_id}"))
            .await;

        let inner = Arc::clone(&self.inner);
        let id = job_id.clone();
        let code = code.to_string();
        self.inner
            .tracker
            .spawn(async move { run_job(inner, id, kind, code).await });

        Ok(job_id)
    }

    /// Non-blocking snapshot of a job.
    pub async fn status(&self, job_id: &str) -> Result<Option<JobStatus>> {
        Ok(self.inner.store.get(job_id).await?.map(|r| r.status()))
    }

    pub async fn get(&self, job_id: &str) -> Result<Option<JobRecord>> {
        self.inner.store.get(job_id).await
    }

    /// Up to `limit` records, newest first.
    pub async fn list(&self, limit: usize) -> Result<Vec<JobRecord>> {
        self.inner.store.list(limit).await
    }

    /// Resolve once the job has finished, including its context summary.
    pub async fn wait(&self, job_id: &str) -> Result<JobRecord> {
        let receiver = self
            .inner
            .completions
            .get(job_id)
            .map(|done| done.subscribe());

        let Some(mut receiver) = receiver else {
            // Not scheduled by this process: only a finished record can be
            // waited on.
            return match self.inner.store.get(job_id).await? {
                Some(record) if record.state.is_terminal() => Ok(record),
                Some(record) => Err(Error::message(format!(
                    "job {job_id} is {} and not tracked by this registry",
                    record.state
                ))),
                None => Err(Error::not_found(job_id)),
            };
        };

        match receiver.wait_for(|record| record.is_some()).await {
            Ok(finished) => finished
                .clone()
                .ok_or_else(|| Error::message("completion signalled without a record")),
            // Released without a record: report whatever the store holds.
            Err(_) => self
                .inner
                .store
                .get(job_id)
                .await?
                .ok_or_else(|| Error::not_found(job_id)),
        }
    }

    /// Stream of every state change.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    /// Stop accepting new jobs and wait for in-flight ones to finish.
    pub async fn shutdown(&self) {
        self.inner.accepting.store(false, Ordering::SeqCst);
        self.inner.tracker.close();
        info!(in_flight = self.inner.tracker.len(), "job registry shutting down");
        self.inner.tracker.wait().await;
        info!("job registry drained");
    }

    /// Fail records a previous process left `queued` or `running`.
    pub async fn recover_interrupted(&self) -> Result<usize> {
        let mut recovered = 0;
        for record in self.inner.store.list(usize::MAX).await? {
            if record.state.is_terminal() || self.inner.completions.contains_key(&record.id) {
                continue;
            }
            warn!(job_id = %record.id, state = %record.state, "failing interrupted job");
            self.inner
                .force_fail(&record.id, "interrupted: sandbar restarted before the job finished")
                .await?;
            recovered += 1;
        }
        Ok(recovered)
    }
}

impl Inner {
    fn publish(&self, job_id: &str, state: JobState) {
        // No subscribers is fine.
        let _ = self.events.send(JobEvent {
            job_id: job_id.to_string(),
            state,
        });
    }

    async fn note(&self, role: &str, content: String) {
        let Some(context) = &self.context else {
            return;
        };
        if let Err(e) = context.append(role, &content).await {
            warn!(error = %e, "failed to append context record");
        }
    }

    /// Move a job to `failed` from whatever non-terminal state it is in.
    async fn force_fail(&self, job_id: &str, diagnostic: &str) -> Result<JobRecord> {
        if let Some(record) = self.store.get(job_id).await?
            && record.state == JobState::Queued
        {
            self.store.transition(job_id, Transition::Start).await?;
            self.publish(job_id, JobState::Running);
        }
        let record = self
            .store
            .transition(job_id, Transition::Fail {
                diagnostic: diagnostic.to_string(),
            })
            .await?;
        self.publish(job_id, record.state);
        Ok(record)
    }

    async fn execute(&self, job_id: &str, kind: JobKind, code: &str) -> Result<JobRecord> {
        self.store.transition(job_id, Transition::Start).await?;
        self.publish(job_id, JobState::Running);
        debug!(job_id, kind = %kind, "job running");

        let dispatcher = &self.dispatcher;
        let outcome = self
            .sandboxes
            .with_sandbox(|sandbox| async move {
                debug!(job_id, sandbox_id = sandbox.id(), "sandbox acquired");
                dispatcher.execute(&sandbox, kind, code).await
            })
            .await;

        let transition = match outcome {
            Ok(result) => Transition::Finish(result),
            Err(e) => {
                warn!(job_id, kind = %kind, error = %e, "job infrastructure failure");
                Transition::Fail {
                    diagnostic: e.to_string(),
                }
            },
        };
        let record = self.store.transition(job_id, transition).await?;
        self.publish(job_id, record.state);
        Ok(record)
    }
}

async fn run_job(inner: Arc<Inner>, job_id: String, kind: JobKind, code: String) {
    let permit = Arc::clone(&inner.permits).acquire_owned().await;
    let record = match permit {
        Ok(_permit) => {
            let attempt = AssertUnwindSafe(inner.execute(&job_id, kind, &code))
                .catch_unwind()
                .await;
            match attempt {
                Ok(Ok(record)) => Ok(record),
                Ok(Err(e)) => {
                    error!(job_id = %job_id, error = %e, "job bookkeeping failed");
                    inner.force_fail(&job_id, &e.to_string()).await
                },
                Err(_) => {
                    error!(job_id = %job_id, "job execution panicked");
                    inner.force_fail(&job_id, "job execution panicked").await
                },
            }
        },
        Err(_) => inner.force_fail(&job_id, "worker pool closed").await,
    };

    let record = match record {
        Ok(record) => record,
        Err(e) => {
            error!(job_id = %job_id, error = %e, "could not record job outcome");
            // Release waiters with whatever the store holds.
            let current = inner.store.get(&job_id).await.ok().flatten();
            if let Some((_, done)) = inner.completions.remove(&job_id) {
                done.send_replace(current);
            }
            return;
        },
    };

    info!(
        job_id = %job_id,
        state = %record.state,
        exit_code = ?record.exit_code,
        "job finished"
    );
    inner
        .note(
            "assistant",
            format!("Job {job_id} completed with state={}", record.state),
        )
        .await;

    // Later waiters read the terminal record from the store.
    if let Some((_, done)) = inner.completions.remove(&job_id) {
        done.send_replace(Some(record));
    }
}
