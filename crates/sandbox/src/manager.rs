use std::{
    future::Future,
    panic::AssertUnwindSafe,
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    futures::FutureExt,
    sandbar_common::ExecResult,
    sandbar_config::SandboxConfig,
    tracing::{debug, info, warn},
};

use crate::{
    error::{Context, Error, Result},
    exec::{ExecOpts, shell_argv},
    handle::{SandboxHandle, SandboxState},
    provider::{SandboxProvider, create_provider},
};

/// Owns the create/use/destroy contract for sandboxes.
pub struct SandboxManager {
    root: PathBuf,
    base_image: Option<PathBuf>,
    require_base_image: bool,
    provider: Arc<dyn SandboxProvider>,
}

impl SandboxManager {
    pub fn new(root: impl Into<PathBuf>, provider: Arc<dyn SandboxProvider>) -> Self {
        Self {
            root: root.into(),
            base_image: None,
            require_base_image: false,
            provider,
        }
    }

    /// Resolve the provider named by `config`; `auto` probes for docker.
    pub async fn from_config(config: &SandboxConfig) -> Self {
        let root = config.root_dir.clone().unwrap_or_else(Self::default_root);
        Self::new(root, create_provider(config).await)
            .with_base_image(config.base_image.clone(), config.require_base_image)
    }

    /// Image cloned into each sandbox. With `required`, a missing image fails
    /// `spawn` instead of producing an empty placeholder.
    #[must_use]
    pub fn with_base_image(mut self, image: Option<PathBuf>, required: bool) -> Self {
        self.base_image = image;
        self.require_base_image = required;
        self
    }

    pub fn default_root() -> PathBuf {
        std::env::temp_dir().join("sandbar_sandboxes")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn provider(&self) -> &Arc<dyn SandboxProvider> {
        &self.provider
    }

    pub fn backend_name(&self) -> &'static str {
        self.provider.backend_name()
    }

    /// Allocate a sandbox: lay out `<root>/<id>/{rootfs.ext4, control.sock}`
    /// and start provider resources.
    pub async fn spawn(&self) -> Result<SandboxHandle> {
        let mut handle = SandboxHandle::allocate(&self.root);
        tokio::fs::create_dir_all(&handle.workdir)
            .await
            .with_context(|| format!("failed to create {}", handle.workdir.display()))?;

        match self.prepare(&handle).await {
            Ok(()) => {
                handle.state = SandboxState::Ready;
                info!(
                    sandbox_id = %handle.id,
                    backend = self.provider.backend_name(),
                    "sandbox ready"
                );
                Ok(handle)
            },
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_dir_all(&handle.workdir).await {
                    warn!(sandbox_id = %handle.id, error = %cleanup, "failed to remove workdir after spawn failure");
                }
                Err(e)
            },
        }
    }

    async fn prepare(&self, handle: &SandboxHandle) -> Result<()> {
        self.install_rootfs(handle).await?;
        tokio::fs::File::create(&handle.control_socket).await?;
        self.provider.spawn(handle).await
    }

    async fn install_rootfs(&self, handle: &SandboxHandle) -> Result<()> {
        let rootfs = handle.rootfs();
        match &self.base_image {
            Some(image) if tokio::fs::try_exists(image).await.unwrap_or(false) => {
                tokio::fs::copy(image, &rootfs)
                    .await
                    .with_context(|| format!("failed to copy base image {}", image.display()))?;
                debug!(sandbox_id = %handle.id, image = %image.display(), "base image copied");
            },
            Some(image) if self.require_base_image => {
                return Err(Error::BaseImageMissing {
                    path: image.clone(),
                });
            },
            None if self.require_base_image => {
                return Err(Error::message(
                    "require_base_image is set but no base image is configured",
                ));
            },
            missing => {
                warn!(
                    sandbox_id = %handle.id,
                    image = ?missing,
                    "base image not found, using empty rootfs placeholder"
                );
                tokio::fs::File::create(&rootfs).await?;
            },
        }
        Ok(())
    }

    /// Release provider resources and remove the workdir.
    ///
    /// The workdir is removed even when provider teardown fails; the provider
    /// error is returned afterwards and the handle stays non-terminated so a
    /// later call retries it. Idempotent: a terminated handle or a vanished
    /// workdir is not an error.
    pub async fn terminate(&self, handle: &mut SandboxHandle) -> Result<()> {
        if handle.is_terminated() {
            return Ok(());
        }
        let provider_result = self.provider.terminate(handle).await;
        match tokio::fs::remove_dir_all(&handle.workdir).await {
            Ok(()) => {},
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => {
                if let Err(provider_err) = &provider_result {
                    warn!(sandbox_id = %handle.id, error = %provider_err, "provider teardown failed");
                }
                return Err(e.into());
            },
        }
        if let Err(e) = provider_result {
            warn!(sandbox_id = %handle.id, error = %e, "provider teardown failed, workdir removed");
            return Err(e);
        }
        handle.state = SandboxState::Terminated;
        debug!(sandbox_id = %handle.id, "sandbox terminated");
        Ok(())
    }

    /// Run `work` with a fresh sandbox and tear it down afterwards.
    ///
    /// Teardown happens when `work` returns, fails, or panics (the panic is
    /// resumed after cleanup). If the returned future is dropped before it
    /// completes, the workdir is removed synchronously and provider teardown
    /// is handed to the current runtime.
    pub async fn with_sandbox<F, Fut, T, E>(&self, work: F) -> std::result::Result<T, E>
    where
        F: FnOnce(ActiveSandbox) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<Error>,
    {
        let mut handle = self.spawn().await?;
        let guard = TeardownGuard {
            handle: Some(handle.clone()),
            provider: Arc::clone(&self.provider),
        };
        let active = ActiveSandbox {
            handle: handle.clone(),
            provider: Arc::clone(&self.provider),
        };

        let outcome = AssertUnwindSafe(async move { work(active).await })
            .catch_unwind()
            .await;
        let teardown = self.terminate(&mut handle).await;
        guard.disarm();

        match (outcome, teardown) {
            (Err(panic), teardown) => {
                if let Err(e) = teardown {
                    warn!(sandbox_id = %handle.id, error = %e, "sandbox teardown failed");
                }
                std::panic::resume_unwind(panic)
            },
            (Ok(Ok(value)), Ok(())) => Ok(value),
            (Ok(Ok(_)), Err(e)) => Err(e.into()),
            (Ok(Err(e)), teardown) => {
                if let Err(td) = teardown {
                    warn!(sandbox_id = %handle.id, error = %td, "sandbox teardown failed");
                }
                Err(e)
            },
        }
    }
}

/// Cleans up a sandbox whose scope ended without reaching normal teardown.
struct TeardownGuard {
    handle: Option<SandboxHandle>,
    provider: Arc<dyn SandboxProvider>,
}

impl TeardownGuard {
    fn disarm(mut self) {
        self.handle = None;
    }
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        warn!(sandbox_id = %handle.id, "sandbox scope dropped, forcing teardown");
        match std::fs::remove_dir_all(&handle.workdir) {
            Ok(()) => {},
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => {
                warn!(sandbox_id = %handle.id, error = %e, "failed to remove sandbox workdir");
            },
        }
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                let provider = Arc::clone(&self.provider);
                rt.spawn(async move {
                    if let Err(e) = provider.terminate(&handle).await {
                        warn!(sandbox_id = %handle.id, error = %e, "deferred sandbox teardown failed");
                    }
                });
            },
            Err(_) => {
                warn!(sandbox_id = %handle.id, "no runtime available, provider resources leaked");
            },
        }
    }
}

/// A ready sandbox lent to a scoped unit of work.
#[derive(Clone)]
pub struct ActiveSandbox {
    handle: SandboxHandle,
    provider: Arc<dyn SandboxProvider>,
}

impl ActiveSandbox {
    pub fn handle(&self) -> &SandboxHandle {
        &self.handle
    }

    pub fn id(&self) -> &str {
        &self.handle.id
    }

    /// Host-side working directory, for writing files the guest will read.
    pub fn workdir(&self) -> &Path {
        &self.handle.workdir
    }

    /// Translate a path relative to the workdir into its guest location.
    pub fn guest_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.provider.guest_workdir(&self.handle).join(relative)
    }

    pub fn backend_name(&self) -> &'static str {
        self.provider.backend_name()
    }

    /// Run `argv` in the sandbox, defaulting the working directory to the
    /// guest workdir.
    pub async fn exec(&self, argv: &[String], opts: &ExecOpts) -> Result<ExecResult> {
        let mut opts = opts.clone();
        if opts.working_dir.is_none() {
            opts.working_dir = Some(self.provider.guest_workdir(&self.handle));
        }
        self.provider.exec(&self.handle, argv, &opts).await
    }

    pub async fn exec_shell(&self, command: &str, opts: &ExecOpts) -> Result<ExecResult> {
        self.exec(&shell_argv(command), opts).await
    }

    pub async fn has_program(&self, program: &str) -> bool {
        self.provider.has_program(&self.handle, program).await
    }
}
