use std::{path::PathBuf, sync::Arc};

use {async_trait::async_trait, sandbar_common::ExecResult, sandbar_config::SandboxConfig};

use crate::{
    docker::DockerProvider, error::Result, exec::ExecOpts, handle::SandboxHandle,
    host::HostProvider,
};

/// Backend that isolates a sandbox: starts its resources, runs commands in
/// it, and releases the resources again.
///
/// The manager owns the on-disk workdir. Providers only own what they start.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Human-readable backend name (e.g. "docker", "host").
    fn backend_name(&self) -> &'static str;

    /// Start backend resources for a freshly laid out handle.
    async fn spawn(&self, handle: &SandboxHandle) -> Result<()>;

    /// Run `argv` inside the sandbox. `opts.working_dir` is a guest path.
    async fn exec(
        &self,
        handle: &SandboxHandle,
        argv: &[String],
        opts: &ExecOpts,
    ) -> Result<ExecResult>;

    /// Whether `program` resolves inside the sandbox.
    async fn has_program(&self, handle: &SandboxHandle, program: &str) -> bool;

    /// The handle's workdir as seen from inside the sandbox.
    fn guest_workdir(&self, handle: &SandboxHandle) -> PathBuf;

    /// Release backend resources. Must succeed when nothing is running.
    async fn terminate(&self, handle: &SandboxHandle) -> Result<()>;
}

/// Create the sandbox provider named by `config.backend`.
///
/// `"auto"` (and any unrecognized name) probes for a usable docker daemon
/// and falls back to host execution.
pub async fn create_provider(config: &SandboxConfig) -> Arc<dyn SandboxProvider> {
    match config.backend.as_str() {
        "docker" => Arc::new(DockerProvider::new(config.container.clone())),
        "host" => {
            tracing::warn!("sandbox backend: host (no isolation)");
            Arc::new(HostProvider)
        },
        _ => auto_detect_provider(config).await,
    }
}

async fn auto_detect_provider(config: &SandboxConfig) -> Arc<dyn SandboxProvider> {
    let docker_cli = is_cli_available("docker");
    let docker_daemon = docker_cli && is_docker_daemon_available().await;
    if should_use_docker_backend(docker_cli, docker_daemon) {
        tracing::info!("sandbox backend: docker");
        return Arc::new(DockerProvider::new(config.container.clone()));
    }

    if docker_cli {
        tracing::warn!(
            "docker CLI detected but daemon is not accessible; jobs will run directly on the host"
        );
    }

    tracing::warn!("no usable container runtime found; jobs will run directly on the host");
    Arc::new(HostProvider)
}

fn should_use_docker_backend(docker_cli_available: bool, docker_daemon_available: bool) -> bool {
    docker_cli_available && docker_daemon_available
}

async fn is_docker_daemon_available() -> bool {
    tokio::process::Command::new("docker")
        .args(["info", "--format", "{{.ServerVersion}}"])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
        .is_ok_and(|s| s.success())
}

fn is_cli_available(name: &str) -> bool {
    which::which(name).is_ok()
}
