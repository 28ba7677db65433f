use std::path::{Path, PathBuf};

use {
    async_trait::async_trait,
    sandbar_common::ExecResult,
    sandbar_config::ContainerConfig,
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    exec::{ExecOpts, run_process},
    handle::SandboxHandle,
    provider::SandboxProvider,
};

pub const DEFAULT_SANDBOX_IMAGE: &str = "ubuntu:22.04";
pub const GUEST_WORKDIR: &str = "/workspace";

/// One long-lived container per sandbox handle, with the handle's workdir
/// bind-mounted at [`GUEST_WORKDIR`].
pub struct DockerProvider {
    pub config: ContainerConfig,
}

impl DockerProvider {
    pub fn new(config: ContainerConfig) -> Self {
        Self { config }
    }

    fn image(&self) -> &str {
        self.config
            .image
            .as_deref()
            .unwrap_or(DEFAULT_SANDBOX_IMAGE)
    }

    fn container_prefix(&self) -> &str {
        self.config
            .container_prefix
            .as_deref()
            .unwrap_or("sandbar-sandbox")
    }

    fn container_name(&self, handle: &SandboxHandle) -> String {
        format!("{}-{}", self.container_prefix(), handle.id)
    }

    fn resource_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        let limits = &self.config.resource_limits;
        if let Some(ref mem) = limits.memory_limit {
            args.extend(["--memory".to_string(), mem.clone()]);
        }
        if let Some(cpu) = limits.cpu_quota {
            args.extend(["--cpus".to_string(), cpu.to_string()]);
        }
        if let Some(pids) = limits.pids_max {
            args.extend(["--pids-limit".to_string(), pids.to_string()]);
        }
        args
    }

    fn run_args(&self, handle: &SandboxHandle) -> Vec<String> {
        let mut args = vec![
            "docker".to_string(),
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            self.container_name(handle),
            "-v".to_string(),
            format!("{}:{GUEST_WORKDIR}:rw", handle.workdir.display()),
            "-w".to_string(),
            GUEST_WORKDIR.to_string(),
        ];
        if self.config.no_network {
            args.push("--network=none".to_string());
        }
        args.extend(self.resource_args());
        args.extend([
            self.image().to_string(),
            "sleep".to_string(),
            "infinity".to_string(),
        ]);
        args
    }

    fn exec_args(&self, handle: &SandboxHandle, argv: &[String], opts: &ExecOpts) -> Vec<String> {
        let mut args = vec!["docker".to_string(), "exec".to_string()];
        let dir = opts
            .working_dir
            .as_deref()
            .unwrap_or(Path::new(GUEST_WORKDIR));
        args.extend(["-w".to_string(), dir.display().to_string()]);
        for (k, v) in &opts.env {
            args.extend(["-e".to_string(), format!("{k}={v}")]);
        }
        args.push(self.container_name(handle));
        args.extend(argv.iter().cloned());
        args
    }
}

#[async_trait]
impl SandboxProvider for DockerProvider {
    fn backend_name(&self) -> &'static str {
        "docker"
    }

    async fn spawn(&self, handle: &SandboxHandle) -> Result<()> {
        let args = self.run_args(handle);
        let result = run_process(&args, &ExecOpts::default())
            .await
            .map_err(|e| Error::backend("docker", format!("docker run failed: {e}")))?;
        if !result.ok() {
            return Err(Error::backend(
                "docker",
                format!("docker run failed: {}", result.stderr.trim()),
            ));
        }
        info!(
            sandbox_id = %handle.id,
            container = %self.container_name(handle),
            image = self.image(),
            "docker sandbox started"
        );
        Ok(())
    }

    async fn exec(
        &self,
        handle: &SandboxHandle,
        argv: &[String],
        opts: &ExecOpts,
    ) -> Result<ExecResult> {
        if argv.is_empty() {
            return Err(Error::message("empty command line"));
        }
        let args = self.exec_args(handle, argv, opts);
        // Directory and environment travel as `docker exec` flags.
        let host_opts = ExecOpts {
            working_dir: None,
            env: Vec::new(),
            ..opts.clone()
        };
        run_process(&args, &host_opts).await
    }

    async fn has_program(&self, handle: &SandboxHandle, program: &str) -> bool {
        let argv = vec![
            "sh".to_string(),
            "-c".to_string(),
            "command -v \"$0\" >/dev/null 2>&1".to_string(),
            program.to_string(),
        ];
        match self.exec(handle, &argv, &ExecOpts::default()).await {
            Ok(result) => result.ok(),
            Err(e) => {
                warn!(sandbox_id = %handle.id, program, error = %e, "program probe failed");
                false
            },
        }
    }

    fn guest_workdir(&self, _handle: &SandboxHandle) -> PathBuf {
        PathBuf::from(GUEST_WORKDIR)
    }

    async fn terminate(&self, handle: &SandboxHandle) -> Result<()> {
        let name = self.container_name(handle);
        let args = vec![
            "docker".to_string(),
            "rm".to_string(),
            "-f".to_string(),
            name.clone(),
        ];
        let result = run_process(&args, &ExecOpts::default())
            .await
            .map_err(|e| Error::backend("docker", format!("docker rm failed: {e}")))?;
        // Removing a container that never started (or is already gone) is fine.
        if !result.ok() && !result.stderr.contains("No such container") {
            return Err(Error::backend(
                "docker",
                format!("docker rm {name} failed: {}", result.stderr.trim()),
            ));
        }
        debug!(sandbox_id = %handle.id, container = %name, "docker sandbox removed");
        Ok(())
    }
}
