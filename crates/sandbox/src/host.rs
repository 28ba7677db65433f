use std::path::PathBuf;

use {async_trait::async_trait, sandbar_common::ExecResult, tracing::debug};

use crate::{
    error::Result,
    exec::{ExecOpts, run_process},
    handle::SandboxHandle,
    provider::SandboxProvider,
};

/// Runs commands directly on the host inside the sandbox workdir.
///
/// Only the working directory is isolated. Meant for development and for
/// machines without a container runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostProvider;

#[async_trait]
impl SandboxProvider for HostProvider {
    fn backend_name(&self) -> &'static str {
        "host"
    }

    async fn spawn(&self, handle: &SandboxHandle) -> Result<()> {
        debug!(sandbox_id = %handle.id, "host sandbox ready");
        Ok(())
    }

    async fn exec(
        &self,
        handle: &SandboxHandle,
        argv: &[String],
        opts: &ExecOpts,
    ) -> Result<ExecResult> {
        let mut opts = opts.clone();
        if opts.working_dir.is_none() {
            opts.working_dir = Some(handle.workdir.clone());
        }
        run_process(argv, &opts).await
    }

    async fn has_program(&self, _handle: &SandboxHandle, program: &str) -> bool {
        which::which(program).is_ok()
    }

    fn guest_workdir(&self, handle: &SandboxHandle) -> PathBuf {
        handle.workdir.clone()
    }

    async fn terminate(&self, _handle: &SandboxHandle) -> Result<()> {
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn handle_in(dir: &std::path::Path) -> SandboxHandle {
        SandboxHandle::allocate(dir)
    }

    #[tokio::test]
    async fn exec_defaults_to_workdir() {
        let root = tempfile::tempdir().unwrap();
        let handle = handle_in(root.path());
        std::fs::create_dir_all(&handle.workdir).unwrap();

        let argv = vec!["sh".to_string(), "-c".to_string(), "pwd".to_string()];
        let result = HostProvider
            .exec(&handle, &argv, &ExecOpts::default())
            .await
            .unwrap();
        assert_eq!(
            std::path::Path::new(result.stdout.trim())
                .canonicalize()
                .unwrap(),
            handle.workdir.canonicalize().unwrap()
        );
    }

    #[tokio::test]
    async fn has_program_resolves_path() {
        let root = tempfile::tempdir().unwrap();
        let handle = handle_in(root.path());
        assert!(HostProvider.has_program(&handle, "sh").await);
        assert!(
            !HostProvider
                .has_program(&handle, "sandbar-no-such-program")
                .await
        );
    }
}
