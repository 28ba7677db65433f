use {
    async_trait::async_trait,
    sandbar_common::{ExecResult, JobKind},
    sandbar_sandbox::{ActiveSandbox, ExecOpts},
    tracing::debug,
};

use crate::{error::Result, executor::KindExecutor};

/// Runs the snippet as one `sh -c` command line in the sandbox workdir.
pub struct ShellExecutor {
    opts: ExecOpts,
}

impl ShellExecutor {
    pub fn new(opts: ExecOpts) -> Self {
        Self { opts }
    }
}

#[async_trait]
impl KindExecutor for ShellExecutor {
    fn kind(&self) -> JobKind {
        JobKind::Shell
    }

    async fn execute(&self, sandbox: &ActiveSandbox, snippet: &str) -> Result<ExecResult> {
        debug!(sandbox_id = sandbox.id(), "running shell snippet");
        Ok(sandbox.exec_shell(snippet, &self.opts).await?)
    }
}
