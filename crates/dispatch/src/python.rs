use {
    async_trait::async_trait,
    sandbar_common::{ExecResult, JobKind},
    sandbar_sandbox::{ActiveSandbox, ExecOpts},
    tracing::debug,
};

use crate::{
    error::Result,
    executor::{KindExecutor, write_script},
};

/// Writes the snippet to a `.py` file in the workdir and runs the
/// configured interpreter on it.
pub struct PythonExecutor {
    interpreter: String,
    opts: ExecOpts,
}

impl PythonExecutor {
    pub fn new(interpreter: impl Into<String>, opts: ExecOpts) -> Self {
        Self {
            interpreter: interpreter.into(),
            opts,
        }
    }
}

#[async_trait]
impl KindExecutor for PythonExecutor {
    fn kind(&self) -> JobKind {
        JobKind::Python
    }

    async fn execute(&self, sandbox: &ActiveSandbox, snippet: &str) -> Result<ExecResult> {
        // Held until the process exits; dropping it deletes the script.
        let (_script, guest_path) = write_script(sandbox, snippet, ".py")?;
        debug!(
            sandbox_id = sandbox.id(),
            interpreter = %self.interpreter,
            script = %guest_path.display(),
            "running python snippet"
        );
        let argv = vec![
            self.interpreter.clone(),
            guest_path.display().to_string(),
        ];
        Ok(sandbox.exec(&argv, &self.opts).await?)
    }
}
