use std::path::PathBuf;

use {
    async_trait::async_trait,
    sandbar_common::{ExecResult, JobKind},
    sandbar_sandbox::{ActiveSandbox, ExecOpts},
    tracing::{debug, info},
};

use crate::{
    error::Result,
    executor::{KindExecutor, write_script},
};

pub const NO_RUNTIME_MESSAGE: &str = "No TypeScript runtime (deno/ts-node) found";

/// Tries candidate runtimes in order until one is actually present.
///
/// Each candidate is a program plus leading arguments; the script path is
/// appended. A candidate is skipped when its program is absent from the
/// sandbox or when running it reports that the runtime program itself could
/// not be found. Any other outcome, including a non-zero exit, is the job's
/// result.
pub struct TypescriptExecutor {
    candidates: Vec<Vec<String>>,
    opts: ExecOpts,
}

impl TypescriptExecutor {
    pub fn new(candidates: Vec<Vec<String>>, opts: ExecOpts) -> Self {
        Self { candidates, opts }
    }
}

/// Whether a failed run means the runtime itself is missing, as opposed to
/// the snippet failing. The exit code alone proves nothing: a snippet may
/// exit 127 on its own.
fn runtime_missing(program: &str, result: &ExecResult) -> bool {
    if result.exit_code == 0 {
        return false;
    }
    result.stderr.contains(&format!("{program}: not found"))
        || result.stderr.contains(&format!("{program}: command not found"))
}

#[async_trait]
impl KindExecutor for TypescriptExecutor {
    fn kind(&self) -> JobKind {
        JobKind::Typescript
    }

    async fn execute(&self, sandbox: &ActiveSandbox, snippet: &str) -> Result<ExecResult> {
        let mut script: Option<(tempfile::NamedTempFile, PathBuf)> = None;

        for candidate in &self.candidates {
            let Some(program) = candidate.first() else {
                continue;
            };
            if !sandbox.has_program(program).await {
                debug!(sandbox_id = sandbox.id(), program = %program, "typescript runtime absent");
                continue;
            }

            // Written once, on the first runtime that is present.
            let guest_path = match &script {
                Some((_, path)) => path.clone(),
                None => {
                    let (file, path) = write_script(sandbox, snippet, ".ts")?;
                    script = Some((file, path.clone()));
                    path
                },
            };

            let mut argv = candidate.clone();
            argv.push(guest_path.display().to_string());
            let result = sandbox.exec(&argv, &self.opts).await?;

            if runtime_missing(program, &result) {
                info!(
                    sandbox_id = sandbox.id(),
                    program = %program,
                    exit_code = result.exit_code,
                    "typescript runtime not usable, trying next"
                );
                continue;
            }
            return Ok(result);
        }

        Ok(ExecResult::failure(1, NO_RUNTIME_MESSAGE))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn result(exit_code: i32, stderr: &str) -> ExecResult {
        ExecResult {
            stdout: String::new(),
            stderr: stderr.to_string(),
            exit_code,
        }
    }

    #[rstest]
    #[case(0, "deno: command not found", false)]
    #[case(127, "", false)]
    #[case(127, "sh: 1: jq: not found", false)]
    #[case(1, "command not found", false)]
    #[case(1, "bash: deno: command not found", true)]
    #[case(2, "sh: 1: deno: not found", true)]
    #[case(1, "error: Uncaught ReferenceError: x is not defined", false)]
    #[case(1, "ts-node: not found", false)]
    fn classifies_missing_runtime(
        #[case] exit_code: i32,
        #[case] stderr: &str,
        #[case] missing: bool,
    ) {
        assert_eq!(runtime_missing("deno", &result(exit_code, stderr)), missing);
    }
}
