use {
    async_trait::async_trait,
    sandbar_common::{ExecResult, JobKind},
    sandbar_config::DispatchConfig,
    sandbar_sandbox::{ActiveSandbox, ExecOpts},
};

use crate::error::Result;

/// Execution strategy for one job kind.
///
/// A non-zero exit from the snippet is a normal `Ok` result. `Err` is for
/// infrastructure failures only.
#[async_trait]
pub trait KindExecutor: Send + Sync {
    fn kind(&self) -> JobKind;

    async fn execute(&self, sandbox: &ActiveSandbox, snippet: &str) -> Result<ExecResult>;
}

/// Process options shared by every executor.
pub fn exec_opts(config: &DispatchConfig) -> ExecOpts {
    ExecOpts {
        timeout: config.timeout_secs.map(std::time::Duration::from_secs),
        max_output_bytes: config.max_output_bytes,
        ..Default::default()
    }
}

/// Write `snippet` to a temp file in the sandbox workdir.
///
/// The file is removed when the returned value is dropped.
pub(crate) fn write_script(
    sandbox: &ActiveSandbox,
    snippet: &str,
    suffix: &str,
) -> Result<(tempfile::NamedTempFile, std::path::PathBuf)> {
    use std::io::Write;

    let mut file = tempfile::Builder::new()
        .prefix("job_")
        .suffix(suffix)
        .tempfile_in(sandbox.workdir())?;
    file.write_all(snippet.as_bytes())?;
    file.flush()?;

    let name = file
        .path()
        .file_name()
        .map(std::path::PathBuf::from)
        .unwrap_or_default();
    let guest = sandbox.guest_path(name);
    Ok((file, guest))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opts_follow_config() {
        let mut cfg = DispatchConfig::default();
        assert!(exec_opts(&cfg).timeout.is_none());

        cfg.timeout_secs = Some(5);
        cfg.max_output_bytes = 10;
        let opts = exec_opts(&cfg);
        assert_eq!(opts.timeout, Some(std::time::Duration::from_secs(5)));
        assert_eq!(opts.max_output_bytes, 10);
    }
}
