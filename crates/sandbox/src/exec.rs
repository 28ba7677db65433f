use std::{path::PathBuf, process::Stdio, time::Duration};

use {
    sandbar_common::ExecResult,
    tokio::process::Command,
    tracing::{debug, warn},
};

use crate::error::{Error, Result};

/// Options controlling a single process execution.
#[derive(Debug, Clone)]
pub struct ExecOpts {
    /// `None` lets the process run until it exits on its own.
    pub timeout: Option<Duration>,
    pub max_output_bytes: usize,
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl Default for ExecOpts {
    fn default() -> Self {
        Self {
            timeout: None,
            max_output_bytes: 200 * 1024, // 200KB
            working_dir: None,
            env: Vec::new(),
        }
    }
}

impl ExecOpts {
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Run `argv[0]` with the remaining arguments, capturing stdout and stderr.
///
/// A non-zero exit is returned as a normal [`ExecResult`]. Errors are reserved
/// for failures to run the process at all and for timeouts.
pub async fn run_process(argv: &[String], opts: &ExecOpts) -> Result<ExecResult> {
    let Some((program, args)) = argv.split_first() else {
        return Err(Error::message("empty command line"));
    };

    debug!(
        program = %program,
        args = args.len(),
        timeout_secs = ?opts.timeout.map(|t| t.as_secs()),
        "run_process"
    );

    let mut cmd = Command::new(program);
    cmd.args(args);

    if let Some(ref dir) = opts.working_dir {
        cmd.current_dir(dir);
    }
    for (k, v) in &opts.env {
        cmd.env(k, v);
    }

    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    // Prevent the child from inheriting stdin.
    cmd.stdin(Stdio::null());
    // A timed-out child is dropped with the wait future; make sure it dies.
    cmd.kill_on_drop(true);

    let child = cmd.spawn()?;

    let output = match opts.timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!(program = %program, "exec timeout");
                return Err(Error::Timeout {
                    secs: limit.as_secs(),
                });
            },
        },
        None => child.wait_with_output().await?,
    };

    let stdout = truncate_output(
        String::from_utf8_lossy(&output.stdout).into_owned(),
        opts.max_output_bytes,
    );
    let stderr = truncate_output(
        String::from_utf8_lossy(&output.stderr).into_owned(),
        opts.max_output_bytes,
    );
    // Killed by a signal: no exit code.
    let exit_code = output.status.code().unwrap_or(-1);
    debug!(
        exit_code,
        stdout_len = stdout.len(),
        stderr_len = stderr.len(),
        "exec done"
    );

    Ok(ExecResult {
        stdout,
        stderr,
        exit_code,
    })
}

pub(crate) fn shell_argv(command: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), command.to_string()]
}

fn truncate_output(mut text: String, max: usize) -> String {
    if text.len() <= max {
        return text;
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push_str("\n... [output truncated]");
    text
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    async fn exec_command(command: &str, opts: &ExecOpts) -> Result<ExecResult> {
        run_process(&shell_argv(command), opts).await
    }

    #[tokio::test]
    async fn captures_streams_and_exit_code() {
        let result = exec_command("echo out; echo err >&2; exit 3", &ExecOpts::default())
            .await
            .unwrap();
        assert_eq!(result.stdout.trim(), "out");
        assert_eq!(result.stderr.trim(), "err");
        assert_eq!(result.exit_code, 3);
        assert!(!result.ok());
    }

    #[tokio::test]
    async fn runs_in_working_dir_with_env() {
        let dir = tempfile::tempdir().unwrap();
        let opts = ExecOpts {
            working_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        }
        .with_env("SANDBAR_MARKER", "42");
        let result = exec_command("pwd; echo $SANDBAR_MARKER", &opts).await.unwrap();
        let lines: Vec<&str> = result.stdout.lines().collect();
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(
            std::path::Path::new(lines[0]).canonicalize().unwrap(),
            expected
        );
        assert_eq!(lines[1], "42");
    }

    #[tokio::test]
    async fn timeout_is_an_error() {
        let opts = ExecOpts {
            timeout: Some(Duration::from_millis(100)),
            ..Default::default()
        };
        let err = exec_command("sleep 5", &opts).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let argv = vec!["sandbar-definitely-not-installed".to_string()];
        assert!(matches!(
            run_process(&argv, &ExecOpts::default()).await,
            Err(Error::Io(_))
        ));
        assert!(run_process(&[], &ExecOpts::default()).await.is_err());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "ééééé".to_string(); // 10 bytes
        let out = truncate_output(text, 3);
        assert!(out.starts_with('é'));
        assert!(out.ends_with("[output truncated]"));
        assert_eq!(truncate_output("short".into(), 10), "short");
    }
}
