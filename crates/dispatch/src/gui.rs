use {
    async_trait::async_trait,
    sandbar_common::{ExecResult, JobKind},
    sandbar_sandbox::{ActiveSandbox, ExecOpts},
    tracing::debug,
};

use crate::{error::Result, executor::KindExecutor};

/// First line marking a snippet as a list of raw xdotool commands.
pub const XDOTOOL_SHEBANG: &str = "#!xdotool";

/// Join raw xdotool commands into one command line that stops at the first
/// failure.
///
/// ```
/// use sandbar_dispatch::xdot_script;
/// assert_eq!(
///     xdot_script(&["mousemove 400 300", "click 1"]),
///     "xdotool mousemove 400 300 && xdotool click 1"
/// );
/// ```
pub fn xdot_script<S: AsRef<str>>(commands: &[S]) -> String {
    commands
        .iter()
        .map(|c| format!("xdotool {}", c.as_ref().trim()))
        .collect::<Vec<_>>()
        .join(" && ")
}

/// Runs GUI automation as a shell command line with `DISPLAY` exported.
pub struct GuiExecutor {
    opts: ExecOpts,
}

impl GuiExecutor {
    pub fn new(display: impl Into<String>, opts: ExecOpts) -> Self {
        Self {
            opts: opts.with_env("DISPLAY", display),
        }
    }

    fn command_line(snippet: &str) -> String {
        let mut lines = snippet.lines();
        match lines.next() {
            Some(first) if first.trim() == XDOTOOL_SHEBANG => {
                let commands: Vec<&str> = lines.filter(|l| !l.trim().is_empty()).collect();
                xdot_script(&commands)
            },
            _ => snippet.to_string(),
        }
    }
}

#[async_trait]
impl KindExecutor for GuiExecutor {
    fn kind(&self) -> JobKind {
        JobKind::Gui
    }

    async fn execute(&self, sandbox: &ActiveSandbox, snippet: &str) -> Result<ExecResult> {
        let command = Self::command_line(snippet);
        debug!(sandbox_id = sandbox.id(), "running gui snippet");
        Ok(sandbox.exec_shell(&command, &self.opts).await?)
    }
}
