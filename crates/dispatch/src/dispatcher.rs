use std::{collections::HashMap, sync::Arc};

use {
    sandbar_common::{ExecResult, JobKind},
    sandbar_config::DispatchConfig,
    sandbar_sandbox::{ActiveSandbox, SandboxManager},
    tracing::{debug, info},
};

use crate::{
    error::{Error, Result},
    executor::{KindExecutor, exec_opts},
    gui::GuiExecutor,
    python::PythonExecutor,
    shell::ShellExecutor,
    typescript::TypescriptExecutor,
};

/// Kind → executor table.
#[derive(Default, Clone)]
pub struct Dispatcher {
    executors: HashMap<JobKind, Arc<dyn KindExecutor>>,
}

impl Dispatcher {
    /// An empty dispatcher. Every kind is unsupported until registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// A dispatcher with the built-in executor for every kind.
    pub fn from_config(config: &DispatchConfig) -> Self {
        let opts = exec_opts(config);
        let mut dispatcher = Self::new();
        dispatcher.register(Arc::new(ShellExecutor::new(opts.clone())));
        dispatcher.register(Arc::new(PythonExecutor::new(
            config.python.clone(),
            opts.clone(),
        )));
        dispatcher.register(Arc::new(TypescriptExecutor::new(
            config.typescript_runtimes.clone(),
            opts.clone(),
        )));
        dispatcher.register(Arc::new(GuiExecutor::new(config.gui_display.clone(), opts)));
        dispatcher
    }

    /// Install `executor` for its kind, returning the one it replaces.
    pub fn register(&mut self, executor: Arc<dyn KindExecutor>) -> Option<Arc<dyn KindExecutor>> {
        self.executors.insert(executor.kind(), executor)
    }

    pub fn supports(&self, kind: JobKind) -> bool {
        self.executors.contains_key(&kind)
    }

    /// Registered kinds in declaration order.
    pub fn kinds(&self) -> Vec<JobKind> {
        JobKind::ALL
            .into_iter()
            .filter(|k| self.supports(*k))
            .collect()
    }

    /// Parse a kind string and make sure an executor is registered for it.
    pub fn check_kind(&self, kind: &str) -> Result<JobKind> {
        let parsed: JobKind = kind.parse()?;
        if !self.supports(parsed) {
            return Err(Error::unsupported(kind));
        }
        Ok(parsed)
    }

    /// Run `snippet` in an already acquired sandbox.
    pub async fn execute(
        &self,
        sandbox: &ActiveSandbox,
        kind: JobKind,
        snippet: &str,
    ) -> Result<ExecResult> {
        let executor = self
            .executors
            .get(&kind)
            .ok_or_else(|| Error::unsupported(kind.as_str()))?;
        debug!(kind = %kind, sandbox_id = sandbox.id(), "dispatching snippet");
        let result = executor.execute(sandbox, snippet).await?;
        info!(
            kind = %kind,
            sandbox_id = sandbox.id(),
            exit_code = result.exit_code,
            "snippet finished"
        );
        Ok(result)
    }

    /// Validate `kind`, then run `snippet` in a fresh sandbox that is torn
    /// down afterwards. An unsupported kind never allocates a sandbox.
    pub async fn run_isolated(
        &self,
        manager: &SandboxManager,
        kind: &str,
        snippet: &str,
    ) -> Result<ExecResult> {
        let kind = self.check_kind(kind)?;
        manager
            .with_sandbox(|sandbox| async move { self.execute(&sandbox, kind, snippet).await })
            .await
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::path::Path;

    use {
        super::*,
        crate::NO_RUNTIME_MESSAGE,
        sandbar_sandbox::{SandboxProvider, host::HostProvider},
    };

    fn manager(root: &Path) -> SandboxManager {
        let provider: Arc<dyn SandboxProvider> = Arc::new(HostProvider);
        SandboxManager::new(root.join("boxes"), provider)
    }

    fn workdir_entries(sandbox: &ActiveSandbox) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(sandbox.workdir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn sh(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn shell_captures_streams_separately() {
        let root = tempfile::tempdir().unwrap();
        let dispatcher = Dispatcher::from_config(&DispatchConfig::default());

        let result = dispatcher
            .run_isolated(&manager(root.path()), "shell", "echo hi; echo oops >&2; exit 3")
            .await
            .unwrap();
        assert_eq!(result.stdout, "hi\n");
        assert_eq!(result.stderr, "oops\n");
        assert_eq!(result.exit_code, 3);
        assert!(!result.ok());
    }

    #[tokio::test]
    async fn shell_runs_in_sandbox_workdir() {
        let root = tempfile::tempdir().unwrap();
        let result = Dispatcher::from_config(&DispatchConfig::default())
            .run_isolated(&manager(root.path()), "shell", "ls")
            .await
            .unwrap();
        assert!(result.ok());
        assert!(result.stdout.contains("rootfs.ext4"));
        assert!(result.stdout.contains("control.sock"));
    }

    #[tokio::test]
    async fn unsupported_kind_allocates_nothing() {
        let root = tempfile::tempdir().unwrap();
        let mgr = manager(root.path());
        let dispatcher = Dispatcher::from_config(&DispatchConfig::default());

        let err = dispatcher
            .run_isolated(&mgr, "cobol", "DISPLAY 'HI'")
            .await
            .unwrap_err();
        assert!(err.is_unsupported_kind());
        assert_eq!(err.to_string(), "unsupported job kind: cobol");
        assert!(!mgr.root().exists());
    }

    #[tokio::test]
    async fn unregistered_kind_is_unsupported() {
        let root = tempfile::tempdir().unwrap();
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Arc::new(ShellExecutor::new(Default::default())));

        assert_eq!(dispatcher.kinds(), vec![JobKind::Shell]);
        assert!(dispatcher.check_kind("python").unwrap_err().is_unsupported_kind());
        let err = dispatcher
            .run_isolated(&manager(root.path()), "python", "print(1)")
            .await
            .unwrap_err();
        assert!(err.is_unsupported_kind());
    }

    #[tokio::test]
    async fn python_script_is_removed_afterwards() {
        let root = tempfile::tempdir().unwrap();
        // `sh` stands in for the interpreter: it runs the script file it is given.
        let executor = PythonExecutor::new("sh", Default::default());

        let (result, leftover) = manager(root.path())
            .with_sandbox(|sb| async move {
                let result = executor.execute(&sb, "echo from-script; exit 4").await?;
                Ok::<_, Error>((result, workdir_entries(&sb)))
            })
            .await
            .unwrap();

        assert_eq!(result.stdout, "from-script\n");
        assert_eq!(result.exit_code, 4);
        assert_eq!(leftover, vec!["control.sock", "rootfs.ext4"]);
    }

    #[tokio::test]
    async fn typescript_without_runtimes_reports_fixed_message() {
        let root = tempfile::tempdir().unwrap();
        let executor = TypescriptExecutor::new(
            vec![
                sh(&["sandbar-no-such-runtime-a", "run"]),
                sh(&["sandbar-no-such-runtime-b"]),
            ],
            Default::default(),
        );

        let (result, leftover) = manager(root.path())
            .with_sandbox(|sb| async move {
                let result = executor.execute(&sb, "console.log(1)").await?;
                Ok::<_, Error>((result, workdir_entries(&sb)))
            })
            .await
            .unwrap();

        assert_eq!(result.exit_code, 1);
        assert_eq!(result.stderr, NO_RUNTIME_MESSAGE);
        assert!(result.stdout.is_empty());
        assert_eq!(leftover, vec!["control.sock", "rootfs.ext4"]);
    }

    #[tokio::test]
    async fn typescript_real_error_does_not_fall_through() {
        let root = tempfile::tempdir().unwrap();
        let marker = root.path().join("second-ran");
        let executor = TypescriptExecutor::new(
            vec![
                sh(&["sh"]),
                sh(&["sh", "-c", &format!("touch {}", marker.display()), "runtime"]),
            ],
            Default::default(),
        );

        let result = manager(root.path())
            .with_sandbox(|sb| async move {
                executor.execute(&sb, "echo boom >&2; exit 2").await
            })
            .await
            .unwrap();

        assert_eq!(result.exit_code, 2);
        assert_eq!(result.stderr, "boom\n");
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn typescript_falls_back_when_runtime_not_found() {
        let root = tempfile::tempdir().unwrap();
        let executor = TypescriptExecutor::new(
            vec![
                // A present but broken shim reporting its own program missing.
                sh(&["sh", "-c", "echo 'sh: command not found' >&2; exit 127"]),
                sh(&["sh"]),
            ],
            Default::default(),
        );

        let result = manager(root.path())
            .with_sandbox(|sb| async move { executor.execute(&sb, "echo ran").await })
            .await
            .unwrap();

        assert!(result.ok());
        assert_eq!(result.stdout, "ran\n");
    }

    #[tokio::test]
    async fn typescript_snippet_exiting_127_is_not_retried() {
        let root = tempfile::tempdir().unwrap();
        let runs = root.path().join("runs");
        let executor = TypescriptExecutor::new(vec![sh(&["sh"]), sh(&["sh"])], Default::default());
        let snippet = format!("echo run >> {}; exit 127", runs.display());

        let result = manager(root.path())
            .with_sandbox(|sb| async move { executor.execute(&sb, &snippet).await })
            .await
            .unwrap();

        assert_eq!(result.exit_code, 127);
        assert_ne!(result.stderr, NO_RUNTIME_MESSAGE);
        assert_eq!(std::fs::read_to_string(&runs).unwrap(), "run\n");
    }

    #[tokio::test]
    async fn gui_exports_display() {
        let root = tempfile::tempdir().unwrap();
        let config = DispatchConfig {
            gui_display: ":3".into(),
            ..Default::default()
        };
        let result = Dispatcher::from_config(&config)
            .run_isolated(&manager(root.path()), "gui", "echo $DISPLAY")
            .await
            .unwrap();
        assert_eq!(result.stdout, ":3\n");
    }

    #[tokio::test]
    async fn timeout_is_an_infrastructure_error() {
        let root = tempfile::tempdir().unwrap();
        let config = DispatchConfig {
            timeout_secs: Some(1),
            ..Default::default()
        };
        let err = Dispatcher::from_config(&config)
            .run_isolated(&manager(root.path()), "shell", "sleep 10")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Sandbox(sandbar_sandbox::Error::Timeout { secs: 1 })
        ));
    }
}
