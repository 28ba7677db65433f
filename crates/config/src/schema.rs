//! Config schema types (server, sandbox, dispatch, jobs, context).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SandbarConfig {
    pub server: ServerConfig,
    pub sandbox: SandboxConfig,
    pub dispatch: DispatchConfig,
    pub jobs: JobsConfig,
    pub context: ContextConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8080,
        }
    }
}

/// Resource limits for container-backed sandboxes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimitsConfig {
    /// Memory limit (e.g. "512M", "1G").
    pub memory_limit: Option<String>,
    /// CPU quota as a fraction (e.g. 0.5 = half a core, 2.0 = two cores).
    pub cpu_quota: Option<f64>,
    /// Maximum number of PIDs.
    pub pids_max: Option<u32>,
}

/// Settings used only by the `docker` backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    pub image: Option<String>,
    pub container_prefix: Option<String>,
    pub no_network: bool,
    pub resource_limits: ResourceLimitsConfig,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            image: None,
            container_prefix: None,
            no_network: true,
            resource_limits: ResourceLimitsConfig::default(),
        }
    }
}

/// Sandbox lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Backend: `"auto"` (default), `"docker"`, or `"host"`.
    /// `"auto"` uses docker when the daemon is reachable, host otherwise.
    pub backend: String,
    /// Parent directory for per-sandbox working directories.
    /// Defaults to `<tmp>/sandbar_sandboxes`.
    pub root_dir: Option<PathBuf>,
    /// Filesystem image cloned into every sandbox as `rootfs.ext4`.
    pub base_image: Option<PathBuf>,
    /// Fail `spawn` instead of writing an empty placeholder when the base
    /// image is missing.
    pub require_base_image: bool,
    pub container: ContainerConfig,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            backend: "auto".into(),
            root_dir: None,
            base_image: Some(PathBuf::from("ubuntu-22.04.ext4")),
            require_base_image: false,
            container: ContainerConfig::default(),
        }
    }
}

/// Per-kind execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Kill a snippet after this many seconds. Unset means no timeout.
    pub timeout_secs: Option<u64>,
    pub max_output_bytes: usize,
    /// Interpreter for the `python` kind.
    pub python: String,
    /// Candidate runtimes for the `typescript` kind, tried in order.
    /// Each entry is a program followed by its arguments; the script path is
    /// appended.
    pub typescript_runtimes: Vec<Vec<String>>,
    /// `DISPLAY` exported to `gui` jobs.
    pub gui_display: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            max_output_bytes: 200 * 1024,
            python: "python3".into(),
            typescript_runtimes: vec![
                vec!["deno".into(), "run".into(), "--allow-all".into()],
                vec!["ts-node".into()],
            ],
            gui_display: ":1".into(),
        }
    }
}

/// Job registry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Maximum number of jobs executing at once.
    pub workers: usize,
    /// `"memory"` (default) or `"file"`.
    pub store: String,
    /// Path of the JSON file used by the `file` store.
    /// Defaults to `<data_dir>/jobs.json`.
    pub store_path: Option<PathBuf>,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            store: "memory".into(),
            store_path: None,
        }
    }
}

/// Context log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// JSONL file path. Defaults to `<data_dir>/history.jsonl`.
    pub path: Option<PathBuf>,
    /// Approximate token budget for retained history.
    pub max_tokens: usize,
    /// Average bytes per token used to turn `max_tokens` into a byte budget.
    pub bytes_per_token: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_tokens: 32_000,
            bytes_per_token: 4,
        }
    }
}

impl ContextConfig {
    pub fn budget_bytes(&self) -> u64 {
        self.max_tokens.saturating_mul(self.bytes_per_token) as u64
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = SandbarConfig::default();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.sandbox.backend, "auto");
        assert!(!cfg.sandbox.require_base_image);
        assert_eq!(cfg.jobs.workers, 4);
        assert_eq!(cfg.context.budget_bytes(), 128_000);
        assert_eq!(cfg.dispatch.typescript_runtimes.len(), 2);
        assert_eq!(cfg.dispatch.typescript_runtimes[0][0], "deno");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: SandbarConfig = toml::from_str(
            r#"
            [jobs]
            workers = 2

            [sandbox]
            backend = "host"
            require_base_image = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.jobs.workers, 2);
        assert_eq!(cfg.jobs.store, "memory");
        assert_eq!(cfg.sandbox.backend, "host");
        assert!(cfg.sandbox.require_base_image);
        assert!(cfg.sandbox.container.no_network);
        assert_eq!(cfg.server.bind, "127.0.0.1");
    }
}
