use std::{
    path::{Path, PathBuf},
    sync::RwLock,
};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::SandbarConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "sandbar.toml",
    "sandbar.yaml",
    "sandbar.yml",
    "sandbar.json",
];

static DATA_DIR_OVERRIDE: RwLock<Option<PathBuf>> = RwLock::new(None);

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<SandbarConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./sandbar.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/sandbar/sandbar.{toml,yaml,yml,json}` (user-global)
///
/// Returns `SandbarConfig::default()` if no config file is found or the file
/// fails to parse.
pub fn discover_and_load() -> SandbarConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    SandbarConfig::default()
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let config_dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| config_dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/sandbar/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "sandbar").map(|d| d.config_dir().to_path_buf())
}

/// Override the data directory (used by the CLI `--data-dir` flag and tests).
pub fn set_data_dir(dir: PathBuf) {
    let mut guard = DATA_DIR_OVERRIDE
        .write()
        .unwrap_or_else(|e| e.into_inner());
    *guard = Some(dir);
}

/// Directory holding persisted state (context log, file job store).
///
/// Override > platform data dir > `~/.sandbar`.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = DATA_DIR_OVERRIDE
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
    {
        return dir;
    }
    if let Some(dirs) = directories::ProjectDirs::from("", "", "sandbar") {
        return dirs.data_dir().to_path_buf();
    }
    directories::BaseDirs::new()
        .map(|d| d.home_dir().join(".sandbar"))
        .unwrap_or_else(|| PathBuf::from(".sandbar"))
}

/// Apply `SANDBAR_*` environment overrides on top of a loaded config.
pub fn apply_env_overrides(config: &mut SandbarConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

fn apply_env_overrides_with(config: &mut SandbarConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(bind) = lookup("SANDBAR_BIND") {
        config.server.bind = bind;
    }
    if let Some(port) = lookup("SANDBAR_PORT") {
        match port.parse() {
            Ok(port) => config.server.port = port,
            Err(e) => warn!(value = %port, error = %e, "ignoring invalid SANDBAR_PORT"),
        }
    }
    if let Some(workers) = lookup("SANDBAR_WORKERS") {
        match workers.parse() {
            Ok(workers) => config.jobs.workers = workers,
            Err(e) => warn!(value = %workers, error = %e, "ignoring invalid SANDBAR_WORKERS"),
        }
    }
    if let Some(backend) = lookup("SANDBAR_SANDBOX_BACKEND") {
        config.sandbox.backend = backend;
    }
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<SandbarConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_each_supported_format() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("sandbar.toml");
        std::fs::write(&toml_path, "[server]\nport = 9001\n").unwrap();
        assert_eq!(load_config(&toml_path).unwrap().server.port, 9001);

        let yaml_path = dir.path().join("sandbar.yaml");
        std::fs::write(&yaml_path, "jobs:\n  workers: 7\n").unwrap();
        assert_eq!(load_config(&yaml_path).unwrap().jobs.workers, 7);

        let json_path = dir.path().join("sandbar.json");
        std::fs::write(&json_path, r#"{"context": {"max_tokens": 10}}"#).unwrap();
        assert_eq!(load_config(&json_path).unwrap().context.max_tokens, 10);
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sandbar.ini");
        std::fs::write(&path, "port=1").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(&dir.path().join("nope.toml")).is_err());
    }

    #[test]
    fn env_overrides_apply_and_skip_garbage() {
        let mut cfg = SandbarConfig::default();
        apply_env_overrides_with(&mut cfg, |name| match name {
            "SANDBAR_BIND" => Some("0.0.0.0".into()),
            "SANDBAR_PORT" => Some("not-a-port".into()),
            "SANDBAR_WORKERS" => Some("9".into()),
            "SANDBAR_SANDBOX_BACKEND" => Some("host".into()),
            _ => None,
        });
        assert_eq!(cfg.server.bind, "0.0.0.0");
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.jobs.workers, 9);
        assert_eq!(cfg.sandbox.backend, "host");
    }
}
