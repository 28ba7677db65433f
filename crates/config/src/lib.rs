//! Configuration loading, validation, and env substitution.
//!
//! Config files: `sandbar.toml`, `sandbar.yaml`, or `sandbar.json`.
//! Searched in `./` then the user config directory (`~/.config/sandbar/`).
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{
        apply_env_overrides, config_dir, data_dir, discover_and_load, load_config, set_data_dir,
    },
    schema::{
        ContainerConfig, ContextConfig, DispatchConfig, JobsConfig, ResourceLimitsConfig,
        SandbarConfig, SandboxConfig, ServerConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
