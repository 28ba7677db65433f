//! Semantic validation of a loaded configuration.
//!
//! Parsing already rejects malformed files; this catches values that parse
//! fine but cannot work (zero workers, an empty runtime list, ...).

use std::fmt;

use crate::schema::SandbarConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "jobs.workers"
    pub path: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.severity, self.path, self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn push(&mut self, severity: Severity, path: &str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path: path.to_string(),
            message: message.into(),
        });
    }
}

const KNOWN_BACKENDS: &[&str] = &["auto", "docker", "host"];
const KNOWN_JOB_STORES: &[&str] = &["memory", "file"];

pub fn validate(config: &SandbarConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    if config.jobs.workers == 0 {
        result.push(
            Severity::Error,
            "jobs.workers",
            "must be at least 1, jobs would never run",
        );
    }
    if !KNOWN_JOB_STORES.contains(&config.jobs.store.as_str()) {
        result.push(
            Severity::Error,
            "jobs.store",
            format!(
                "unknown store \"{}\" (expected one of: {})",
                config.jobs.store,
                KNOWN_JOB_STORES.join(", ")
            ),
        );
    }

    if !KNOWN_BACKENDS.contains(&config.sandbox.backend.as_str()) {
        result.push(
            Severity::Error,
            "sandbox.backend",
            format!(
                "unknown backend \"{}\" (expected one of: {})",
                config.sandbox.backend,
                KNOWN_BACKENDS.join(", ")
            ),
        );
    }
    if config.sandbox.require_base_image && config.sandbox.base_image.is_none() {
        result.push(
            Severity::Error,
            "sandbox.require_base_image",
            "set but sandbox.base_image is not configured",
        );
    }
    if config.sandbox.backend == "host" {
        result.push(
            Severity::Warning,
            "sandbox.backend",
            "host backend runs snippets directly on this machine without isolation",
        );
    }

    if config.context.max_tokens == 0 || config.context.bytes_per_token == 0 {
        result.push(
            Severity::Error,
            "context.max_tokens",
            "token budget is zero, every context record would be pruned immediately",
        );
    }

    if config.dispatch.typescript_runtimes.is_empty() {
        result.push(
            Severity::Warning,
            "dispatch.typescript_runtimes",
            "no candidates configured, typescript jobs will always fail",
        );
    }
    if config
        .dispatch
        .typescript_runtimes
        .iter()
        .any(|candidate| candidate.is_empty())
    {
        result.push(
            Severity::Error,
            "dispatch.typescript_runtimes",
            "candidate entries must name a program",
        );
    }
    if config.dispatch.timeout_secs == Some(0) {
        result.push(
            Severity::Error,
            "dispatch.timeout_secs",
            "0 would kill every snippet immediately, remove the key to disable the timeout",
        );
    }
    if config.dispatch.timeout_secs.is_none() {
        result.push(
            Severity::Warning,
            "dispatch.timeout_secs",
            "unset, a snippet that never exits holds its worker forever",
        );
    }

    result
}
