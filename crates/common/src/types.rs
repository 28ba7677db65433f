//! Job kinds and the normalized execution result.

use std::{fmt, str::FromStr};

use {
    serde::{Deserialize, Serialize},
    thiserror::Error,
};

/// The category of snippet a job carries. Determines the execution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Shell,
    Python,
    Typescript,
    /// xdotool-style GUI automation commands.
    Gui,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [Self::Shell, Self::Python, Self::Typescript, Self::Gui];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shell => "shell",
            Self::Python => "python",
            Self::Typescript => "typescript",
            Self::Gui => "gui",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a kind string (or a kind without a registered executor) is
/// requested.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported job kind: {kind}")]
pub struct UnsupportedKind {
    pub kind: String,
}

impl UnsupportedKind {
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }
}

impl FromStr for JobKind {
    type Err = UnsupportedKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shell" => Ok(Self::Shell),
            "python" => Ok(Self::Python),
            "typescript" => Ok(Self::Typescript),
            "gui" => Ok(Self::Gui),
            _ => Err(UnsupportedKind::new(s)),
        }
    }
}

/// Result of running a snippet: separated output streams and the exit code.
///
/// A non-zero exit is a normal outcome here, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecResult {
    pub fn ok(&self) -> bool {
        self.exit_code == 0
    }

    /// A failed result carrying only a diagnostic on stderr.
    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("shell", JobKind::Shell)]
    #[case("python", JobKind::Python)]
    #[case("TypeScript", JobKind::Typescript)]
    #[case(" gui ", JobKind::Gui)]
    fn parses_known_kinds(#[case] raw: &str, #[case] expected: JobKind) {
        assert_eq!(raw.parse::<JobKind>().unwrap(), expected);
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = "ruby".parse::<JobKind>().unwrap_err();
        assert_eq!(err.kind, "ruby");
        assert_eq!(err.to_string(), "unsupported job kind: ruby");
    }

    #[test]
    fn kind_serde_is_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobKind::Typescript).unwrap(),
            "\"typescript\""
        );
        let kind: JobKind = serde_json::from_str("\"gui\"").unwrap();
        assert_eq!(kind, JobKind::Gui);
        for kind in JobKind::ALL {
            assert_eq!(kind.to_string(), kind.as_str());
        }
    }

    #[test]
    fn ok_iff_exit_code_zero() {
        assert!(ExecResult::default().ok());
        assert!(!ExecResult::failure(1, "boom").ok());
        assert!(
            !ExecResult {
                exit_code: -1,
                ..Default::default()
            }
            .ok()
        );
    }
}
