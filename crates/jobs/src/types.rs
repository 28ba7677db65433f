use std::fmt;

use {
    sandbar_common::{ExecResult, JobKind, time::now_ms},
    serde::{Deserialize, Serialize},
};

use crate::error::{Error, Result};

/// Lifecycle state of a job. Only `queued → running → succeeded|failed` is
/// allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running) | (Self::Running, Self::Succeeded | Self::Failed)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change requested by the execution task.
#[derive(Debug, Clone)]
pub enum Transition {
    Start,
    /// The snippet ran; the exit code decides success.
    Finish(ExecResult),
    /// Infrastructure failure before or around the snippet.
    Fail { diagnostic: String },
}

impl Transition {
    pub fn target(&self) -> JobState {
        match self {
            Self::Start => JobState::Running,
            Self::Finish(result) if result.ok() => JobState::Succeeded,
            Self::Finish(_) | Self::Fail { .. } => JobState::Failed,
        }
    }
}

/// Persistent record of one scheduled job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub kind: JobKind,
    pub code: String,
    pub state: JobState,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub exit_code: Option<i32>,
    pub created_at_ms: u64,
    #[serde(default)]
    pub started_at_ms: Option<u64>,
    #[serde(default)]
    pub finished_at_ms: Option<u64>,
}

impl JobRecord {
    pub fn new(kind: JobKind, code: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            code: code.into(),
            state: JobState::Queued,
            stdout: None,
            stderr: None,
            exit_code: None,
            created_at_ms: now_ms(),
            started_at_ms: None,
            finished_at_ms: None,
        }
    }

    /// Apply `transition`, rejecting any edge outside the state machine.
    pub fn apply(&mut self, transition: Transition) -> Result<()> {
        let to = transition.target();
        if !self.state.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                id: self.id.clone(),
                from: self.state,
                to,
            });
        }

        match transition {
            Transition::Start => {
                self.started_at_ms = Some(now_ms());
            },
            Transition::Finish(result) => {
                self.stdout = Some(result.stdout);
                self.stderr = Some(result.stderr);
                self.exit_code = Some(result.exit_code);
                self.finished_at_ms = Some(now_ms());
            },
            Transition::Fail { diagnostic } => {
                self.stdout = Some(String::new());
                self.stderr = Some(diagnostic);
                self.exit_code = None;
                self.finished_at_ms = Some(now_ms());
            },
        }
        self.state = to;
        Ok(())
    }

    pub fn status(&self) -> JobStatus {
        JobStatus {
            state: self.state,
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
        }
    }
}

/// Snapshot returned by status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub state: JobState,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

/// Broadcast on every state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobEvent {
    pub job_id: String,
    pub state: JobState,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn finished(exit_code: i32) -> Transition {
        Transition::Finish(ExecResult {
            stdout: "out".into(),
            stderr: "err".into(),
            exit_code,
        })
    }

    #[rstest]
    #[case(JobState::Queued, JobState::Running, true)]
    #[case(JobState::Running, JobState::Succeeded, true)]
    #[case(JobState::Running, JobState::Failed, true)]
    #[case(JobState::Queued, JobState::Succeeded, false)]
    #[case(JobState::Queued, JobState::Failed, false)]
    #[case(JobState::Running, JobState::Queued, false)]
    #[case(JobState::Succeeded, JobState::Failed, false)]
    #[case(JobState::Failed, JobState::Running, false)]
    #[case(JobState::Running, JobState::Running, false)]
    fn transition_table(#[case] from: JobState, #[case] to: JobState, #[case] allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn new_record_is_queued_with_null_outputs() {
        let record = JobRecord::new(JobKind::Shell, "echo hi");
        assert_eq!(record.state, JobState::Queued);
        assert!(uuid::Uuid::parse_str(&record.id).is_ok());
        assert_eq!(
            record.status(),
            JobStatus {
                state: JobState::Queued,
                stdout: None,
                stderr: None,
            }
        );
        assert!(record.exit_code.is_none());
    }

    #[test]
    fn exit_code_decides_terminal_state() {
        let mut ok = JobRecord::new(JobKind::Shell, "true");
        ok.apply(Transition::Start).unwrap();
        ok.apply(finished(0)).unwrap();
        assert_eq!(ok.state, JobState::Succeeded);
        assert_eq!(ok.exit_code, Some(0));
        assert!(ok.finished_at_ms >= ok.started_at_ms);

        let mut bad = JobRecord::new(JobKind::Shell, "false");
        bad.apply(Transition::Start).unwrap();
        bad.apply(finished(1)).unwrap();
        assert_eq!(bad.state, JobState::Failed);
        assert_eq!(bad.stderr.as_deref(), Some("err"));
    }

    #[test]
    fn infrastructure_failure_has_no_exit_code() {
        let mut record = JobRecord::new(JobKind::Python, "print(1)");
        record.apply(Transition::Start).unwrap();
        record
            .apply(Transition::Fail {
                diagnostic: "docker run failed".into(),
            })
            .unwrap();
        assert_eq!(record.state, JobState::Failed);
        assert_eq!(record.stdout.as_deref(), Some(""));
        assert_eq!(record.stderr.as_deref(), Some("docker run failed"));
        assert_eq!(record.exit_code, None);
    }

    #[test]
    fn terminal_states_are_final() {
        let mut record = JobRecord::new(JobKind::Shell, "true");
        let err = record.apply(finished(0)).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(record.state, JobState::Queued);

        record.apply(Transition::Start).unwrap();
        record.apply(finished(0)).unwrap();
        assert!(record.apply(Transition::Start).is_err());
        assert!(record.apply(finished(1)).is_err());
        assert_eq!(record.state, JobState::Succeeded);
    }

    #[test]
    fn serializes_lowercase_states() {
        let record = JobRecord::new(JobKind::Typescript, "1");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["state"], "queued");
        assert_eq!(json["kind"], "typescript");
        assert!(json["stdout"].is_null());
    }
}
