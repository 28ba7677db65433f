use {
    anyhow::Result,
    sandbar_config::SandbarConfig,
    sandbar_jobs::{JobRegistry, JobState},
    tracing::debug,
};

/// Exit code reported when a job failed before its snippet produced one.
const INFRA_FAILURE_EXIT: i32 = 1;

/// Schedule one job, wait for it and relay its output.
///
/// Returns the process exit code the CLI should terminate with.
pub async fn run(config: &SandbarConfig, kind: &str, code: &str) -> Result<i32> {
    let registry = JobRegistry::from_config(config).await?;
    let job_id = registry.schedule(kind, code).await?;
    debug!(job_id = %job_id, kind, "waiting for job");

    let record = registry.wait(&job_id).await?;
    registry.shutdown().await;

    print!("{}", record.stdout.unwrap_or_default());
    eprint!("{}", record.stderr.unwrap_or_default());

    let exit_code = match (record.state, record.exit_code) {
        (JobState::Succeeded, _) => 0,
        (_, Some(code)) if code != 0 => code,
        _ => INFRA_FAILURE_EXIT,
    };
    Ok(exit_code)
}
