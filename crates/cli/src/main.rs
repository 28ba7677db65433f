mod config_commands;
mod context_commands;
mod job_commands;

use std::path::PathBuf;

use {
    anyhow::Result,
    clap::{Parser, Subcommand},
    sandbar_config::SandbarConfig,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "sandbar", about = "sandbar: run code snippets in isolated sandboxes", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (skips discovery of ./sandbar.toml and the user config dir).
    #[arg(long, global = true, env = "SANDBAR_CONFIG")]
    config: Option<PathBuf>,

    /// Custom data directory for the context log and file job store.
    #[arg(long, global = true, env = "SANDBAR_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,

    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway (default when no subcommand is provided).
    Serve,
    /// Run one job to completion and exit with its exit code.
    Run {
        /// Job kind: shell, python, typescript or gui.
        #[arg(short, long)]
        kind: String,
        /// Snippet to execute.
        #[arg(short, long, required_unless_present = "file", conflicts_with = "file")]
        code: Option<String>,
        /// Read the snippet from a file.
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Inspect or reset the context log.
    Context {
        #[command(subcommand)]
        action: context_commands::ContextAction,
    },
    /// Show or validate the effective configuration.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Resolve the effective config: file (explicit or discovered), then
/// `SANDBAR_*` env vars, then command-line flags.
fn resolve_config(cli: &Cli) -> Result<SandbarConfig> {
    let mut config = match &cli.config {
        Some(path) => sandbar_config::load_config(path)?,
        None => sandbar_config::discover_and_load(),
    };
    sandbar_config::apply_env_overrides(&mut config);
    if let Some(bind) = &cli.bind {
        config.server.bind = bind.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    Ok(config)
}

async fn serve(config: SandbarConfig) -> Result<()> {
    let report = sandbar_config::validate(&config);
    for diagnostic in &report.diagnostics {
        tracing::warn!("config {diagnostic}");
    }
    if report.has_errors() {
        anyhow::bail!("configuration has errors, run `sandbar config check`");
    }

    let registry = sandbar_jobs::JobRegistry::from_config(&config).await?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        workers = registry.workers(),
        kinds = ?registry.dispatcher().kinds(),
        "starting sandbar"
    );
    sandbar_gateway::start_gateway(&config.server, registry).await
}

#[tokio::main]
async fn main() -> Result<()> {
    // Missing .env is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_telemetry(&cli);

    if let Some(dir) = &cli.data_dir {
        sandbar_config::set_data_dir(dir.clone());
    }
    let config = resolve_config(&cli)?;

    match cli.command {
        None | Some(Commands::Serve) => serve(config).await,
        Some(Commands::Run { kind, code, file }) => {
            let code = match (code, file) {
                (Some(code), _) => code,
                (None, Some(path)) => std::fs::read_to_string(&path).map_err(|e| {
                    anyhow::anyhow!("failed to read {}: {e}", path.display())
                })?,
                (None, None) => anyhow::bail!("either --code or --file is required"),
            };
            let exit_code = job_commands::run(&config, &kind, &code).await?;
            std::process::exit(exit_code);
        },
        Some(Commands::Context { action }) => context_commands::handle(action, &config).await,
        Some(Commands::Config { action }) => {
            config_commands::handle(action, &config, cli.config.as_deref())
        },
    }
}
