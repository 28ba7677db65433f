use {anyhow::Result, clap::Subcommand};

use {sandbar_config::SandbarConfig, sandbar_context::ContextStore};

#[derive(Subcommand)]
pub enum ContextAction {
    /// Print the retained context records, oldest first.
    Dump {
        /// Only print the last N records.
        #[arg(long)]
        tail: Option<usize>,
        /// Print raw JSON lines instead of `[role] content`.
        #[arg(long)]
        json: bool,
    },
    /// Delete every context record.
    Clear,
}

pub async fn handle(action: ContextAction, config: &SandbarConfig) -> Result<()> {
    let store = ContextStore::from_config(&config.context);
    match action {
        ContextAction::Dump { tail, json } => {
            let records = match tail {
                Some(n) => store.tail(n).await?,
                None => store.dump().await?,
            };
            for record in &records {
                if json {
                    println!("{}", serde_json::to_string(record)?);
                } else {
                    println!("[{}] {}", record.role, record.content);
                }
            }
        },
        ContextAction::Clear => {
            store.clear().await?;
            eprintln!("Cleared {}", store.path().display());
        },
    }
    Ok(())
}
