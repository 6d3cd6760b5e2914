mod cli;

use backup_octopus::{app, config::Config, observability, server};
use clap::Parser;
use cli::{Cli, Commands};
use std::sync::Arc;

type AnyError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    observability::init();

    let cli = Cli::parse();

    let config = match cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    let metrics = Arc::new(observability::Metrics::new());
    let (mut manager, summary) = app::build_manager(&config, metrics)?;

    match cli.command {
        Commands::Run => {
            let report = manager.run_backups().await;
            manager.shutdown().await;

            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.all_succeeded() {
                return Err(format!(
                    "{} of {} backups failed",
                    report.failed(),
                    report.total()
                )
                .into());
            }
        }
        Commands::Discover => {
            for (kind, count) in &summary.per_kind {
                println!("{kind}: {count} handler(s)");
            }
            for identity in manager.identities() {
                println!(
                    "  {identity} -> {}",
                    identity
                        .default_folder(&manager.settings().backups_root)
                        .display()
                );
            }
            for err in &summary.errors {
                eprintln!("error: {err}");
            }
            manager.shutdown().await;
        }
        Commands::Serve(args) => {
            let address = args.address.unwrap_or(config.server.bind_addr);
            server::run(address, server::AppState::new(manager)).await?;
        }
    }

    Ok(())
}
