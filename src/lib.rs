mod cli;
pub mod commands;
pub mod config;
pub mod data;
pub mod error;
pub mod models;
pub mod services;
pub mod state;

use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use cli::{CliArgs, CliCommand};
use commands::{indexing_commands, search_commands};
use config::Config;
use state::AppState;

pub use error::AppError;
pub use models::index_entry::{Index, IndexEntry};
pub use services::analysis_service::{AnalysisPool, Analyzer};
pub use services::indexing_service::Indexer;

/// Installs the global subscriber. `MEDIADEX_LOG` wins over `RUST_LOG`.
pub fn init_tracing() {
    let filter = std::env::var("MEDIADEX_LOG")
        .ok()
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn run() -> anyhow::Result<()> {
    init_tracing();
    let args = CliArgs::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(root) = args.root {
        config.root = root;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let state = AppState::new(config);

    runtime.block_on(async {
        match args.command {
            CliCommand::Scan => print_json(&indexing_commands::scan(&state).await),
            CliCommand::Search { query, limit } => {
                print_json(&search_commands::search(&state, &query, limit))
            }
            CliCommand::Stats => print_json(&indexing_commands::get_stats(&state)),
            CliCommand::List => print_json(&search_commands::list_entries(&state)),
            CliCommand::Remove { relative_path } => {
                let removed = indexing_commands::remove_from_index(&state, &relative_path)?;
                print_json(&removed)
            }
            CliCommand::Watch => {
                indexing_commands::start_indexing(&state, tokio::runtime::Handle::current())?;
                tokio::signal::ctrl_c().await?;
                indexing_commands::stop_indexing(&state)?;
                Ok(())
            }
        }
    })
}
