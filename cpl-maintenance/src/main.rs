//! Maintenance binary of the created pages index.
//!
//! Applies the index migrations, rebuilds the index from the host's page history and lists
//! the pages created by a user.

use clap::{Parser, Subcommand};
use cpl::types::Pagination;
use cpl_config::Environment;
use cpl_telemetry::tracing::init_tracing;
use tracing::error;

use crate::config::load_maintenance_config;
use crate::core::{Task, run_task};
use crate::error::{MaintenanceError, MaintenanceResult};

mod config;
mod core;
mod error;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or upgrade the index table
    Migrate,
    /// Rebuild the index from the page history
    Recompute,
    /// Rebuild the index only if it is empty, as done on install
    Populate,
    /// List the pages created by a user, newest first
    List {
        /// User name, with spaces or underscores
        name: String,

        /// Number of pages to skip
        #[arg(long, default_value = "0")]
        offset: u64,

        /// Maximum number of pages to print
        #[arg(long)]
        limit: Option<u64>,
    },
}

impl From<Command> for Task {
    fn from(command: Command) -> Self {
        match command {
            Command::Migrate => Task::Migrate,
            Command::Recompute => Task::Recompute,
            Command::Populate => Task::Populate,
            Command::List {
                name,
                offset,
                limit,
            } => {
                let pagination = match (offset, limit) {
                    (0, None) => None,
                    (offset, limit) => Some(Pagination::new(offset, limit.unwrap_or(u64::MAX))),
                };
                Task::List { name, pagination }
            }
        }
    }
}

fn main() -> MaintenanceResult<()> {
    let args = Args::parse();

    let maintenance_config = load_maintenance_config()?;

    let environment = Environment::load().map_err(MaintenanceError::config)?;
    let _log_flusher =
        init_tracing(env!("CARGO_BIN_NAME"), environment).map_err(MaintenanceError::config)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async {
            let task = Task::from(args.command);
            if let Err(err) = run_task(maintenance_config, task).await {
                error!("{err}");
                return Err(err);
            }

            Ok(())
        })
}
