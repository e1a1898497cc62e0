//! sweep - experiment task queue worker and operator commands.

mod args;
mod commands;
mod scenarios;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::args::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        None => commands::work(cli.worker).await,
        Some(Command::Enqueue {
            tasks_dir,
            db_name,
            files,
            set,
            store,
        }) => commands::enqueue(&tasks_dir, &store.config(&db_name), files, set).await,
        Some(Command::Status {
            db_name,
            json,
            store,
        }) => commands::status(&store.config(&db_name), json).await,
        Some(Command::Claimed {
            db_name,
            json,
            store,
        }) => commands::claimed(&store.config(&db_name), json).await,
        Some(Command::Reclaim {
            db_name,
            older_than,
            store,
        }) => commands::reclaim(&store.config(&db_name), older_than).await,
    }
}
