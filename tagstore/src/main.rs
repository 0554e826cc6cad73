//! `tagstore [DB_PATH]`: run the tagged-record CRUD verification once.
//!
//! Exits 0 without output when every step passes. Any failure is logged with
//! the failing step and the process exits with a failure status.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tagstore::{verify, LibsqlStore, TaggedRecordRowAdapter};
use tracing_subscriber::EnvFilter;

/// Verify create, read, update and delete of a tagged record against an embedded database.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Database file path. Omit for an in-memory database.
    #[arg(default_value = "")]
    db_path: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("verification failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> anyhow::Result<()> {
    let store = LibsqlStore::open(&args.db_path)
        .await
        .with_context(|| format!("opening database {:?}", args.db_path))?;
    let repo = store.repository(TaggedRecordRowAdapter);
    let report = verify::run(&store, &repo).await?;
    tracing::info!(
        id = ?report.persisted.id,
        owner_id = report.persisted.owner_id,
        "verification passed"
    );
    Ok(())
}
