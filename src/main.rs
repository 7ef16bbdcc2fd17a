use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use dbsync::api;
use dbsync::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let options = Cli::parse().into_options();
    match api::sync(&options).await {
        Ok(result) if result.no_changes => {
            println!("No differences found; schemas match.");
            Ok(())
        }
        Ok(result) => {
            if let Some(path) = &result.script_path {
                println!("Sync script written to {}", path.display());
            }
            if let Some(exec) = &result.execution {
                println!(
                    "Applied {} operations: {} created, {} altered, {} dropped, {} renamed.",
                    exec.total(),
                    exec.created,
                    exec.altered,
                    exec.dropped,
                    exec.renamed
                );
            }
            Ok(())
        }
        Err(err) => {
            error!(%err, "sync failed");
            Err(err.into())
        }
    }
}
