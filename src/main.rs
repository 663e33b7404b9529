//! Aqua Monitor - live water quality monitoring
//!
//! Trains BOD, COD and DO predictors, samples a sensor and pushes classified
//! results to connected viewers.

use aqua_monitor::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging (INFO by default, override with RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    cli::run().await
}
