//! Forge Agent - Self-Modifying Agent
//!
//! CLI entry point for the targeting, info exploration and self-modification
//! abilities.

use forge_agent::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging (INFO level by default, use RUST_LOG to override)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into())
        )
        .init();

    // Run CLI
    cli::run().await
}
