//! reportflow CLI entrypoint

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use reportflow::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the generated script
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("reportflow=info,warn")),
        )
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    Cli::parse().execute().await
}
