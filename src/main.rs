//! Regime Pilot - regime-aware crypto trading bot

use anyhow::Result;
use clap::Parser;

use regime_pilot::adapters::cli::{self, CliApp};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (secrets go here, not in config.toml)
    dotenvy::dotenv().ok();

    let app = CliApp::parse();
    cli::execute(app).await
}
