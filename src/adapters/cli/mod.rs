//! CLI Adapter
//!
//! Command-line interface for the regime pilot.
//! Uses clap derive macros for argument parsing.

mod commands;

pub use commands::{build_backtest_engine, BacktestCmd, CliApp, Command, RegimeCmd, RunCmd};

use anyhow::Result;

/// Execute the CLI command
pub async fn execute(app: CliApp) -> Result<()> {
    commands::execute(app).await
}
