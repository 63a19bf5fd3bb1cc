//! CLI Command Handlers
//!
//! Implementation of all CLI commands for the regime pilot.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::binance::BinanceDataProvider;
use crate::adapters::discord::DiscordNotifier;
use crate::adapters::fear_greed::FearGreedClient;
use crate::adapters::paper::PaperExchange;
use crate::application::{
    BacktestEngine, BacktestResult, NotificationQueue, TradingOrchestrator, TradingPolicy,
    DEFAULT_MIN_BARS,
};
use crate::config::{expand_path, load_config, Config};
use crate::domain::{PortfolioState, RiskManager, TimeFrame};
use crate::strategy::{DecisionEngine, MarketRegimeDetector, ProtectionConfig, RiskProfileConfig};

/// Regime Pilot - regime-aware crypto trading decisions
#[derive(Parser, Debug)]
#[command(
    name = "regime-pilot",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Regime-aware decision layer for crypto trading",
    long_about = "Regime Pilot classifies the market as bull, bear or range, routes each cycle \
                  to a matching strategy, validates the proposal against the risk profile and \
                  executes it on a paper exchange or replays it over historical bars."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay the decision pipeline over historical bars
    Backtest(BacktestCmd),

    /// Classify the market regime of a bar series
    Regime(RegimeCmd),

    /// Start one trading loop per configured timeframe
    Run(RunCmd),
}

/// Run backtesting
#[derive(Parser, Debug)]
pub struct BacktestCmd {
    /// CSV file with timestamp,open,high,low,close,volume rows
    #[arg(short, long, value_name = "FILE")]
    pub data: String,

    /// Starting fiat balance
    #[arg(long, value_name = "AMOUNT", default_value = "10000")]
    pub fiat: f64,

    /// Starting crypto balance
    #[arg(long, value_name = "AMOUNT", default_value = "0")]
    pub crypto: f64,

    /// Bars skipped before the first evaluation
    #[arg(long, value_name = "BARS", default_value_t = DEFAULT_MIN_BARS)]
    pub min_bars: usize,

    /// Decision policy: baseline or regime
    #[arg(long, value_name = "POLICY", default_value = "baseline")]
    pub policy: TradingPolicy,

    /// Risk profile, protection and pair from a config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<String>,

    /// Print every simulated fill
    #[arg(short, long)]
    pub trades: bool,

    /// Export results to JSON
    #[arg(long, value_name = "FILE")]
    pub export_json: Option<PathBuf>,
}

/// Classify a series
#[derive(Parser, Debug)]
pub struct RegimeCmd {
    /// CSV file with timestamp,open,high,low,close,volume rows
    #[arg(short, long, value_name = "FILE")]
    pub data: String,
}

/// Start trading loop
#[derive(Parser, Debug)]
pub struct RunCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/default.toml")]
    pub config: String,

    /// Run in paper trading mode (no real orders)
    #[arg(short, long)]
    pub paper: bool,
}

/// Execute the CLI command
pub async fn execute(app: CliApp) -> Result<()> {
    match app.command {
        Command::Backtest(cmd) => {
            init_logging("warn", app.verbose, app.debug)?;
            backtest_command(cmd).await
        }
        Command::Regime(cmd) => {
            init_logging("warn", app.verbose, app.debug)?;
            regime_command(cmd).await
        }
        Command::Run(cmd) => {
            let config = load_config(expand_path(&cmd.config))
                .with_context(|| format!("Failed to load configuration from {}", cmd.config))?;
            init_logging(&config.logging.level, app.verbose, app.debug)?;
            run_command(cmd, config).await
        }
    }
}

/// Initialize logging system. RUST_LOG wins over flags and config.
fn init_logging(default_level: &str, verbose: bool, debug: bool) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        default_level
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Build a backtest engine from CLI flags and an optional config file
pub fn build_backtest_engine(cmd: &BacktestCmd, config: Option<&Config>) -> Result<BacktestEngine> {
    let engine = match config {
        Some(config) => BacktestEngine::new(config.risk_profile_config()?, config.protection.clone())
            .with_pair(&config.trading.pair_symbol)
            .with_truncate(config.trading.truncate)
            .with_timeframe(config.trading.timeframes.first().copied().unwrap_or(TimeFrame::Daily)),
        None => BacktestEngine::new(RiskProfileConfig::default(), ProtectionConfig::default()),
    };

    Ok(engine.with_policy(cmd.policy).with_min_bars(cmd.min_bars))
}

/// Handle backtest command
async fn backtest_command(cmd: BacktestCmd) -> Result<()> {
    let config = match &cmd.config {
        Some(path) => Some(load_config(expand_path(path)).context("Failed to load configuration")?),
        None => None,
    };

    let data_path = expand_path(&cmd.data);
    let bars = BacktestEngine::load_csv(&data_path)
        .with_context(|| format!("Failed to load bars from {}", data_path.display()))?;
    if bars.is_empty() {
        bail!("No bars in {}", data_path.display());
    }

    let engine = build_backtest_engine(&cmd, config.as_ref())?;
    tracing::info!("Backtesting {} bars with {} policy", bars.len(), cmd.policy);
    let result = engine.run(&bars, cmd.fiat, cmd.crypto);

    if cmd.trades {
        print_trades(&result);
    }
    println!("{}", result.summary());

    if let Some(path) = &cmd.export_json {
        export_json(&result, path)?;
        println!("Results written to {}", path.display());
    }

    Ok(())
}

fn print_trades(result: &BacktestResult) {
    println!("{:>6}  {:<4}  {:>12}  {:>12}  {:<8}  {:>10}", "BAR", "SIDE", "PRICE", "QTY", "REGIME", "PNL");
    for trade in &result.trades {
        let pnl = trade.pnl.map(|p| format!("{:.2}", p)).unwrap_or_default();
        println!(
            "{:>6}  {:<4}  {:>12.2}  {:>12.6}  {:<8}  {:>10}",
            trade.bar, trade.side, trade.price, trade.quantity, trade.regime, pnl
        );
    }
    println!();
}

fn export_json(result: &BacktestResult, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(result).context("Failed to serialize results")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Handle regime command
async fn regime_command(cmd: RegimeCmd) -> Result<()> {
    let data_path = expand_path(&cmd.data);
    let bars = BacktestEngine::load_csv(&data_path)
        .with_context(|| format!("Failed to load bars from {}", data_path.display()))?;

    let (regime, confidence) = MarketRegimeDetector::default().detect_bars(&bars);
    println!("Bars:       {}", bars.len());
    println!("Regime:     {}", regime);
    println!("Confidence: {:.2}", confidence);
    Ok(())
}

/// Mark the paper exchange with the last price its loop saw
async fn mark_paper_exchange(orchestrator: TradingOrchestrator, exchange: Arc<PaperExchange>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let Some(price) = orchestrator.status().await.last_price else {
            continue;
        };
        for fill in exchange.mark(price).await {
            tracing::info!(
                "[{}] Paper protective order {:?} filled {:.6} @ {:.2}",
                orchestrator.timeframe(),
                fill.order_id,
                fill.filled_quantity,
                fill.filled_price
            );
        }
    }
}

/// Handle run command
async fn run_command(cmd: RunCmd, config: Config) -> Result<()> {
    if !cmd.paper {
        bail!("Only paper execution is available, pass --paper");
    }

    tracing::info!("Starting regime pilot...");
    tracing::warn!("Running in PAPER TRADING mode - no real orders");

    let trading = &config.trading;
    let profile = config.risk_profile_config()?;
    let capital = config.capital_per_timeframe();

    let data = Arc::new(
        BinanceDataProvider::new(&config.data.binance_url).context("Failed to create Binance client")?,
    );

    let notifications = match config.alerts.get_discord_webhook_url() {
        Some(url) => {
            let notifier = DiscordNotifier::new(&url).context("Failed to create Discord notifier")?;
            let (queue, _worker) = NotificationQueue::spawn(Arc::new(notifier));
            Some(queue)
        }
        None => {
            tracing::info!("Discord webhook not configured, alerts disabled");
            None
        }
    };

    let sentiment = if config.data.fear_and_greed {
        Some(FearGreedClient::new().context("Failed to create fear & greed client")?)
    } else {
        None
    };

    let poll_interval = Duration::from_secs(trading.poll_interval_secs);
    let mut orchestrators = Vec::with_capacity(trading.timeframes.len());
    let mut exchanges = Vec::with_capacity(trading.timeframes.len());
    for &timeframe in &trading.timeframes {
        let exchange = Arc::new(PaperExchange::new(
            &trading.fiat_symbol,
            &trading.crypto_symbol,
            capital,
            0.0,
        ));
        let portfolio =
            PortfolioState::new(&trading.pair_symbol, capital, 0.0, 0.0).with_risk_profile(profile.profile());
        let decision = DecisionEngine::new(profile.clone(), config.protection.clone());
        let risk = RiskManager::new(profile.clone(), config.protection.clone()).with_truncate(trading.truncate);

        let mut orchestrator = TradingOrchestrator::new(
            portfolio,
            timeframe,
            &trading.fiat_symbol,
            &trading.crypto_symbol,
            data.clone(),
            exchange.clone(),
            decision,
            risk,
            trading.policy,
        )?
        .with_poll_interval(poll_interval)
        .with_min_bars(trading.min_bars);

        if let Some(queue) = &notifications {
            orchestrator = orchestrator.with_notifications(queue.clone());
        }
        if let Some(client) = &sentiment {
            orchestrator = orchestrator.with_sentiment(client.clone());
        }
        orchestrators.push(orchestrator);
        exchanges.push(exchange);
    }

    let handles: Vec<_> = orchestrators
        .iter()
        .cloned()
        .map(|orchestrator| tokio::spawn(async move { orchestrator.run().await }))
        .collect();

    // Paper stops and targets only trigger when the exchange sees a price
    let marks: Vec<_> = orchestrators
        .iter()
        .cloned()
        .zip(exchanges)
        .map(|(orchestrator, exchange)| tokio::spawn(mark_paper_exchange(orchestrator, exchange, poll_interval)))
        .collect();

    println!(
        "Trading {} on {} timeframe(s) with {} policy and {} profile. Ctrl-C to stop.",
        trading.pair_symbol,
        trading.timeframes.len(),
        trading.policy,
        profile.name
    );

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown requested");

    for orchestrator in &orchestrators {
        orchestrator.stop().await;
    }
    for mark in marks {
        mark.abort();
    }
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("Orchestrator failed: {}", e),
            Err(e) => tracing::error!("Orchestrator task panicked: {}", e),
        }
    }

    for orchestrator in &orchestrators {
        let status = orchestrator.status().await;
        println!(
            "[{}] regime={} fiat={:.2} crypto={:.6} losses={}",
            status.timeframe, status.regime, status.fiat_amount, status.crypto_amount, status.consecutive_losses
        );
    }

    Ok(())
}
