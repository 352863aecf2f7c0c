use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::{interval_at, Instant};
use trendbot::api::{BinanceClient, PaperExchange};
use trendbot::persistence::HistoryStore;
use trendbot::{BotConfig, Engine, EngineSnapshot};

#[derive(Parser)]
#[command(name = "trendbot")]
#[command(about = "Trend-following spot trading bot (paper account on live Binance data)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trading loop until Ctrl+C
    Run {
        /// TOML configuration file, layered under TRENDBOT_* variables
        #[arg(short, long, default_value = "trendbot.toml")]
        config: PathBuf,
    },

    /// Print the effective configuration and exit
    CheckConfig {
        #[arg(short, long, default_value = "trendbot.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config } => run(&config).await,
        Commands::CheckConfig { config } => check_config(&config),
    }
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("trendbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(path: &Path) -> Result<BotConfig> {
    BotConfig::load(Some(path))
        .with_context(|| format!("loading configuration from {}", path.display()))
}

fn check_config(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    println!("\n✓ Configuration is valid");
    Ok(())
}

async fn run(path: &Path) -> Result<()> {
    let config = load_config(path)?;

    tracing::info!("🚀 TrendBot starting (paper trading)");
    log_configuration(&config);

    let client = BinanceClient::new(config.binance_base_url.clone())
        .context("building Binance client")?;
    let exchange = Arc::new(PaperExchange::new(
        client,
        config.symbol.clone(),
        config.base_asset.clone(),
        config.quote_asset.clone(),
        config.paper_quote_balance,
    ));

    let history = HistoryStore::new(config.history_file.clone());
    let engine = Engine::new(
        config.symbol.clone(),
        config.quote_asset.clone(),
        config.strategy.clone(),
        exchange.clone(),
        exchange,
        history.load(),
    );

    engine.start().await;
    tracing::info!("\nPress Ctrl+C to stop...\n");

    let period = config.strategy.poll_interval();
    let mut status = interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
                break;
            }
            _ = status.tick() => {
                let snapshot = engine.snapshot();
                log_status(&snapshot);
                if snapshot.halted {
                    tracing::error!("Engine halted by the daily loss limit, exiting");
                    break;
                }
            }
        }
    }

    engine.shutdown().await;

    let snapshot = engine.snapshot();
    if let Err(e) = history.save(&snapshot.price_history) {
        tracing::error!("Failed to save price history: {}", e);
    }

    tracing::info!("👋 TrendBot stopped");
    Ok(())
}

fn log_configuration(config: &BotConfig) {
    let strategy = &config.strategy;
    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Symbol: {} ({}/{})", config.symbol, config.base_asset, config.quote_asset);
    tracing::info!("  Timeframe: {} x {} candles", strategy.timeframe, strategy.history_window_length);
    tracing::info!("  Risk per trade: {}%", strategy.risk_fraction * 100.0);
    tracing::info!(
        "  Stop loss: {}% | Trailing: {}% | Take profit: {}%",
        strategy.stop_loss_fraction * 100.0,
        strategy.trailing_stop_fraction * 100.0,
        strategy.take_profit_fraction * 100.0
    );
    tracing::info!(
        "  Daily loss limit: {}% | Max trades/day: {}",
        strategy.daily_loss_limit_fraction * 100.0,
        strategy.max_trades_per_day
    );
    tracing::info!("  Poll interval: {}s", strategy.poll_interval_seconds);
}

fn log_status(snapshot: &EngineSnapshot) {
    tracing::info!("\n📊 Status Summary:");
    tracing::info!("  {} @ {:.4}", snapshot.symbol, snapshot.current_price);
    tracing::info!("  Balance: {:.2}", snapshot.balance);
    if let Some(equity) = snapshot.equity {
        tracing::info!(
            "  Equity: {:.2} (day {:+.2}%)",
            equity,
            snapshot.daily_pnl_fraction * 100.0
        );
    }
    tracing::info!(
        "  Signal: {:?} | Trades today: {} | Risk: {:?}",
        snapshot.signal,
        snapshot.trades_today,
        snapshot.risk_level
    );

    if let (Some(entry), Some(stop)) = (snapshot.entry_price, snapshot.stop_price) {
        tracing::info!(
            "  Position: {:.4} | Entry: {:.4} | Stop: {:.4} | P&L: {:+.2}%",
            snapshot.quantity,
            entry,
            stop,
            snapshot.unrealized_pnl_pct.unwrap_or(0.0)
        );
    } else {
        tracing::info!("  Position: flat");
    }
}
