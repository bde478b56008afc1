//! Swingbot
//!
//! Runs the swing market maker against the SQLite paper venue.
//!
//! Usage:
//!   swingbot --config swingbot.toml [--once] [--log-level debug]
//!
//! Environment Variables:
//!   SWINGBOT_CONFIG_PATH - Path to TOML config file (default: swingbot.toml)
//!   RUST_LOG - Overrides --log-level when set

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use swingbot_core::config::StrategyConfig;
use swingbot_core::history::TradeFetcher;
use swingbot_core::models::OrderSide;
use swingbot_core::paper::PaperVenue;
use swingbot_core::submit::SubmitFilter;
use swingbot_core::swing::{PriceContinuityMap, SwingLevelProvider};
use swingbot_core::trader::{Balances, Trader};
use swingbot_core::volume::VolumeFilter;

#[derive(Parser, Debug)]
#[command(name = "swingbot")]
#[command(about = "Swing market maker with daily volume caps")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "SWINGBOT_CONFIG_PATH")]
    config: Option<String>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("swingbot={level},swingbot_core={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn build_trader(config: &StrategyConfig) -> Result<Trader> {
    let market = &config.market;
    let pair = market.pair();
    let venue = Arc::new(PaperVenue::open(
        &market.database_path,
        market.market_id(),
        market.account_id.clone(),
    )?);

    let fetcher: Arc<dyn TradeFetcher> = venue.clone();
    let continuity = PriceContinuityMap::new();
    let sell = SwingLevelProvider::new(
        OrderSide::Sell,
        config.sell_params(),
        config.swing.last_trade_price,
        config.swing.last_trade_cursor.clone(),
        pair.clone(),
        fetcher.clone(),
        continuity.clone(),
    )?;
    let buy = SwingLevelProvider::new(
        OrderSide::Buy,
        config.buy_params(),
        config.swing.last_trade_price,
        config.swing.last_trade_cursor.clone(),
        pair.clone(),
        fetcher,
        continuity,
    )?;

    let volume_filter = config
        .volume_filter
        .clone()
        .map(|volume_config| {
            VolumeFilter::new(
                &market.exchange,
                &pair,
                market.base_asset_code(),
                market.quote_asset_code(),
                volume_config,
                config.swing.precision,
                venue.clone(),
            )
        })
        .transpose()?;

    Trader::new(
        pair.clone(),
        config.swing.precision,
        sell,
        buy,
        volume_filter,
        SubmitFilter::for_mode(config.submit_mode, &pair),
        venue.clone(),
        venue,
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_tracing(&args.log_level);

    let config = match &args.config {
        Some(path) => StrategyConfig::load(path),
        None => StrategyConfig::from_env(),
    }
    .context("Failed to load strategy config")?;

    info!(
        exchange = %config.market.exchange,
        pair = %config.market.pair(),
        market_id = %config.market.market_id(),
        submit_mode = %config.submit_mode,
        volume_filter = config.volume_filter.is_some(),
        "Starting swingbot"
    );

    let mut trader = build_trader(&config)?;
    let balances = Balances {
        base: config.inventory.base,
        quote: config.inventory.quote,
    };

    if args.once {
        trader.run_cycle(balances).await?;
        return Ok(());
    }

    let mut interval = tokio::time::interval(Duration::from_secs(config.tick_interval_secs));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = trader.run_cycle(balances).await {
                    error!(error = ?e, "cycle failed, nothing submitted");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                return Ok(());
            }
        }
    }
}
