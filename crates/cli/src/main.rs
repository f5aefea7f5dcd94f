//! Crypto price history CLI.
//!
//! # Usage
//!
//! ```bash
//! # 90 days of BTC closes
//! crypto-history series BTC --days 90
//!
//! # Several holdings, resolved one after another with the inter-coin throttle
//! crypto-history portfolio BTC ETH SOL --days 180
//!
//! # Fetch 365 days once per coin and derive the 180/90 day caches
//! crypto-history prewarm --symbols BTC,ETH,SOL
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crypto_history_core::models::settings::parse_symbol_list;
use crypto_history_core::{HistoryService, Settings};

#[derive(Parser)]
#[command(name = "crypto-history")]
#[command(about = "Daily USD price history with a local cache", long_about = None)]
#[command(version)]
struct Cli {
    /// Cache directory (overrides CG_CACHE_DIR)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Cache TTL in seconds (overrides CG_CACHE_TTL_SECS)
    #[arg(long, global = true)]
    ttl_secs: Option<u64>,

    /// Pause between coins in milliseconds (overrides CG_THROTTLE_MS)
    #[arg(long, global = true)]
    throttle_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the daily series for one coin
    Series {
        /// Ticker symbol (e.g. BTC)
        symbol: String,

        /// Trailing window in days
        #[arg(short, long, default_value_t = 30)]
        days: u32,

        /// Emit JSON instead of CSV lines
        #[arg(long)]
        json: bool,
    },

    /// Resolve several coins sequentially and report coverage
    Portfolio {
        /// Ticker symbols
        #[arg(required = true)]
        symbols: Vec<String>,

        /// Trailing window in days
        #[arg(short, long, default_value_t = 365)]
        days: u32,
    },

    /// Cache 365-day series and derive 180/90-day windows locally
    Prewarm {
        /// Comma separated allow-list (overrides CG_PREWARM_COINS)
        #[arg(long)]
        symbols: Option<String>,
    },
}

fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let env_filter = EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));

    if log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn build_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let mut settings = Settings::from_env().context("Failed to read settings from environment")?;
    if let Some(dir) = &cli.cache_dir {
        settings.cache_dir = dir.clone();
    }
    if let Some(secs) = cli.ttl_secs {
        settings.cache_ttl = Duration::from_secs(secs);
    }
    if let Some(ms) = cli.throttle_ms {
        settings.throttle = Duration::from_millis(ms);
    }
    if settings.api_key.is_none() {
        info!("no COINGECKO_API_KEY set, using the public rate limit");
    }
    Ok(settings)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let settings = build_settings(&cli)?;
    let service = HistoryService::from_settings(settings).context("Failed to build history service")?;

    match cli.command {
        Commands::Series { symbol, days, json } => {
            let outcome = service.resolve_series(&symbol, days).await;
            if let Some(reason) = &outcome.reason {
                eprintln!("{reason}");
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome.series)?);
            } else {
                for point in &outcome.series {
                    println!("{},{}", point.date, point.price);
                }
            }
            if outcome.is_empty() {
                std::process::exit(2);
            }
        }
        Commands::Portfolio { symbols, days } => {
            let history = service.resolve_many(&symbols, days).await;
            for (symbol, series) in &history.series {
                let last = series.last().map(|p| p.price.to_string()).unwrap_or_default();
                println!("{symbol}: {} days, last {last}", series.len());
            }
            if !history.failures.is_empty() {
                println!("Some coins had no historical series and were skipped:");
                for (symbol, reason) in &history.failures {
                    println!("- {symbol}: {reason}");
                }
            }
        }
        Commands::Prewarm { symbols } => {
            let allow_list = symbols.as_deref().map(parse_symbol_list);
            let report = service.prewarm(allow_list.as_deref()).await;
            println!("{}", report.summary());
        }
    }

    Ok(())
}
