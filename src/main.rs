use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use spotbot::config::{Settings, VenueMode};
use spotbot::execution::{DecisionScheduler, PortfolioLimits, PortfolioManager, SchedulerConfig};
use spotbot::persistence::{CsvRecorder, FeedbackSummary, RecordSink};
use spotbot::strategy::build_signal_source;
use spotbot::venue::{with_timeout, BinanceClient, PaperVenue, Venue};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "spotbot", version, about = "Spot trading bot with volatility-scaled exits")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the trading loop until Ctrl+C
    Run {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Show free and locked balances of the Binance account behind the API key
    Balances {
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Assets to check (comma-separated); defaults to the quote and universe base assets
        #[arg(long, value_delimiter = ',')]
        assets: Vec<String>,
    },
    /// Summarize the feedback logs
    Report {
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Predicted-return cut-off for the conditional profit line
        #[arg(long, default_value_t = 0.002)]
        threshold: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config_path = match &cli.command {
        Command::Run { config } | Command::Balances { config, .. } | Command::Report { config, .. } => {
            config.clone()
        }
    };
    let settings = Settings::load(config_path.as_deref()).context("Failed to load settings")?;
    setup_logging(&settings.log_level);

    match cli.command {
        Command::Run { .. } => run(settings).await,
        Command::Balances { assets, .. } => balances(settings, assets).await,
        Command::Report { threshold, .. } => report(settings, threshold),
    }
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn setup_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("spotbot={}", level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn create_binance_client(settings: &Settings) -> Result<Arc<BinanceClient>> {
    let mut client = BinanceClient::new(&settings.api_url, settings.requests_per_minute)
        .context("Failed to create Binance client")?;
    if let Some(credentials) = settings.credentials() {
        client = client.with_credentials(credentials);
    }
    Ok(Arc::new(client))
}

/// Order venue for the configured mode; paper accounts start with `paper_quote_balance`
fn create_venue(settings: &Settings, client: Arc<BinanceClient>) -> Arc<dyn Venue> {
    match settings.venue {
        VenueMode::Paper => Arc::new(
            PaperVenue::new(client, &settings.quote_asset, settings.fee_rate)
                .with_balance(&settings.quote_asset, settings.paper_quote_balance),
        ),
        VenueMode::Binance => {
            tracing::warn!("⚠️  Live trading: orders are sent to {}", settings.api_url);
            client
        }
    }
}

fn log_configuration(settings: &Settings, venue: &dyn Venue) {
    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Venue: {} ({})", venue.name(), settings.api_url);
    tracing::info!("  Strategy: {}", settings.strategy);
    tracing::info!("  Max positions: {}", settings.max_positions);
    tracing::info!(
        "  Trade size: {} {} (fee {})",
        settings.fixed_trade_usd,
        settings.quote_asset,
        settings.fee_rate
    );
    tracing::info!(
        "  Risk multipliers: SL x{} / TP x{}",
        settings.risk.stop_loss_multiplier,
        settings.risk.take_profit_multiplier
    );
    tracing::info!("  Symbols: {}", settings.symbols.len());
    for symbol in settings.universe() {
        tracing::info!("    - {}", symbol);
    }
}

/// Warn about a low quote balance on the order venue and about base holdings in
/// the exchange account (when credentials are configured) that the bot will not manage
async fn check_balances(settings: &Settings, venue: &dyn Venue, account: Option<&dyn Venue>) {
    let quote = &settings.quote_asset;
    let timeout = settings.venue_timeout();

    match with_timeout("get_balance", timeout, venue.get_balance(quote)).await {
        Ok(balance) => {
            tracing::info!("💰 Available {} balance: {}", quote, balance.free);
            if balance.free < settings.min_quote_balance {
                tracing::warn!(
                    "⚠️  {} balance is low (< {}); entries may fail",
                    quote,
                    settings.min_quote_balance
                );
            }
        }
        Err(e) => tracing::warn!("Could not fetch {} balance: {}", quote, e),
    }

    let Some(account) = account else {
        tracing::debug!("No API key configured, skipping the account holdings check");
        return;
    };
    for symbol in settings.universe() {
        let Some(base) = symbol.base_asset(quote) else {
            continue;
        };
        match with_timeout("get_balance", timeout, account.get_balance(base)).await {
            Ok(balance) if !balance.free.is_zero() => tracing::warn!(
                "⚠️  {} {} already held; the bot starts flat and will not manage it",
                balance.free,
                base
            ),
            Ok(_) => {}
            Err(e) => tracing::warn!("Could not fetch {} balance: {}", base, e),
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn run(settings: Settings) -> Result<()> {
    tracing::info!(
        "🚀 spotbot starting - strategy: {}",
        settings.strategy.to_uppercase()
    );

    let market = create_binance_client(&settings)?;
    let venue = create_venue(&settings, market.clone());
    let recorder: Arc<dyn RecordSink> = Arc::new(CsvRecorder::new(&settings.log_dir));

    log_configuration(&settings, venue.as_ref());
    let account: Option<&dyn Venue> = market
        .has_credentials()
        .then_some(market.as_ref() as &dyn Venue);
    check_balances(&settings, venue.as_ref(), account).await;

    let source = build_signal_source(
        &settings.strategy,
        market,
        &settings.kline_interval,
        settings.kline_limit,
    )?;

    let portfolio = PortfolioManager::new(
        settings.universe(),
        PortfolioLimits {
            max_positions: settings.max_positions,
            trade_notional: settings.fixed_trade_usd,
            fee_rate: settings.fee_rate,
            call_timeout: settings.venue_timeout(),
        },
        settings.risk.clone(),
        venue.clone(),
        recorder.clone(),
    );

    recorder
        .audit(
            "START",
            &format!("strategy {} on {}", settings.strategy.to_uppercase(), venue.name()),
        )
        .with_context(|| format!("Failed to write to {}", settings.log_dir.display()))?;

    let scheduler = DecisionScheduler::new(
        portfolio,
        source,
        recorder.clone(),
        SchedulerConfig {
            price_interval: settings.price_check_interval(),
            decision_interval: settings.decision_interval(),
            error_backoff: settings.error_backoff(),
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut loop_task = tokio::spawn(scheduler.run(shutdown_rx));
    tracing::info!("\nPress Ctrl+C to stop...\n");

    // Wait for Ctrl+C or loop failure
    let interrupted = tokio::select! {
        _ = tokio::signal::ctrl_c() => true,
        result = &mut loop_task => {
            tracing::error!("Scheduler exited: {:?}", result);
            false
        }
    };

    if interrupted {
        tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
        shutdown_tx.send(true).ok();
        if let Err(e) = loop_task.await {
            tracing::error!("Scheduler task failed: {}", e);
        }
    }

    if let Err(e) = recorder.audit("STOP", "shutdown") {
        tracing::warn!("Failed to write audit line: {}", e);
    }
    tracing::info!("👋 spotbot stopped");
    Ok(())
}

async fn balances(settings: Settings, assets: Vec<String>) -> Result<()> {
    let client = create_binance_client(&settings)?;
    if !client.has_credentials() {
        anyhow::bail!("Balances need api_key and api_secret (SPOTBOT__API_KEY / SPOTBOT__API_SECRET)");
    }
    let venue: Arc<dyn Venue> = client;

    let assets = if assets.is_empty() {
        let mut defaults = vec![settings.quote_asset.clone()];
        defaults.extend(
            settings
                .universe()
                .iter()
                .filter_map(|s| s.base_asset(&settings.quote_asset).map(str::to_string)),
        );
        defaults
    } else {
        assets.iter().map(|a| a.trim().to_uppercase()).collect()
    };

    println!("💰 {} balances:\n", venue.name());
    for asset in assets {
        match with_timeout("get_balance", settings.venue_timeout(), venue.get_balance(&asset)).await {
            Ok(balance) => println!(
                "{:<6} free = {:.4}, locked = {:.4}",
                asset, balance.free, balance.locked
            ),
            Err(e) => println!("{:<6} ⚠️  {}", asset, e),
        }
    }
    Ok(())
}

fn report(settings: Settings, threshold: f64) -> Result<()> {
    match FeedbackSummary::from_dir(&settings.log_dir, threshold)
        .with_context(|| format!("Failed to read logs in {}", settings.log_dir.display()))?
    {
        Some(summary) => println!("{}", summary),
        None => println!("No feedback logs found in {}", settings.log_dir.display()),
    }
    Ok(())
}
