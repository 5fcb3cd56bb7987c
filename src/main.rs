use clap::Parser;
use indexbot::algo::AlgoController;
use indexbot::api::BrokerClient;
use indexbot::bootstrap::bootstrap;
use indexbot::db::CandleRepository;
use indexbot::feed::{run_broker_feed, run_live_feed, SimulatedFeed};
use indexbot::models::{default_instruments, AlgoMode};
use indexbot::pnl::{PnlEngine, PositionBook};
use indexbot::scheduler::{run_scheduler, Strategy};
use indexbot::service::ApiService;
use indexbot::store::CandleStore;
use indexbot::timeframe::TimeframeAggregator;
use indexbot::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Duration;

const FEED_CHANNEL_CAPACITY: usize = 1024;
const BROKER_POLL_SECS: u64 = 60;

#[derive(Parser, Debug)]
#[command(name = "indexbot", about = "Candle engine and algo lifecycle backend")]
struct Cli {
    /// Execution mode: DEMO or LIVE
    #[arg(long, default_value = "DEMO")]
    mode: String,

    /// Days of history to backfill at startup
    #[arg(long, default_value_t = 5)]
    backfill_days: u32,

    /// Scheduler tick period in seconds
    #[arg(long, default_value_t = 60)]
    tick_secs: u64,

    /// Start the algo immediately instead of waiting for a control call
    #[arg(long)]
    start: bool,
}

/// Default strategy hook: logs the state of the world on every tick and
/// liquidates the book on force exit. Real signal logic plugs in here.
struct LogStrategy {
    book: PositionBook,
}

impl Strategy for LogStrategy {
    fn name(&self) -> &str {
        "log"
    }

    fn on_tick(&self, store: &CandleStore, mode: AlgoMode) {
        for symbol in store.symbols() {
            if let Some(close) = store.last_close(&symbol) {
                tracing::info!(
                    "[{}] {} @ {:.2} ({} candles)",
                    mode,
                    symbol,
                    close,
                    store.candle_count(&symbol)
                );
            }
        }
    }

    fn on_force_exit(&self, store: &CandleStore, _mode: AlgoMode) {
        let closed = self.book.close_all(store);
        tracing::info!("Force exit closed {} positions", closed);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let mode: AlgoMode = cli.mode.parse()?;
    let instruments = default_instruments();

    tracing::info!("indexbot starting | mode={}", mode);

    // Stage 1: durable storage. A configured database that cannot be
    // reached is fatal; no DATABASE_URL means memory-only operation.
    let repository = match std::env::var("DATABASE_URL") {
        Ok(url) => Some(CandleRepository::new(&url).await?),
        Err(_) => {
            tracing::warn!("DATABASE_URL not set, running without durable storage");
            None
        }
    };

    let store = match repository.clone() {
        Some(repo) => CandleStore::with_repository(repo),
        None => CandleStore::new(),
    };

    // Stage 2: broker client. Required for live trading, optional in demo.
    let broker = build_broker_client(mode)?;

    // Stage 3: historical bootstrap. Must finish before the live feed
    // attaches; any failure here aborts startup.
    let stats = bootstrap(
        &store,
        repository.as_ref(),
        broker.as_ref(),
        &instruments,
        cli.backfill_days,
    )
    .await?;
    tracing::info!(
        "Bootstrap complete: {} warm-loaded, {} backfilled, {} malformed skipped",
        stats.warm_loaded,
        stats.stored,
        stats.skipped_malformed
    );

    // Shared state
    let controller = AlgoController::new();
    controller.set_mode(mode);
    let book = PositionBook::new();
    let service = ApiService::new(
        controller.clone(),
        store.clone(),
        TimeframeAggregator::new(store.clone()),
        PnlEngine::new(store.clone(), book.clone()),
    );

    if cli.start {
        let response = service.start(&cli.mode)?;
        tracing::info!("Auto-start: accepted={} mode={}", response.accepted, response.mode);
    }

    // Stage 4: live feed, only after bootstrap finished
    let (tx, rx) = mpsc::channel(FEED_CHANNEL_CAPACITY);

    let producer_task = match (mode, broker) {
        (AlgoMode::Live, Some(broker)) => {
            let instruments = instruments.clone();
            tokio::spawn(run_broker_feed(broker, instruments, tx, BROKER_POLL_SECS))
        }
        _ => {
            let feed = SimulatedFeed::new(rand::random());
            let instruments = instruments.clone();
            tokio::spawn(feed.run(instruments, tx, BROKER_POLL_SECS))
        }
    };

    let ingest_task = tokio::spawn(run_live_feed(store.clone(), rx));

    // Stage 5: strategy scheduler
    let scheduler_task = tokio::spawn(run_scheduler(
        controller.clone(),
        store.clone(),
        Arc::new(LogStrategy { book }) as Arc<dyn Strategy>,
        Duration::from_secs(cli.tick_secs),
    ));

    let health = service.health();
    tracing::info!(
        "Backend started | mode={} running={}",
        health.mode,
        health.running
    );

    // Wait for Ctrl+C or task failure
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        result = producer_task => {
            tracing::error!("Feed producer exited: {:?}", result);
        }
        result = ingest_task => {
            tracing::error!("Feed ingestion exited: {:?}", result);
        }
        result = scheduler_task => {
            tracing::error!("Scheduler exited: {:?}", result);
        }
    }

    tracing::info!("indexbot stopped");
    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "indexbot=info".into()),
        )
        .init();
}

fn build_broker_client(mode: AlgoMode) -> Result<Option<BrokerClient>> {
    let url = std::env::var("BROKER_API_URL").ok();
    let key = std::env::var("BROKER_API_KEY").ok();

    match (url, key) {
        (Some(url), Some(key)) => Ok(Some(BrokerClient::new(url, key)?)),
        _ if mode == AlgoMode::Live => {
            Err("BROKER_API_URL and BROKER_API_KEY are required in LIVE mode".into())
        }
        _ => {
            tracing::info!("No broker credentials, demo mode will use the simulated feed");
            Ok(None)
        }
    }
}
