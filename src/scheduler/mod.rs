use crate::algo::AlgoController;
use crate::models::AlgoMode;
use crate::store::CandleStore;
use std::sync::Arc;
use tokio::time::{interval, Duration};

/// Trigger contract for the trading strategy
///
/// The scheduler only decides WHEN these fire; what they do is up to the
/// implementation. Hooks must not block the scheduler for long - anything
/// slow belongs in a spawned task.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    /// Called every scheduler tick while the algo is RUNNING
    fn on_tick(&self, store: &CandleStore, mode: AlgoMode);

    /// Called once per consumed force-exit request
    fn on_force_exit(&self, store: &CandleStore, mode: AlgoMode);
}

/// Periodic strategy trigger, gated by the algo controller
///
/// Ticks while STOPPED are skipped entirely. A pending force-exit is
/// consumed here (cleared exactly once) and routed to the strategy instead
/// of a regular tick; the control call that requested it already returned
/// long ago.
pub async fn run_scheduler(
    controller: AlgoController,
    store: CandleStore,
    strategy: Arc<dyn Strategy>,
    period: Duration,
) {
    tracing::info!(
        "Scheduler starting for strategy '{}' (every {:?})",
        strategy.name(),
        period
    );

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        if !controller.is_algo_running() {
            continue;
        }

        let mode = controller.mode();

        if controller.take_force_exit() {
            tracing::info!("Scheduler executing force exit");
            strategy.on_force_exit(&store, mode);
            continue;
        }

        strategy.on_tick(&store, mode);
    }
}
