use crate::models::AlgoMode;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct AlgoSession {
    running: bool,
    mode: AlgoMode,
    force_exit_requested: bool,
}

/// Single authority for whether the strategy may run, in what mode, and
/// whether an exit is being forced
///
/// One controller exists per process; clones share the same session. Every
/// transition happens atomically under one lock and no operation performs
/// I/O while holding it, so control calls always return immediately.
///
/// State-conflict calls (start while running, stop while stopped, force-exit
/// while stopped) are idempotent no-ops reported through the return value,
/// never errors.
#[derive(Clone, Default)]
pub struct AlgoController {
    session: Arc<Mutex<AlgoSession>>,
}

impl AlgoController {
    /// New controller: STOPPED, default mode, no force-exit pending
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the desired mode
    ///
    /// Accepted only while STOPPED; returns false and leaves the session
    /// untouched while RUNNING. Mode changes are never queued - health reads
    /// must always report the mode the running session is actually using.
    pub fn set_mode(&self, mode: AlgoMode) -> bool {
        let mut session = self.session.lock().unwrap();
        if session.running {
            tracing::warn!("Rejected mode change to {} while algo is running", mode);
            return false;
        }
        session.mode = mode;
        true
    }

    /// STOPPED -> RUNNING; true if this call performed the transition
    ///
    /// Returns false when already running, so concurrent starts see true
    /// exactly once.
    pub fn start_algo(&self) -> bool {
        let mut session = self.session.lock().unwrap();
        if session.running {
            return false;
        }
        session.running = true;
        session.force_exit_requested = false;
        tracing::info!("Algo started in {} mode", session.mode);
        true
    }

    /// RUNNING -> STOPPED, unconditionally; clears any pending force-exit
    pub fn stop_algo(&self) {
        let mut session = self.session.lock().unwrap();
        if session.running {
            tracing::info!("Algo stopped");
        }
        session.running = false;
        session.force_exit_requested = false;
    }

    /// Request liquidation of open positions; observed by the scheduler
    ///
    /// Valid only while RUNNING; a request while STOPPED is a silent no-op
    /// returning false.
    pub fn request_force_exit(&self) -> bool {
        let mut session = self.session.lock().unwrap();
        if !session.running {
            tracing::debug!("Ignored force-exit request while stopped");
            return false;
        }
        session.force_exit_requested = true;
        tracing::info!("Force exit requested");
        true
    }

    /// Consume the force-exit flag (scheduler side); true if it was set
    pub fn take_force_exit(&self) -> bool {
        let mut session = self.session.lock().unwrap();
        std::mem::take(&mut session.force_exit_requested)
    }

    pub fn is_algo_running(&self) -> bool {
        self.session.lock().unwrap().running
    }

    pub fn mode(&self) -> AlgoMode {
        self.session.lock().unwrap().mode
    }

    pub fn is_force_exit_requested(&self) -> bool {
        self.session.lock().unwrap().force_exit_requested
    }
}
