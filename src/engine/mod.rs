//! Control loop and the read-only snapshot it publishes
//!
//! One spawned task drives the engine core through repeated iterations. The
//! core sits behind a `tokio::sync::Mutex` held for a whole iteration, so two
//! iterations never overlap. Readers only ever see [`EngineSnapshot`] clones.

mod iteration;
mod snapshot;

pub use iteration::IterationOutcome;
pub use snapshot::EngineSnapshot;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use iteration::EngineCore;
use crate::api::{MarketDataSource, OrderVenue};
use crate::config::StrategyConfig;

/// Supplies the trading day used for the daily risk roll-over
pub type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// Handle to the trading engine. Cheap to clone; all clones drive the same loop.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
}

struct Shared {
    core: tokio::sync::Mutex<EngineCore>,
    snapshot: RwLock<EngineSnapshot>,
    stop_tx: watch::Sender<bool>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    halted: AtomicBool,
    clock: Clock,
}

impl Engine {
    pub fn new(
        symbol: impl Into<String>,
        quote_asset: impl Into<String>,
        config: StrategyConfig,
        market: Arc<dyn MarketDataSource>,
        venue: Arc<dyn OrderVenue>,
        price_history: Vec<f64>,
    ) -> Self {
        Self::with_clock(
            symbol,
            quote_asset,
            config,
            market,
            venue,
            price_history,
            Arc::new(|| Local::now().date_naive()),
        )
    }

    /// Same as [`Engine::new`] with an explicit source for the current trading day
    pub fn with_clock(
        symbol: impl Into<String>,
        quote_asset: impl Into<String>,
        config: StrategyConfig,
        market: Arc<dyn MarketDataSource>,
        venue: Arc<dyn OrderVenue>,
        price_history: Vec<f64>,
        clock: Clock,
    ) -> Self {
        let symbol = symbol.into();
        let snapshot = EngineSnapshot::empty(symbol.clone(), price_history.clone());
        let core = EngineCore::new(
            symbol,
            quote_asset.into(),
            config,
            market,
            venue,
            price_history,
            clock(),
        );
        let (stop_tx, _) = watch::channel(true);

        Self {
            shared: Arc::new(Shared {
                core: tokio::sync::Mutex::new(core),
                snapshot: RwLock::new(snapshot),
                stop_tx,
                task: tokio::sync::Mutex::new(None),
                halted: AtomicBool::new(false),
                clock,
            }),
        }
    }

    /// Spawn the control loop
    ///
    /// Returns `false` without doing anything when the loop is already
    /// running or the daily loss limit has halted the engine. A loop that is
    /// still winding down from `stop()` is waited for, then replaced.
    pub async fn start(&self) -> bool {
        let mut task = self.shared.task.lock().await;

        if let Some(handle) = task.as_mut() {
            if !handle.is_finished() {
                if !*self.shared.stop_tx.borrow() {
                    return false;
                }
                if let Err(e) = handle.await {
                    tracing::error!("Engine task ended abnormally: {}", e);
                }
            }
        }

        if self.is_halted() {
            tracing::warn!("Engine halted by the daily loss limit, refusing to start");
            return false;
        }

        self.shared.stop_tx.send_replace(false);
        self.shared.update_snapshot(|s| s.running = true);
        *task = Some(tokio::spawn(run_loop(Arc::clone(&self.shared))));
        tracing::info!("▶️  Engine started");
        true
    }

    /// Ask the loop to stop. Takes effect at the next iteration boundary or sleep.
    pub fn stop(&self) {
        self.shared.stop_tx.send_replace(true);
    }

    /// Wait for the loop task to exit
    pub async fn join(&self) {
        let mut task = self.shared.task.lock().await;
        if let Some(handle) = task.take() {
            if let Err(e) = handle.await {
                tracing::error!("Engine task ended abnormally: {}", e);
            }
        }
    }

    /// Stop and wait for any in-flight iteration to finish
    pub async fn shutdown(&self) {
        self.stop();
        self.join().await;
    }

    pub fn is_running(&self) -> bool {
        self.snapshot().running
    }

    pub fn is_halted(&self) -> bool {
        self.shared.halted.load(Ordering::SeqCst)
    }

    /// Latest published state
    pub fn snapshot(&self) -> EngineSnapshot {
        match self.shared.snapshot.read() {
            Ok(snapshot) => snapshot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Run a single iteration outside the loop and publish its snapshot
    pub async fn run_once(&self) -> anyhow::Result<IterationOutcome> {
        if self.is_halted() {
            let fraction = self.snapshot().daily_pnl_fraction;
            return Ok(IterationOutcome::Halted {
                daily_pnl_fraction: fraction,
            });
        }
        Arc::clone(&self.shared).tick().await
    }
}

impl Shared {
    fn update_snapshot(&self, update: impl FnOnce(&mut EngineSnapshot)) {
        match self.snapshot.write() {
            Ok(mut snapshot) => update(&mut snapshot),
            Err(poisoned) => update(&mut poisoned.into_inner()),
        }
    }

    /// One iteration under the core lock, followed by a snapshot publish
    async fn tick(self: Arc<Self>) -> anyhow::Result<IterationOutcome> {
        let today = (self.clock)();
        let mut core = self.core.lock().await;
        let outcome = core.run_iteration(today).await;

        if let IterationOutcome::Halted { .. } = outcome {
            self.halted.store(true, Ordering::SeqCst);
        }

        let running = !*self.stop_tx.borrow() && !self.halted.load(Ordering::SeqCst);
        let snapshot = core.snapshot(running, self.halted.load(Ordering::SeqCst));
        let mut published = self
            .snapshot
            .write()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .context("publishing engine snapshot")?;
        *published = snapshot;

        Ok(outcome)
    }

    async fn pauses(&self) -> (Duration, Duration, Duration) {
        let core = self.core.lock().await;
        let config = core.config();
        (
            config.poll_interval(),
            config.error_backoff(),
            config.recovery_backoff(),
        )
    }
}

async fn run_loop(shared: Arc<Shared>) {
    let mut stop_rx = shared.stop_tx.subscribe();
    let (poll_interval, error_backoff, recovery_backoff) = shared.pauses().await;

    tracing::info!(
        poll_secs = poll_interval.as_secs(),
        "🔄 Trading loop starting"
    );

    loop {
        if *stop_rx.borrow_and_update() {
            break;
        }

        // Run on its own task so a panic inside one iteration is contained
        let result = tokio::spawn(Arc::clone(&shared).tick()).await;

        let pause = match result {
            Ok(Ok(IterationOutcome::Completed(_))) => poll_interval,
            Ok(Ok(IterationOutcome::DataUnavailable)) => {
                tracing::info!(
                    backoff_secs = error_backoff.as_secs(),
                    "Market data unavailable, backing off"
                );
                error_backoff
            }
            Ok(Ok(IterationOutcome::Halted { .. })) => break,
            Ok(Err(e)) => {
                tracing::error!("Iteration failed: {:#}", e);
                recovery_backoff
            }
            Err(e) => {
                tracing::error!("Iteration aborted: {}", e);
                recovery_backoff
            }
        };

        if wait_or_stop(&mut stop_rx, pause).await {
            break;
        }
    }

    shared.update_snapshot(|s| s.running = false);
    tracing::info!("⏹️  Trading loop stopped");
}

/// Sleep for `pause`, returning early with `true` if a stop is requested
async fn wait_or_stop(stop_rx: &mut watch::Receiver<bool>, pause: Duration) -> bool {
    let deadline = Instant::now() + pause;
    loop {
        if *stop_rx.borrow_and_update() {
            return true;
        }
        tokio::select! {
            _ = sleep_until(deadline) => return false,
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    return true;
                }
            }
        }
    }
}
