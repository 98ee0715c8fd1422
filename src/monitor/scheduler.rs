//! One independent periodic check loop per target.
use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::models::CheckResult;
use super::probe::{Prober, panic_message};
use super::target::Target;

/// Consumes every result a check loop produces, in order, before the loop
/// schedules its next tick.
#[async_trait]
pub trait ResultHandler: Send + Sync {
    async fn handle(&self, result: CheckResult);
}

pub struct Scheduler {
    shutdown_tx: watch::Sender<bool>,
    running_tasks: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            running_tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawns one check loop per target. The first check of each loop runs
    /// immediately.
    pub fn spawn_all(
        &self,
        targets: &[Target],
        default_interval: Duration,
        prober: Arc<Prober>,
        handler: Arc<dyn ResultHandler>,
    ) {
        let mut running = self
            .running_tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        for target in targets {
            let period = target.effective_interval(default_interval);
            let handle = tokio::spawn(run_check_loop(
                target.clone(),
                period,
                Arc::clone(&prober),
                Arc::clone(&handler),
                self.shutdown_tx.subscribe(),
            ));
            running.push((target.name.clone(), handle));
        }
    }

    pub fn running(&self) -> usize {
        self.running_tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Signals every loop to stop and waits up to `grace` for them to drain.
    ///
    /// In-flight probes are left to finish on their own; loops still running
    /// at the deadline are aborted.
    pub async fn stop(&self, grace: Duration) {
        if self.shutdown_tx.send_replace(true) {
            debug!("Scheduler already signalled to stop.");
        }

        let tasks = std::mem::take(
            &mut *self
                .running_tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if tasks.is_empty() {
            return;
        }

        info!(count = tasks.len(), "Stopping check loops.");
        let deadline = Instant::now() + grace;
        for (name, mut handle) in tasks {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(monitor = %name, error = %e, "Check loop ended abnormally."),
                Err(_) => {
                    warn!(monitor = %name, "Check loop did not stop in time; aborting.");
                    handle.abort();
                }
            }
        }
    }
}

async fn run_check_loop(
    target: Target,
    period: Duration,
    prober: Arc<Prober>,
    handler: Arc<dyn ResultHandler>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    // A slow probe pushes the schedule back instead of causing a burst.
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(monitor = %target.name, kind = target.kind.label(), interval = ?period, "Started check loop.");

    loop {
        if *shutdown_rx.borrow_and_update() {
            break;
        }
        tokio::select! {
            biased;
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = interval.tick() => {
                let result = prober.check(&target).await;
                if let Err(panic) = AssertUnwindSafe(handler.handle(result)).catch_unwind().await {
                    error!(
                        monitor = %target.name,
                        error = %panic_message(panic.as_ref()),
                        "Result handler panicked; keeping the check loop alive."
                    );
                }
            }
        }
    }
    info!(monitor = %target.name, "Check loop stopped.");
}
