use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::models::CheckResult;
use super::probe::{DEFAULT_PROBE_TIMEOUT, Prober};
use super::scheduler::{ResultHandler, Scheduler};
use super::state::StateTracker;
use super::target::{DEFAULT_INTERVAL, Target};
use super::traits::{Notifier, Store};

/// Extra time granted on shutdown on top of the probe timeout.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub default_interval: Duration,
    pub probe_timeout: Duration,
    pub icmp: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_interval: DEFAULT_INTERVAL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            icmp: false,
        }
    }
}

/// Per-check side effects, in order: persist, compare, notify.
struct CheckPipeline {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    tracker: StateTracker,
}

#[async_trait]
impl ResultHandler for CheckPipeline {
    async fn handle(&self, result: CheckResult) {
        if let Err(e) = self.store.log_check(&result).await {
            error!(monitor = %result.target, error = %e, "Failed to persist check result.");
        }

        debug!(
            monitor = %result.target,
            success = result.success,
            latency_ms = result.latency_ms(),
            "Check completed."
        );

        let Some(transition) = self.tracker.observe(&result) else {
            return;
        };

        if transition.is_up {
            info!(monitor = %transition.target, "Monitor is back UP.");
        } else {
            warn!(
                monitor = %transition.target,
                error = result.error.as_deref().unwrap_or_default(),
                "Monitor went DOWN."
            );
        }

        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            notifier
                .notify(&transition.target, transition.is_up, transition.was_up)
                .await;
        });
    }
}

/// Composition root of the monitoring engine.
pub struct Engine {
    targets: Vec<Target>,
    settings: EngineSettings,
    prober: Arc<Prober>,
    pipeline: Arc<CheckPipeline>,
    scheduler: Scheduler,
    started: AtomicBool,
}

impl Engine {
    /// Builds an engine over a fixed target list. With ICMP enabled this must
    /// run inside a tokio runtime.
    pub fn new(
        targets: Vec<Target>,
        settings: EngineSettings,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            targets,
            settings,
            prober: Arc::new(Prober::new(settings.probe_timeout, settings.icmp)),
            pipeline: Arc::new(CheckPipeline {
                store,
                notifier,
                tracker: StateTracker::new(),
            }),
            scheduler: Scheduler::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Launches one check loop per target. Subsequent calls do nothing.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Monitoring engine already started.");
            return;
        }
        self.scheduler.spawn_all(
            &self.targets,
            self.settings.default_interval,
            Arc::clone(&self.prober),
            self.pipeline.clone(),
        );
        info!(monitors = self.targets.len(), "Monitoring engine started.");
    }

    /// Stops every check loop. Returns once they have drained, which takes at
    /// most one probe timeout plus a short grace period.
    pub async fn stop(&self) {
        self.scheduler
            .stop(self.prober.timeout() + SHUTDOWN_GRACE)
            .await;
        info!("Monitoring engine stopped.");
    }

    /// Last observed status of `target`; `None` before its first check.
    pub fn status(&self, target: &str) -> Option<bool> {
        self.pipeline.tracker.status(target)
    }
}
