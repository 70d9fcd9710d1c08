use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::backoff::BackoffPolicy;
use crate::chain::ChainGateway;
use crate::config::SchedulerConfig;
use crate::error::CycleError;
use crate::processor::{ProcessOutcome, RequestProcessor};
use crate::status::RelayerStatus;

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Previous cycle still in flight
    Skipped,
    Ran(CycleReport),
    Failed { consecutive_failures: u32, backoff: Option<Duration> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub pending: usize,
    pub outcomes: Vec<ProcessOutcome>,
    /// Stopped early because of shutdown
    pub interrupted: bool,
}

impl CycleReport {
    fn attempted(&self) -> impl Iterator<Item = &ProcessOutcome> {
        self.outcomes.iter().filter(|o| !matches!(o, ProcessOutcome::Duplicate { .. }))
    }

    /// At least one request was attempted and every attempt hit a remote failure
    pub fn is_remote_outage(&self) -> bool {
        self.attempted().next().is_some() && self.attempted().all(ProcessOutcome::is_remote_failure)
    }

    fn outage_error(&self) -> CycleError {
        let last = self
            .outcomes
            .iter()
            .rev()
            .find_map(|o| match o {
                ProcessOutcome::Skipped { stage, reason, .. } => Some(format!("{}: {}", stage, reason)),
                _ => None,
            })
            .unwrap_or_default();

        CycleError::RemoteOutage { attempted: self.attempted().count(), last }
    }
}

// Clears the in-flight flag when the cycle ends, however it ends
struct CycleGuard<'a>(&'a AtomicBool);

impl<'a> CycleGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Poll loop: discovers pending requests and feeds them, one at a time, to the processor
pub struct Scheduler {
    chain: Arc<dyn ChainGateway>,
    processor: RequestProcessor,
    config: SchedulerConfig,
    backoff: BackoffPolicy,
    status: Arc<RelayerStatus>,
    in_flight: AtomicBool,
    shutdown: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(
        chain: Arc<dyn ChainGateway>,
        processor: RequestProcessor,
        config: SchedulerConfig,
        status: Arc<RelayerStatus>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let backoff = BackoffPolicy {
            base: config.poll_interval,
            threshold: config.failure_threshold,
            max_delay: config.max_backoff,
        };

        Self {
            chain,
            processor,
            config,
            backoff,
            status,
            in_flight: AtomicBool::new(false),
            shutdown,
        }
    }

    pub fn status(&self) -> Arc<RelayerStatus> {
        self.status.clone()
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Main polling loop, returns once shutdown is signalled
    pub async fn run(&self) {
        info!(
            interval_ms = self.config.poll_interval.as_millis() as u64,
            failure_threshold = self.config.failure_threshold,
            max_backoff_secs = self.config.max_backoff.as_secs(),
            "relayer polling started"
        );

        loop {
            if self.shutdown_requested() {
                break;
            }

            self.tick().await;

            if !self.sleep_unless_shutdown(self.config.poll_interval).await {
                break;
            }
        }

        info!("relayer polling stopped");
    }

    /// One poll cycle, including any backoff sleep it earns
    pub async fn tick(&self) -> TickOutcome {
        let Some(_guard) = CycleGuard::try_acquire(&self.in_flight) else {
            debug!("previous cycle still in flight, skipping tick");
            return TickOutcome::Skipped;
        };

        match self.run_cycle().await {
            Ok(report) => {
                self.status.record_success(report.pending);
                TickOutcome::Ran(report)
            }
            Err(e) => {
                let failures = self.status.record_failure(&e.to_string());
                error!(consecutive_failures = failures, "poll cycle failed: {}", e);

                let backoff = self.backoff.delay(failures);
                if let Some(delay) = backoff {
                    warn!(
                        consecutive_failures = failures,
                        delay_ms = delay.as_millis() as u64,
                        "backing off"
                    );
                    self.status.set_backing_off(true);
                    self.sleep_unless_shutdown(delay).await;
                    self.status.set_backing_off(false);
                }

                TickOutcome::Failed { consecutive_failures: failures, backoff }
            }
        }
    }

    async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let items = self.chain.list_pending().await?;

        let mut report = CycleReport { pending: items.len(), ..Default::default() };
        if !items.is_empty() {
            info!("found {} pending request(s)", items.len());
        }

        // an item is the unit of shutdown: once marked it runs to completion or failure
        for item in &items {
            if self.shutdown_requested() {
                info!("shutdown requested, leaving remaining requests for the next run");
                report.interrupted = true;
                break;
            }

            let outcome = self.processor.process(item).await;
            self.status.record_outcome(&outcome);
            report.outcomes.push(outcome);
        }

        if report.is_remote_outage() {
            return Err(report.outage_error());
        }

        Ok(report)
    }

    /// Returns false if shutdown was signalled before `delay` elapsed
    async fn sleep_unless_shutdown(&self, delay: Duration) -> bool {
        let mut shutdown = self.shutdown.clone();
        if *shutdown.borrow() {
            return false;
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            changed = shutdown.changed() => match changed {
                Ok(()) => !*shutdown.borrow(),
                // sender gone: nobody can ask us to stop any more
                Err(_) => {
                    tokio::time::sleep(delay).await;
                    true
                }
            },
        }
    }
}
