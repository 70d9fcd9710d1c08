use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Instant;

use crate::processor::ProcessOutcome;

/// Outcome of the most recent poll
#[derive(Debug, Clone, Serialize)]
pub struct LastPoll {
    pub at: DateTime<Utc>,
    pub ok: bool,
    pub pending: usize,
    pub error: Option<String>,
}

/// Point-in-time view served by the health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub last_poll: Option<LastPoll>,
    pub consecutive_failures: u32,
    pub backing_off: bool,
    pub cycles: u64,
    pub completed: u64,
    pub failed: u64,
}

impl HealthSnapshot {
    pub fn is_healthy(&self) -> bool {
        !self.backing_off
    }
}

/// Relayer state shared between the scheduler (sole writer) and the health server
pub struct RelayerStatus {
    started: Instant,
    cycles: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    consecutive_failures: AtomicU32,
    backing_off: AtomicBool,
    last_poll: RwLock<Option<LastPoll>>,
}

impl Default for RelayerStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayerStatus {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            cycles: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            consecutive_failures: AtomicU32::new(0),
            backing_off: AtomicBool::new(false),
            last_poll: RwLock::new(None),
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    pub fn record_outcome(&self, outcome: &ProcessOutcome) {
        match outcome {
            ProcessOutcome::Completed { .. } => {
                self.completed.fetch_add(1, Ordering::Relaxed);
            }
            ProcessOutcome::Duplicate { .. } => {}
            _ => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Successful cycle; resets the failure streak
    pub fn record_success(&self, pending: usize) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.set_last_poll(LastPoll { at: Utc::now(), ok: true, pending, error: None });
    }

    /// Failed cycle; returns the new failure streak
    pub fn record_failure(&self, error: &str) -> u32 {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        let streak = self.consecutive_failures.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        self.set_last_poll(LastPoll {
            at: Utc::now(),
            ok: false,
            pending: 0,
            error: Some(error.to_string()),
        });
        streak
    }

    pub fn set_backing_off(&self, backing_off: bool) {
        self.backing_off.store(backing_off, Ordering::SeqCst);
    }

    fn set_last_poll(&self, poll: LastPoll) {
        if let Ok(mut last) = self.last_poll.write() {
            *last = Some(poll);
        }
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let backing_off = self.backing_off.load(Ordering::SeqCst);
        HealthSnapshot {
            status: if backing_off { "degraded" } else { "ok" },
            uptime_secs: self.started.elapsed().as_secs(),
            last_poll: self.last_poll.read().ok().and_then(|p| p.clone()),
            consecutive_failures: self.consecutive_failures(),
            backing_off,
            cycles: self.cycles.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
