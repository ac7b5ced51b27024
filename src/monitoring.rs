//! Self-monitoring counters for the watcher
//!
//! Tracks how much of the log stream was usable, where traffic went, and how
//! alert delivery went, so an operator can sanity-check a run from the
//! shutdown summary alone.

use crate::alerts::DispatchOutcome;
use crate::events::{RequestEvent, Timestamp};
use chrono::Utc;
use log::{debug, info, warn};
use std::collections::BTreeMap;

/// Counters accumulated over one watcher run
#[derive(Debug, Clone)]
pub struct WatcherStats {
    /// When counting started
    started_at: Timestamp,
    /// Lines pulled from the source, including rejected ones
    lines_read: u64,
    /// Lines that did not parse into a request
    lines_rejected: u64,
    /// Lines that parsed into a request
    requests_accepted: u64,
    /// Accepted requests whose final status was 5xx
    server_errors: u64,
    /// Accepted requests per pool
    pool_requests: BTreeMap<String, u64>,
    alerts_sent: u64,
    alerts_suppressed: u64,
    alerts_fallback: u64,
    alerts_failed: u64,
}

impl Default for WatcherStats {
    fn default() -> Self {
        Self::new()
    }
}

impl WatcherStats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            lines_read: 0,
            lines_rejected: 0,
            requests_accepted: 0,
            server_errors: 0,
            pool_requests: BTreeMap::new(),
            alerts_sent: 0,
            alerts_suppressed: 0,
            alerts_fallback: 0,
            alerts_failed: 0,
        }
    }

    /// Record a line that could not be parsed
    pub fn record_rejected(&mut self) {
        self.lines_read += 1;
        self.lines_rejected += 1;
    }

    /// Record a line that parsed into `event`
    pub fn record_request(&mut self, event: &RequestEvent) {
        self.lines_read += 1;
        self.requests_accepted += 1;
        if event.is_server_error() {
            self.server_errors += 1;
        }
        *self.pool_requests.entry(event.pool.clone()).or_insert(0) += 1;
    }

    /// Record what happened to one dispatched alert
    pub fn record_dispatch(&mut self, outcome: &DispatchOutcome) {
        debug!("Recording dispatch outcome: {:?}", outcome);

        match outcome {
            DispatchOutcome::Sent => self.alerts_sent += 1,
            DispatchOutcome::Suppressed { .. } => self.alerts_suppressed += 1,
            DispatchOutcome::FallbackPrinted => self.alerts_fallback += 1,
            DispatchOutcome::Failed(_) => self.alerts_failed += 1,
        }
    }

    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    pub fn lines_rejected(&self) -> u64 {
        self.lines_rejected
    }

    pub fn requests_accepted(&self) -> u64 {
        self.requests_accepted
    }

    pub fn server_errors(&self) -> u64 {
        self.server_errors
    }

    /// Accepted requests seen for `pool`
    pub fn pool_requests(&self, pool: &str) -> u64 {
        self.pool_requests.get(pool).copied().unwrap_or(0)
    }

    pub fn alerts_sent(&self) -> u64 {
        self.alerts_sent
    }

    pub fn alerts_suppressed(&self) -> u64 {
        self.alerts_suppressed
    }

    pub fn alerts_fallback(&self) -> u64 {
        self.alerts_fallback
    }

    pub fn alerts_failed(&self) -> u64 {
        self.alerts_failed
    }

    /// Share of delivery attempts that succeeded, as a percentage (0-100)
    ///
    /// Suppressed alerts are not delivery attempts. With no attempts the
    /// rate is 100.
    pub fn notification_success_rate(&self) -> f64 {
        let attempts = self.alerts_sent + self.alerts_failed;
        if attempts == 0 {
            return 100.0;
        }
        (self.alerts_sent as f64 / attempts as f64) * 100.0
    }

    /// Log a one-shot summary of the run
    pub fn log_summary(&self) {
        let elapsed = Utc::now() - self.started_at;
        let pools = self
            .pool_requests
            .iter()
            .map(|(pool, count)| format!("{}={}", pool, count))
            .collect::<Vec<_>>()
            .join(", ");

        info!(
            "Watcher summary: uptime={}s, lines={}, requests={}, rejected={}, 5xx={}, pools=[{}]",
            elapsed.num_seconds(),
            self.lines_read,
            self.requests_accepted,
            self.lines_rejected,
            self.server_errors,
            pools
        );
        info!(
            "Alert summary: sent={}, suppressed={}, printed={}, failed={}, delivery_success={:.1}%, memory={}MB",
            self.alerts_sent,
            self.alerts_suppressed,
            self.alerts_fallback,
            self.alerts_failed,
            self.notification_success_rate(),
            peak_memory_bytes() / 1024 / 1024
        );

        if self.notification_success_rate() < 90.0 {
            warn!(
                "Low notification success rate: {:.1}%",
                self.notification_success_rate()
            );
        }
        if self.lines_read > 0 && self.requests_accepted == 0 {
            warn!("No line matched the expected access log format");
        }
    }
}

/// Peak resident memory of this process, or 0 if unknown
fn peak_memory_bytes() -> u64 {
    #[cfg(unix)]
    {
        // SAFETY: getrusage only writes into the zeroed struct we pass
        unsafe {
            let mut usage: libc::rusage = std::mem::zeroed();
            if libc::getrusage(libc::RUSAGE_SELF, &mut usage) == 0 {
                // ru_maxrss is in KB on Linux, bytes on macOS
                #[cfg(target_os = "macos")]
                return usage.ru_maxrss as u64;

                #[cfg(not(target_os = "macos"))]
                return (usage.ru_maxrss as u64) * 1024;
            }
        }
    }

    0
}
