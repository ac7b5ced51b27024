//! The per-line watcher loop
//!
//! `PoolWatcher` owns every piece of detection state and drives it one line
//! at a time: parse, log, update the window and the pool state machine,
//! then dispatch whatever alerts the line produced before pulling the next.

use crate::aggregator::SlidingWindow;
use crate::alerts::messages::{error_rate_message, failover_message, recovery_message};
use crate::alerts::{AlertDispatcher, DispatchOutcome, NotificationSink, SlackWebhookSink};
use crate::collectors::{parse_line_at, LineSource, SourceLine};
use crate::config::Config;
use crate::error::{ConfigError, WatcherError};
use crate::events::{AlertKind, RequestEvent, Timestamp};
use crate::monitoring::WatcherStats;
use crate::triggers::{ErrorRateDetector, PoolStateMachine, PoolTransition};
use chrono::Utc;
use log::{debug, error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

/// How long to wait for a line before re-checking the shutdown flag
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Why a watcher run ended normally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The source has no more lines
    EndOfStream,
    /// The running flag was cleared
    Shutdown,
}

/// One alert raised while processing a line, and what became of it
#[derive(Debug)]
pub struct DispatchReport {
    pub kind: AlertKind,
    pub outcome: DispatchOutcome,
}

/// Streaming failover and error-rate watcher
pub struct PoolWatcher {
    window: SlidingWindow,
    pools: PoolStateMachine,
    detector: ErrorRateDetector,
    dispatcher: AlertDispatcher,
    stats: WatcherStats,
    /// Drives the async notification sink from this synchronous loop
    runtime: Runtime,
    cooldown_seconds: u64,
}

impl PoolWatcher {
    /// Create a watcher from configuration
    ///
    /// A Slack sink is built when a usable webhook URL is configured;
    /// otherwise alerts are printed to the log.
    pub fn new(config: &Config) -> Result<Self, WatcherError> {
        let sink: Option<Arc<dyn NotificationSink>> = match config.webhook_url() {
            Some(url) => Some(Arc::new(SlackWebhookSink::new(
                url.to_string(),
                config.webhook_timeout(),
            )?)),
            None => None,
        };
        Self::with_sink(config, sink)
    }

    /// Create a watcher delivering alerts to an explicit sink
    pub fn with_sink(
        config: &Config,
        sink: Option<Arc<dyn NotificationSink>>,
    ) -> Result<Self, WatcherError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(WatcherError::Runtime)?;

        let cooldown_seconds = config.alerts.cooldown_seconds;
        let cooldown = i64::try_from(cooldown_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "alert cooldown of {}s is out of range",
                    cooldown_seconds
                ))
            })?;

        Ok(Self {
            window: SlidingWindow::new(config.detection.window_size),
            pools: PoolStateMachine::new(config.pools.active_pool.clone()),
            detector: ErrorRateDetector::new(
                config.detection.window_size,
                config.detection.error_rate_threshold,
            ),
            dispatcher: AlertDispatcher::new(
                cooldown,
                sink,
                config.notification.username.clone(),
                config.webhook_timeout(),
            ),
            stats: WatcherStats::new(),
            runtime,
            cooldown_seconds,
        })
    }

    /// Log the effective settings once at startup
    pub fn log_banner(&self) {
        info!("Pool watcher starting");
        info!("  Active pool:      {}", self.pools.active_pool());
        info!("  Error threshold:  {}%", self.detector.threshold());
        info!(
            "  Window size:      {} requests (min {} samples)",
            self.window.capacity(),
            self.detector.min_samples()
        );
        info!("  Alert cooldown:   {}s", self.cooldown_seconds);
        if self.dispatcher.has_sink() {
            info!("  Notifications:    Slack webhook configured");
        } else {
            info!("  Notifications:    no webhook, alerts print to console");
        }
    }

    /// Process one raw log line at the current time
    pub fn process_line(&mut self, line: &str) -> Vec<DispatchReport> {
        self.process_line_at(line, Utc::now())
    }

    /// Process one raw log line as if observed at `now`
    ///
    /// Lines that do not parse are counted and otherwise ignored.
    pub fn process_line_at(&mut self, line: &str, now: Timestamp) -> Vec<DispatchReport> {
        let Some(event) = parse_line_at(line, now) else {
            debug!("Skipping unparsable line: {}", line);
            self.stats.record_rejected();
            return Vec::new();
        };

        log_request(&event);
        self.stats.record_request(&event);

        let pool = event.pool.clone();
        self.window.append(event);

        let mut alerts = Vec::new();

        match self.pools.observe(&pool) {
            Some(PoolTransition::Failover { from, to }) => {
                info!("Pool change detected: {} -> {}", from, to);
                alerts.push((AlertKind::Failover, failover_message(&from, &to, now)));
            }
            Some(PoolTransition::Recovery { pool }) => {
                info!("Traffic back on active pool {}", pool);
                alerts.push((AlertKind::Recovery, recovery_message(&pool, now)));
            }
            None => {}
        }

        if let Some(decision) = self.detector.evaluate(&self.window) {
            debug!(
                "Error rate {:.2}% over {} requests exceeds {}%",
                decision.error_rate, decision.total, decision.threshold
            );
            alerts.push((AlertKind::ErrorRate, error_rate_message(&decision)));
        }

        alerts
            .into_iter()
            .map(|(kind, message)| {
                let outcome = self
                    .runtime
                    .block_on(self.dispatcher.dispatch_at(kind, &message, now));
                self.stats.record_dispatch(&outcome);
                DispatchReport { kind, outcome }
            })
            .collect()
    }

    /// Pull lines from `source` until it ends or `running` is cleared
    ///
    /// The source is closed and a summary logged on every exit path. A
    /// source failure ends the run with an error.
    pub fn run(
        &mut self,
        source: &mut dyn LineSource,
        running: &AtomicBool,
    ) -> Result<StopReason, WatcherError> {
        info!("Watching log stream...");

        let result = self.pump(source, running);

        if let Err(e) = source.close() {
            error!("Failed to close log source: {}", e);
        }
        if let Err(e) = &result {
            error!("Watcher stopped: {}", e);
        }
        self.stats.log_summary();

        result
    }

    fn pump(
        &mut self,
        source: &mut dyn LineSource,
        running: &AtomicBool,
    ) -> Result<StopReason, WatcherError> {
        loop {
            if !running.load(Ordering::SeqCst) {
                info!("Shutdown requested, stopping watcher");
                return Ok(StopReason::Shutdown);
            }

            let polled = match source.poll_line(POLL_INTERVAL) {
                // Ctrl+C also reaches the log stream child, so its exit is not a failure
                Err(_) | Ok(SourceLine::EndOfStream) if !running.load(Ordering::SeqCst) => {
                    info!("Shutdown requested, stopping watcher");
                    return Ok(StopReason::Shutdown);
                }
                polled => polled?,
            };

            match polled {
                SourceLine::Line(line) => {
                    self.process_line(&line);
                }
                SourceLine::Idle => {}
                SourceLine::EndOfStream => {
                    info!("Log stream ended");
                    return Ok(StopReason::EndOfStream);
                }
            }
        }
    }

    pub fn stats(&self) -> &WatcherStats {
        &self.stats
    }

    pub fn pool_state(&self) -> &PoolStateMachine {
        &self.pools
    }

    pub fn window(&self) -> &SlidingWindow {
        &self.window
    }
}

fn log_request(event: &RequestEvent) {
    let upstream = event
        .upstream_status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string());

    info!(
        "[{}] Request: pool={} status={} (upstream: {})",
        event.status_class().marker(),
        event.pool,
        event.status,
        upstream
    );
}
