//! Error-rate detection over the request window

use crate::aggregator::SlidingWindow;
use serde::Serialize;

/// Smallest sample size the detector will ever evaluate
const MIN_SAMPLES_FLOOR: usize = 50;

/// Details of an error-rate threshold breach
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRateDecision {
    /// Percentage of 5xx responses in the window, rounded to two decimals
    pub error_rate: f64,
    /// Number of 5xx responses in the window
    pub error_count: usize,
    /// Number of requests in the window
    pub total: usize,
    /// Threshold that was exceeded, in percent
    pub threshold: f64,
    /// Requests per pool, in order of first appearance in the window
    pub pool_distribution: Vec<(String, usize)>,
}

/// Decides whether the window's 5xx ratio warrants an alert
///
/// Evaluation is skipped until the window holds at least
/// `max(50, capacity / 4)` requests, so a cold window cannot alert on a
/// handful of failures.
#[derive(Debug, Clone)]
pub struct ErrorRateDetector {
    /// Error percentage that must be exceeded
    threshold: f64,
    /// Minimum window size before evaluating
    min_samples: usize,
}

impl ErrorRateDetector {
    /// Create a detector for a window of `window_capacity` requests
    ///
    /// # Arguments
    ///
    /// * `window_capacity` - Capacity of the window the detector will evaluate
    /// * `threshold` - Error percentage that must be exceeded to alert
    pub fn new(window_capacity: usize, threshold: f64) -> Self {
        Self {
            threshold,
            min_samples: MIN_SAMPLES_FLOOR.max(window_capacity / 4),
        }
    }

    /// Minimum number of requests required before evaluating
    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Evaluate the window and return a decision if the threshold is exceeded
    pub fn evaluate(&self, window: &SlidingWindow) -> Option<ErrorRateDecision> {
        let total = window.size();
        if total < self.min_samples || total == 0 {
            return None;
        }

        let error_count = window.snapshot().filter(|e| e.is_server_error()).count();
        let error_rate = (error_count as f64 * 100.0) / total as f64;

        if error_rate <= self.threshold {
            return None;
        }

        Some(ErrorRateDecision {
            error_rate: (error_rate * 100.0).round() / 100.0,
            error_count,
            total,
            threshold: self.threshold,
            pool_distribution: pool_distribution(window),
        })
    }
}

/// Count requests per pool, keeping first-seen order
fn pool_distribution(window: &SlidingWindow) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for event in window.snapshot() {
        match counts.iter_mut().find(|(pool, _)| *pool == event.pool) {
            Some((_, count)) => *count += 1,
            None => counts.push((event.pool.clone(), 1)),
        }
    }
    counts
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::events::RequestEvent;
    use chrono::Utc;
    use quickcheck_macros::quickcheck;

    #[quickcheck]
    fn prop_no_decision_below_min_samples(statuses: Vec<u16>, capacity: u16, threshold: f64) -> bool {
        let capacity = capacity as usize;
        let detector = ErrorRateDetector::new(capacity, threshold);
        let mut window = SlidingWindow::new(capacity);

        statuses.iter().all(|status| {
            window.append(RequestEvent {
                pool: "blue".to_string(),
                status: 100 + status % 500,
                upstream_status: None,
                observed_at: Utc::now(),
            });
            window.size() >= detector.min_samples() || detector.evaluate(&window).is_none()
        })
    }

    #[quickcheck]
    fn prop_decision_counts_are_consistent(errors: u8, successes: u8) -> bool {
        let mut window = SlidingWindow::new(1000);
        for n in 0..(errors as usize + successes as usize) {
            window.append(RequestEvent {
                pool: if n % 2 == 0 { "blue" } else { "green" }.to_string(),
                status: if n < errors as usize { 500 } else { 200 },
                upstream_status: None,
                observed_at: Utc::now(),
            });
        }

        match ErrorRateDetector::new(1000, 0.0).evaluate(&window) {
            Some(decision) => {
                decision.error_count == errors as usize
                    && decision.total == window.size()
                    && decision.pool_distribution.iter().map(|(_, c)| c).sum::<usize>()
                        == decision.total
            }
            None => window.size() < 250 || errors == 0,
        }
    }
}
