//! Core event types for the pool watcher
//!
//! This module defines the value types that flow from the line parser through
//! the detectors to the alert dispatcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type for consistent time handling across the application
pub type Timestamp = DateTime<Utc>;

/// One proxied request extracted from an access log line
///
/// Created by the line parser for every accepted line and never mutated
/// afterwards. The sliding window owns it until it is evicted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestEvent {
    /// Backend pool that served the request (never the `-` sentinel)
    pub pool: String,
    /// Final HTTP status returned to the client
    pub status: u16,
    /// Last usable status reported by the upstream(s), if any
    pub upstream_status: Option<u16>,
    /// When the watcher observed the line
    pub observed_at: Timestamp,
}

impl RequestEvent {
    /// Whether the final status counts towards the error rate
    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }

    /// Coarse classification of the final status
    pub fn status_class(&self) -> StatusClass {
        match self.status {
            s if s >= 500 => StatusClass::ServerError,
            s if s >= 400 => StatusClass::ClientError,
            _ => StatusClass::Success,
        }
    }
}

/// Coarse status classification used for the per-request operator log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    /// 1xx-3xx
    Success,
    /// 4xx
    ClientError,
    /// 5xx
    ServerError,
}

impl StatusClass {
    /// Marker printed in front of each request line
    pub fn marker(&self) -> &'static str {
        match self {
            StatusClass::Success => "OK",
            StatusClass::ClientError => "WARN",
            StatusClass::ServerError => "ERR",
        }
    }
}

/// Kind of alert, each with its own cooldown slot
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Observed pool changed relative to the previous request
    Failover,
    /// Error rate over the window exceeded the threshold
    ErrorRate,
    /// Traffic returned to the configured active pool
    Recovery,
}

impl AlertKind {
    /// All alert kinds, in a stable order
    pub const ALL: [AlertKind; 3] = [AlertKind::Failover, AlertKind::ErrorRate, AlertKind::Recovery];

    /// Slack emoji shortcode used as the message icon
    pub fn icon(&self) -> &'static str {
        match self {
            AlertKind::Failover => ":warning:",
            AlertKind::ErrorRate => ":rotating_light:",
            AlertKind::Recovery => ":white_check_mark:",
        }
    }

    /// Lowercase identifier matching the serialized form
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Failover => "failover",
            AlertKind::ErrorRate => "error_rate",
            AlertKind::Recovery => "recovery",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(status: u16) -> RequestEvent {
        RequestEvent {
            pool: "blue".to_string(),
            status,
            upstream_status: Some(status),
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn test_request_event_serialization() {
        let original = event(502);

        let json = serde_json::to_string(&original).unwrap();
        let deserialized: RequestEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(original, deserialized);
    }

    #[test]
    fn test_status_class_boundaries() {
        assert_eq!(event(200).status_class(), StatusClass::Success);
        assert_eq!(event(399).status_class(), StatusClass::Success);
        assert_eq!(event(400).status_class(), StatusClass::ClientError);
        assert_eq!(event(499).status_class(), StatusClass::ClientError);
        assert_eq!(event(500).status_class(), StatusClass::ServerError);
        assert!(event(500).is_server_error());
        assert!(!event(499).is_server_error());
    }

    #[test]
    fn test_alert_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&AlertKind::Failover).unwrap(),
            "\"failover\""
        );
        assert_eq!(
            serde_json::to_string(&AlertKind::ErrorRate).unwrap(),
            "\"error_rate\""
        );
        assert_eq!(
            serde_json::to_string(&AlertKind::Recovery).unwrap(),
            "\"recovery\""
        );
    }

    #[test]
    fn test_alert_kind_display_matches_serde() {
        for kind in AlertKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
        }
    }
}
