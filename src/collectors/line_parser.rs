//! Extraction of request events from nginx access log lines
//!
//! The proxy is expected to log in combined format with two extra fields,
//! `pool=<name>` and `upstream_status=<list>`, for example:
//!
//! ```text
//! 172.18.0.1 - - [09/Dec/2024:10:30:45 +0000] "GET /version HTTP/1.1" 200 57 "-" "curl/8.5.0" pool=blue release=v1 upstream_status=502, 200 upstream=172.18.0.3:3000
//! ```

use crate::events::{RequestEvent, Timestamp};
use chrono::Utc;
use regex::Regex;
use std::sync::LazyLock;

static POOL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"pool=(\w+|-)").expect("pool pattern is valid"));

static STATUS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""[^"]*"\s+(\d+)\s+"#).expect("status pattern is valid"));

static UPSTREAM_STATUS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"upstream_status="?([0-9, -]+)"#).expect("upstream status pattern is valid")
});

/// Sentinel nginx writes when a field has no value
const EMPTY_FIELD: &str = "-";

/// Parse one access log line, stamping it with the current time
///
/// Returns `None` for anything that is not a proxied request: lines without
/// a pool or status field, lines whose pool is `-`, and statuses outside
/// 100-599.
pub fn parse_line(line: &str) -> Option<RequestEvent> {
    parse_line_at(line, Utc::now())
}

/// Parse one access log line with an explicit observation time
pub fn parse_line_at(line: &str, observed_at: Timestamp) -> Option<RequestEvent> {
    let pool = POOL_PATTERN.captures(line)?.get(1)?.as_str();
    let status_text = STATUS_PATTERN.captures(line)?.get(1)?.as_str();

    if pool == EMPTY_FIELD {
        return None;
    }

    let status: u16 = status_text.parse().ok()?;
    if !(100..=599).contains(&status) {
        return None;
    }

    let upstream_status = UPSTREAM_STATUS_PATTERN
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|list| last_upstream_status(list.as_str()));

    Some(RequestEvent {
        pool: pool.to_string(),
        status,
        upstream_status,
        observed_at,
    })
}

/// Pick the status of the last upstream that actually answered
///
/// nginx appends one entry per upstream tried, so the rightmost numeric
/// entry is the one that produced the response.
fn last_upstream_status(list: &str) -> Option<u16> {
    list.split(',')
        .rev()
        .map(str::trim)
        .filter(|entry| !entry.is_empty() && *entry != EMPTY_FIELD)
        .filter(|entry| entry.bytes().all(|b| b.is_ascii_digit()))
        .find_map(|entry| entry.parse().ok())
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[quickcheck]
    fn prop_arbitrary_input_never_panics(line: String) -> bool {
        // Either outcome is fine, parsing must simply not panic
        let _ = parse_line(&line);
        true
    }

    #[quickcheck]
    fn prop_accepted_events_respect_invariants(line: String) -> bool {
        match parse_line(&line) {
            Some(event) => {
                !event.pool.is_empty()
                    && event.pool != EMPTY_FIELD
                    && (100..=599).contains(&event.status)
            }
            None => true,
        }
    }

    #[quickcheck]
    fn prop_rightmost_upstream_status_wins(statuses: Vec<u16>) -> bool {
        let list = statuses
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let line = format!(r#""GET / HTTP/1.1" 200 0 pool=blue upstream_status={}"#, list);

        parse_line(&line).map(|event| event.upstream_status) == Some(statuses.last().copied())
    }
}
