//! Alert message formatting
//!
//! Messages use Slack's mrkdwn flavour: `*bold*` and `` `code` ``.

use crate::events::Timestamp;
use crate::triggers::ErrorRateDecision;

/// Human-readable UTC time used in alert bodies
pub fn format_time(time: Timestamp) -> String {
    time.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Body of a failover alert
pub fn failover_message(from: &str, to: &str, at: Timestamp) -> String {
    format!(
        "*Failover Detected* :warning:\n\n\
         Pool switched: `{from}` → `{to}`\n\
         Time: {time}\n\n\
         *Action Required:*\n\
         • Check health of `{from}` container\n\
         • Review logs: `docker logs app_{from}`\n\
         • Monitor recovery status",
        from = from,
        to = to,
        time = format_time(at),
    )
}

/// Body of a recovery alert
pub fn recovery_message(active_pool: &str, at: Timestamp) -> String {
    format!(
        "*Recovery Detected* :white_check_mark:\n\n\
         Primary pool `{}` is back online\n\
         Time: {}\n\n\
         System has auto-recovered to normal state.",
        active_pool,
        format_time(at),
    )
}

/// Body of a high error rate alert
pub fn error_rate_message(decision: &ErrorRateDecision) -> String {
    let distribution = decision
        .pool_distribution
        .iter()
        .map(|(pool, count)| format!("{}: {}", pool, count))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "*High Error Rate Detected* :rotating_light:\n\n\
         Error Rate: `{:.2}%` (threshold: {}%)\n\
         Errors: {}/{} requests\n\
         Window: last {} requests\n\
         Pool distribution: {}\n\n\
         *Action Required:*\n\
         • Inspect upstream logs immediately\n\
         • Consider manual pool toggle if persistent\n\
         • Check application health endpoints",
        decision.error_rate,
        decision.threshold,
        decision.error_count,
        decision.total,
        decision.total,
        distribution,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 12, 9, 10, 30, 45).unwrap()
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(at()), "2024-12-09 10:30:45 UTC");
    }

    #[test]
    fn test_failover_message() {
        let message = failover_message("blue", "green", at());

        assert!(message.starts_with("*Failover Detected*"));
        assert!(message.contains("Pool switched: `blue` → `green`"));
        assert!(message.contains("Time: 2024-12-09 10:30:45 UTC"));
        assert!(message.contains("docker logs app_blue"));
    }

    #[test]
    fn test_recovery_message() {
        let message = recovery_message("blue", at());

        assert!(message.starts_with("*Recovery Detected*"));
        assert!(message.contains("Primary pool `blue` is back online"));
    }

    #[test]
    fn test_error_rate_message() {
        let decision = ErrorRateDecision {
            error_rate: 4.0,
            error_count: 8,
            total: 200,
            threshold: 2.0,
            pool_distribution: vec![("blue".to_string(), 120), ("green".to_string(), 80)],
        };

        let message = error_rate_message(&decision);

        assert!(message.contains("Error Rate: `4.00%` (threshold: 2%)"));
        assert!(message.contains("Errors: 8/200 requests"));
        assert!(message.contains("Window: last 200 requests"));
        assert!(message.contains("Pool distribution: blue: 120, green: 80"));
    }
}
