use crate::alerts::{CooldownTable, NotificationSink, WebhookPayload};
use crate::error::AlertError;
use crate::events::{AlertKind, Timestamp};
use chrono::{Duration, Utc};
use log::{error, info, warn};
use std::sync::Arc;

/// What happened to one alert handed to the dispatcher
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Delivered to the notification sink
    Sent,
    /// Dropped because the same kind was dispatched recently
    Suppressed { remaining: Duration },
    /// No sink configured; the alert was written to the operator log
    FallbackPrinted,
    /// Delivery was attempted and failed; the cooldown was not consumed
    Failed(AlertError),
}

impl DispatchOutcome {
    /// Whether this outcome used up the kind's cooldown slot
    pub fn consumed_cooldown(&self) -> bool {
        matches!(self, DispatchOutcome::Sent | DispatchOutcome::FallbackPrinted)
    }
}

/// Gates alerts by cooldown and forwards them to the notification sink
///
/// Each alert kind has its own cooldown. Successful deliveries and fallback
/// prints start the cooldown; failed deliveries do not, so the next
/// qualifying event retries immediately.
pub struct AlertDispatcher {
    /// Last dispatch per alert kind
    cooldowns: CooldownTable,
    /// Sink to deliver to; `None` means print alerts locally instead
    sink: Option<Arc<dyn NotificationSink>>,
    /// Display name attached to every delivered alert
    username: String,
    /// Upper bound on a single delivery attempt
    delivery_timeout: std::time::Duration,
}

impl AlertDispatcher {
    /// Create a dispatcher
    ///
    /// # Arguments
    ///
    /// * `cooldown` - Minimum time between two dispatched alerts of one kind
    /// * `sink` - Notification sink, or `None` to print alerts locally
    /// * `username` - Display name for delivered alerts
    /// * `delivery_timeout` - Upper bound on one delivery attempt
    pub fn new(
        cooldown: Duration,
        sink: Option<Arc<dyn NotificationSink>>,
        username: String,
        delivery_timeout: std::time::Duration,
    ) -> Self {
        Self {
            cooldowns: CooldownTable::new(cooldown),
            sink,
            username,
            delivery_timeout,
        }
    }

    /// Dispatch an alert at the current time
    pub async fn dispatch(&mut self, kind: AlertKind, message: &str) -> DispatchOutcome {
        self.dispatch_at(kind, message, Utc::now()).await
    }

    /// Dispatch an alert as if the current time were `now`
    pub async fn dispatch_at(
        &mut self,
        kind: AlertKind,
        message: &str,
        now: Timestamp,
    ) -> DispatchOutcome {
        if let Some(remaining) = self.cooldowns.remaining_at(kind, now) {
            info!(
                "[COOLDOWN] Skipping {} alert (next allowed in {}s)",
                kind,
                remaining.num_seconds()
            );
            return DispatchOutcome::Suppressed { remaining };
        }

        let Some(sink) = self.sink.clone() else {
            warn!("No valid Slack webhook configured; printing alert instead:");
            warn!("[ALERT] {} - {}", kind.as_str().to_uppercase(), message);
            self.cooldowns.record_at(kind, now);
            return DispatchOutcome::FallbackPrinted;
        };

        let payload = self.payload(kind, message);
        let delivery = tokio::time::timeout(self.delivery_timeout, sink.deliver(&payload)).await;

        match delivery {
            Ok(Ok(())) => {
                self.cooldowns.record_at(kind, now);
                info!(
                    "[SLACK ALERT SENT] {} at {}",
                    kind.as_str().to_uppercase(),
                    crate::alerts::messages::format_time(now)
                );
                DispatchOutcome::Sent
            }
            Ok(Err(e)) => {
                error!("[SLACK ERROR] {} alert not delivered: {}", kind, e);
                DispatchOutcome::Failed(e)
            }
            Err(_) => {
                let e = AlertError::Timeout(self.delivery_timeout);
                error!("[SLACK ERROR] {} alert not delivered: {}", kind, e);
                DispatchOutcome::Failed(e)
            }
        }
    }

    /// Build the webhook payload for an alert
    fn payload(&self, kind: AlertKind, message: &str) -> WebhookPayload {
        WebhookPayload {
            text: format!("{} *Blue/Green Alert*\n\n{}", kind.icon(), message),
            username: self.username.clone(),
            icon_emoji: kind.icon().to_string(),
        }
    }

    /// Whether alerts go to a real sink rather than the local log
    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    pub fn cooldowns(&self) -> &CooldownTable {
        &self.cooldowns
    }
}
