/// Alert dispatch, cooldowns and notification delivery
pub mod cooldown;
pub mod dispatcher;
pub mod messages;
pub mod sink;

pub use cooldown::CooldownTable;
pub use dispatcher::{AlertDispatcher, DispatchOutcome};
pub use sink::{MockOutcome, MockSink, NotificationSink, SlackWebhookSink, WebhookPayload};
