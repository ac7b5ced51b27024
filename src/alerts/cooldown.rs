use crate::events::{AlertKind, Timestamp};
use chrono::Duration;
use std::collections::HashMap;

/// Per-kind cooldown bookkeeping for alert dispatch
///
/// Remembers when each alert kind was last dispatched and refuses another
/// dispatch of the same kind until the cooldown has elapsed. Kinds never
/// dispatched are always allowed.
#[derive(Debug)]
pub struct CooldownTable {
    /// Minimum time between two dispatches of one kind
    cooldown: Duration,
    /// Last dispatch time per kind; absent means never
    last_dispatch: HashMap<AlertKind, Timestamp>,
}

impl CooldownTable {
    /// Create a table with the given cooldown and no dispatch history
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_dispatch: HashMap::new(),
        }
    }

    /// Time left before `kind` may be dispatched again, as seen at `now`
    ///
    /// # Returns
    ///
    /// `None` if a dispatch is allowed, `Some(remaining)` while cooling down
    pub fn remaining_at(&self, kind: AlertKind, now: Timestamp) -> Option<Duration> {
        let last = self.last_dispatch.get(&kind)?;
        let elapsed = now - *last;

        if elapsed < self.cooldown {
            Some(self.cooldown - elapsed)
        } else {
            None
        }
    }

    /// Record that `kind` was dispatched at `now`
    pub fn record_at(&mut self, kind: AlertKind, now: Timestamp) {
        self.last_dispatch.insert(kind, now);
    }

    /// When `kind` was last dispatched, if ever
    pub fn last_dispatch(&self, kind: AlertKind) -> Option<Timestamp> {
        self.last_dispatch.get(&kind).copied()
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}
