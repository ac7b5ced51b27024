//! Failover and recovery tracking for the blue/green pool pair

use serde::Serialize;

/// Coarse state of the pool state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PoolState {
    /// No failover outstanding
    Stable,
    /// A pool change was seen and traffic has not settled on the active pool
    Diverged,
}

/// Transition produced by a pool observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PoolTransition {
    /// The observed pool differs from the previous observation
    Failover { from: String, to: String },
    /// Traffic is back on the configured active pool
    Recovery { pool: String },
}

/// Tracks which pool is serving traffic and reports changes
///
/// A failover is reported on every change relative to the previous request,
/// so flapping between pools yields one failover per flip, and a switch
/// back to the active pool is itself a failover. The first request that
/// stays on the active pool after that is reported as the recovery.
#[derive(Debug, Clone)]
pub struct PoolStateMachine {
    /// Pool expected to serve traffic normally
    active_pool: String,
    /// Pool seen on the most recent request
    current_pool: String,
    /// Set by a failover, cleared by a recovery
    failover_active: bool,
}

impl PoolStateMachine {
    /// Start in the stable state with traffic assumed on `active_pool`
    pub fn new(active_pool: String) -> Self {
        Self {
            current_pool: active_pool.clone(),
            active_pool,
            failover_active: false,
        }
    }

    /// Record the pool of one request and report any transition
    ///
    /// # Examples
    ///
    /// ```
    /// use poolwatch::triggers::{PoolStateMachine, PoolTransition};
    ///
    /// let mut machine = PoolStateMachine::new("blue".to_string());
    /// assert_eq!(
    ///     machine.observe("green"),
    ///     Some(PoolTransition::Failover { from: "blue".to_string(), to: "green".to_string() })
    /// );
    /// assert_eq!(machine.observe("green"), None);
    /// ```
    pub fn observe(&mut self, pool: &str) -> Option<PoolTransition> {
        if pool != self.current_pool {
            let from = std::mem::replace(&mut self.current_pool, pool.to_string());
            self.failover_active = true;
            return Some(PoolTransition::Failover {
                from,
                to: pool.to_string(),
            });
        }

        if self.failover_active && pool == self.active_pool {
            self.failover_active = false;
            return Some(PoolTransition::Recovery {
                pool: self.active_pool.clone(),
            });
        }

        None
    }

    pub fn current_pool(&self) -> &str {
        &self.current_pool
    }

    pub fn active_pool(&self) -> &str {
        &self.active_pool
    }

    pub fn is_failover_active(&self) -> bool {
        self.failover_active
    }

    pub fn state(&self) -> PoolState {
        if self.failover_active {
            PoolState::Diverged
        } else {
            PoolState::Stable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failover(from: &str, to: &str) -> Option<PoolTransition> {
        Some(PoolTransition::Failover {
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    #[test]
    fn test_initial_state() {
        let machine = PoolStateMachine::new("blue".to_string());

        assert_eq!(machine.state(), PoolState::Stable);
        assert_eq!(machine.current_pool(), "blue");
        assert_eq!(machine.active_pool(), "blue");
        assert!(!machine.is_failover_active());
    }

    #[test]
    fn test_active_pool_traffic_is_quiet() {
        let mut machine = PoolStateMachine::new("blue".to_string());

        for _ in 0..10 {
            assert_eq!(machine.observe("blue"), None);
        }
        assert_eq!(machine.state(), PoolState::Stable);
    }

    #[test]
    fn test_failover_then_recovery() {
        let mut machine = PoolStateMachine::new("blue".to_string());

        assert_eq!(machine.observe("green"), failover("blue", "green"));
        assert!(machine.is_failover_active());
        assert_eq!(machine.state(), PoolState::Diverged);

        assert_eq!(machine.observe("green"), None);

        // Switching back is a pool change in its own right
        assert_eq!(machine.observe("blue"), failover("green", "blue"));
        assert!(machine.is_failover_active());
        assert_eq!(machine.current_pool(), "blue");

        assert_eq!(
            machine.observe("blue"),
            Some(PoolTransition::Recovery {
                pool: "blue".to_string()
            })
        );
        assert!(!machine.is_failover_active());
        assert_eq!(machine.state(), PoolState::Stable);

        assert_eq!(machine.observe("blue"), None);
    }

    #[test]
    fn test_recovery_needs_active_pool() {
        let mut machine = PoolStateMachine::new("blue".to_string());

        machine.observe("green");
        machine.observe("red");

        // Settled on a non-active pool: no recovery
        assert_eq!(machine.observe("red"), None);
        assert!(machine.is_failover_active());
    }

    #[test]
    fn test_second_failover_after_recovery() {
        let mut machine = PoolStateMachine::new("blue".to_string());

        machine.observe("green");
        machine.observe("blue");
        machine.observe("blue");
        assert_eq!(machine.state(), PoolState::Stable);

        assert_eq!(machine.observe("green"), failover("blue", "green"));
        assert_eq!(machine.state(), PoolState::Diverged);
    }

    #[test]
    fn test_flapping_reports_every_change() {
        let mut machine = PoolStateMachine::new("blue".to_string());

        assert_eq!(machine.observe("green"), failover("blue", "green"));
        assert_eq!(machine.observe("red"), failover("green", "red"));
        assert_eq!(machine.observe("green"), failover("red", "green"));
        assert_eq!(machine.current_pool(), "green");
        assert_eq!(machine.state(), PoolState::Diverged);
    }

    #[test]
    fn test_non_default_active_pool() {
        let mut machine = PoolStateMachine::new("green".to_string());

        assert_eq!(machine.observe("blue"), failover("green", "blue"));
        assert_eq!(machine.observe("green"), failover("blue", "green"));
        assert_eq!(
            machine.observe("green"),
            Some(PoolTransition::Recovery {
                pool: "green".to_string()
            })
        );
    }
}
