/// Detectors that turn request events into alert decisions
pub mod error_rate;
pub mod pool_state;

pub use error_rate::{ErrorRateDecision, ErrorRateDetector};
pub use pool_state::{PoolState, PoolStateMachine, PoolTransition};
