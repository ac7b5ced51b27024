/// Request-count sliding window
pub mod sliding_window;

pub use sliding_window::SlidingWindow;
