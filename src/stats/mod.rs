//! Session statistics for the IMU event monitor.
//!
//! Tracks how many lines, samples, and events each run saw, for the status
//! display and the cumulative totals on disk.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, SessionLog, SessionStats,
    SharedSessionLog,
};
