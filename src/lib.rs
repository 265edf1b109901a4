//! IMU Event Monitor - live vehicle event detection from serial telemetry.
//!
//! This library decodes the line-oriented accelerometer/gyroscope stream sent
//! by the vehicle firmware, estimates jerk, and raises brake, impact, and
//! curve events with the same hysteresis rules the firmware applies.
//!
//! # Guarantees
//!
//! - **Aligned channels**: every plot snapshot has equal-length time and axis series
//! - **Bounded memory**: the plot buffer keeps at most `capacity` samples
//! - **No lost events**: transitions survive render coalescing
//! - **No shared mutable state**: the renderer only sees immutable frames
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      IMU Event Monitor                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │ LineReader  │──▶│   Decoder   │──▶│ Derivative  │       │
//! │  │  (serial)   │   │   (lines)   │   │   (jerk)    │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │                                             │               │
//! │                                             ▼               │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │ FrameSlot   │◀──│ Ring Buffer │◀──│ Classifier  │       │
//! │  │ (renderer)  │   │ (300 rows)  │   │ (hysteresis)│       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use imu_event_monitor::{collector::LineReader, monitor::Monitor, stats, SerialSettings};
//!
//! let reader = LineReader::open("/dev/ttyUSB0".as_ref(), &SerialSettings::default())
//!     .expect("Failed to open port");
//! let mut monitor = Monitor::start(reader, Default::default(), stats::create_shared_log())
//!     .expect("Failed to start monitor");
//!
//! if let Some(frame) = monitor.poll() {
//!     for transition in &frame.transitions {
//!         println!("{transition}");
//!     }
//! }
//! let summary = monitor.stop().expect("Monitor thread failed");
//! println!("{} events", summary.total_events);
//! ```

pub mod collector;
pub mod config;
pub mod core;
pub mod monitor;
pub mod report;
pub mod stats;

// Re-export key types at crate root for convenience
pub use collector::{
    EventKind, EventTransition, LineReader, Sample, SerialSettings, TransportError,
};
pub use config::{Config, ConfigError};
pub use core::{Frame, FrameDecoder, Pipeline, SeriesSnapshot, ThresholdSet, Units};
pub use monitor::{Monitor, MonitorConfig, MonitorError, SessionEnd, SessionSummary};
pub use report::{ExportFormat, SessionReport};
pub use stats::{SessionLog, SessionStats, SharedSessionLog};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
