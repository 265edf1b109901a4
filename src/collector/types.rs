//! Sample and event types shared across the monitor.
//!
//! Samples are plain values moved down the pipeline; event transitions are
//! the only records that outlive a single pipeline step.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed tag that prefixes every telemetry line sent by the firmware.
pub const WIRE_HEADER: &str = "[CAMARADAS DO EDU]:";

/// Number of comma-separated fields after the header.
pub const WIRE_FIELD_COUNT: usize = 6;

/// One 6-axis inertial reading.
///
/// `timestamp` is the receipt time on the host in seconds since the Unix
/// epoch; the firmware does not send one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: f64,
    pub ax: f64,
    pub ay: f64,
    pub az: f64,
    pub gx: f64,
    pub gy: f64,
    pub gz: f64,
}

impl Sample {
    pub fn new(timestamp: f64, accel: [f64; 3], gyro: [f64; 3]) -> Self {
        Self {
            timestamp,
            ax: accel[0],
            ay: accel[1],
            az: accel[2],
            gx: gyro[0],
            gy: gyro[1],
            gz: gyro[2],
        }
    }

    /// Acceleration channels in wire order.
    pub fn accel(&self) -> [f64; 3] {
        [self.ax, self.ay, self.az]
    }

    /// Angular rate channels in wire order.
    pub fn gyro(&self) -> [f64; 3] {
        [self.gx, self.gy, self.gz]
    }
}

/// A sample plus the backward-difference derivative of its acceleration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedSample {
    pub sample: Sample,
    pub jerk_x: f64,
    pub jerk_y: f64,
    pub jerk_z: f64,
}

impl DerivedSample {
    /// A derived sample with zero jerk on every axis.
    pub fn at_rest(sample: Sample) -> Self {
        Self {
            sample,
            jerk_x: 0.0,
            jerk_y: 0.0,
            jerk_z: 0.0,
        }
    }

    pub fn jerk(&self) -> [f64; 3] {
        [self.jerk_x, self.jerk_y, self.jerk_z]
    }
}

/// The vehicle events recognised by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Brake,
    Impact,
    Curve,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [EventKind::Brake, EventKind::Impact, EventKind::Curve];

    /// Label used by the firmware status display.
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Brake => "BRAKE",
            EventKind::Impact => "CRASH",
            EventKind::Curve => "CURVE",
        }
    }

    /// Description of the signal each rule compares.
    pub fn signal_name(&self) -> &'static str {
        match self {
            EventKind::Brake => "ax",
            EventKind::Impact => "ax + |ay| + |az|",
            EventKind::Curve => "gz",
        }
    }
}

/// Direction of an activation flag flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    /// Inactive to active.
    Rising,
    /// Active to inactive.
    Falling,
}

/// Emitted once per actual flip of an event's activation flag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventTransition {
    pub kind: EventKind,
    pub edge: Edge,
    /// Receipt time of the sample that caused the flip
    pub timestamp: f64,
    /// Reading that crossed the threshold (signed `gz` for curves)
    pub triggering_value: f64,
}

impl fmt::Display for EventTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let edge = match self.edge {
            Edge::Rising => "rising",
            Edge::Falling => "falling",
        };
        write!(
            f,
            "{} {} ({} = {})",
            self.kind.label(),
            edge,
            self.kind.signal_name(),
            self.triggering_value
        )
    }
}
