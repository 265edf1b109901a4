//! Hysteresis event classification.
//!
//! Each event kind is a two-level Schmitt trigger. A kind turns active when
//! its signal crosses the enter threshold and turns inactive only when the
//! signal crosses the exit threshold, so noise inside the band between the two
//! never produces extra transitions.
//!
//! The rules mirror the vehicle firmware's detection task exactly:
//!
//! | Kind   | Signal               | Enter                 | Exit                      |
//! |--------|----------------------|-----------------------|---------------------------|
//! | Brake  | `ax`                 | `ax < brake_enter`    | `ax > brake_exit`         |
//! | Impact | `ax + \|ay\| + \|az\|` | `> impact_enter`      | `< impact_enter / 2`      |
//! | Curve  | `\|gz\|`               | `> curve_enter`       | `< curve_enter / 2`       |
//!
//! The half-threshold exits for impact and curve are fixed by the firmware
//! and are not configurable. Curve transitions record the signed `gz`.

use crate::collector::types::{Edge, EventKind, EventTransition, Sample};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The unit regime samples and thresholds are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Units {
    /// m/s² and deg/s.
    Physical,
    /// Raw MPU6050 counts as sent by the firmware.
    Raw,
}

impl Units {
    pub fn accel_label(&self) -> &'static str {
        match self {
            Units::Physical => "m/s²",
            Units::Raw => "counts",
        }
    }

    pub fn gyro_label(&self) -> &'static str {
        match self {
            Units::Physical => "deg/s",
            Units::Raw => "counts",
        }
    }

    pub fn jerk_label(&self) -> &'static str {
        match self {
            Units::Physical => "m/s³",
            Units::Raw => "counts/s",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Units::Physical => write!(f, "physical"),
            Units::Raw => write!(f, "raw"),
        }
    }
}

impl FromStr for Units {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "physical" | "si" => Ok(Units::Physical),
            "raw" | "counts" => Ok(Units::Raw),
            other => Err(format!("unknown units {other:?} (expected physical or raw)")),
        }
    }
}

/// Enter thresholds for the three rules, in the regime named by `units`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSet {
    pub units: Units,
    /// Brake turns active when `ax` drops below this
    pub brake_enter: f64,
    /// Brake turns inactive when `ax` rises above this
    pub brake_exit: f64,
    /// Impact turns active when `ax + |ay| + |az|` exceeds this
    pub impact_enter: f64,
    /// Curve turns active when `|gz|` exceeds this
    pub curve_enter: f64,
}

impl ThresholdSet {
    /// The firmware's thresholds, in raw counts.
    pub fn raw_counts() -> Self {
        Self {
            units: Units::Raw,
            brake_enter: -8000.0,
            brake_exit: -8000.0,
            impact_enter: 20000.0,
            curve_enter: 8000.0,
        }
    }

    /// Thresholds for calibrated streams in m/s² and deg/s.
    pub fn physical() -> Self {
        Self {
            units: Units::Physical,
            brake_enter: -5.0,
            brake_exit: -5.0,
            impact_enter: 12.0,
            curve_enter: 90.0,
        }
    }

    /// The preset for a unit regime.
    pub fn for_units(units: Units) -> Self {
        match units {
            Units::Physical => Self::physical(),
            Units::Raw => Self::raw_counts(),
        }
    }

    /// Impact exit threshold, fixed at half the enter threshold.
    pub fn impact_exit(&self) -> f64 {
        self.impact_enter / 2.0
    }

    /// Curve exit threshold, fixed at half the enter threshold.
    pub fn curve_exit(&self) -> f64 {
        self.curve_enter / 2.0
    }

    /// Check that each pair forms a usable hysteresis band.
    pub fn validate(&self) -> Result<(), String> {
        let values = [
            ("brake_enter", self.brake_enter),
            ("brake_exit", self.brake_exit),
            ("impact_enter", self.impact_enter),
            ("curve_enter", self.curve_enter),
        ];
        for (name, value) in values {
            if !value.is_finite() {
                return Err(format!("{name} must be finite, got {value}"));
            }
        }
        if self.brake_exit < self.brake_enter {
            return Err(format!(
                "brake_exit ({}) must not be below brake_enter ({})",
                self.brake_exit, self.brake_enter
            ));
        }
        if self.impact_enter <= 0.0 {
            return Err(format!(
                "impact_enter must be positive, got {}",
                self.impact_enter
            ));
        }
        if self.curve_enter <= 0.0 {
            return Err(format!(
                "curve_enter must be positive, got {}",
                self.curve_enter
            ));
        }
        Ok(())
    }
}

/// Which side of the enter threshold activates a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Active while the signal is low (braking).
    Below,
    /// Active while the signal is high (impact, curve).
    Above,
}

/// Activation flag and threshold pair for one event kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventState {
    pub kind: EventKind,
    pub trigger: Trigger,
    pub enter: f64,
    pub exit: f64,
    pub active: bool,
}

impl EventState {
    pub fn new(kind: EventKind, trigger: Trigger, enter: f64, exit: f64) -> Self {
        Self {
            kind,
            trigger,
            enter,
            exit,
            active: false,
        }
    }

    /// Feed one signal value; returns a transition only on a flag flip.
    ///
    /// NaN fails every comparison, so it never causes a transition.
    pub fn evaluate(&mut self, signal: f64, timestamp: f64) -> Option<EventTransition> {
        self.evaluate_reporting(signal, signal, timestamp)
    }

    /// Like [`EventState::evaluate`], but records `reported` as the
    /// triggering value. The curve rule compares `|gz|` and reports signed `gz`.
    pub fn evaluate_reporting(
        &mut self,
        signal: f64,
        reported: f64,
        timestamp: f64,
    ) -> Option<EventTransition> {
        let (entered, exited) = match self.trigger {
            Trigger::Below => (signal < self.enter, signal > self.exit),
            Trigger::Above => (signal > self.enter, signal < self.exit),
        };

        let edge = if !self.active && entered {
            self.active = true;
            Edge::Rising
        } else if self.active && exited {
            self.active = false;
            Edge::Falling
        } else {
            return None;
        };

        Some(EventTransition {
            kind: self.kind,
            edge,
            timestamp,
            triggering_value: reported,
        })
    }
}

/// Runs the brake, impact, and curve rules against every sample.
#[derive(Debug, Clone)]
pub struct EventClassifier {
    thresholds: ThresholdSet,
    brake: EventState,
    impact: EventState,
    curve: EventState,
    /// Rising edges since creation or the last reset
    total_events: u64,
}

impl EventClassifier {
    pub fn new(thresholds: ThresholdSet) -> Self {
        Self {
            thresholds,
            brake: EventState::new(
                EventKind::Brake,
                Trigger::Below,
                thresholds.brake_enter,
                thresholds.brake_exit,
            ),
            impact: EventState::new(
                EventKind::Impact,
                Trigger::Above,
                thresholds.impact_enter,
                thresholds.impact_exit(),
            ),
            curve: EventState::new(
                EventKind::Curve,
                Trigger::Above,
                thresholds.curve_enter,
                thresholds.curve_exit(),
            ),
            total_events: 0,
        }
    }

    pub fn thresholds(&self) -> &ThresholdSet {
        &self.thresholds
    }

    /// Evaluate all three rules; returns up to three transitions.
    pub fn classify(&mut self, sample: &Sample) -> Vec<EventTransition> {
        let t = sample.timestamp;
        let impact_signal = sample.ax + sample.ay.abs() + sample.az.abs();

        let transitions: Vec<EventTransition> = [
            self.brake.evaluate(sample.ax, t),
            self.impact.evaluate(impact_signal, t),
            self.curve.evaluate_reporting(sample.gz.abs(), sample.gz, t),
        ]
        .into_iter()
        .flatten()
        .collect();

        self.total_events += transitions
            .iter()
            .filter(|tr| tr.edge == Edge::Rising)
            .count() as u64;

        transitions
    }

    /// Current activation flag of a rule.
    pub fn is_active(&self, kind: EventKind) -> bool {
        self.state(kind).active
    }

    pub fn state(&self, kind: EventKind) -> &EventState {
        match kind {
            EventKind::Brake => &self.brake,
            EventKind::Impact => &self.impact,
            EventKind::Curve => &self.curve,
        }
    }

    /// Number of rising edges, matching the firmware's event counter.
    pub fn total_events(&self) -> u64 {
        self.total_events
    }

    /// Clear every flag and the event counter.
    pub fn reset(&mut self) {
        *self = Self::new(self.thresholds);
    }
}
