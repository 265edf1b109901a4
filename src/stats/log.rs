//! Session counters for the monitor.
//!
//! Counters are atomics so the producer thread can record while the
//! renderer reads. Totals can be persisted and are accumulated across runs.

use crate::collector::types::{Edge, EventKind, EventTransition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Line and event counters for the current session.
#[derive(Debug)]
pub struct SessionLog {
    /// Whole lines delivered by the transport
    lines_received: AtomicU64,
    /// Lines decoded into samples
    samples_decoded: AtomicU64,
    /// Lines without the telemetry header
    lines_ignored: AtomicU64,
    /// Header-tagged lines that failed to decode
    decode_errors: AtomicU64,
    brake_events: AtomicU64,
    impact_events: AtomicU64,
    curve_events: AtomicU64,
    session_start: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self {
            lines_received: AtomicU64::new(0),
            samples_decoded: AtomicU64::new(0),
            lines_ignored: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            brake_events: AtomicU64::new(0),
            impact_events: AtomicU64::new(0),
            curve_events: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log that starts from, and saves back to, the totals at `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            warn!("Could not load previous session stats: {e}");
        }

        log
    }

    pub fn record_line(&self) {
        self.lines_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sample(&self) {
        self.samples_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ignored(&self) {
        self.lines_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a transition. Only rising edges are events.
    pub fn record_transition(&self, transition: &EventTransition) {
        if transition.edge != Edge::Rising {
            return;
        }
        let counter = match transition.kind {
            EventKind::Brake => &self.brake_events,
            EventKind::Impact => &self.impact_events,
            EventKind::Curve => &self.curve_events,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> SessionStats {
        let brake_events = self.brake_events.load(Ordering::Relaxed);
        let impact_events = self.impact_events.load(Ordering::Relaxed);
        let curve_events = self.curve_events.load(Ordering::Relaxed);
        SessionStats {
            lines_received: self.lines_received.load(Ordering::Relaxed),
            samples_decoded: self.samples_decoded.load(Ordering::Relaxed),
            lines_ignored: self.lines_ignored.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            brake_events,
            impact_events,
            curve_events,
            total_events: brake_events + impact_events + curve_events,
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Human-readable summary for the end of a run.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics:\n\
             - Lines received: {}\n\
             - Samples decoded: {}\n\
             - Lines ignored: {}\n\
             - Decode errors: {}\n\
             - Events: {} (brake {}, crash {}, curve {})\n\
             - Session duration: {} seconds",
            stats.lines_received,
            stats.samples_decoded,
            stats.lines_ignored,
            stats.decode_errors,
            stats.total_events,
            stats.brake_events,
            stats.impact_events,
            stats.curve_events,
            stats.session_duration_secs
        )
    }

    /// Save totals to disk, if the log has a persistence path.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                lines_received: stats.lines_received,
                samples_decoded: stats.samples_decoded,
                lines_ignored: stats.lines_ignored,
                decode_errors: stats.decode_errors,
                brake_events: stats.brake_events,
                impact_events: stats.impact_events,
                curve_events: stats.curve_events,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.lines_received
                    .store(persisted.lines_received, Ordering::Relaxed);
                self.samples_decoded
                    .store(persisted.samples_decoded, Ordering::Relaxed);
                self.lines_ignored
                    .store(persisted.lines_ignored, Ordering::Relaxed);
                self.decode_errors
                    .store(persisted.decode_errors, Ordering::Relaxed);
                self.brake_events
                    .store(persisted.brake_events, Ordering::Relaxed);
                self.impact_events
                    .store(persisted.impact_events, Ordering::Relaxed);
                self.curve_events
                    .store(persisted.curve_events, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Add another session's counts to these totals.
    pub fn accumulate(&self, stats: &SessionStats) {
        self.lines_received
            .fetch_add(stats.lines_received, Ordering::Relaxed);
        self.samples_decoded
            .fetch_add(stats.samples_decoded, Ordering::Relaxed);
        self.lines_ignored
            .fetch_add(stats.lines_ignored, Ordering::Relaxed);
        self.decode_errors
            .fetch_add(stats.decode_errors, Ordering::Relaxed);
        self.brake_events
            .fetch_add(stats.brake_events, Ordering::Relaxed);
        self.impact_events
            .fetch_add(stats.impact_events, Ordering::Relaxed);
        self.curve_events
            .fetch_add(stats.curve_events, Ordering::Relaxed);
    }

    /// Zero every counter, like the firmware's reset button.
    pub fn reset(&self) {
        self.lines_received.store(0, Ordering::Relaxed);
        self.samples_decoded.store(0, Ordering::Relaxed);
        self.lines_ignored.store(0, Ordering::Relaxed);
        self.decode_errors.store(0, Ordering::Relaxed);
        self.brake_events.store(0, Ordering::Relaxed);
        self.impact_events.store(0, Ordering::Relaxed);
        self.curve_events.store(0, Ordering::Relaxed);
    }
}

impl Default for SessionLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the session counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub lines_received: u64,
    pub samples_decoded: u64,
    pub lines_ignored: u64,
    pub decode_errors: u64,
    pub brake_events: u64,
    pub impact_events: u64,
    pub curve_events: u64,
    pub total_events: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    lines_received: u64,
    samples_decoded: u64,
    lines_ignored: u64,
    decode_errors: u64,
    brake_events: u64,
    impact_events: u64,
    curve_events: u64,
    last_updated: DateTime<Utc>,
}

/// Session log shared between the producer thread and the renderer.
pub type SharedSessionLog = Arc<SessionLog>;

pub fn create_shared_log() -> SharedSessionLog {
    Arc::new(SessionLog::new())
}

pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedSessionLog {
    Arc::new(SessionLog::with_persistence(path))
}
