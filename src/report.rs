//! Session reports written when a monitoring run ends.
//!
//! A report records which thresholds were in force and every event
//! transition of the run. Reports are plain JSON files in the export
//! directory; the `export` command merges them.

use crate::collector::types::EventTransition;
use crate::core::events::ThresholdSet;
use crate::monitor::SessionSummary;
use crate::stats::SessionStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

/// Everything recorded about one monitoring run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    /// Hostname of the machine the monitor ran on
    pub host: String,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// How the session ended
    pub end_reason: String,
    pub thresholds: ThresholdSet,
    pub transitions: Vec<EventTransition>,
    /// Oldest transitions not kept in `transitions`
    #[serde(default)]
    pub dropped_transitions: u64,
    pub stats: SessionStats,
}

impl SessionReport {
    /// Build a report for a finished session.
    pub fn new(
        summary: &SessionSummary,
        thresholds: ThresholdSet,
        started_at: DateTime<Utc>,
        stats: SessionStats,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            host: hostname::get()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "unknown".to_string()),
            source: summary.source.clone(),
            started_at,
            ended_at: Utc::now(),
            end_reason: summary.end.to_string(),
            thresholds,
            transitions: summary.transitions.clone(),
            dropped_transitions: summary.dropped_transitions,
            stats,
        }
    }

    /// File name used for this report in the export directory.
    ///
    /// The session id suffix keeps sessions ending in the same second apart.
    pub fn file_name(&self) -> String {
        let id = self.session_id.simple().to_string();
        format!(
            "session_{}_{}.json",
            self.ended_at.format("%Y%m%d_%H%M%S"),
            &id[..8]
        )
    }

    /// Write the report into `dir`, creating it if needed.
    pub fn write_to_dir(&self, dir: &Path) -> Result<PathBuf, ReportError> {
        std::fs::create_dir_all(dir).map_err(|e| ReportError::IoError(e.to_string()))?;

        let path = dir.join(self.file_name());
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ReportError::SerializeError(e.to_string()))?;
        std::fs::write(&path, json).map_err(|e| ReportError::IoError(e.to_string()))?;
        Ok(path)
    }
}

/// Output format for merged exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// One pretty-printed JSON array
    Json,
    /// One JSON object per line
    JsonLines,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::JsonLines => "jsonl",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "jsonl" | "jsonlines" => Ok(ExportFormat::JsonLines),
            other => Err(format!("unknown format {other:?} (expected json or jsonl)")),
        }
    }
}

/// A transition tagged with the session it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedTransition {
    pub session_id: Uuid,
    #[serde(flatten)]
    pub transition: EventTransition,
}

/// Read every session report in `dir`, skipping files that are not reports.
pub fn load_reports(dir: &Path) -> Result<Vec<SessionReport>, ReportError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ReportError::IoError(e.to_string()))?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension().map(|e| e == "json").unwrap_or(false)
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("session_"))
                    .unwrap_or(false)
        })
        .collect();
    paths.sort();

    let mut reports = Vec::new();
    for path in paths {
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        if let Ok(report) = serde_json::from_str::<SessionReport>(&content) {
            reports.push(report);
        }
    }
    Ok(reports)
}

/// Flatten the transitions of several reports into one document.
pub fn export_transitions(
    reports: &[SessionReport],
    format: ExportFormat,
) -> Result<String, ReportError> {
    let rows: Vec<ExportedTransition> = reports
        .iter()
        .flat_map(|report| {
            report.transitions.iter().map(|t| ExportedTransition {
                session_id: report.session_id,
                transition: *t,
            })
        })
        .collect();

    match format {
        ExportFormat::Json => serde_json::to_string_pretty(&rows)
            .map_err(|e| ReportError::SerializeError(e.to_string())),
        ExportFormat::JsonLines => {
            let mut out = String::new();
            for row in &rows {
                let line = serde_json::to_string(row)
                    .map_err(|e| ReportError::SerializeError(e.to_string()))?;
                out.push_str(&line);
                out.push('\n');
            }
            Ok(out)
        }
    }
}

/// Report persistence errors.
#[derive(Debug)]
pub enum ReportError {
    IoError(String),
    SerializeError(String),
}

impl std::fmt::Display for ReportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportError::IoError(e) => write!(f, "IO error: {e}"),
            ReportError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ReportError {}
