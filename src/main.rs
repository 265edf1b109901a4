//! IMU Event Monitor CLI
//!
//! Live brake, crash, and curve detection from serial IMU telemetry.

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use imu_event_monitor::{
    collector::LineReader,
    config::Config,
    core::{Frame, ThresholdSet, Throughput, Units},
    monitor::{Monitor, SessionEnd},
    report::{export_transitions, load_reports, ExportFormat, SessionReport},
    stats::{create_shared_log, SessionLog},
    EventKind, VERSION,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// File holding cumulative statistics across runs.
const STATS_FILE: &str = "session_stats.json";

/// Interval between status lines. A sample rate older than this is stale.
const STATUS_PERIOD: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "imu-monitor")]
#[command(version = VERSION)]
#[command(about = "Live vehicle event detection from serial IMU telemetry", long_about = None)]
struct Cli {
    /// Log filter (e.g. "debug"); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor a telemetry stream and report events
    Monitor {
        /// Serial device or capture file to read, or "-" for stdin
        input: PathBuf,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Show configuration and cumulative statistics
    Status,

    /// Export event transitions from all saved sessions
    Export {
        /// Output directory for the export
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Export format (json or jsonl)
        #[arg(long, default_value = "json")]
        format: ExportFormat,
    },

    /// Show configuration
    Config,

    /// Show threshold presets
    Thresholds {
        /// Only show the preset for these units (physical or raw)
        #[arg(long)]
        units: Option<Units>,
    },
}

/// Per-run overrides of the configuration file.
#[derive(Args, Debug, Default)]
struct Overrides {
    /// Unit regime of the stream (physical or raw); loads that preset
    #[arg(long)]
    units: Option<Units>,

    /// Brake enter threshold on ax
    #[arg(long, allow_hyphen_values = true)]
    brake: Option<f64>,

    /// Brake exit threshold on ax (defaults to the enter threshold)
    #[arg(long, allow_hyphen_values = true)]
    brake_exit: Option<f64>,

    /// Crash enter threshold on ax + |ay| + |az|
    #[arg(long)]
    impact: Option<f64>,

    /// Curve enter threshold on |gz|
    #[arg(long)]
    curve: Option<f64>,

    /// Number of samples kept for plotting
    #[arg(long)]
    capacity: Option<usize>,

    /// Renderer updates per second
    #[arg(long)]
    fps: Option<u32>,

    /// Serial link speed
    #[arg(long)]
    baud: Option<u32>,
}

impl Overrides {
    fn apply(&self, config: &mut Config) {
        if let Some(units) = self.units {
            config.use_units(units);
        }
        if let Some(brake) = self.brake {
            config.thresholds.brake_enter = brake;
            config.thresholds.brake_exit = brake;
        }
        if let Some(brake_exit) = self.brake_exit {
            config.thresholds.brake_exit = brake_exit;
        }
        if let Some(impact) = self.impact {
            config.thresholds.impact_enter = impact;
        }
        if let Some(curve) = self.curve {
            config.thresholds.curve_enter = curve;
        }
        if let Some(capacity) = self.capacity {
            config.buffer_capacity = capacity;
        }
        if let Some(fps) = self.fps {
            config.render_fps = fps;
        }
        if let Some(baud) = self.baud {
            config.baud_rate = baud;
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref())?;

    match cli.command {
        Commands::Monitor { input, overrides } => cmd_monitor(&input, &overrides),
        Commands::Status => cmd_status(),
        Commands::Export { output, format } => cmd_export(output, format),
        Commands::Config => cmd_config(),
        Commands::Thresholds { units } => {
            cmd_thresholds(units);
            Ok(())
        }
    }
}

/// Install the global tracing subscriber.
fn init_logging(level: Option<&str>) -> anyhow::Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).context("Invalid --log-level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
    Ok(())
}

fn cmd_monitor(input: &Path, overrides: &Overrides) -> anyhow::Result<()> {
    println!("IMU Event Monitor v{VERSION}");
    println!();

    let mut config = Config::load().context("Could not load configuration")?;
    overrides.apply(&mut config);
    config.validate().context("Invalid settings")?;

    if let Err(e) = config.ensure_directories() {
        warn!("Could not create directories: {e}");
    }

    let thresholds = config.thresholds;
    println!("Monitoring {}...", input.display());
    println!("  Units: {}", config.units);
    print_thresholds(&thresholds);
    println!(
        "  Buffer: {} samples | Display: {} FPS",
        config.buffer_capacity, config.render_fps
    );
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let session_log = create_shared_log();
    let reader = LineReader::open(input, &config.serial_settings())
        .with_context(|| format!("Could not open {}", input.display()))?;
    info!(source = reader.source_name(), "Connected");

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    let started_at = Utc::now();
    let mut monitor = Monitor::start(reader, config.monitor_config(), session_log.clone())?;

    let period = config.render_period();
    let mut last_status = Instant::now();
    let mut latest: Option<(Throughput, Instant)> = None;

    while running.load(Ordering::SeqCst) && monitor.is_running() {
        thread::sleep(period);

        if let Some(frame) = monitor.poll() {
            render_frame(&frame);
            latest = Some((frame.throughput, Instant::now()));
        }

        if last_status.elapsed() >= STATUS_PERIOD {
            if let Some((throughput, received)) = &latest {
                let fresh = received.elapsed() < STATUS_PERIOD;
                info!("{}", status_line(throughput, fresh, config.render_fps));
            }
            last_status = Instant::now();
        }
    }

    println!();
    println!("Stopping monitor...");
    let summary = monitor.stop()?;

    // Events published after the last poll.
    if let Some(frame) = monitor.poll() {
        render_frame(&frame);
    }
    info!(source = %summary.source, reason = %summary.end, "Disconnected");

    let totals = SessionLog::with_persistence(config.data_path.join(STATS_FILE));
    totals.accumulate(&session_log.stats());
    if let Err(e) = totals.save() {
        warn!("Could not save session stats: {e}");
    }

    let report = SessionReport::new(&summary, thresholds, started_at, session_log.stats());
    match report.write_to_dir(&config.export_path) {
        Ok(path) => println!(
            "Saved session with {} transitions to {path:?}",
            report.transitions.len()
        ),
        Err(e) => eprintln!("Error writing session report: {e}"),
    }

    println!();
    println!("{}", session_log.summary());

    if let SessionEnd::TransportFailed(e) = summary.end {
        bail!("Connection lost: {e}");
    }
    Ok(())
}

/// Print what the renderer would show for a frame.
fn render_frame(frame: &Frame) {
    if frame.dropped_transitions > 0 {
        warn!(
            "{} event transitions were dropped while the display was behind",
            frame.dropped_transitions
        );
    }

    for transition in &frame.transitions {
        println!("[{}] {transition}", clock_time(transition.timestamp));
    }
}

/// Throughput line. The sample rate reads `--` once frames stop arriving.
fn status_line(throughput: &Throughput, fresh: bool, fps: u32) -> String {
    let rate = if fresh {
        throughput.samples_per_second.to_string()
    } else {
        "--".to_string()
    };
    format!(
        "Data: {rate} pps | Display: {fps} FPS | Buffer: {}/{}",
        throughput.buffer_occupancy, throughput.buffer_capacity
    )
}

/// Wall-clock time of day for a receipt timestamp.
fn clock_time(timestamp: f64) -> String {
    let secs = timestamp.floor();
    let nanos = ((timestamp - secs) * 1e9) as u32;
    DateTime::<Utc>::from_timestamp(secs as i64, nanos)
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| format!("{timestamp:.3}"))
}

fn cmd_status() -> anyhow::Result<()> {
    let config = Config::load().context("Could not load configuration")?;

    println!("IMU Event Monitor Status");
    println!("========================");
    println!();
    println!("Units: {}", config.units);
    print_thresholds(&config.thresholds);
    println!("Buffer capacity: {} samples", config.buffer_capacity);
    println!("Display rate: {} FPS", config.render_fps);
    println!();

    let stats_path = config.data_path.join(STATS_FILE);
    if stats_path.exists() {
        let totals = SessionLog::with_persistence(stats_path).stats();
        println!("Cumulative statistics:");
        println!("  Lines received: {}", totals.lines_received);
        println!("  Samples decoded: {}", totals.samples_decoded);
        println!("  Lines ignored: {}", totals.lines_ignored);
        println!("  Decode errors: {}", totals.decode_errors);
        println!(
            "  Events: {} (brake {}, crash {}, curve {})",
            totals.total_events, totals.brake_events, totals.impact_events, totals.curve_events
        );
    } else {
        println!("No sessions recorded yet.");
    }

    let sessions = load_reports(&config.export_path).map(|r| r.len()).unwrap_or(0);
    println!();
    println!("Saved sessions: {sessions} in {:?}", config.export_path);
    Ok(())
}

fn cmd_export(output: Option<PathBuf>, format: ExportFormat) -> anyhow::Result<()> {
    let config = Config::load().context("Could not load configuration")?;
    let output_dir = output.unwrap_or_else(|| config.export_path.clone());

    let reports = load_reports(&config.export_path)
        .with_context(|| format!("Could not read sessions from {:?}", config.export_path))?;
    if reports.is_empty() {
        println!("No sessions to export.");
        return Ok(());
    }

    let transitions: usize = reports.iter().map(|r| r.transitions.len()).sum();
    println!(
        "Exporting {transitions} transitions from {} sessions...",
        reports.len()
    );

    let content = export_transitions(&reports, format)?;
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Could not create {output_dir:?}"))?;
    let output_path = output_dir.join(format!(
        "export_{}.{}",
        Utc::now().format("%Y%m%d_%H%M%S"),
        format.extension()
    ));
    std::fs::write(&output_path, content)
        .with_context(|| format!("Could not write {output_path:?}"))?;

    println!("Exported to {output_path:?}");
    Ok(())
}

fn cmd_config() -> anyhow::Result<()> {
    let config = Config::load().context("Could not load configuration")?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_thresholds(units: Option<Units>) {
    let presets = match units {
        Some(units) => vec![ThresholdSet::for_units(units)],
        None => vec![ThresholdSet::raw_counts(), ThresholdSet::physical()],
    };

    for (i, preset) in presets.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("Preset: {}", preset.units);
        print_thresholds(preset);
    }
}

fn print_thresholds(thresholds: &ThresholdSet) {
    for kind in EventKind::ALL {
        let (label, enter, exit) = match kind {
            EventKind::Brake => (
                thresholds.units.accel_label(),
                format!("< {}", thresholds.brake_enter),
                format!("> {}", thresholds.brake_exit),
            ),
            EventKind::Impact => (
                thresholds.units.accel_label(),
                format!("> {}", thresholds.impact_enter),
                format!("< {}", thresholds.impact_exit()),
            ),
            EventKind::Curve => (
                thresholds.units.gyro_label(),
                format!("> {}", thresholds.curve_enter),
                format!("< {}", thresholds.curve_exit()),
            ),
        };
        println!(
            "  {:<6} {}: enter {enter}, exit {exit} ({label})",
            kind.label(),
            kind.signal_name()
        );
    }
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_line_shows_rate_while_frames_arrive() {
        let throughput = Throughput {
            samples_per_second: 98,
            buffer_occupancy: 120,
            buffer_capacity: 300,
        };
        assert_eq!(
            status_line(&throughput, true, 15),
            "Data: 98 pps | Display: 15 FPS | Buffer: 120/300"
        );
    }

    #[test]
    fn test_status_line_blanks_rate_when_stream_goes_quiet() {
        let throughput = Throughput {
            samples_per_second: 98,
            buffer_occupancy: 300,
            buffer_capacity: 300,
        };
        assert_eq!(
            status_line(&throughput, false, 15),
            "Data: -- pps | Display: 15 FPS | Buffer: 300/300"
        );
    }

    #[test]
    fn test_baud_override_applies() {
        let mut config = Config::default();
        let overrides = Overrides {
            baud: Some(9600),
            ..Overrides::default()
        };
        overrides.apply(&mut config);
        assert_eq!(config.serial_settings().baud_rate, 9600);
    }
}
