//! Demonstration of the IMU Event Monitor on a synthetic drive.
//!
//! This example shows how to:
//! 1. Generate firmware-format telemetry lines
//! 2. Feed them to a monitor through an in-memory transport
//! 3. Poll frames at a fixed display rate
//! 4. Print event transitions and the throughput line
//!
//! Run with: cargo run --example replay_demo

use std::io::Cursor;
use std::time::Duration;

use imu_event_monitor::{
    collector::{LineReader, Sample},
    core::encode_line,
    monitor::{Monitor, MonitorConfig},
    stats::create_shared_log,
};

/// A short drive in raw counts: cruise, hard brake, a bump, then a turn.
fn synthetic_drive() -> Vec<u8> {
    let mut data = String::from("IMU ready\n");

    for i in 0..600 {
        let phase = i as f64 / 600.0;
        let (ax, ay, gz) = match i {
            100..=140 => (-9500.0, 300.0, 0.0),
            250..=252 => (14000.0, 7000.0, 0.0),
            400..=480 => (200.0, 2500.0, 9000.0 + 500.0 * phase),
            _ => (150.0, -80.0, 40.0),
        };
        let sample = Sample::new(0.0, [ax, ay, 0.0], [0.0, 0.0, gz]);
        data.push_str(&encode_line(&sample));
        data.push('\n');

        if i == 300 {
            data.push_str("[CAMARADAS DO EDU]: 12, 34\n");
        }
    }

    data.into_bytes()
}

fn main() {
    println!("IMU Event Monitor - Replay Demo");
    println!("===============================");
    println!();

    let reader = match LineReader::spawn("synthetic drive", Cursor::new(synthetic_drive())) {
        Ok(reader) => reader,
        Err(e) => {
            eprintln!("Error starting reader: {e}");
            return;
        }
    };

    let log = create_shared_log();
    let mut monitor = match Monitor::start(reader, MonitorConfig::default(), log.clone()) {
        Ok(monitor) => monitor,
        Err(e) => {
            eprintln!("Error starting monitor: {e}");
            return;
        }
    };

    let period = Duration::from_millis(66);
    let mut frames = 0;
    loop {
        let finished = !monitor.is_running();

        if let Some(frame) = monitor.poll() {
            frames += 1;
            for transition in &frame.transitions {
                println!("  {transition}");
            }
            println!(
                "Data: {} pps | Buffer: {}/{}",
                frame.throughput.samples_per_second,
                frame.throughput.buffer_occupancy,
                frame.throughput.buffer_capacity
            );
        }

        if finished {
            break;
        }
        std::thread::sleep(period);
    }

    match monitor.stop() {
        Ok(summary) => {
            println!();
            println!("Session ended: {}", summary.end);
            println!("Frames rendered: {frames}");
            println!("Total events: {}", summary.total_events);
        }
        Err(e) => eprintln!("Error stopping monitor: {e}"),
    }

    println!();
    println!("{}", log.summary());
}
