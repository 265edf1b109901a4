//! Producer thread that drives the pipeline from a line transport.
//!
//! The monitor owns the transport, the decoder, and all session state on one
//! background thread. The renderer only ever sees [`Frame`]s taken from a
//! single-slot [`FrameSlot`], so it cannot touch pipeline state and never
//! sees the plot channels out of step with each other or with an event.

use crate::collector::serial::{LineRead, LineReader, TransportError};
use crate::collector::types::{EventTransition, WIRE_HEADER};
use crate::core::decoder::FrameDecoder;
use crate::core::events::ThresholdSet;
use crate::core::pipeline::{LineOutcome, Pipeline};
use crate::core::series::DEFAULT_CAPACITY;
use crate::core::slot::{Frame, FrameSlot};
use crate::stats::SharedSessionLog;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Most samples folded into one frame while lines keep arriving.
const MAX_SAMPLES_PER_FRAME: usize = 64;

/// Settings for one monitoring session.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub thresholds: ThresholdSet,
    pub buffer_capacity: usize,
    /// How long a transport wait may block before the stop flag is checked
    pub read_timeout: Duration,
    pub header: String,
    /// Transitions kept for the session summary; the oldest are dropped beyond this
    pub history_limit: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            thresholds: ThresholdSet::raw_counts(),
            buffer_capacity: DEFAULT_CAPACITY,
            read_timeout: Duration::from_millis(100),
            header: WIRE_HEADER.to_string(),
            history_limit: 100_000,
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEnd {
    /// `stop` was called.
    Stopped,
    /// The source reached end of stream.
    EndOfStream,
    /// The transport failed.
    TransportFailed(TransportError),
}

impl std::fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEnd::Stopped => write!(f, "stopped"),
            SessionEnd::EndOfStream => write!(f, "end of stream"),
            SessionEnd::TransportFailed(e) => write!(f, "transport failed: {e}"),
        }
    }
}

/// What the producer thread hands back when it exits.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub source: String,
    pub end: SessionEnd,
    /// Transitions of the session, in order, up to the history limit
    pub transitions: Vec<EventTransition>,
    /// Oldest transitions discarded to stay within the history limit
    pub dropped_transitions: u64,
    /// Rising edges counted by the classifier
    pub total_events: u64,
    /// Frames handed to the renderer
    pub frames_published: u64,
}

/// Errors from starting or joining the producer thread.
#[derive(Debug)]
pub enum MonitorError {
    AlreadyStopped,
    Spawn(String),
    ThreadPanicked,
}

impl std::fmt::Display for MonitorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorError::AlreadyStopped => write!(f, "Monitor has already been stopped"),
            MonitorError::Spawn(e) => write!(f, "Could not start monitor thread: {e}"),
            MonitorError::ThreadPanicked => write!(f, "Monitor thread panicked"),
        }
    }
}

impl std::error::Error for MonitorError {}

/// A running monitoring session.
pub struct Monitor {
    slot: FrameSlot,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<SessionSummary>>,
}

impl Monitor {
    /// Start consuming lines from `reader` on a background thread.
    ///
    /// Each session starts from empty buffers and inactive events.
    pub fn start(
        reader: LineReader,
        config: MonitorConfig,
        log: SharedSessionLog,
    ) -> Result<Self, MonitorError> {
        let slot = FrameSlot::new();
        let running = Arc::new(AtomicBool::new(true));

        let pipeline = Pipeline::with_decoder(
            FrameDecoder::new(config.header.clone()),
            config.thresholds,
            config.buffer_capacity,
        );

        let producer = Producer {
            reader,
            pipeline,
            slot: slot.clone(),
            running: running.clone(),
            log,
            read_timeout: config.read_timeout,
            history_limit: config.history_limit,
        };

        info!(
            source = producer.reader.source_name(),
            units = %config.thresholds.units,
            capacity = config.buffer_capacity,
            "Monitor started"
        );

        let handle = thread::Builder::new()
            .name("imu-monitor".to_string())
            .spawn(move || producer.run())
            .map_err(|e| MonitorError::Spawn(e.to_string()))?;

        Ok(Self {
            slot,
            running,
            thread_handle: Some(handle),
        })
    }

    /// Take the latest frame if anything changed since the last poll.
    pub fn poll(&self) -> Option<Frame> {
        self.slot.take()
    }

    /// False once the producer has exited for any reason.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Signal the producer to stop and wait for it.
    ///
    /// The producer notices within one read timeout. A frame published before
    /// exit stays available to [`Monitor::poll`].
    pub fn stop(&mut self) -> Result<SessionSummary, MonitorError> {
        self.running.store(false, Ordering::SeqCst);
        let handle = self
            .thread_handle
            .take()
            .ok_or(MonitorError::AlreadyStopped)?;
        handle.join().map_err(|_| MonitorError::ThreadPanicked)
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

struct Producer {
    reader: LineReader,
    pipeline: Pipeline,
    slot: FrameSlot,
    running: Arc<AtomicBool>,
    log: SharedSessionLog,
    read_timeout: Duration,
    history_limit: usize,
}

impl Producer {
    fn run(self) -> SessionSummary {
        let Producer {
            reader,
            mut pipeline,
            slot,
            running,
            log,
            read_timeout,
            history_limit,
        } = self;

        let source = reader.source_name().to_string();
        let mut history = History::new(history_limit);
        let mut batch: Vec<EventTransition> = Vec::new();
        let mut batched_samples = 0;
        let mut frames_published = 0;

        let end = loop {
            if !running.load(Ordering::SeqCst) {
                break SessionEnd::Stopped;
            }

            match reader.recv_timeout(read_timeout) {
                LineRead::Line(line) => {
                    log.record_line();
                    match pipeline.process_line(&line) {
                        LineOutcome::Accepted(transitions) => {
                            log.record_sample();
                            for transition in &transitions {
                                info!(
                                    kind = ?transition.kind,
                                    edge = ?transition.edge,
                                    value = transition.triggering_value,
                                    "{transition}"
                                );
                                log.record_transition(transition);
                                history.push(*transition);
                            }
                            batch.extend(transitions);
                            batched_samples += 1;
                        }
                        LineOutcome::Ignored => {
                            log.record_ignored();
                            debug!(%line, "Ignored line without telemetry header");
                        }
                        LineOutcome::Rejected(e) => {
                            log.record_decode_error();
                            warn!("Invalid data format: {e}");
                        }
                    }

                    // One frame per burst of queued lines.
                    if reader.pending() == 0 || batched_samples >= MAX_SAMPLES_PER_FRAME {
                        if publish(&mut pipeline, &slot, &mut batch) {
                            frames_published += 1;
                        }
                        batched_samples = 0;
                    }
                }
                LineRead::Timeout => {
                    if publish(&mut pipeline, &slot, &mut batch) {
                        frames_published += 1;
                    }
                    batched_samples = 0;
                }
                LineRead::Closed => {
                    info!(%source, "End of stream");
                    break SessionEnd::EndOfStream;
                }
                LineRead::Failed(e) => {
                    error!("Connection lost: {e}");
                    break SessionEnd::TransportFailed(e);
                }
            }
        };

        if publish(&mut pipeline, &slot, &mut batch) {
            frames_published += 1;
        }

        // Joins the reader thread, which drops the device.
        drop(reader);
        running.store(false, Ordering::SeqCst);

        let (transitions, dropped_transitions) = history.into_parts();
        SessionSummary {
            source,
            end,
            transitions,
            dropped_transitions,
            total_events: pipeline.classifier().total_events(),
            frames_published,
        }
    }
}

/// Hand the pending render and the batched transitions to the renderer.
fn publish(pipeline: &mut Pipeline, slot: &FrameSlot, batch: &mut Vec<EventTransition>) -> bool {
    match pipeline.poll_snapshot() {
        Some(snapshot) => {
            let throughput = pipeline.throughput();
            slot.publish(Frame::new(snapshot, std::mem::take(batch), throughput));
            true
        }
        None => false,
    }
}

/// Session transitions, bounded to the newest `limit`.
struct History {
    transitions: VecDeque<EventTransition>,
    limit: usize,
    dropped: u64,
}

impl History {
    fn new(limit: usize) -> Self {
        Self {
            transitions: VecDeque::new(),
            limit,
            dropped: 0,
        }
    }

    fn push(&mut self, transition: EventTransition) {
        self.transitions.push_back(transition);
        if self.transitions.len() > self.limit {
            self.transitions.pop_front();
            if self.dropped == 0 {
                warn!(limit = self.limit, "Transition history full, dropping the oldest");
            }
            self.dropped += 1;
        }
    }

    fn into_parts(self) -> (Vec<EventTransition>, u64) {
        (self.transitions.into(), self.dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::create_shared_log;
    use std::io::Cursor;

    #[test]
    fn test_stop_before_any_data() {
        // A device that is open but never sends a byte.
        struct Silent;
        impl std::io::Read for Silent {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                std::thread::sleep(Duration::from_millis(5));
                Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "silent"))
            }
        }

        let reader = LineReader::spawn("silent", Silent).unwrap();
        let config = MonitorConfig {
            read_timeout: Duration::from_millis(10),
            ..MonitorConfig::default()
        };
        let mut monitor = Monitor::start(reader, config, create_shared_log()).unwrap();
        assert!(monitor.poll().is_none());

        let summary = monitor.stop().unwrap();
        assert_eq!(summary.end, SessionEnd::Stopped);
        assert!(summary.transitions.is_empty());
        assert!(!monitor.is_running());
        assert!(matches!(monitor.stop(), Err(MonitorError::AlreadyStopped)));
    }

    #[test]
    fn test_end_of_stream_ends_session() {
        let data = "[CAMARADAS DO EDU]: -9000, 0, 0, 0, 0, 0\n";
        let reader = LineReader::spawn("memory", Cursor::new(data.as_bytes().to_vec())).unwrap();
        let log = create_shared_log();
        let mut monitor = Monitor::start(reader, MonitorConfig::default(), log.clone()).unwrap();

        while monitor.is_running() {
            std::thread::sleep(Duration::from_millis(5));
        }
        let summary = monitor.stop().unwrap();

        assert_eq!(summary.end, SessionEnd::EndOfStream);
        assert_eq!(summary.total_events, 1);
        assert_eq!(log.stats().samples_decoded, 1);

        let frame = monitor.poll().expect("final frame");
        assert_eq!(frame.snapshot.len(), 1);
        assert_eq!(frame.transitions.len(), 1);
    }

    fn brake_capture(episodes: usize, idle_between: usize) -> Vec<u8> {
        let mut data = String::new();
        for _ in 0..episodes {
            data.push_str("[CAMARADAS DO EDU]: -9000, 0, 0, 0, 0, 0\n");
            for _ in 0..idle_between.max(1) {
                data.push_str("[CAMARADAS DO EDU]: 100, 0, 0, 0, 0, 0\n");
            }
        }
        data.into_bytes()
    }

    fn run_to_end(reader: LineReader, config: MonitorConfig) -> (Monitor, SessionSummary) {
        let mut monitor = Monitor::start(reader, config, create_shared_log()).unwrap();
        while monitor.is_running() {
            std::thread::sleep(Duration::from_millis(5));
        }
        let summary = monitor.stop().unwrap();
        (monitor, summary)
    }

    #[test]
    fn test_history_keeps_newest_transitions() {
        let reader = LineReader::spawn("memory", Cursor::new(brake_capture(3, 1))).unwrap();
        let config = MonitorConfig {
            history_limit: 4,
            ..MonitorConfig::default()
        };
        let (_, summary) = run_to_end(reader, config);

        assert_eq!(summary.total_events, 3);
        assert_eq!(summary.transitions.len(), 4);
        assert_eq!(summary.dropped_transitions, 2);
        assert!(summary
            .transitions
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp));
    }

    #[test]
    fn test_queued_lines_share_frames() {
        // 4 episodes of 50 lines each, all queued before the monitor starts.
        let reader = LineReader::spawn("memory", Cursor::new(brake_capture(4, 49))).unwrap();
        while reader.pending() < 200 {
            std::thread::sleep(Duration::from_millis(1));
        }

        let (monitor, summary) = run_to_end(reader, MonitorConfig::default());
        assert_eq!(summary.end, SessionEnd::EndOfStream);
        assert!(summary.frames_published >= 1);
        assert!(summary.frames_published <= 4);

        let frame = monitor.poll().expect("final frame");
        assert_eq!(frame.snapshot.len(), 200);
        assert_eq!(frame.snapshot.accel[0].last(), Some(&100.0));
        assert_eq!(frame.transitions, summary.transitions);
        assert_eq!(frame.transitions.len(), 8);
    }
}
