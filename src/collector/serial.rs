//! Line transport for the telemetry link.
//!
//! The serial device (or a capture file, or stdin) is read on a dedicated
//! thread that reassembles whole lines and hands them over a bounded channel.
//! The consumer of the channel waits with a timeout, so it can observe a stop
//! request even while the device is silent.
//!
//! Sources handed to [`LineReader::spawn`] must return from `read` within a
//! bounded time (data, end of stream, or `TimedOut`), the way a serial port
//! opened with a timeout does. That lets [`LineReader::stop`] join the thread
//! and drop the source before it returns.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

/// Default number of whole lines buffered between the reader thread and the
/// pipeline before the reader blocks.
pub const DEFAULT_LINE_CAPACITY: usize = 1_024;

/// Link speed of the telemetry radio.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// How a serial device is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialSettings {
    pub baud_rate: u32,
    /// Longest a single device read may block
    pub timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: Duration::from_millis(100),
        }
    }
}

/// Result of a single bounded wait on the transport.
#[derive(Debug)]
pub enum LineRead {
    /// A complete line, without its terminator.
    Line(String),
    /// Nothing arrived within the timeout. Not an error.
    Timeout,
    /// The source reached end of stream.
    Closed,
    /// The source failed; the session must end.
    Failed(TransportError),
}

/// Errors raised by the transport. Always fatal to the current session.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The device or file could not be opened.
    Open { source: String, message: String },
    /// A read on an open source failed.
    Read { source: String, message: String },
    /// The reader thread could not be started.
    Spawn(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Open { source, message } => {
                write!(f, "Could not open {source}: {message}")
            }
            TransportError::Read { source, message } => {
                write!(f, "Read error on {source}: {message}")
            }
            TransportError::Spawn(e) => write!(f, "Could not start reader thread: {e}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Reads newline-delimited text from a byte source on a background thread.
pub struct LineReader {
    source_name: String,
    receiver: Receiver<Result<String, TransportError>>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    /// Stdin cannot be interrupted; its thread is left to exit on its own.
    detach_on_stop: bool,
}

impl LineReader {
    /// Start reading lines from an arbitrary byte source.
    pub fn spawn<R>(source_name: impl Into<String>, source: R) -> Result<Self, TransportError>
    where
        R: Read + Send + 'static,
    {
        Self::spawn_with_capacity(source_name, source, DEFAULT_LINE_CAPACITY)
    }

    /// Start reading lines with an explicit channel capacity.
    pub fn spawn_with_capacity<R>(
        source_name: impl Into<String>,
        source: R,
        capacity: usize,
    ) -> Result<Self, TransportError>
    where
        R: Read + Send + 'static,
    {
        let source_name = source_name.into();
        let (sender, receiver) = bounded(capacity.max(1));
        let running = Arc::new(AtomicBool::new(true));

        let thread_running = running.clone();
        let thread_name = source_name.clone();
        let handle = thread::Builder::new()
            .name("imu-line-reader".to_string())
            .spawn(move || read_lines(source, thread_name, sender, thread_running))
            .map_err(|e| TransportError::Spawn(e.to_string()))?;

        Ok(Self {
            source_name,
            receiver,
            running,
            thread_handle: Some(handle),
            detach_on_stop: false,
        })
    }

    /// Open a serial device, or replay a capture file. `-` reads standard input.
    ///
    /// Regular files are replayed as-is; anything else is opened as a serial
    /// port with `settings`.
    pub fn open(path: &Path, settings: &SerialSettings) -> Result<Self, TransportError> {
        if path.as_os_str() == "-" {
            let mut reader = Self::spawn("stdin", std::io::stdin())?;
            reader.detach_on_stop = true;
            return Ok(reader);
        }

        let name = path.display().to_string();
        let open_error = |message: String| TransportError::Open {
            source: name.clone(),
            message,
        };

        let is_capture = std::fs::metadata(path)
            .map(|m| m.is_file())
            .unwrap_or(false);
        if is_capture {
            let file = File::open(path).map_err(|e| open_error(e.to_string()))?;
            return Self::spawn(name, file);
        }

        let port = serialport::new(name.as_str(), settings.baud_rate)
            .timeout(settings.timeout)
            .open()
            .map_err(|e| open_error(e.to_string()))?;
        debug!(source = %name, baud = settings.baud_rate, "Serial port opened");
        Self::spawn(name, port)
    }

    /// Name of the underlying source, for diagnostics.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Wait up to `timeout` for the next complete line.
    pub fn recv_timeout(&self, timeout: Duration) -> LineRead {
        match self.receiver.recv_timeout(timeout) {
            Ok(Ok(line)) => LineRead::Line(line),
            Ok(Err(e)) => LineRead::Failed(e),
            Err(RecvTimeoutError::Timeout) => LineRead::Timeout,
            Err(RecvTimeoutError::Disconnected) => LineRead::Closed,
        }
    }

    /// Number of complete lines waiting to be received.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Stop the reader thread and release the source.
    ///
    /// Returns once the thread has exited and the source is dropped. Lines
    /// not yet received are discarded.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        // A reader blocked on a full channel needs room to see the flag.
        while self.receiver.try_recv().is_ok() {}

        if let Some(handle) = self.thread_handle.take() {
            if self.detach_on_stop && !handle.is_finished() {
                return;
            }
            let _ = handle.join();
        }
    }
}

impl Drop for LineReader {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_lines<R: Read>(
    source: R,
    source_name: String,
    sender: Sender<Result<String, TransportError>>,
    running: Arc<AtomicBool>,
) {
    let mut reader = BufReader::new(source);
    let mut buf = Vec::with_capacity(128);

    // A read timeout may split a line; the partial bytes stay in `buf`.
    while running.load(Ordering::SeqCst) {
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => {
                if !buf.is_empty() {
                    let _ = sender.send(Ok(decode_line(&buf)));
                }
                break;
            }
            Ok(_) => {
                if buf.last() != Some(&b'\n') {
                    continue;
                }
                let line = decode_line(&buf);
                buf.clear();
                if sender.send(Ok(line)).is_err() {
                    break;
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock
                ) =>
            {
                continue;
            }
            Err(e) => {
                let _ = sender.send(Err(TransportError::Read {
                    source: source_name.clone(),
                    message: e.to_string(),
                }));
                break;
            }
        }
    }
}

/// Invalid UTF-8 from line noise is replaced, not fatal.
fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(&['\r', '\n'][..])
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn collect_lines(reader: &LineReader) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            match reader.recv_timeout(Duration::from_secs(1)) {
                LineRead::Line(line) => lines.push(line),
                LineRead::Closed => break,
                other => panic!("unexpected read result: {other:?}"),
            }
        }
        lines
    }

    #[test]
    fn test_reads_whole_lines_and_strips_terminators() {
        let data = b"first\r\nsecond\nthird".to_vec();
        let reader = LineReader::spawn("memory", Cursor::new(data)).unwrap();

        assert_eq!(collect_lines(&reader), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let data = vec![b'o', b'k', 0xff, b'\n'];
        let reader = LineReader::spawn("memory", Cursor::new(data)).unwrap();

        let lines = collect_lines(&reader);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("ok"));
    }

    struct FailingSource;

    impl Read for FailingSource {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(ErrorKind::BrokenPipe, "unplugged"))
        }
    }

    #[test]
    fn test_read_failure_is_reported() {
        let reader = LineReader::spawn("device", FailingSource).unwrap();

        match reader.recv_timeout(Duration::from_secs(1)) {
            LineRead::Failed(TransportError::Read { source, message }) => {
                assert_eq!(source, "device");
                assert!(message.contains("unplugged"));
            }
            other => panic!("expected read failure, got {other:?}"),
        }
    }

    #[test]
    fn test_open_missing_path_fails() {
        let result = LineReader::open(
            Path::new("/nonexistent/imu-device"),
            &SerialSettings::default(),
        );
        assert!(matches!(result, Err(TransportError::Open { .. })));
    }

    #[test]
    fn test_open_replays_capture_file() {
        let path = std::env::temp_dir().join(format!("imu-capture-{}.txt", uuid::Uuid::new_v4()));
        std::fs::write(&path, "one\ntwo\n").unwrap();

        let reader = LineReader::open(&path, &SerialSettings::default()).unwrap();
        assert_eq!(collect_lines(&reader), vec!["one", "two"]);

        drop(reader);
        let _ = std::fs::remove_file(&path);
    }

    /// Hands out scripted chunks, timing out between them like a quiet port.
    struct ScriptedPort {
        chunks: Vec<&'static [u8]>,
        released: Arc<AtomicBool>,
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.chunks.is_empty() {
                std::thread::sleep(Duration::from_millis(5));
                return Err(std::io::Error::new(ErrorKind::TimedOut, "timed out"));
            }
            let chunk = self.chunks.remove(0);
            if chunk.is_empty() {
                return Err(std::io::Error::new(ErrorKind::TimedOut, "timed out"));
            }
            buf[..chunk.len()].copy_from_slice(chunk);
            Ok(chunk.len())
        }
    }

    impl Drop for ScriptedPort {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_line_split_by_timeout_is_reassembled() {
        let released = Arc::new(AtomicBool::new(false));
        let port = ScriptedPort {
            chunks: vec![b"[CAMARADAS", b"", b"", b" DO EDU]: 1\n"],
            released: released.clone(),
        };
        let reader = LineReader::spawn("port", port).unwrap();

        match reader.recv_timeout(Duration::from_secs(1)) {
            LineRead::Line(line) => assert_eq!(line, "[CAMARADAS DO EDU]: 1"),
            other => panic!("expected a line, got {other:?}"),
        }
        assert!(!released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_stop_releases_a_silent_port() {
        let released = Arc::new(AtomicBool::new(false));
        let port = ScriptedPort {
            chunks: Vec::new(),
            released: released.clone(),
        };
        let mut reader = LineReader::spawn("port", port).unwrap();
        assert!(matches!(
            reader.recv_timeout(Duration::from_millis(20)),
            LineRead::Timeout
        ));

        reader.stop();
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_stop_unblocks_a_reader_on_a_full_channel() {
        let released = Arc::new(AtomicBool::new(false));
        let port = ScriptedPort {
            chunks: vec![b"a\n", b"b\n", b"c\n", b"d\n"],
            released: released.clone(),
        };
        let mut reader = LineReader::spawn_with_capacity("port", port, 1).unwrap();
        while reader.pending() == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }

        reader.stop();
        assert!(released.load(Ordering::SeqCst));
    }
}
