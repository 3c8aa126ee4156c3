//! Stream writer: pcap framing on top of a [`PipeTransport`].
//!
//! ```text
//!  Closed ──► Opening ──► Streaming
//!    ▲           │            │
//!    └───────────┴────────────┘   (open failure, write failure, stop)
//! ```
//!
//! Capture to the analyzer is optional. A failed write closes the
//! stream and turns later `emit` calls into no-ops; nothing is ever
//! returned to the packet path.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::config::StreamConfig;
use crate::error::CaptureError;
use crate::pcap::{self, GlobalHeader, LinkType, Timestamp};
use crate::pipe::PipeTransport;

// ── StreamState ──────────────────────────────────────────────────

/// Lifecycle phase of a capture stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StreamState {
    /// No pipe open. Initial and terminal state.
    #[default]
    Closed,

    /// Waiting for the analyzer to attach.
    Opening,

    /// Global header written; records flow.
    Streaming {
        /// When the stream entered `Streaming`.
        since: Instant,
    },
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Opening => write!(f, "Opening"),
            Self::Streaming { .. } => write!(f, "Streaming"),
        }
    }
}

impl StreamState {
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// How long the stream has been `Streaming`.
    pub fn streaming_duration(&self) -> Option<std::time::Duration> {
        match self {
            Self::Streaming { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Valid from: `Closed`.
    pub fn begin_open(&mut self) -> Result<(), CaptureError> {
        match self {
            Self::Closed => {
                *self = Self::Opening;
                Ok(())
            }
            _ => Err(CaptureError::InvalidState(
                "cannot start: stream is not Closed",
            )),
        }
    }

    /// Valid from: `Opening`.
    pub fn complete_open(&mut self) -> Result<(), CaptureError> {
        match self {
            Self::Opening => {
                *self = Self::Streaming {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(CaptureError::InvalidState(
                "cannot stream: stream is not Opening",
            )),
        }
    }

    /// Back to `Closed` from any state.
    pub fn force_close(&mut self) {
        *self = Self::Closed;
    }
}

// ── StreamStats ──────────────────────────────────────────────────

/// Counters over the lifetime of a writer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Records successfully written.
    pub packets_written: u64,
    /// Bytes successfully written, global header included.
    pub bytes_written: u64,
    /// Packets handed to `emit` while the stream was not streaming.
    pub packets_dropped: u64,
}

// ── StreamWriter ─────────────────────────────────────────────────

/// Owns one pipe and writes a pcap stream into it.
#[derive(Debug)]
pub struct StreamWriter<T: PipeTransport> {
    pipe: T,
    header: GlobalHeader,
    state: StreamState,
    stats: StreamStats,
    /// The pipe has already been released.
    released: bool,
}

impl<T: PipeTransport> StreamWriter<T> {
    /// Wrap a transport. Nothing is opened until [`start`](Self::start).
    pub fn new(pipe: T, link_type: LinkType) -> Self {
        Self {
            pipe,
            header: GlobalHeader::new(link_type),
            state: StreamState::Closed,
            stats: StreamStats::default(),
            released: false,
        }
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    pub fn is_streaming(&self) -> bool {
        self.state.is_streaming()
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// Resolved pipe path, for pointing the analyzer at it.
    pub fn pipe_name(&self) -> &Path {
        self.pipe.name()
    }

    pub fn transport(&self) -> &T {
        &self.pipe
    }

    /// Flag that aborts a [`start`](Self::start) still waiting for the
    /// analyzer, from another thread.
    pub fn abort_handle(&self) -> Option<Arc<AtomicBool>> {
        self.pipe.abort_handle()
    }

    /// Wait for the analyzer, then write the global header.
    ///
    /// Blocks for at most the transport's connect timeout. On failure
    /// the pipe is released, the writer is `Closed` and the error is
    /// returned once; the caller decides whether to carry on without
    /// the stream.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.released {
            return Err(CaptureError::InvalidState("stream already closed"));
        }
        self.state.begin_open()?;
        debug!("waiting for analyzer on {}", self.pipe.name().display());

        let opened = self
            .pipe
            .open()
            .and_then(|()| self.pipe.write(&self.header.encode()));

        match opened {
            Ok(()) => {
                self.stats.bytes_written += GlobalHeader::SIZE as u64;
                self.state.complete_open()?;
                info!("capture stream started on {}", self.pipe.name().display());
                Ok(())
            }
            Err(e) => {
                error!("capture stream failed to start: {e}");
                self.release();
                Err(e)
            }
        }
    }

    /// Write one record: header, `board_id`, then `packet`.
    ///
    /// A no-op unless `Streaming`. A failed write closes the stream.
    pub fn emit(&mut self, board_id: u8, packet: &[u8]) {
        if !self.state.is_streaming() {
            self.stats.packets_dropped += 1;
            return;
        }

        let Some(record) = pcap::encode_record(board_id, packet, Timestamp::now()) else {
            warn!("dropping oversize packet of {} bytes", packet.len());
            self.stats.packets_dropped += 1;
            return;
        };

        match self.pipe.write(&record) {
            Ok(()) => {
                self.stats.packets_written += 1;
                self.stats.bytes_written += record.len() as u64;
            }
            Err(e) if e.is_disconnect() => {
                info!("analyzer detached, closing stream: {e}");
                self.stats.packets_dropped += 1;
                self.release();
            }
            Err(e) => {
                error!("capture pipe write failed, closing stream: {e}");
                self.stats.packets_dropped += 1;
                self.release();
            }
        }
    }

    /// Close the pipe. Valid from any state; idempotent.
    pub fn stop(&mut self) {
        if let Some(elapsed) = self.state.streaming_duration() {
            info!(
                "capture stream stopped after {:.1}s: {} packets, {} bytes",
                elapsed.as_secs_f64(),
                self.stats.packets_written,
                self.stats.bytes_written
            );
        }
        self.release();
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.pipe.close();
        }
        self.state.force_close();
    }
}

impl<T: PipeTransport> Drop for StreamWriter<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(any(unix, target_os = "windows"))]
impl StreamWriter<crate::pipe::PlatformPipe> {
    /// Create the platform pipe described by `config` and wrap it.
    ///
    /// Fails when the pipe cannot be created.
    pub fn from_config(config: &StreamConfig) -> Result<Self, CaptureError> {
        let pipe = crate::pipe::create_platform_pipe(config)?;
        Ok(Self::new(pipe, config.link_type))
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;
    use crate::pcap::{RecordHeader, encode_global_header};

    /// Transport that records every call.
    #[derive(Debug, Default)]
    struct RecordingPipe {
        writes: Vec<Vec<u8>>,
        opens: usize,
        closes: usize,
        fail_open: bool,
        fail_write_after: Option<usize>,
        path: PathBuf,
    }

    impl PipeTransport for RecordingPipe {
        fn open(&mut self) -> Result<(), CaptureError> {
            self.opens += 1;
            if self.fail_open {
                return Err(CaptureError::ConnectTimeout(Duration::from_secs(1)));
            }
            Ok(())
        }

        fn write(&mut self, bytes: &[u8]) -> Result<(), CaptureError> {
            if self.fail_write_after == Some(self.writes.len()) {
                return Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe).into());
            }
            self.writes.push(bytes.to_vec());
            Ok(())
        }

        fn close(&mut self) {
            self.closes += 1;
        }

        fn name(&self) -> &Path {
            &self.path
        }
    }

    fn writer(pipe: RecordingPipe) -> StreamWriter<RecordingPipe> {
        StreamWriter::new(pipe, LinkType::NordicBle)
    }

    #[test]
    fn start_writes_global_header_first() {
        let mut w = writer(RecordingPipe::default());
        w.start().unwrap();
        assert!(w.is_streaming());
        assert_eq!(w.transport().writes[0], encode_global_header());
        assert_eq!(w.stats().bytes_written, 24);
    }

    #[test]
    fn emit_writes_one_record() {
        let mut w = writer(RecordingPipe::default());
        w.start().unwrap();
        w.emit(0x01, &[0xAA, 0xBB, 0xCC]);

        let writes = &w.transport().writes;
        assert_eq!(writes.len(), 2);
        let record = &writes[1];
        assert_eq!(record.len(), 16 + 4);
        let hdr = RecordHeader::decode(record).unwrap();
        assert_eq!(hdr.captured_len, 4);
        assert_eq!(hdr.original_len, 4);
        assert_eq!(&record[16..], &[0x01, 0xAA, 0xBB, 0xCC]);
        assert_eq!(w.stats().packets_written, 1);
    }

    #[test]
    fn emit_before_start_is_noop() {
        let mut w = writer(RecordingPipe::default());
        w.emit(0, b"early");
        assert!(w.transport().writes.is_empty());
        assert_eq!(w.stats().packets_dropped, 1);
    }

    #[test]
    fn open_failure_leaves_closed_without_writes() {
        let mut w = writer(RecordingPipe {
            fail_open: true,
            ..Default::default()
        });
        let err = w.start().unwrap_err();
        assert!(matches!(err, CaptureError::ConnectTimeout(_)));
        assert!(w.state().is_closed());
        assert!(w.transport().writes.is_empty());
        assert_eq!(w.transport().closes, 1);
    }

    #[test]
    fn header_write_failure_fails_start() {
        let mut w = writer(RecordingPipe {
            fail_write_after: Some(0),
            ..Default::default()
        });
        assert!(w.start().is_err());
        assert!(w.state().is_closed());
    }

    #[test]
    fn write_failure_closes_and_silences() {
        let mut w = writer(RecordingPipe {
            fail_write_after: Some(2),
            ..Default::default()
        });
        w.start().unwrap();
        w.emit(1, b"ok");
        w.emit(1, b"fails");
        assert!(w.state().is_closed());
        assert_eq!(w.transport().closes, 1);

        let writes_before = w.transport().writes.len();
        w.emit(1, b"ignored");
        w.emit(1, b"ignored");
        assert_eq!(w.transport().writes.len(), writes_before);
        assert_eq!(w.stats().packets_written, 1);
        assert_eq!(w.stats().packets_dropped, 3);
    }

    #[test]
    fn stop_twice_closes_once() {
        let mut w = writer(RecordingPipe::default());
        w.start().unwrap();
        w.stop();
        w.stop();
        assert_eq!(w.transport().closes, 1);
        assert!(w.state().is_closed());
    }

    #[test]
    fn stop_after_write_failure_does_not_close_again() {
        let mut w = writer(RecordingPipe {
            fail_write_after: Some(1),
            ..Default::default()
        });
        w.start().unwrap();
        w.emit(3, b"x");
        w.stop();
        assert_eq!(w.transport().closes, 1);
    }

    #[test]
    fn stop_without_start_closes_once() {
        let mut w = writer(RecordingPipe::default());
        assert!(w.state().streaming_duration().is_none());
        w.stop();
        w.stop();
        assert_eq!(w.transport().closes, 1);
        assert_eq!(w.transport().opens, 0);
        assert_eq!(w.stats(), StreamStats::default());
    }

    #[test]
    fn abort_handle_comes_from_transport() {
        let w = writer(RecordingPipe::default());
        assert!(w.abort_handle().is_none());
    }

    #[test]
    fn start_twice_is_rejected() {
        let mut w = writer(RecordingPipe::default());
        w.start().unwrap();
        assert!(matches!(w.start(), Err(CaptureError::InvalidState(_))));
        assert_eq!(w.transport().opens, 1);
    }

    #[test]
    fn closed_stream_cannot_restart() {
        let mut w = writer(RecordingPipe {
            fail_open: true,
            ..Default::default()
        });
        assert!(w.start().is_err());
        assert!(matches!(w.start(), Err(CaptureError::InvalidState(_))));
        assert_eq!(w.transport().opens, 1);
    }

    #[test]
    fn link_type_reaches_header() {
        let mut w = StreamWriter::new(RecordingPipe::default(), LinkType::BluetoothLeLl);
        w.start().unwrap();
        let hdr = GlobalHeader::decode(&w.transport().writes[0]).unwrap();
        assert_eq!(hdr.link_type, LinkType::BluetoothLeLl);
    }

    #[test]
    fn state_transitions() {
        let mut state = StreamState::default();
        assert!(state.complete_open().is_err());
        state.begin_open().unwrap();
        assert_eq!(state, StreamState::Opening);
        assert!(state.begin_open().is_err());
        state.complete_open().unwrap();
        assert!(state.is_streaming());
        assert!(state.streaming_duration().is_some());
        state.force_close();
        assert!(state.is_closed());
        assert_eq!(state.to_string(), "Closed");
    }
}
