//! Domain-specific error types for the capture stream.
//!
//! Setup failures surface as `Result<T, CaptureError>` from pipe
//! construction and [`StreamWriter::start`](crate::StreamWriter::start).
//! Write failures are absorbed by the stream writer and never reach the
//! packet path.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the capture stream.
#[derive(Debug, Error)]
pub enum CaptureError {
    // ── Pipe Errors ──────────────────────────────────────────────
    /// The FIFO or named pipe could not be created.
    #[error("cannot create capture pipe {}: {source}", path.display())]
    PipeCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No reader attached to the pipe before the connect deadline.
    #[error("no reader attached to the capture pipe within {0:?}")]
    ConnectTimeout(Duration),

    /// Shutdown was requested while waiting for a reader.
    #[error("waiting for a reader was aborted")]
    Aborted,

    /// A write was attempted on a pipe that is not open.
    #[error("capture pipe is not open")]
    NotOpen,

    /// The OS reported an error on the pipe.
    #[error("pipe I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ── State Errors ─────────────────────────────────────────────
    /// A lifecycle operation was called in the wrong state.
    #[error("invalid stream state: {0}")]
    InvalidState(&'static str),

    // ── Format Errors ────────────────────────────────────────────
    /// A global header did not carry the microsecond pcap magic.
    #[error("invalid pcap magic: {0:#010x}")]
    InvalidMagic(u32),

    /// Fewer bytes than a header needs.
    #[error("truncated {what}: expected {expected} bytes, got {actual}")]
    Truncated {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl CaptureError {
    /// Returns `true` when the error means the reader went away
    /// (broken pipe, disconnected client).
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::NotConnected
            ),
            Self::NotOpen => true,
            _ => false,
        }
    }
}
