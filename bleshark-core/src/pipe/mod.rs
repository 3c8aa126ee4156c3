//! Named-pipe transport between the stream writer and the analyzer.
//!
//! Two variants implement [`PipeTransport`]:
//!
//! - [`FifoPipe`]: a FIFO special file on POSIX hosts.
//! - [`NamedPipe`]: a `\\.\pipe\` message-mode pipe on Windows.
//!
//! [`PlatformPipe`] names the variant of the build target. The stream
//! writer only talks to the trait, so tests swap in a recording
//! transport.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use crate::config::StreamConfig;
use crate::error::CaptureError;

#[cfg(unix)]
mod fifo;
#[cfg(target_os = "windows")]
mod named_pipe;

#[cfg(unix)]
pub use fifo::FifoPipe;
#[cfg(target_os = "windows")]
pub use named_pipe::NamedPipe;

/// The pipe variant for the build target.
#[cfg(unix)]
pub type PlatformPipe = FifoPipe;
/// The pipe variant for the build target.
#[cfg(target_os = "windows")]
pub type PlatformPipe = NamedPipe;

/// Interval between attempts while waiting for a reader to attach.
pub(crate) const CONNECT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Capability set shared by every pipe variant.
pub trait PipeTransport {
    /// Wait (bounded) for a reader to attach.
    fn open(&mut self) -> Result<(), CaptureError>;

    /// Write the whole buffer once. Never retries or blocks: a full pipe
    /// or a partial write is an error.
    fn write(&mut self, bytes: &[u8]) -> Result<(), CaptureError>;

    /// Release the OS resource. Idempotent.
    fn close(&mut self);

    /// Resolved path of the pipe, for the analyzer's `-i` argument.
    fn name(&self) -> &Path;

    /// Flag that cuts a pending [`open`](Self::open) short when set.
    ///
    /// `None` for transports whose `open` never waits.
    fn abort_handle(&self) -> Option<Arc<AtomicBool>> {
        None
    }
}

/// Turn a partial write into an error.
pub(crate) fn check_full_write(written: usize, expected: usize) -> Result<(), CaptureError> {
    if written == expected {
        return Ok(());
    }
    Err(CaptureError::Io(io::Error::new(
        io::ErrorKind::WriteZero,
        format!("short pipe write: {written} of {expected} bytes"),
    )))
}

/// Create the pipe for this platform from `config`.
///
/// Fails when the FIFO or named pipe cannot be created.
#[cfg(any(unix, target_os = "windows"))]
pub fn create_platform_pipe(config: &StreamConfig) -> Result<PlatformPipe, CaptureError> {
    PlatformPipe::create(config)
}
