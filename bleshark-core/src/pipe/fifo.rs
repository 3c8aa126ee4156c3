//! FIFO special file transport for POSIX hosts.
//!
//! `open(2)` for writing on a FIFO blocks until a reader shows up. To
//! keep the wait bounded the pipe is opened with `O_NONBLOCK`, which
//! fails with `ENXIO` while nobody reads, and retried until the connect
//! deadline. The descriptor stays non-blocking afterwards: when the
//! reader stops draining and the pipe buffer fills, a write fails with
//! `EAGAIN` (or lands short) instead of stalling the packet path.
//!
//! The connect wait also watches an abort flag so a shutdown request
//! does not have to sit out the whole timeout.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use tracing::{debug, info};

use super::{CONNECT_POLL_INTERVAL, PipeTransport, check_full_write};
use crate::config::StreamConfig;
use crate::error::CaptureError;

/// FIFO at `<base_dir>/<pipe_name>`.
#[derive(Debug)]
pub struct FifoPipe {
    path: PathBuf,
    connect_timeout: Duration,
    file: Option<File>,
    /// The FIFO node still exists on disk.
    created: bool,
    abort: Arc<AtomicBool>,
}

impl FifoPipe {
    /// Remove any stale file at the pipe path and create a fresh FIFO.
    ///
    /// The base directory is created when missing.
    pub fn create(config: &StreamConfig) -> Result<Self, CaptureError> {
        let path = config.fifo_path();

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| CaptureError::PipeCreate {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        match fs::remove_file(&path) {
            Ok(()) => debug!("removed stale capture pipe {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(CaptureError::PipeCreate { path, source }),
        }

        if let Err(errno) = mkfifo(&path, Mode::S_IRUSR | Mode::S_IWUSR) {
            return Err(CaptureError::PipeCreate {
                path,
                source: io::Error::from(errno),
            });
        }
        info!("created capture pipe {}", path.display());

        Ok(Self {
            path,
            connect_timeout: config.connect_timeout(),
            file: None,
            created: true,
            abort: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn try_open(&self) -> io::Result<File> {
        OpenOptions::new()
            .write(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(&self.path)
    }
}

impl PipeTransport for FifoPipe {
    fn open(&mut self) -> Result<(), CaptureError> {
        if self.file.is_some() {
            return Ok(());
        }
        if !self.created {
            return Err(CaptureError::NotOpen);
        }

        let deadline = Instant::now() + self.connect_timeout;
        loop {
            if self.abort.load(Ordering::SeqCst) {
                return Err(CaptureError::Aborted);
            }
            match self.try_open() {
                Ok(file) => {
                    debug!("reader attached to {}", self.path.display());
                    self.file = Some(file);
                    return Ok(());
                }
                Err(e) if e.raw_os_error() == Some(Errno::ENXIO as i32) => {
                    if Instant::now() >= deadline {
                        return Err(CaptureError::ConnectTimeout(self.connect_timeout));
                    }
                    std::thread::sleep(CONNECT_POLL_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), CaptureError> {
        let file = self.file.as_mut().ok_or(CaptureError::NotOpen)?;
        let written = file.write(bytes)?;
        check_full_write(written, bytes.len())
    }

    fn close(&mut self) {
        if self.file.take().is_some() {
            debug!("closed capture pipe {}", self.path.display());
        }
        if self.created {
            self.created = false;
            if let Err(e) = fs::remove_file(&self.path) {
                debug!("could not remove {}: {e}", self.path.display());
            }
        }
    }

    fn name(&self) -> &Path {
        &self.path
    }

    fn abort_handle(&self) -> Option<Arc<AtomicBool>> {
        Some(Arc::clone(&self.abort))
    }
}

impl Drop for FifoPipe {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Tests ────────────────────────────────────────────────────────
