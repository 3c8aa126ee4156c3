//! `\\.\pipe\` named-pipe transport for Windows.
//!
//! The pipe is created outbound, message mode, single instance, and
//! stays in `PIPE_NOWAIT` for its whole life. `ConnectNamedPipe` is
//! polled against the connect deadline, and a write into a full buffer
//! comes back short instead of waiting on a reader that stopped reading.
//!
//! # Safety
//!
//! All unsafe FFI calls are confined to this module.

use std::ffi::OsStr;
use std::io;
use std::os::windows::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info};
use windows::Win32::Foundation::{
    CloseHandle, ERROR_PIPE_CONNECTED, ERROR_PIPE_LISTENING, HANDLE,
};
use windows::Win32::Storage::FileSystem::{PIPE_ACCESS_OUTBOUND, WriteFile};
use windows::Win32::System::Pipes::{
    ConnectNamedPipe, CreateNamedPipeW, DisconnectNamedPipe, PIPE_NOWAIT, PIPE_TYPE_MESSAGE,
};
use windows::core::PCWSTR;

use super::{CONNECT_POLL_INTERVAL, PipeTransport, check_full_write};
use crate::config::{StreamConfig, windows_pipe_path};
use crate::error::CaptureError;

// ── Constants ────────────────────────────────────────────────────

const MAX_INSTANCES: u32 = 1;
const BUFFER_SIZE: u32 = 65536;
/// Default client wait passed to `CreateNamedPipeW`, in milliseconds.
const DEFAULT_TIMEOUT_MS: u32 = 300;

// ── NamedPipe ────────────────────────────────────────────────────

/// Server end of `\\.\pipe\<pipe_name>`.
#[derive(Debug)]
pub struct NamedPipe {
    path: PathBuf,
    connect_timeout: Duration,
    handle: Option<HANDLE>,
    connected: bool,
    abort: Arc<AtomicBool>,
}

// The handle is owned exclusively by this struct and only used by
// whichever thread currently owns it.
unsafe impl Send for NamedPipe {}

impl NamedPipe {
    /// Create the pipe instance. Does not wait for a client.
    pub fn create(config: &StreamConfig) -> Result<Self, CaptureError> {
        let path = windows_pipe_path(&config.pipe_name);
        let wide: Vec<u16> = OsStr::new(&path)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        let handle = unsafe {
            CreateNamedPipeW(
                PCWSTR(wide.as_ptr()),
                PIPE_ACCESS_OUTBOUND,
                PIPE_TYPE_MESSAGE | PIPE_NOWAIT,
                MAX_INSTANCES,
                BUFFER_SIZE,
                BUFFER_SIZE,
                DEFAULT_TIMEOUT_MS,
                None,
            )
        };
        if handle.is_invalid() {
            return Err(CaptureError::PipeCreate {
                path,
                source: io::Error::last_os_error(),
            });
        }
        info!("created capture pipe {}", path.display());

        Ok(Self {
            path,
            connect_timeout: config.connect_timeout(),
            handle: Some(handle),
            connected: false,
            abort: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn is_open(&self) -> bool {
        self.connected
    }

    /// `Ok(true)` once a client is attached, `Ok(false)` while listening.
    fn poll_connect(handle: HANDLE) -> io::Result<bool> {
        match unsafe { ConnectNamedPipe(handle, None) } {
            Ok(()) => Ok(false),
            Err(e) if e.code() == ERROR_PIPE_CONNECTED.to_hresult() => Ok(true),
            Err(e) if e.code() == ERROR_PIPE_LISTENING.to_hresult() => Ok(false),
            Err(e) => Err(io::Error::from(e)),
        }
    }
}

impl PipeTransport for NamedPipe {
    fn open(&mut self) -> Result<(), CaptureError> {
        if self.connected {
            return Ok(());
        }
        let handle = self.handle.ok_or(CaptureError::NotOpen)?;

        let deadline = Instant::now() + self.connect_timeout;
        while !Self::poll_connect(handle)? {
            if self.abort.load(Ordering::SeqCst) {
                return Err(CaptureError::Aborted);
            }
            if Instant::now() >= deadline {
                return Err(CaptureError::ConnectTimeout(self.connect_timeout));
            }
            std::thread::sleep(CONNECT_POLL_INTERVAL);
        }

        debug!("analyzer attached to {}", self.path.display());
        self.connected = true;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), CaptureError> {
        let handle = match self.handle {
            Some(h) if self.connected => h,
            _ => return Err(CaptureError::NotOpen),
        };
        let mut written = 0u32;
        unsafe { WriteFile(handle, Some(bytes), Some(&mut written as *mut _), None) }
            .map_err(io::Error::from)?;
        check_full_write(written as usize, bytes.len())
    }

    fn close(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        unsafe {
            if self.connected {
                let _ = DisconnectNamedPipe(handle);
            }
            let _ = CloseHandle(handle);
        }
        self.connected = false;
        debug!("closed capture pipe {}", self.path.display());
    }

    fn name(&self) -> &Path {
        &self.path
    }

    fn abort_handle(&self) -> Option<Arc<AtomicBool>> {
        Some(Arc::clone(&self.abort))
    }
}

impl Drop for NamedPipe {
    fn drop(&mut self) {
        self.close();
    }
}
