//! Capture host: wires the packet feed to the stream writer.
//!
//! Creates the capture pipe, waits for Wireshark to attach, then
//! forwards every packet the feed pushes until the feed ends or Ctrl-C
//! arrives. When Wireshark never attaches the feed is still drained so
//! the producer side never stalls. Ctrl-C during the connect wait aborts
//! it and removes the pipe.

use std::future::Future;
use std::sync::atomic::Ordering;

use tokio::io::AsyncBufRead;
use tracing::{error, info, warn};

use bleshark_core::{
    CaptureError, PlatformPipe, StreamStats, StreamWriter, forward_channel, packet_channel,
};

use crate::config::HostConfig;
use crate::feed;

// ── CaptureService ───────────────────────────────────────────────

/// The top-level capture host.
pub struct CaptureService {
    config: HostConfig,
}

impl CaptureService {
    pub fn new(config: HostConfig) -> Self {
        Self { config }
    }

    /// Run until `input` ends or `shutdown` resolves.
    ///
    /// 1. Creates the capture pipe (fatal when it fails).
    /// 2. Waits, bounded, for the analyzer to attach. `shutdown`
    ///    already counts here and aborts the wait.
    /// 3. Spawns the feed reader into a bounded channel.
    /// 4. Forwards packets to the writer in arrival order.
    /// 5. Stops the stream and returns its statistics.
    pub async fn run<R, S>(&self, input: R, shutdown: S) -> Result<StreamStats, CaptureError>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        S: Future<Output = ()>,
    {
        let writer = StreamWriter::<PlatformPipe>::from_config(&self.config.stream)?;
        info!("capture pipe: {}", writer.pipe_name().display());
        info!(
            "waiting up to {:?} for Wireshark to attach",
            self.config.stream.connect_timeout()
        );

        let abort = writer.abort_handle();
        tokio::pin!(shutdown);

        let mut open_task = tokio::task::spawn_blocking(move || {
            let mut writer = writer;
            let started = writer.start();
            (writer, started)
        });

        let (mut writer, started) = tokio::select! {
            joined = &mut open_task => joined.map_err(join_error)?,
            _ = &mut shutdown => {
                info!("shutdown requested while waiting for Wireshark");
                if let Some(abort) = &abort {
                    abort.store(true, Ordering::SeqCst);
                }
                let (mut writer, _) = open_task.await.map_err(join_error)?;
                writer.stop();
                return Ok(writer.stats());
            }
        };

        if let Err(e) = started {
            warn!("continuing without capture stream: {e}");
        }

        let (tx, mut rx) = packet_channel();
        let feed_task = tokio::spawn(feed::pump(input, tx));

        tokio::select! {
            forwarded = forward_channel(&mut rx, &mut writer) => {
                info!("feed ended after {forwarded} packets");
            }
            _ = &mut shutdown => {
                info!("shutdown requested");
            }
        }

        feed_task.abort();
        match feed_task.await {
            Ok(Ok(rejected)) if rejected > 0 => warn!("{rejected} feed lines rejected"),
            Ok(Err(e)) => error!("feed read error: {e}"),
            _ => {}
        }

        writer.stop();
        Ok(writer.stats())
    }
}

fn join_error(e: tokio::task::JoinError) -> CaptureError {
    CaptureError::Other(format!("pipe open task failed: {e}"))
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(all(test, unix))]
mod tests {
    use std::fs::File;
    use std::io::Read;
    use std::time::Duration;

    use bleshark_core::{GlobalHeader, RecordHeader};

    use super::*;

    fn config_in(dir: &std::path::Path, timeout: Duration) -> HostConfig {
        let mut config = HostConfig::default();
        config.stream = config
            .stream
            .with_base_dir(dir)
            .with_connect_timeout(timeout);
        config
    }

    #[tokio::test]
    async fn streams_feed_to_reader() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), Duration::from_secs(5));
        let path = config.stream.fifo_path();

        let reader = std::thread::spawn(move || {
            // Wait for the FIFO node to appear.
            while !path.exists() {
                std::thread::sleep(Duration::from_millis(10));
            }
            let mut buf = Vec::new();
            File::open(&path).unwrap().read_to_end(&mut buf).unwrap();
            buf
        });

        let input: &'static [u8] = b"1 aabbcc\n2 dd\n";
        let service = CaptureService::new(config);
        let stats = service
            .run(input, std::future::pending::<()>())
            .await
            .unwrap();
        assert_eq!(stats.packets_written, 2);

        let bytes = reader.join().unwrap();
        assert!(GlobalHeader::decode(&bytes).is_ok());
        let first = RecordHeader::decode(&bytes[24..]).unwrap();
        assert_eq!(first.captured_len, 4);
        assert_eq!(&bytes[40..44], &[1, 0xAA, 0xBB, 0xCC]);
    }

    #[tokio::test]
    async fn drains_feed_without_reader() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), Duration::ZERO);

        let input: &'static [u8] = b"1 aa\n1 bb\n1 cc\n";
        let stats = CaptureService::new(config)
            .run(input, std::future::pending::<()>())
            .await
            .unwrap();
        assert_eq!(stats.packets_written, 0);
        assert_eq!(stats.packets_dropped, 3);
    }

    #[tokio::test]
    async fn shutdown_during_connect_wait_removes_pipe() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), Duration::from_secs(30));
        let path = config.stream.fifo_path();

        let service = CaptureService::new(config);
        let run = service.run(&b"1 aa\n"[..], std::future::ready(()));
        let stats = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("connect wait was not aborted")
            .unwrap();

        assert_eq!(stats.packets_written, 0);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn pipe_creation_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("ble.pipe")).unwrap();
        let config = config_in(dir.path(), Duration::ZERO);

        let err = CaptureService::new(config)
            .run(&b""[..], std::future::pending::<()>())
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::PipeCreate { .. }));
    }
}
