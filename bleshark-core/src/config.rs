//! Stream configuration passed explicitly into the writer.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pcap::LinkType;

/// Default logical name of the capture pipe.
pub const DEFAULT_PIPE_NAME: &str = "ble.pipe";

/// Settings for one capture stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Logical channel name, e.g. `ble.pipe`.
    pub pipe_name: String,
    /// Directory holding the FIFO on POSIX hosts. Ignored on Windows.
    pub base_dir: PathBuf,
    /// How long `start()` waits for the analyzer to attach, in
    /// milliseconds.
    pub connect_timeout_ms: u64,
    /// Link-layer type advertised in the global header.
    pub link_type: LinkType,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            pipe_name: DEFAULT_PIPE_NAME.into(),
            base_dir: PathBuf::from("logs"),
            connect_timeout_ms: 30_000,
            link_type: LinkType::default(),
        }
    }
}

impl StreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Resolved pipe location for the build target.
    ///
    /// The external launcher points the analyzer at this path.
    pub fn pipe_path(&self) -> PathBuf {
        if cfg!(windows) {
            windows_pipe_path(&self.pipe_name)
        } else {
            self.fifo_path()
        }
    }

    /// `<base_dir>/<pipe_name>`.
    pub fn fifo_path(&self) -> PathBuf {
        self.base_dir.join(&self.pipe_name)
    }

    pub fn with_base_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.base_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_pipe_name(mut self, name: impl Into<String>) -> Self {
        self.pipe_name = name.into();
        self
    }

    /// Sub-millisecond remainders round up, so a non-zero timeout
    /// never collapses to zero.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        let ms = timeout.as_nanos().div_ceil(1_000_000);
        self.connect_timeout_ms = u64::try_from(ms).unwrap_or(u64::MAX);
        self
    }
}

/// `\\.\pipe\<name>`.
pub fn windows_pipe_path(name: &str) -> PathBuf {
    PathBuf::from(format!(r"\\.\pipe\{name}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = StreamConfig::default();
        assert_eq!(cfg.pipe_name, "ble.pipe");
        assert_eq!(cfg.connect_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.link_type, LinkType::NordicBle);
    }

    #[test]
    fn fifo_path_joins_base_dir() {
        let cfg = StreamConfig::default().with_base_dir("/tmp/sniff");
        assert_eq!(cfg.fifo_path(), PathBuf::from("/tmp/sniff/ble.pipe"));
    }

    #[test]
    fn windows_namespace() {
        assert_eq!(
            windows_pipe_path("ble.pipe"),
            PathBuf::from(r"\\.\pipe\ble.pipe")
        );
    }

    #[cfg(unix)]
    #[test]
    fn pipe_path_is_fifo_on_unix() {
        let cfg = StreamConfig::default();
        assert_eq!(cfg.pipe_path(), cfg.fifo_path());
    }

    #[test]
    fn connect_timeout_keeps_milliseconds() {
        let cfg = StreamConfig::default().with_connect_timeout(Duration::from_millis(1500));
        assert_eq!(cfg.connect_timeout(), Duration::from_millis(1500));

        let cfg = StreamConfig::default().with_connect_timeout(Duration::from_millis(500));
        assert_eq!(cfg.connect_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn connect_timeout_rounds_up_sub_millisecond() {
        let cfg = StreamConfig::default().with_connect_timeout(Duration::from_nanos(1));
        assert_eq!(cfg.connect_timeout_ms, 1);

        let cfg = StreamConfig::default().with_connect_timeout(Duration::ZERO);
        assert_eq!(cfg.connect_timeout_ms, 0);
    }

    #[test]
    fn roundtrip_toml() {
        let cfg = StreamConfig::default().with_pipe_name("nrf.pipe");
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("link_type = 157"));
        let parsed: StreamConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let parsed: StreamConfig = toml::from_str("link_type = 251").unwrap();
        assert_eq!(parsed.link_type, LinkType::BluetoothLeLl);
        assert_eq!(parsed.pipe_name, "ble.pipe");
    }
}
