//! # bleshark-core
//!
//! Live capture streaming for a BLE sniffer: decoded packets go out as a
//! classic pcap stream through a FIFO (POSIX) or named pipe (Windows),
//! where Wireshark reads them in real time.
//!
//! This crate contains:
//! - **Encoder**: `GlobalHeader`, `RecordHeader`, `LinkType`: byte-exact pcap headers
//! - **Pipe**: `PipeTransport` with the `FifoPipe` / `NamedPipe` variants
//! - **Stream**: `StreamWriter`: lifecycle, framing, and fail-open error policy
//! - **Adapter**: `PacketEvent`, `PacketSubscriber`, `PacketBus`, channel forwarding
//! - **Config**: `StreamConfig`: pipe name, base directory, connect timeout
//! - **Error**: `CaptureError`: typed, `thiserror`-based error hierarchy

pub mod adapter;
pub mod config;
pub mod error;
pub mod pcap;
pub mod pipe;
pub mod stream;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use adapter::{PacketBus, PacketEvent, PacketSubscriber, forward_channel, packet_channel};
pub use config::{DEFAULT_PIPE_NAME, StreamConfig};
pub use error::CaptureError;
pub use pcap::{
    GlobalHeader, LinkType, RecordHeader, Timestamp, encode_global_header, encode_record_header,
};
pub use pipe::PipeTransport;
#[cfg(any(unix, target_os = "windows"))]
pub use pipe::PlatformPipe;
pub use stream::{StreamState, StreamStats, StreamWriter};
