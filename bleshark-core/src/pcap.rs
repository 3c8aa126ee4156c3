//! Classic pcap headers for the live capture stream.
//!
//! ## Wire format
//!
//! **Global header** (24 bytes, once per stream):
//! ```text
//! magic:          u32  (4)   0xA1B2C3D4, microsecond timestamps
//! version_major:  u16  (2)   2
//! version_minor:  u16  (2)   4
//! thiszone:       i32  (4)   0
//! sigfigs:        u32  (4)   0
//! snaplen:        u32  (4)   0xFFFF
//! network:        u32  (4)   link-layer type
//! ```
//!
//! **Record header** (16 bytes, before every packet):
//! ```text
//! ts_sec:         u32  (4)
//! ts_usec:        u32  (4)
//! incl_len:       u32  (4)
//! orig_len:       u32  (4)
//! ```
//!
//! All fields are little-endian. Records are never truncated, so
//! `incl_len == orig_len`.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::CaptureError;

// ── Constants ────────────────────────────────────────────────────

/// Magic number for microsecond-resolution pcap files.
pub const PCAP_MAGIC: u32 = 0xA1B2_C3D4;
pub const VERSION_MAJOR: u16 = 2;
pub const VERSION_MINOR: u16 = 4;
/// Largest packet the analyzer is told to expect.
pub const SNAPLEN: u32 = 0xFFFF;

// ── LinkType ─────────────────────────────────────────────────────

/// Link-layer type written into the global header.
///
/// Selects the dissector Wireshark applies to every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum LinkType {
    /// `LINKTYPE_NORDIC_BLE`: board id + Nordic sniffer packet.
    #[default]
    NordicBle,
    /// `LINKTYPE_BLUETOOTH_LE_LL`: bare BLE link-layer PDU.
    BluetoothLeLl,
    Other(u32),
}

impl From<u32> for LinkType {
    fn from(value: u32) -> Self {
        match value {
            157 => LinkType::NordicBle,
            251 => LinkType::BluetoothLeLl,
            other => LinkType::Other(other),
        }
    }
}

impl From<LinkType> for u32 {
    fn from(value: LinkType) -> Self {
        match value {
            LinkType::NordicBle => 157,
            LinkType::BluetoothLeLl => 251,
            LinkType::Other(v) => v,
        }
    }
}

// ── Timestamp ────────────────────────────────────────────────────

/// Capture time of a record, split the way the record header stores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Timestamp {
    pub seconds: u32,
    pub micros: u32,
}

impl Timestamp {
    pub fn new(seconds: u32, micros: u32) -> Self {
        Self { seconds, micros }
    }

    /// Sample the wall clock.
    ///
    /// A clock set before the Unix epoch yields zero. Seconds wrap after
    /// 2106 like every classic pcap writer.
    pub fn now() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            seconds: since_epoch.as_secs() as u32,
            micros: since_epoch.subsec_micros(),
        }
    }
}

// ── GlobalHeader ─────────────────────────────────────────────────

/// The 24-byte header opening every capture stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalHeader {
    pub magic: u32,
    pub version_major: u16,
    pub version_minor: u16,
    pub thiszone: i32,
    pub sigfigs: u32,
    pub snaplen: u32,
    pub link_type: LinkType,
}

impl Default for GlobalHeader {
    fn default() -> Self {
        Self::new(LinkType::default())
    }
}

impl GlobalHeader {
    /// Encoded size on the wire.
    pub const SIZE: usize = 24;

    pub fn new(link_type: LinkType) -> Self {
        Self {
            magic: PCAP_MAGIC,
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
            thiszone: 0,
            sigfigs: 0,
            snaplen: SNAPLEN,
            link_type,
        }
    }

    /// Serialize to bytes (little-endian).
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..6].copy_from_slice(&self.version_major.to_le_bytes());
        buf[6..8].copy_from_slice(&self.version_minor.to_le_bytes());
        buf[8..12].copy_from_slice(&self.thiszone.to_le_bytes());
        buf[12..16].copy_from_slice(&self.sigfigs.to_le_bytes());
        buf[16..20].copy_from_slice(&self.snaplen.to_le_bytes());
        buf[20..24].copy_from_slice(&u32::from(self.link_type).to_le_bytes());
        buf
    }

    /// Deserialize from bytes.
    pub fn decode(data: &[u8]) -> Result<Self, CaptureError> {
        let data: &[u8; Self::SIZE] = data
            .get(..Self::SIZE)
            .and_then(|d| d.try_into().ok())
            .ok_or(CaptureError::Truncated {
                what: "global header",
                expected: Self::SIZE,
                actual: data.len(),
            })?;
        let magic = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        if magic != PCAP_MAGIC {
            return Err(CaptureError::InvalidMagic(magic));
        }
        Ok(Self {
            magic,
            version_major: u16::from_le_bytes([data[4], data[5]]),
            version_minor: u16::from_le_bytes([data[6], data[7]]),
            thiszone: i32::from_le_bytes([data[8], data[9], data[10], data[11]]),
            sigfigs: u32::from_le_bytes([data[12], data[13], data[14], data[15]]),
            snaplen: u32::from_le_bytes([data[16], data[17], data[18], data[19]]),
            link_type: u32::from_le_bytes([data[20], data[21], data[22], data[23]]).into(),
        })
    }
}

// ── RecordHeader ─────────────────────────────────────────────────

/// The 16-byte header preceding every packet record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub timestamp: Timestamp,
    pub captured_len: u32,
    pub original_len: u32,
}

impl RecordHeader {
    /// Encoded size on the wire.
    pub const SIZE: usize = 16;

    /// Header for an untruncated payload of `payload_len` bytes.
    pub fn new(payload_len: u32, timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            captured_len: payload_len,
            original_len: payload_len,
        }
    }

    /// Serialize to bytes (little-endian).
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.timestamp.seconds.to_le_bytes());
        buf[4..8].copy_from_slice(&self.timestamp.micros.to_le_bytes());
        buf[8..12].copy_from_slice(&self.captured_len.to_le_bytes());
        buf[12..16].copy_from_slice(&self.original_len.to_le_bytes());
        buf
    }

    /// Deserialize from bytes.
    pub fn decode(data: &[u8]) -> Result<Self, CaptureError> {
        if data.len() < Self::SIZE {
            return Err(CaptureError::Truncated {
                what: "record header",
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let word = |at: usize| u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
        Ok(Self {
            timestamp: Timestamp::new(word(0), word(4)),
            captured_len: word(8),
            original_len: word(12),
        })
    }
}

// ── Free functions ───────────────────────────────────────────────

/// Global header for the default link type. Constant output.
pub fn encode_global_header() -> [u8; GlobalHeader::SIZE] {
    GlobalHeader::default().encode()
}

/// Record header for an untruncated payload of `payload_len` bytes.
pub fn encode_record_header(payload_len: u32, timestamp: Timestamp) -> [u8; RecordHeader::SIZE] {
    RecordHeader::new(payload_len, timestamp).encode()
}

/// Build one complete record: header, board id, then the packet bytes.
///
/// Returns `None` when `1 + packet.len()` does not fit the header's
/// 32-bit length fields.
pub fn encode_record(board_id: u8, packet: &[u8], timestamp: Timestamp) -> Option<Vec<u8>> {
    let payload_len = u32::try_from(packet.len().checked_add(1)?).ok()?;
    let mut record = Vec::with_capacity(RecordHeader::SIZE + 1 + packet.len());
    record.extend_from_slice(&encode_record_header(payload_len, timestamp));
    record.push(board_id);
    record.extend_from_slice(packet);
    Some(record)
}

// ── Tests ────────────────────────────────────────────────────────
