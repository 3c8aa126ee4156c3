//! Text packet feed standing in for the serial sniffer driver.
//!
//! One packet per line: a board id, whitespace, then the packet as hex.
//!
//! ```text
//! 1 aabbcc
//! 0x02 0600c0ffee
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use bleshark_core::PacketEvent;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::warn;

/// Why a feed line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error("missing packet bytes")]
    MissingPacket,
    #[error("invalid board id {0:?}")]
    BadBoardId(String),
    #[error("invalid hex {0:?}")]
    BadHex(String),
}

/// Parse one feed line. `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str) -> Result<Option<PacketEvent>, FeedError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut parts = line.split_whitespace();
    let board = parts.next().unwrap_or_default();
    let board_id = match board.strip_prefix("0x") {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => board.parse(),
    }
    .map_err(|_| FeedError::BadBoardId(board.to_string()))?;

    let hex: String = parts.collect();
    if hex.is_empty() {
        return Err(FeedError::MissingPacket);
    }
    Ok(Some(PacketEvent::new(board_id, decode_hex(&hex)?)))
}

fn decode_hex(hex: &str) -> Result<Vec<u8>, FeedError> {
    let bad = || FeedError::BadHex(hex.to_string());
    if hex.len() % 2 != 0 || !hex.is_ascii() {
        return Err(bad());
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| bad()))
        .collect()
}

/// Read lines from `input` and push parsed packets into `tx`.
///
/// Stops at end of input or when the receiver is gone. Returns the
/// number of rejected lines.
pub async fn pump<R>(input: R, tx: mpsc::Sender<PacketEvent>) -> std::io::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut rejected = 0;
    let mut lineno = 0u64;
    while let Some(line) = lines.next_line().await? {
        lineno += 1;
        match parse_line(&line) {
            Ok(Some(event)) => {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!("feed line {lineno}: {e}");
                rejected += 1;
            }
        }
    }
    Ok(rejected)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_and_hex_board() {
        assert_eq!(
            parse_line("1 aabbcc").unwrap(),
            Some(PacketEvent::new(1, vec![0xAA, 0xBB, 0xCC]))
        );
        assert_eq!(
            parse_line("0x0a 00 ff").unwrap(),
            Some(PacketEvent::new(10, vec![0x00, 0xFF]))
        );
    }

    #[test]
    fn skips_blank_and_comments() {
        assert_eq!(parse_line("   ").unwrap(), None);
        assert_eq!(parse_line("# header").unwrap(), None);
    }

    #[test]
    fn rejects_bad_lines() {
        assert_eq!(parse_line("1"), Err(FeedError::MissingPacket));
        assert!(matches!(parse_line("300 aa"), Err(FeedError::BadBoardId(_))));
        assert!(matches!(parse_line("1 abc"), Err(FeedError::BadHex(_))));
        assert!(matches!(parse_line("1 zz"), Err(FeedError::BadHex(_))));
    }

    #[tokio::test]
    async fn pump_forwards_good_lines() {
        let input: &[u8] = b"1 aa\nbogus line\n\n2 bbcc\n";
        let (tx, mut rx) = mpsc::channel(8);
        let rejected = pump(input, tx).await.unwrap();
        assert_eq!(rejected, 1);
        assert_eq!(rx.recv().await, Some(PacketEvent::new(1, vec![0xAA])));
        assert_eq!(rx.recv().await, Some(PacketEvent::new(2, vec![0xBB, 0xCC])));
        assert_eq!(rx.recv().await, None);
    }
}
