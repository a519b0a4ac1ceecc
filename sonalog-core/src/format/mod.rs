//! Wire format parsing and encoding.
//!
//! Two recorded log formats are supported, both little-endian with 16-byte
//! record headers:
//!
//! - [`tagged`]: a tagged message stream with fixed sub-headers per message
//!   type. Ping records carry the vehicle pose inline. No checksum; unknown
//!   tags are skipped by their declared size.
//! - [`framed`]: a checksummed self-describing packet stream. Every header
//!   starts with a 2-byte sync marker and ends with a checksum byte, so a
//!   reader can resynchronize after corruption.
//!
//! Every decoder is a pure `&[u8]` → `Result<T>` function over a pre-read
//! byte window; decoders never perform I/O. Each decoder is paired with an
//! encoder producing the exact wire bytes, used by tests and by the `synth`
//! tool in the engine crate.

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

pub mod framed;
pub mod tagged;

/// Fixed record header size, identical in both formats.
pub const HEADER_SIZE: usize = 16;

/// Which wire format a log file uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogFormat {
    Tagged,
    Framed,
}

impl LogFormat {
    /// Guess the format from the first header of a file.
    ///
    /// A window starting with a valid framed header (sync marker plus
    /// matching checksum) is framed; anything else is treated as tagged.
    pub fn detect(window: &[u8]) -> LogFormat {
        if window.len() >= HEADER_SIZE && framed::parse_header(&window[..HEADER_SIZE]).is_ok() {
            LogFormat::Framed
        } else {
            LogFormat::Tagged
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Tagged => write!(f, "tagged"),
            LogFormat::Framed => write!(f, "framed"),
        }
    }
}

/// Ensure `buf` holds at least `expected` bytes.
pub(crate) fn require(buf: &[u8], expected: usize) -> Result<(), DecodeError> {
    if buf.len() < expected {
        return Err(DecodeError::Truncated {
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

pub(crate) fn le_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

pub(crate) fn le_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

pub(crate) fn le_u64(buf: &[u8], off: usize) -> u64 {
    u64::from_le_bytes([
        buf[off],
        buf[off + 1],
        buf[off + 2],
        buf[off + 3],
        buf[off + 4],
        buf[off + 5],
        buf[off + 6],
        buf[off + 7],
    ])
}

pub(crate) fn le_f32(buf: &[u8], off: usize) -> f32 {
    f32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

pub(crate) fn le_f64(buf: &[u8], off: usize) -> f64 {
    f64::from_bits(le_u64(buf, off))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_framed() {
        let mut header = [0u8; HEADER_SIZE];
        header[0..2].copy_from_slice(&framed::SYNC_MARKER.to_le_bytes());
        header[2] = framed::TAG_REFERENCE_TIME;
        header[5..9].copy_from_slice(&8u32.to_le_bytes());
        header[15] = framed::header_checksum(&header);

        assert_eq!(LogFormat::detect(&header), LogFormat::Framed);
    }

    #[test]
    fn test_detect_tagged() {
        let mut header = [0u8; HEADER_SIZE];
        header[0..4].copy_from_slice(&tagged::TAG_PING.to_le_bytes());
        assert_eq!(LogFormat::detect(&header), LogFormat::Tagged);
    }

    #[test]
    fn test_detect_short_window() {
        assert_eq!(LogFormat::detect(&[0x01, 0x16]), LogFormat::Tagged);
    }
}
