//! Error types for record decoding

use thiserror::Error;

/// Errors that can occur when decoding sonar log records.
///
/// Every variant is recoverable at the stream level: `UnknownTag` records are
/// skipped by their declared size, `ChecksumMismatch` and `BadSync` trigger
/// resynchronization, and `Truncated` terminates the current pass without
/// invalidating what was already decoded.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Byte window is too short for the structure being decoded
    #[error("Record truncated: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// Record tag is not one of the known tags; the declared size is still
    /// authoritative and the caller must skip that many bytes
    #[error("Unknown record tag {tag:#06X} with {declared_size} byte payload")]
    UnknownTag { tag: u32, declared_size: u32 },

    /// Framed header checksum does not match the preceding header bytes
    #[error("Header checksum mismatch: computed {computed:#04X}, stored {stored:#04X}")]
    ChecksumMismatch { computed: u8, stored: u8 },

    /// Framed header does not start with the sync marker
    #[error("Bad sync marker: expected {expected:02X?}, got {actual:02X?}")]
    BadSync { expected: Vec<u8>, actual: Vec<u8> },

    /// Payload bytes are structurally invalid
    #[error("Malformed payload: {0}")]
    Malformed(String),
}
