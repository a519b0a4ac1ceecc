//! # Sonalog Core
//!
//! Platform-independent parsing and signal math for recorded sidescan sonar
//! data streams.
//!
//! This crate contains pure decoding and reconstruction logic with **zero I/O
//! dependencies**. Every codec is a `&[u8]` → `Result<T>` function operating
//! on a pre-read byte window, so the same logic runs anywhere the bytes can
//! be produced.
//!
//! ## Architecture
//!
//! `sonalog-core` is the shared foundation below the `sonalog` engine crate,
//! which adds file scanning, time indexing and the query API:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  sonalog-core (platform-independent, no I/O)                │
//! │  ├── format/   (wire format parsing & encoding)             │
//! │  ├── record/   (record headers, payloads, pose fragments)   │
//! │  ├── gain/     (time-varying-gain lookup tables)            │
//! │  └── line/     (sidescan line assembly & normalization)     │
//! └─────────────────────────────────────────────────────────────┘
//!                          ▲
//!              ┌───────────┴───────────┐
//!              │  sonalog (engine)     │
//!              │  scanner, index,      │
//!              │  session, caches, CLI │
//!              └───────────────────────┘
//! ```
//!
//! ## Supported Formats
//!
//! | Format  | Module            | Description                              |
//! |---------|-------------------|------------------------------------------|
//! | Tagged  | [`format::tagged`] | Tagged message stream, pose inline on ping |
//! | Framed  | [`format::framed`] | Checksummed self-describing packets with a sync marker |
//!
//! Both formats use 16-byte little-endian record headers. The framed format
//! carries a per-header checksum and a 2-byte sync marker so that a reader
//! can resynchronize after corruption.
//!
//! ## Key Modules
//!
//! - [`format`] - Wire format parsing and record encoding
//! - [`record`] - Record headers, payload sum type, pose fragments
//! - [`gain`] - Time-varying-gain correction via precomputed lookup tables
//! - [`line`] - Sidescan line assembly, sanitization and normalization
//!
//! ## Example: Parsing a Framed Header
//!
//! ```rust
//! use sonalog_core::format::framed;
//! use sonalog_core::record::RecordTag;
//!
//! let mut header = [0u8; 16];
//! header[0..2].copy_from_slice(&framed::SYNC_MARKER.to_le_bytes());
//! header[2] = framed::TAG_FATHOMETER;
//! header[5..9].copy_from_slice(&8u32.to_le_bytes());
//! header[15] = framed::header_checksum(&header);
//!
//! let parsed = framed::parse_header(&header).unwrap();
//! assert_eq!(parsed.tag, RecordTag::Fathometer);
//! assert_eq!(parsed.payload_size, 8);
//! ```

pub mod error;
pub mod format;
pub mod gain;
pub mod line;
pub mod record;

// Re-export commonly used types
pub use error::DecodeError;
pub use format::{LogFormat, HEADER_SIZE};
pub use gain::{GainCorrector, TVG_TABLE_SIZE};
pub use line::{DisplayParams, Normalization, SidescanLine};
pub use record::{
    ChannelData, Fathometer, Navigation, Orientation, Ping, Pose, RecordHeader, RecordPayload,
    RecordTag,
};
