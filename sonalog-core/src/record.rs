//! Record headers, payload types and pose fragments.
//!
//! The payload types form a closed sum type ([`RecordPayload`]) over the
//! known record kinds, with an explicit `Unknown` variant carrying enough
//! information to skip the record safely. Vendor-added record types in
//! future log files therefore never break a scan.

use serde::{Deserialize, Serialize};

/// Logical kind of a record, independent of the wire format that carried it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordTag {
    /// Absolute reference time for subsequent relative timestamps
    ReferenceTime,
    /// Ping metadata; in the tagged format this carries the pose inline
    Ping,
    /// Acoustic return samples for one channel
    ChannelData,
    /// Position, course and speed over ground
    Navigation,
    /// Vehicle attitude
    Orientation,
    /// Depth and altitude above the seafloor
    Fathometer,
    /// Unrecognized tag, skipped by declared size
    Unknown,
}

/// Decoded fixed-size record header, common to both wire formats.
///
/// `payload_size` bytes must be fully consumed (or skipped) before the next
/// header is read.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordHeader {
    pub tag: RecordTag,
    /// Tag value as it appeared on the wire
    pub raw_tag: u32,
    /// Payload bytes following the header
    pub payload_size: u32,
    /// Milliseconds relative to the most recent reference-time record
    pub timestamp_ms: u64,
    /// Subsystem id, when the format carries it in the header
    pub subsystem: Option<u16>,
    /// Channel id, when the format carries it in the header
    pub channel: Option<u8>,
    /// Header checksum, framed format only
    pub checksum: Option<u8>,
}

/// Acoustic samples for one channel of one ping.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelData {
    /// 0 = port, 1 = starboard
    pub channel: u16,
    /// Logical transducer source (e.g. low- vs high-frequency head)
    pub subsystem: u16,
    pub frequency_hz: f32,
    /// Slant range covered by the sample window, in meters
    pub range_meters: f32,
    /// Delay before the first sample, in the same units as the range
    pub range_delay: f32,
    pub samples: Vec<u16>,
}

/// Position, course and speed over ground.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Navigation {
    pub latitude: f64,
    pub longitude: f64,
    pub course_deg: f32,
    pub heading_deg: f32,
    pub speed_mps: f32,
}

/// Vehicle attitude.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Orientation {
    pub roll_deg: f32,
    pub pitch_deg: f32,
    pub yaw_deg: f32,
    pub heave_m: f32,
}

/// Depth below surface and altitude above the seafloor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Fathometer {
    pub depth_m: f32,
    pub altitude_m: f32,
}

/// Resolved vehicle pose for one reconstructed line.
///
/// The fragments are not guaranteed to share a timestamp with the acoustic
/// record; the engine resolves each by nearest-time lookup.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub navigation: Navigation,
    pub orientation: Orientation,
    pub fathometer: Fathometer,
}

/// Ping metadata record (tagged format), with the pose carried inline.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Ping {
    pub ping_number: u32,
    pub subsystem: u16,
    pub frequency_hz: f32,
    pub range_meters: f32,
    pub pose: Pose,
}

/// Decoded record payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordPayload {
    ReferenceTime { epoch_ms: u64 },
    Ping(Ping),
    Channel(ChannelData),
    Navigation(Navigation),
    Orientation(Orientation),
    Fathometer(Fathometer),
    /// Unrecognized record; `declared_size` is authoritative for skipping
    Unknown { tag: u32, declared_size: u32 },
}
