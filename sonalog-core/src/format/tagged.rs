//! Tagged stream format ("Format A").
//!
//! A simple sequential message stream. Each record is a 16-byte header
//! followed by a fixed sub-header per message type:
//!
//! ```text
//! bytes 0..4   tag (u32)
//! bytes 4..8   payload size (u32)
//! bytes 8..16  timestamp, ms relative to the last reference time (u64)
//! ```
//!
//! There is no checksum and no sync marker; unknown tags are skipped by
//! their declared size, which is the forward-compatibility contract for
//! vendor-added record types. Ping records carry the vehicle pose inline,
//! so no separate navigation or orientation records exist in this format.

use crate::error::DecodeError;
use crate::record::{
    ChannelData, Fathometer, Navigation, Orientation, Ping, Pose, RecordHeader, RecordPayload,
    RecordTag,
};

use super::{le_f32, le_f64, le_u16, le_u32, le_u64, require, HEADER_SIZE};

pub const TAG_REFERENCE_TIME: u32 = 0x0001;
pub const TAG_PING: u32 = 0x0002;
pub const TAG_CHANNEL: u32 = 0x0003;
pub const TAG_FATHOMETER: u32 = 0x0004;

/// Fixed ping payload size
pub const PING_PAYLOAD_SIZE: usize = 66;

/// Fixed portion of a channel payload, before the sample words
pub const CHANNEL_FIXED_SIZE: usize = 20;

/// Fathometer payload size
pub const FATHOMETER_PAYLOAD_SIZE: usize = 8;

/// Reference time payload size
pub const REFERENCE_TIME_PAYLOAD_SIZE: usize = 8;

fn tag_from_raw(raw: u32) -> RecordTag {
    match raw {
        TAG_REFERENCE_TIME => RecordTag::ReferenceTime,
        TAG_PING => RecordTag::Ping,
        TAG_CHANNEL => RecordTag::ChannelData,
        TAG_FATHOMETER => RecordTag::Fathometer,
        _ => RecordTag::Unknown,
    }
}

/// Parse a tagged record header from a 16-byte window.
pub fn parse_header(buf: &[u8]) -> Result<RecordHeader, DecodeError> {
    require(buf, HEADER_SIZE)?;

    let raw_tag = le_u32(buf, 0);
    Ok(RecordHeader {
        tag: tag_from_raw(raw_tag),
        raw_tag,
        payload_size: le_u32(buf, 4),
        timestamp_ms: le_u64(buf, 8),
        subsystem: None,
        channel: None,
        checksum: None,
    })
}

/// Parse the payload for a previously decoded header.
pub fn parse_payload(header: &RecordHeader, buf: &[u8]) -> Result<RecordPayload, DecodeError> {
    require(buf, header.payload_size as usize)?;

    match header.tag {
        RecordTag::ReferenceTime => parse_reference_time(buf),
        RecordTag::Ping => parse_ping(buf).map(RecordPayload::Ping),
        RecordTag::ChannelData => parse_channel(buf).map(RecordPayload::Channel),
        RecordTag::Fathometer => parse_fathometer(buf).map(RecordPayload::Fathometer),
        _ => Ok(RecordPayload::Unknown {
            tag: header.raw_tag,
            declared_size: header.payload_size,
        }),
    }
}

pub fn parse_reference_time(buf: &[u8]) -> Result<RecordPayload, DecodeError> {
    require(buf, REFERENCE_TIME_PAYLOAD_SIZE)?;
    Ok(RecordPayload::ReferenceTime {
        epoch_ms: le_u64(buf, 0),
    })
}

pub fn parse_ping(buf: &[u8]) -> Result<Ping, DecodeError> {
    require(buf, PING_PAYLOAD_SIZE)?;

    Ok(Ping {
        ping_number: le_u32(buf, 0),
        subsystem: le_u16(buf, 4),
        frequency_hz: le_f32(buf, 6),
        range_meters: le_f32(buf, 10),
        pose: Pose {
            navigation: Navigation {
                latitude: le_f64(buf, 14),
                longitude: le_f64(buf, 22),
                course_deg: le_f32(buf, 30),
                heading_deg: le_f32(buf, 34),
                speed_mps: le_f32(buf, 38),
            },
            orientation: Orientation {
                roll_deg: le_f32(buf, 42),
                pitch_deg: le_f32(buf, 46),
                yaw_deg: le_f32(buf, 50),
                heave_m: le_f32(buf, 54),
            },
            fathometer: Fathometer {
                depth_m: le_f32(buf, 58),
                altitude_m: le_f32(buf, 62),
            },
        },
    })
}

pub fn parse_channel(buf: &[u8]) -> Result<ChannelData, DecodeError> {
    require(buf, CHANNEL_FIXED_SIZE)?;

    let sample_count = le_u32(buf, 16) as usize;
    let needed = CHANNEL_FIXED_SIZE + sample_count * 2;
    require(buf, needed)?;

    let mut samples = Vec::with_capacity(sample_count);
    for i in 0..sample_count {
        samples.push(le_u16(buf, CHANNEL_FIXED_SIZE + i * 2));
    }

    Ok(ChannelData {
        channel: le_u16(buf, 0),
        subsystem: le_u16(buf, 2),
        frequency_hz: le_f32(buf, 4),
        range_meters: le_f32(buf, 8),
        range_delay: le_f32(buf, 12),
        samples,
    })
}

pub fn parse_fathometer(buf: &[u8]) -> Result<Fathometer, DecodeError> {
    require(buf, FATHOMETER_PAYLOAD_SIZE)?;
    Ok(Fathometer {
        depth_m: le_f32(buf, 0),
        altitude_m: le_f32(buf, 4),
    })
}

// =============================================================================
// Encoders
// =============================================================================

fn encode_header(tag: u32, payload_size: u32, timestamp_ms: u64) -> [u8; HEADER_SIZE] {
    let mut buf = [0u8; HEADER_SIZE];
    buf[0..4].copy_from_slice(&tag.to_le_bytes());
    buf[4..8].copy_from_slice(&payload_size.to_le_bytes());
    buf[8..16].copy_from_slice(&timestamp_ms.to_le_bytes());
    buf
}

/// Encode a complete reference-time record (header + payload).
pub fn encode_reference_time(timestamp_ms: u64, epoch_ms: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + REFERENCE_TIME_PAYLOAD_SIZE);
    out.extend_from_slice(&encode_header(
        TAG_REFERENCE_TIME,
        REFERENCE_TIME_PAYLOAD_SIZE as u32,
        timestamp_ms,
    ));
    out.extend_from_slice(&epoch_ms.to_le_bytes());
    out
}

/// Encode a complete ping record (header + payload).
pub fn encode_ping(timestamp_ms: u64, ping: &Ping) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + PING_PAYLOAD_SIZE);
    out.extend_from_slice(&encode_header(
        TAG_PING,
        PING_PAYLOAD_SIZE as u32,
        timestamp_ms,
    ));
    out.extend_from_slice(&ping.ping_number.to_le_bytes());
    out.extend_from_slice(&ping.subsystem.to_le_bytes());
    out.extend_from_slice(&ping.frequency_hz.to_le_bytes());
    out.extend_from_slice(&ping.range_meters.to_le_bytes());
    let nav = &ping.pose.navigation;
    out.extend_from_slice(&nav.latitude.to_le_bytes());
    out.extend_from_slice(&nav.longitude.to_le_bytes());
    out.extend_from_slice(&nav.course_deg.to_le_bytes());
    out.extend_from_slice(&nav.heading_deg.to_le_bytes());
    out.extend_from_slice(&nav.speed_mps.to_le_bytes());
    let att = &ping.pose.orientation;
    out.extend_from_slice(&att.roll_deg.to_le_bytes());
    out.extend_from_slice(&att.pitch_deg.to_le_bytes());
    out.extend_from_slice(&att.yaw_deg.to_le_bytes());
    out.extend_from_slice(&att.heave_m.to_le_bytes());
    let fathom = &ping.pose.fathometer;
    out.extend_from_slice(&fathom.depth_m.to_le_bytes());
    out.extend_from_slice(&fathom.altitude_m.to_le_bytes());
    out
}

/// Encode a complete channel-data record (header + payload).
pub fn encode_channel(timestamp_ms: u64, channel: &ChannelData) -> Vec<u8> {
    let payload_size = CHANNEL_FIXED_SIZE + channel.samples.len() * 2;
    let mut out = Vec::with_capacity(HEADER_SIZE + payload_size);
    out.extend_from_slice(&encode_header(
        TAG_CHANNEL,
        payload_size as u32,
        timestamp_ms,
    ));
    out.extend_from_slice(&channel.channel.to_le_bytes());
    out.extend_from_slice(&channel.subsystem.to_le_bytes());
    out.extend_from_slice(&channel.frequency_hz.to_le_bytes());
    out.extend_from_slice(&channel.range_meters.to_le_bytes());
    out.extend_from_slice(&channel.range_delay.to_le_bytes());
    out.extend_from_slice(&(channel.samples.len() as u32).to_le_bytes());
    for sample in &channel.samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

/// Encode a complete fathometer record (header + payload).
pub fn encode_fathometer(timestamp_ms: u64, fathometer: &Fathometer) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + FATHOMETER_PAYLOAD_SIZE);
    out.extend_from_slice(&encode_header(
        TAG_FATHOMETER,
        FATHOMETER_PAYLOAD_SIZE as u32,
        timestamp_ms,
    ));
    out.extend_from_slice(&fathometer.depth_m.to_le_bytes());
    out.extend_from_slice(&fathometer.altitude_m.to_le_bytes());
    out
}

/// Encode an unknown record, used by tests for forward-compatibility checks.
pub fn encode_unknown(timestamp_ms: u64, tag: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&encode_header(tag, payload.len() as u32, timestamp_ms));
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ping() -> Ping {
        Ping {
            ping_number: 7,
            subsystem: 1,
            frequency_hz: 455_000.0,
            range_meters: 50.0,
            pose: Pose {
                navigation: Navigation {
                    latitude: 43.125,
                    longitude: 16.0625,
                    course_deg: 181.5,
                    heading_deg: 182.0,
                    speed_mps: 1.75,
                },
                orientation: Orientation {
                    roll_deg: -1.5,
                    pitch_deg: 0.25,
                    yaw_deg: 182.0,
                    heave_m: 0.125,
                },
                fathometer: Fathometer {
                    depth_m: 12.5,
                    altitude_m: 8.25,
                },
            },
        }
    }

    #[test]
    fn test_header_roundtrip() {
        let record = encode_reference_time(1234, 1_700_000_000_000);
        let header = parse_header(&record[..HEADER_SIZE]).unwrap();

        assert_eq!(header.tag, RecordTag::ReferenceTime);
        assert_eq!(header.raw_tag, TAG_REFERENCE_TIME);
        assert_eq!(header.payload_size, 8);
        assert_eq!(header.timestamp_ms, 1234);
        assert!(header.checksum.is_none());
    }

    #[test]
    fn test_ping_roundtrip() {
        let ping = sample_ping();
        let record = encode_ping(500, &ping);
        assert_eq!(record.len(), HEADER_SIZE + PING_PAYLOAD_SIZE);

        let header = parse_header(&record[..HEADER_SIZE]).unwrap();
        let payload = parse_payload(&header, &record[HEADER_SIZE..]).unwrap();
        assert_eq!(payload, RecordPayload::Ping(ping));
    }

    #[test]
    fn test_channel_roundtrip() {
        let channel = ChannelData {
            channel: 0,
            subsystem: 1,
            frequency_hz: 455_000.0,
            range_meters: 50.0,
            range_delay: 0.0,
            samples: vec![1, 2, 3, 4],
        };
        let record = encode_channel(1000, &channel);

        let header = parse_header(&record[..HEADER_SIZE]).unwrap();
        assert_eq!(header.tag, RecordTag::ChannelData);
        let payload = parse_payload(&header, &record[HEADER_SIZE..]).unwrap();
        assert_eq!(payload, RecordPayload::Channel(channel));
    }

    #[test]
    fn test_unknown_tag_preserves_size() {
        let record = encode_unknown(0, 0xBEEF, &[0xAA; 12]);
        let header = parse_header(&record[..HEADER_SIZE]).unwrap();

        assert_eq!(header.tag, RecordTag::Unknown);
        assert_eq!(header.raw_tag, 0xBEEF);
        assert_eq!(header.payload_size, 12);

        let payload = parse_payload(&header, &record[HEADER_SIZE..]).unwrap();
        assert_eq!(
            payload,
            RecordPayload::Unknown {
                tag: 0xBEEF,
                declared_size: 12
            }
        );
    }

    #[test]
    fn test_truncated_header() {
        let err = parse_header(&[0u8; 10]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Truncated {
                expected: HEADER_SIZE,
                actual: 10
            }
        );
    }

    #[test]
    fn test_truncated_channel_samples() {
        let channel = ChannelData {
            channel: 1,
            subsystem: 0,
            frequency_hz: 100_000.0,
            range_meters: 30.0,
            range_delay: 0.0,
            samples: vec![9; 8],
        };
        let record = encode_channel(0, &channel);
        let header = parse_header(&record[..HEADER_SIZE]).unwrap();

        // Chop off the last sample word
        let short = &record[HEADER_SIZE..record.len() - 2];
        assert!(matches!(
            parse_payload(&header, short),
            Err(DecodeError::Truncated { .. })
        ));
    }
}
