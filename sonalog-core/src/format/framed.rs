//! Sync-framed packet format ("Format B").
//!
//! A self-describing packet stream. Every record starts with a sync marker
//! and carries a header checksum, so a reader can recover from corruption by
//! scanning forward for the next valid header:
//!
//! ```text
//! bytes 0..2    sync marker 0x1601 (u16)
//! byte  2       tag (u8)
//! byte  3       subsystem (u8)
//! byte  4       channel (u8)
//! bytes 5..9    payload size (u32)
//! bytes 9..13   timestamp, ms relative to the last reference time (u32)
//! bytes 13..15  reserved, zero
//! byte  15      checksum: wrapping sum of bytes 0..15
//! ```
//!
//! On a checksum mismatch the stream must NOT be advanced by the declared
//! size; the declared size itself is suspect and resynchronization on the
//! sync marker is the only safe recovery.

use crate::error::DecodeError;
use crate::record::{
    ChannelData, Fathometer, Navigation, Orientation, RecordHeader, RecordPayload, RecordTag,
};

use super::{le_f32, le_f64, le_u16, le_u32, le_u64, require, HEADER_SIZE};

/// Marker starting every framed record header.
pub const SYNC_MARKER: u16 = 0x1601;

pub const TAG_CHANNEL: u8 = 0x50;
pub const TAG_NAVIGATION: u8 = 0x51;
pub const TAG_ORIENTATION: u8 = 0x52;
pub const TAG_FATHOMETER: u8 = 0x53;
pub const TAG_REFERENCE_TIME: u8 = 0x54;

/// Fixed portion of a channel payload, before the sample words
pub const CHANNEL_FIXED_SIZE: usize = 16;

pub const NAVIGATION_PAYLOAD_SIZE: usize = 28;
pub const ORIENTATION_PAYLOAD_SIZE: usize = 16;
pub const FATHOMETER_PAYLOAD_SIZE: usize = 8;
pub const REFERENCE_TIME_PAYLOAD_SIZE: usize = 8;

fn tag_from_raw(raw: u8) -> RecordTag {
    match raw {
        TAG_CHANNEL => RecordTag::ChannelData,
        TAG_NAVIGATION => RecordTag::Navigation,
        TAG_ORIENTATION => RecordTag::Orientation,
        TAG_FATHOMETER => RecordTag::Fathometer,
        TAG_REFERENCE_TIME => RecordTag::ReferenceTime,
        _ => RecordTag::Unknown,
    }
}

/// Checksum over the first 15 header bytes.
pub fn header_checksum(header: &[u8; HEADER_SIZE]) -> u8 {
    header[..HEADER_SIZE - 1]
        .iter()
        .fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Parse a framed record header from a 16-byte window.
///
/// Sync marker and checksum are validated before any field is interpreted;
/// a failure of either means the stream is desynchronized.
pub fn parse_header(buf: &[u8]) -> Result<RecordHeader, DecodeError> {
    require(buf, HEADER_SIZE)?;

    if le_u16(buf, 0) != SYNC_MARKER {
        return Err(DecodeError::BadSync {
            expected: SYNC_MARKER.to_le_bytes().to_vec(),
            actual: buf[0..2].to_vec(),
        });
    }

    let mut window = [0u8; HEADER_SIZE];
    window.copy_from_slice(&buf[..HEADER_SIZE]);
    let computed = header_checksum(&window);
    let stored = buf[15];
    if computed != stored {
        return Err(DecodeError::ChecksumMismatch { computed, stored });
    }

    let raw_tag = buf[2];
    Ok(RecordHeader {
        tag: tag_from_raw(raw_tag),
        raw_tag: raw_tag as u32,
        payload_size: le_u32(buf, 5),
        timestamp_ms: le_u32(buf, 9) as u64,
        subsystem: Some(buf[3] as u16),
        channel: Some(buf[4]),
        checksum: Some(stored),
    })
}

/// Parse the payload for a previously decoded header.
pub fn parse_payload(header: &RecordHeader, buf: &[u8]) -> Result<RecordPayload, DecodeError> {
    require(buf, header.payload_size as usize)?;

    match header.tag {
        RecordTag::ChannelData => parse_channel(header, buf).map(RecordPayload::Channel),
        RecordTag::Navigation => parse_navigation(buf).map(RecordPayload::Navigation),
        RecordTag::Orientation => parse_orientation(buf).map(RecordPayload::Orientation),
        RecordTag::Fathometer => parse_fathometer(buf).map(RecordPayload::Fathometer),
        RecordTag::ReferenceTime => parse_reference_time(buf),
        _ => Ok(RecordPayload::Unknown {
            tag: header.raw_tag,
            declared_size: header.payload_size,
        }),
    }
}

/// Channel payload; channel and subsystem ids live in the header.
pub fn parse_channel(header: &RecordHeader, buf: &[u8]) -> Result<ChannelData, DecodeError> {
    require(buf, CHANNEL_FIXED_SIZE)?;

    let sample_count = le_u32(buf, 12) as usize;
    let needed = CHANNEL_FIXED_SIZE + sample_count * 2;
    require(buf, needed)?;

    let mut samples = Vec::with_capacity(sample_count);
    for i in 0..sample_count {
        samples.push(le_u16(buf, CHANNEL_FIXED_SIZE + i * 2));
    }

    Ok(ChannelData {
        channel: header.channel.unwrap_or(0) as u16,
        subsystem: header.subsystem.unwrap_or(0),
        frequency_hz: le_f32(buf, 0),
        range_meters: le_f32(buf, 4),
        range_delay: le_f32(buf, 8),
        samples,
    })
}

pub fn parse_navigation(buf: &[u8]) -> Result<Navigation, DecodeError> {
    require(buf, NAVIGATION_PAYLOAD_SIZE)?;
    Ok(Navigation {
        latitude: le_f64(buf, 0),
        longitude: le_f64(buf, 8),
        course_deg: le_f32(buf, 16),
        heading_deg: le_f32(buf, 20),
        speed_mps: le_f32(buf, 24),
    })
}

pub fn parse_orientation(buf: &[u8]) -> Result<Orientation, DecodeError> {
    require(buf, ORIENTATION_PAYLOAD_SIZE)?;
    Ok(Orientation {
        roll_deg: le_f32(buf, 0),
        pitch_deg: le_f32(buf, 4),
        yaw_deg: le_f32(buf, 8),
        heave_m: le_f32(buf, 12),
    })
}

pub fn parse_fathometer(buf: &[u8]) -> Result<Fathometer, DecodeError> {
    require(buf, FATHOMETER_PAYLOAD_SIZE)?;
    Ok(Fathometer {
        depth_m: le_f32(buf, 0),
        altitude_m: le_f32(buf, 4),
    })
}

pub fn parse_reference_time(buf: &[u8]) -> Result<RecordPayload, DecodeError> {
    require(buf, REFERENCE_TIME_PAYLOAD_SIZE)?;
    Ok(RecordPayload::ReferenceTime {
        epoch_ms: le_u64(buf, 0),
    })
}

// =============================================================================
// Encoders
// =============================================================================

fn encode_header(
    tag: u8,
    subsystem: u8,
    channel: u8,
    payload_size: u32,
    timestamp_ms: u32,
) -> [u8; HEADER_SIZE] {
    let mut buf = [0u8; HEADER_SIZE];
    buf[0..2].copy_from_slice(&SYNC_MARKER.to_le_bytes());
    buf[2] = tag;
    buf[3] = subsystem;
    buf[4] = channel;
    buf[5..9].copy_from_slice(&payload_size.to_le_bytes());
    buf[9..13].copy_from_slice(&timestamp_ms.to_le_bytes());
    buf[15] = header_checksum(&buf);
    buf
}

/// Encode a complete channel-data record (header + payload).
pub fn encode_channel(timestamp_ms: u32, channel: &ChannelData) -> Vec<u8> {
    let payload_size = CHANNEL_FIXED_SIZE + channel.samples.len() * 2;
    let mut out = Vec::with_capacity(HEADER_SIZE + payload_size);
    out.extend_from_slice(&encode_header(
        TAG_CHANNEL,
        channel.subsystem as u8,
        channel.channel as u8,
        payload_size as u32,
        timestamp_ms,
    ));
    out.extend_from_slice(&channel.frequency_hz.to_le_bytes());
    out.extend_from_slice(&channel.range_meters.to_le_bytes());
    out.extend_from_slice(&channel.range_delay.to_le_bytes());
    out.extend_from_slice(&(channel.samples.len() as u32).to_le_bytes());
    for sample in &channel.samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

/// Encode a complete navigation record (header + payload).
pub fn encode_navigation(timestamp_ms: u32, nav: &Navigation) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + NAVIGATION_PAYLOAD_SIZE);
    out.extend_from_slice(&encode_header(
        TAG_NAVIGATION,
        0,
        0,
        NAVIGATION_PAYLOAD_SIZE as u32,
        timestamp_ms,
    ));
    out.extend_from_slice(&nav.latitude.to_le_bytes());
    out.extend_from_slice(&nav.longitude.to_le_bytes());
    out.extend_from_slice(&nav.course_deg.to_le_bytes());
    out.extend_from_slice(&nav.heading_deg.to_le_bytes());
    out.extend_from_slice(&nav.speed_mps.to_le_bytes());
    out
}

/// Encode a complete orientation record (header + payload).
pub fn encode_orientation(timestamp_ms: u32, att: &Orientation) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + ORIENTATION_PAYLOAD_SIZE);
    out.extend_from_slice(&encode_header(
        TAG_ORIENTATION,
        0,
        0,
        ORIENTATION_PAYLOAD_SIZE as u32,
        timestamp_ms,
    ));
    out.extend_from_slice(&att.roll_deg.to_le_bytes());
    out.extend_from_slice(&att.pitch_deg.to_le_bytes());
    out.extend_from_slice(&att.yaw_deg.to_le_bytes());
    out.extend_from_slice(&att.heave_m.to_le_bytes());
    out
}

/// Encode a complete fathometer record (header + payload).
pub fn encode_fathometer(timestamp_ms: u32, fathometer: &Fathometer) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + FATHOMETER_PAYLOAD_SIZE);
    out.extend_from_slice(&encode_header(
        TAG_FATHOMETER,
        0,
        0,
        FATHOMETER_PAYLOAD_SIZE as u32,
        timestamp_ms,
    ));
    out.extend_from_slice(&fathometer.depth_m.to_le_bytes());
    out.extend_from_slice(&fathometer.altitude_m.to_le_bytes());
    out
}

/// Encode a complete reference-time record (header + payload).
pub fn encode_reference_time(timestamp_ms: u32, epoch_ms: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + REFERENCE_TIME_PAYLOAD_SIZE);
    out.extend_from_slice(&encode_header(
        TAG_REFERENCE_TIME,
        0,
        0,
        REFERENCE_TIME_PAYLOAD_SIZE as u32,
        timestamp_ms,
    ));
    out.extend_from_slice(&epoch_ms.to_le_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let record = encode_channel(
            4321,
            &ChannelData {
                channel: 1,
                subsystem: 21,
                frequency_hz: 900_000.0,
                range_meters: 30.0,
                range_delay: 0.5,
                samples: vec![10, 20, 30],
            },
        );

        let header = parse_header(&record[..HEADER_SIZE]).unwrap();
        assert_eq!(header.tag, RecordTag::ChannelData);
        assert_eq!(header.subsystem, Some(21));
        assert_eq!(header.channel, Some(1));
        assert_eq!(header.timestamp_ms, 4321);
        assert_eq!(header.payload_size as usize, CHANNEL_FIXED_SIZE + 6);
        assert!(header.checksum.is_some());
    }

    #[test]
    fn test_channel_roundtrip() {
        let channel = ChannelData {
            channel: 0,
            subsystem: 20,
            frequency_hz: 100_000.0,
            range_meters: 75.0,
            range_delay: 0.0,
            samples: vec![0xFFFF, 0, 42],
        };
        let record = encode_channel(0, &channel);

        let header = parse_header(&record[..HEADER_SIZE]).unwrap();
        let payload = parse_payload(&header, &record[HEADER_SIZE..]).unwrap();
        assert_eq!(payload, RecordPayload::Channel(channel));
    }

    #[test]
    fn test_navigation_roundtrip() {
        let nav = Navigation {
            latitude: -33.5,
            longitude: 151.25,
            course_deg: 90.0,
            heading_deg: 91.5,
            speed_mps: 2.0,
        };
        let record = encode_navigation(100, &nav);

        let header = parse_header(&record[..HEADER_SIZE]).unwrap();
        assert_eq!(header.tag, RecordTag::Navigation);
        let payload = parse_payload(&header, &record[HEADER_SIZE..]).unwrap();
        assert_eq!(payload, RecordPayload::Navigation(nav));
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut record = encode_fathometer(
            0,
            &Fathometer {
                depth_m: 10.0,
                altitude_m: 5.0,
            },
        );
        record[15] = record[15].wrapping_add(1);

        assert!(matches!(
            parse_header(&record[..HEADER_SIZE]),
            Err(DecodeError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_corrupted_field_fails_checksum() {
        let mut record = encode_reference_time(0, 1_700_000_000_000);
        // Flip a bit inside the declared size field
        record[6] ^= 0x40;

        assert!(matches!(
            parse_header(&record[..HEADER_SIZE]),
            Err(DecodeError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_bad_sync() {
        let buf = [0u8; HEADER_SIZE];
        assert!(matches!(
            parse_header(&buf),
            Err(DecodeError::BadSync { .. })
        ));
    }

    #[test]
    fn test_unknown_tag_passes_checksum() {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..2].copy_from_slice(&SYNC_MARKER.to_le_bytes());
        buf[2] = 0x7F;
        buf[5..9].copy_from_slice(&4u32.to_le_bytes());
        buf[15] = header_checksum(&buf);

        let header = parse_header(&buf).unwrap();
        assert_eq!(header.tag, RecordTag::Unknown);
        assert_eq!(header.raw_tag, 0x7F);
        assert_eq!(header.payload_size, 4);
    }
}
