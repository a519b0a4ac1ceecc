//! Single-pass log scanning.
//!
//! A [`StreamScanner`] walks a file once, front to back, and builds the
//! [`TimeIndex`] for it. Corruption inside a single record never aborts the
//! pass: unknown tags are skipped by their declared size, and for the framed
//! format a checksum failure triggers a byte-by-byte search for the next
//! valid header. Scanning is pure CPU and local-disk work; independent files
//! are safe to scan concurrently on separate threads.

use log::{debug, trace, warn};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use sonalog_core::format::{framed, tagged};
use sonalog_core::record::RecordTag;
use sonalog_core::{DecodeError, LogFormat, HEADER_SIZE};

use crate::index::TimeIndex;

/// Counters accumulated over one scan pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStatistics {
    /// Headers successfully decoded
    pub records: u64,
    /// Channel-data records indexed
    pub channel_records: u64,
    /// Unknown tags skipped by declared size
    pub unknown_tags: u64,
    /// Records whose payload was too small for its type
    pub broken_records: u64,
    /// Checksum or sync failures encountered (framed only)
    pub checksum_failures: u64,
    /// Successful resynchronizations
    pub resyncs: u64,
    /// Pass ended on a record extending past end-of-file
    pub truncated_tail: bool,
}

/// Builds a [`TimeIndex`] for one file in a single forward pass.
pub struct StreamScanner {
    format: LogFormat,
}

impl StreamScanner {
    pub fn new(format: LogFormat) -> Self {
        StreamScanner { format }
    }

    /// Open `path` and scan it.
    pub fn scan_file(&self, path: &Path) -> io::Result<(TimeIndex, ScanStatistics)> {
        debug!("Scanning {} ({} format)", path.display(), self.format);
        let mut reader = BufReader::new(File::open(path)?);
        let result = self.scan(&mut reader)?;
        debug!("Scan of {} complete: {:?}", path.display(), result.1);
        Ok(result)
    }

    /// Scan any seekable byte source.
    pub fn scan<R: Read + Seek>(&self, reader: &mut R) -> io::Result<(TimeIndex, ScanStatistics)> {
        let len = reader.seek(SeekFrom::End(0))?;
        let mut index = TimeIndex::new(self.format);
        let mut stats = ScanStatistics::default();
        let mut epoch_ms = 0u64;
        let mut offset = 0u64;
        let mut header_buf = [0u8; HEADER_SIZE];

        while offset + HEADER_SIZE as u64 <= len {
            read_window(reader, offset, &mut header_buf)?;
            let parsed = match self.format {
                LogFormat::Tagged => tagged::parse_header(&header_buf),
                LogFormat::Framed => framed::parse_header(&header_buf),
            };

            let header = match parsed {
                Ok(header) => header,
                Err(DecodeError::ChecksumMismatch { .. }) | Err(DecodeError::BadSync { .. }) => {
                    // The declared size is suspect; do not advance by it.
                    stats.checksum_failures += 1;
                    match self.resync(reader, offset + 1, len)? {
                        Some(pos) => {
                            trace!("Resynchronized at offset {} (lost {} bytes)", pos, pos - offset);
                            stats.resyncs += 1;
                            offset = pos;
                            continue;
                        }
                        None => {
                            warn!("No sync marker after offset {}, ending scan", offset);
                            break;
                        }
                    }
                }
                Err(e) => {
                    warn!("Header decode failed at offset {}: {}", offset, e);
                    break;
                }
            };

            let next = offset + HEADER_SIZE as u64 + header.payload_size as u64;
            if next > len {
                if self.format == LogFormat::Framed && header.tag == RecordTag::Unknown {
                    // An unknown record claiming to run past end-of-file is
                    // indistinguishable from garbage; try to resync instead.
                    stats.checksum_failures += 1;
                    match self.resync(reader, offset + 1, len)? {
                        Some(pos) => {
                            stats.resyncs += 1;
                            offset = pos;
                            continue;
                        }
                        None => break,
                    }
                }
                stats.truncated_tail = true;
                break;
            }

            stats.records += 1;
            let timestamp_ms = epoch_ms + header.timestamp_ms;

            match header.tag {
                RecordTag::ChannelData => {
                    match self.channel_entry(reader, offset, &header) {
                        Some((subsystem, frequency_hz)) => {
                            index.note_channel(subsystem, timestamp_ms, offset, frequency_hz);
                            stats.channel_records += 1;
                        }
                        None => stats.broken_records += 1,
                    }
                }
                RecordTag::Ping => match self.ping_subsystem(reader, offset, &header) {
                    Some(subsystem) => {
                        index
                            .pings
                            .entry(subsystem)
                            .or_default()
                            .entry(timestamp_ms)
                            .or_insert(offset);
                    }
                    None => stats.broken_records += 1,
                },
                RecordTag::Navigation => {
                    index.navigation.entry(timestamp_ms).or_insert(offset);
                }
                RecordTag::Orientation => {
                    index.orientation.entry(timestamp_ms).or_insert(offset);
                }
                RecordTag::Fathometer => {
                    index.fathometer.entry(timestamp_ms).or_insert(offset);
                }
                RecordTag::ReferenceTime => {
                    let mut buf = [0u8; 8];
                    if header.payload_size >= 8 {
                        read_window(reader, offset + HEADER_SIZE as u64, &mut buf)?;
                        epoch_ms = u64::from_le_bytes(buf);
                        trace!("Reference time {} at offset {}", epoch_ms, offset);
                    } else {
                        stats.broken_records += 1;
                    }
                }
                RecordTag::Unknown => {
                    trace!(
                        "Skipping unknown tag {:#06X} ({} bytes) at offset {}",
                        header.raw_tag,
                        header.payload_size,
                        offset
                    );
                    stats.unknown_tags += 1;
                }
            }

            offset = next;
        }

        if offset < len && !stats.truncated_tail {
            // Trailing bytes too short for a header
            stats.truncated_tail = true;
        }

        Ok((index, stats))
    }

    /// Extract (subsystem, frequency) from the fixed prefix of a channel
    /// payload, without decoding the sample words.
    fn channel_entry<R: Read + Seek>(
        &self,
        reader: &mut R,
        offset: u64,
        header: &sonalog_core::RecordHeader,
    ) -> Option<(u16, f32)> {
        let prefix_len = match self.format {
            LogFormat::Tagged => tagged::CHANNEL_FIXED_SIZE,
            LogFormat::Framed => framed::CHANNEL_FIXED_SIZE,
        };
        if (header.payload_size as usize) < prefix_len {
            warn!(
                "Channel record at offset {} too small ({} < {} bytes)",
                offset, header.payload_size, prefix_len
            );
            return None;
        }

        let mut prefix = vec![0u8; prefix_len];
        if read_window(reader, offset + HEADER_SIZE as u64, &mut prefix).is_err() {
            return None;
        }

        match self.format {
            LogFormat::Tagged => {
                let subsystem = u16::from_le_bytes([prefix[2], prefix[3]]);
                let frequency = f32::from_le_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]);
                Some((subsystem, frequency))
            }
            LogFormat::Framed => {
                let subsystem = header.subsystem.unwrap_or(0);
                let frequency = f32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
                Some((subsystem, frequency))
            }
        }
    }

    /// Subsystem id from the fixed prefix of a tagged ping payload.
    fn ping_subsystem<R: Read + Seek>(
        &self,
        reader: &mut R,
        offset: u64,
        header: &sonalog_core::RecordHeader,
    ) -> Option<u16> {
        if (header.payload_size as usize) < tagged::PING_PAYLOAD_SIZE {
            warn!(
                "Ping record at offset {} too small ({} < {} bytes)",
                offset,
                header.payload_size,
                tagged::PING_PAYLOAD_SIZE
            );
            return None;
        }

        let mut buf = [0u8; 2];
        if read_window(reader, offset + HEADER_SIZE as u64 + 4, &mut buf).is_err() {
            return None;
        }
        Some(u16::from_le_bytes(buf))
    }

    /// Scan forward byte-by-byte for the next valid framed header and
    /// return its offset. The tagged format has no sync pattern, so failure
    /// there ends the pass with the index accumulated so far.
    fn resync<R: Read + Seek>(
        &self,
        reader: &mut R,
        mut pos: u64,
        len: u64,
    ) -> io::Result<Option<u64>> {
        if self.format != LogFormat::Framed {
            return Ok(None);
        }

        let mut buf = [0u8; HEADER_SIZE];
        while pos + HEADER_SIZE as u64 <= len {
            read_window(reader, pos, &mut buf)?;
            if framed::parse_header(&buf).is_ok() {
                return Ok(Some(pos));
            }
            pos += 1;
        }
        Ok(None)
    }
}

fn read_window<R: Read + Seek>(reader: &mut R, offset: u64, buf: &mut [u8]) -> io::Result<()> {
    reader.seek(SeekFrom::Start(offset))?;
    reader.read_exact(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth;
    use std::io::Cursor;

    #[test]
    fn test_scan_tagged_log() {
        let bytes = synth::tagged_log(
            1_000_000,
            1,
            &[
                (0, [vec![1, 2, 3, 4], vec![5, 6, 7, 8]]),
                (1000, [vec![1, 2, 3, 4], vec![5, 6, 7, 8]]),
            ],
        );
        let scanner = StreamScanner::new(LogFormat::Tagged);
        let (index, stats) = scanner.scan(&mut Cursor::new(bytes)).unwrap();

        assert_eq!(stats.channel_records, 4);
        assert_eq!(stats.checksum_failures, 0);
        assert!(!stats.truncated_tail);
        assert_eq!(index.first_timestamp, Some(1_000_000));
        assert_eq!(index.last_timestamp, Some(1_001_000));
        assert_eq!(index.record_count, 4);
        assert_eq!(index.pings[&1].len(), 2);
        assert_eq!(index.known_subsystems.iter().copied().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_scan_framed_log() {
        let bytes = synth::framed_log(
            2_000_000,
            21,
            &[
                (0, [vec![10, 20], vec![30, 40]]),
                (500, [vec![11, 21], vec![31, 41]]),
                (1000, [vec![12, 22], vec![32, 42]]),
            ],
        );
        let scanner = StreamScanner::new(LogFormat::Framed);
        let (index, stats) = scanner.scan(&mut Cursor::new(bytes)).unwrap();

        assert_eq!(stats.channel_records, 6);
        assert_eq!(index.navigation.len(), 3);
        assert_eq!(index.orientation.len(), 3);
        assert_eq!(index.fathometer.len(), 3);
        assert_eq!(index.first_timestamp, Some(2_000_000));
        assert_eq!(index.last_timestamp, Some(2_001_000));
    }

    #[test]
    fn test_timestamps_non_decreasing_in_index() {
        let bytes = synth::framed_log(
            0,
            20,
            &[(0, [vec![1], vec![1]]), (10, [vec![1], vec![1]]), (20, [vec![1], vec![1]])],
        );
        let scanner = StreamScanner::new(LogFormat::Framed);
        let (index, _) = scanner.scan(&mut Cursor::new(bytes)).unwrap();

        let sub = &index.subsystems[&20];
        let keys: Vec<u64> = sub.entries.keys().copied().collect();
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_unknown_tag_skipped_by_declared_size() {
        let mut bytes = synth::tagged_log(0, 1, &[(0, [vec![1, 2], vec![3, 4]])]);
        // Insert a vendor record between the reference record and the rest
        let vendor = sonalog_core::format::tagged::encode_unknown(0, 0xFACE, &[0u8; 33]);
        let split = HEADER_SIZE + 8; // after the reference-time record
        bytes.splice(split..split, vendor);

        let scanner = StreamScanner::new(LogFormat::Tagged);
        let (index, stats) = scanner.scan(&mut Cursor::new(bytes)).unwrap();

        assert_eq!(stats.unknown_tags, 1);
        assert_eq!(stats.channel_records, 2);
        assert_eq!(index.record_count, 2);
    }

    #[test]
    fn test_resync_after_corrupted_checksum() {
        // N valid channel records; corrupting the checksum of record k must
        // still yield N-1 indexed records.
        let pings: Vec<(u32, [Vec<u16>; 2])> = (0..5)
            .map(|i| (i * 100, [vec![i as u16 + 1; 4], vec![i as u16 + 2; 4]]))
            .collect();
        let bytes = synth::framed_log(0, 20, &pings);

        let scanner = StreamScanner::new(LogFormat::Framed);
        let (clean_index, clean_stats) = scanner.scan(&mut Cursor::new(bytes.clone())).unwrap();
        assert_eq!(clean_stats.channel_records, 10);

        // Find the third channel record and flip its checksum byte
        let mut corrupted = bytes.clone();
        let mut channel_headers = Vec::new();
        let mut off = 0usize;
        while off + HEADER_SIZE <= corrupted.len() {
            let header = framed::parse_header(&corrupted[off..off + HEADER_SIZE]).unwrap();
            if header.tag == RecordTag::ChannelData {
                channel_headers.push(off);
            }
            off += HEADER_SIZE + header.payload_size as usize;
        }
        let target = channel_headers[2];
        corrupted[target + 15] = corrupted[target + 15].wrapping_add(1);

        let (index, stats) = scanner.scan(&mut Cursor::new(corrupted)).unwrap();
        assert_eq!(stats.checksum_failures, 1);
        assert_eq!(stats.resyncs, 1);
        assert_eq!(stats.channel_records, clean_stats.channel_records - 1);
        assert_eq!(index.record_count, clean_index.record_count - 1);
    }

    #[test]
    fn test_truncated_final_record() {
        let mut bytes = synth::tagged_log(0, 1, &[(0, [vec![1, 2, 3], vec![4, 5, 6]])]);
        // Drop the last 4 bytes of the final channel record
        bytes.truncate(bytes.len() - 4);

        let scanner = StreamScanner::new(LogFormat::Tagged);
        let (index, stats) = scanner.scan(&mut Cursor::new(bytes)).unwrap();

        assert!(stats.truncated_tail);
        assert_eq!(stats.channel_records, 1);
        assert_eq!(index.record_count, 1);
    }

    #[test]
    fn test_garbage_prefix_framed() {
        let mut bytes = vec![0xDEu8; 37];
        bytes.extend(synth::framed_log(0, 20, &[(0, [vec![7; 3], vec![8; 3]])]));

        let scanner = StreamScanner::new(LogFormat::Framed);
        let (index, stats) = scanner.scan(&mut Cursor::new(bytes)).unwrap();

        assert_eq!(stats.resyncs, 1);
        assert_eq!(stats.channel_records, 2);
        assert_eq!(index.record_count, 2);
    }
}
