//! Line reconstruction.
//!
//! For a target timestamp and subsystem, gathers the channel-data records at
//! the indexed offsets plus the nearest available companion records, then
//! assembles the externally visible [`SidescanLine`]. The tagged format
//! carries the pose inline on the ping record (resolved by floor lookup);
//! the framed format resolves navigation, orientation and fathometer against
//! three independent per-type indices by ceiling lookup.

use log::debug;
use std::sync::Mutex;

use sonalog_core::line::{assemble_line, DisplayParams};
use sonalog_core::record::{ChannelData, Pose, RecordPayload};
use sonalog_core::{GainCorrector, LogFormat, SidescanLine};

use crate::cache::ResultCache;
use crate::index::TimeIndex;
use crate::session::{QueryError, SessionFile};

/// Reconstructs lines, owning the gain tables shared across queries.
pub struct LineReconstructor {
    gain: Mutex<GainCorrector>,
}

impl LineReconstructor {
    pub fn new(params: &DisplayParams) -> Self {
        LineReconstructor {
            gain: Mutex::new(GainCorrector::new(params.tvg_gain)),
        }
    }

    /// Reconstruct the line for one index entry.
    ///
    /// Returns `Ok(None)` when a required companion record cannot be found;
    /// `line_at` surfaces that as a null result and `lines_between` skips
    /// the entry silently.
    pub fn reconstruct(
        &self,
        file: &SessionFile,
        cache: &ResultCache,
        timestamp_ms: u64,
        offsets: &[u64],
        params: &DisplayParams,
    ) -> Result<Option<SidescanLine>, QueryError> {
        let mut payloads = Vec::with_capacity(offsets.len());
        for offset in offsets {
            payloads.push(file.payload_at(cache, *offset)?);
        }

        let port = find_channel(&payloads, 0);
        let starboard = find_channel(&payloads, 1);
        if port.is_none() && starboard.is_none() {
            debug!("Index entry at {} has no channel payloads", timestamp_ms);
            return Ok(None);
        }

        let reference = port.or(starboard).unwrap();
        let (pose, frequency_hz, range_meters) = match file.format() {
            LogFormat::Tagged => {
                match self.tagged_companions(file, cache, timestamp_ms, reference.subsystem)? {
                    Some(resolved) => resolved,
                    None => return Ok(None),
                }
            }
            LogFormat::Framed => {
                match self.framed_companions(file, cache, timestamp_ms)? {
                    Some(pose) => (pose, reference.frequency_hz, reference.range_meters),
                    None => return Ok(None),
                }
            }
        };

        let mut gain = self.gain.lock().unwrap();
        gain.ensure_gain(params.tvg_gain);
        Ok(Some(assemble_line(
            timestamp_ms,
            pose,
            frequency_hz,
            range_meters,
            port,
            starboard,
            params,
            &gain,
        )))
    }

    /// Tagged format: the subsystem's ping at or before the line carries
    /// everything.
    fn tagged_companions(
        &self,
        file: &SessionFile,
        cache: &ResultCache,
        timestamp_ms: u64,
        subsystem: u16,
    ) -> Result<Option<(Pose, f32, f32)>, QueryError> {
        let Some(pings) = file.index().pings.get(&subsystem) else {
            debug!("No ping records for subsystem {}", subsystem);
            return Ok(None);
        };
        let Some((ping_ts, offset)) = TimeIndex::floor(pings, timestamp_ms) else {
            debug!("No ping record at or before {}", timestamp_ms);
            return Ok(None);
        };
        let payload = file.payload_at(cache, offset)?;
        match payload.as_ref() {
            RecordPayload::Ping(ping) => {
                Ok(Some((ping.pose, ping.frequency_hz, ping.range_meters)))
            }
            other => {
                debug!("Ping index at {} points at {:?}", ping_ts, other);
                Ok(None)
            }
        }
    }

    /// Framed format: ceiling lookup against the three companion indices.
    fn framed_companions(
        &self,
        file: &SessionFile,
        cache: &ResultCache,
        timestamp_ms: u64,
    ) -> Result<Option<Pose>, QueryError> {
        let index = file.index();
        let nav = TimeIndex::ceiling(&index.navigation, timestamp_ms);
        let att = TimeIndex::ceiling(&index.orientation, timestamp_ms);
        let fathom = TimeIndex::ceiling(&index.fathometer, timestamp_ms);
        let (Some((_, nav_off)), Some((_, att_off)), Some((_, fathom_off))) = (nav, att, fathom)
        else {
            debug!("Missing companion record at or after {}", timestamp_ms);
            return Ok(None);
        };

        let mut pose = Pose::default();
        match file.payload_at(cache, nav_off)?.as_ref() {
            RecordPayload::Navigation(nav) => pose.navigation = *nav,
            _ => return Ok(None),
        }
        match file.payload_at(cache, att_off)?.as_ref() {
            RecordPayload::Orientation(att) => pose.orientation = *att,
            _ => return Ok(None),
        }
        match file.payload_at(cache, fathom_off)?.as_ref() {
            RecordPayload::Fathometer(fathom) => pose.fathometer = *fathom,
            _ => return Ok(None),
        }
        Ok(Some(pose))
    }
}

fn find_channel(payloads: &[std::sync::Arc<RecordPayload>], channel: u16) -> Option<&ChannelData> {
    payloads.iter().find_map(|p| match p.as_ref() {
        RecordPayload::Channel(ch) if ch.channel == channel => Some(ch),
        _ => None,
    })
}
