//! Time index and sidecar persistence.
//!
//! A [`TimeIndex`] maps timestamps to byte offsets, per subsystem, so that a
//! query never rescans the log. [`IndexStore`] persists the index as a
//! sidecar file (`<log>.slx`) with an explicit schema version and a
//! source-file consistency gate; anything that fails validation is rejected
//! so the caller falls back to a full re-scan, never to a silently partial
//! index.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use sonalog_core::LogFormat;

use thiserror::Error;

/// Bumped whenever the serialized layout of [`TimeIndex`] changes.
pub const INDEX_SCHEMA_VERSION: u32 = 3;

/// Sidecar file extension, appended to the full source file name.
pub const SIDECAR_EXTENSION: &str = "slx";

/// Errors when loading or saving a sidecar index. All variants except `Io`
/// on save are recoverable by re-scanning the source file.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("No sidecar index at {path}")]
    MissingSidecar { path: PathBuf },

    #[error("Corrupt sidecar index at {path}: {reason}")]
    CorruptSidecar { path: PathBuf, reason: String },

    #[error("Sidecar schema version {found}, supported {supported}")]
    SchemaMismatch { found: u32, supported: u32 },

    #[error("Sidecar is stale: source file length or mtime changed")]
    SourceMismatch,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Offset index for one subsystem.
///
/// Duplicate timestamps legitimately occur (one entry per channel record),
/// hence the offset list per key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubsystemIndex {
    /// Absolute timestamp (ms) → byte offsets of channel records
    pub entries: BTreeMap<u64, Vec<u64>>,
    pub first_timestamp: Option<u64>,
    pub last_timestamp: Option<u64>,
    pub record_count: u64,
}

impl SubsystemIndex {
    fn note(&mut self, timestamp_ms: u64, offset: u64) {
        self.entries.entry(timestamp_ms).or_default().push(offset);
        self.first_timestamp = Some(self.first_timestamp.map_or(timestamp_ms, |t| t.min(timestamp_ms)));
        self.last_timestamp = Some(self.last_timestamp.map_or(timestamp_ms, |t| t.max(timestamp_ms)));
        self.record_count += 1;
    }
}

/// Complete time index for one log file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeIndex {
    pub format: LogFormat,
    /// Per-subsystem channel record offsets
    pub subsystems: BTreeMap<u16, SubsystemIndex>,
    /// Ping record offsets per subsystem (tagged format; pose resolved by
    /// floor lookup). Keyed by subsystem so interleaved heads in one file
    /// never resolve to each other's pings.
    pub pings: BTreeMap<u16, BTreeMap<u64, u64>>,
    /// Companion record offsets (framed format; resolved by ceiling lookup)
    pub navigation: BTreeMap<u64, u64>,
    pub orientation: BTreeMap<u64, u64>,
    pub fathometer: BTreeMap<u64, u64>,
    pub first_timestamp: Option<u64>,
    pub last_timestamp: Option<u64>,
    /// Channel records indexed
    pub record_count: u64,
    /// Distinct acoustic frequencies, stored as f32 bit patterns for Ord/Eq
    pub known_frequencies: BTreeSet<u32>,
    pub known_subsystems: BTreeSet<u16>,
}

impl TimeIndex {
    pub fn new(format: LogFormat) -> Self {
        TimeIndex {
            format,
            subsystems: BTreeMap::new(),
            pings: BTreeMap::new(),
            navigation: BTreeMap::new(),
            orientation: BTreeMap::new(),
            fathometer: BTreeMap::new(),
            first_timestamp: None,
            last_timestamp: None,
            record_count: 0,
            known_frequencies: BTreeSet::new(),
            known_subsystems: BTreeSet::new(),
        }
    }

    /// Record a channel-data entry.
    pub fn note_channel(&mut self, subsystem: u16, timestamp_ms: u64, offset: u64, frequency_hz: f32) {
        self.subsystems
            .entry(subsystem)
            .or_default()
            .note(timestamp_ms, offset);
        self.first_timestamp = Some(self.first_timestamp.map_or(timestamp_ms, |t| t.min(timestamp_ms)));
        self.last_timestamp = Some(self.last_timestamp.map_or(timestamp_ms, |t| t.max(timestamp_ms)));
        self.record_count += 1;
        self.known_frequencies.insert(frequency_hz.to_bits());
        self.known_subsystems.insert(subsystem);
    }

    /// Distinct frequencies as floats.
    pub fn frequencies(&self) -> Vec<f32> {
        self.known_frequencies
            .iter()
            .map(|bits| f32::from_bits(*bits))
            .collect()
    }

    /// First entry at or after `timestamp_ms` in `map`.
    pub fn ceiling(map: &BTreeMap<u64, u64>, timestamp_ms: u64) -> Option<(u64, u64)> {
        map.range(timestamp_ms..).next().map(|(t, o)| (*t, *o))
    }

    /// Last entry at or before `timestamp_ms` in `map`.
    pub fn floor(map: &BTreeMap<u64, u64>, timestamp_ms: u64) -> Option<(u64, u64)> {
        map.range(..=timestamp_ms).next_back().map(|(t, o)| (*t, *o))
    }
}

/// Serializable summary of one indexed log file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSummary {
    pub path: PathBuf,
    pub format: String,
    pub first_timestamp_ms: Option<u64>,
    pub last_timestamp_ms: Option<u64>,
    pub record_count: u64,
    pub subsystems: Vec<u16>,
    pub frequencies_hz: Vec<f32>,
}

impl LogSummary {
    pub fn new(path: &Path, index: &TimeIndex) -> Self {
        LogSummary {
            path: path.to_path_buf(),
            format: index.format.to_string(),
            first_timestamp_ms: index.first_timestamp,
            last_timestamp_ms: index.last_timestamp,
            record_count: index.record_count,
            subsystems: index.known_subsystems.iter().copied().collect(),
            frequencies_hz: index.frequencies(),
        }
    }
}

/// On-disk envelope around a [`TimeIndex`].
#[derive(Serialize, Deserialize)]
struct Sidecar {
    schema_version: u32,
    source_len: u64,
    source_modified_ms: u64,
    index: TimeIndex,
}

/// Persists and reloads sidecar index files.
pub struct IndexStore {
    /// Override directory; sidecars live next to the source when `None`
    dir: Option<PathBuf>,
}

impl Default for IndexStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexStore {
    pub fn new() -> Self {
        IndexStore { dir: None }
    }

    /// Place sidecars in `dir` instead of next to the source (testing hook,
    /// also useful for read-only source media).
    pub fn with_dir(dir: PathBuf) -> Self {
        IndexStore { dir: Some(dir) }
    }

    /// Sidecar path for a source log file: the full file name with `.slx`
    /// appended, next to the source or in the override directory.
    pub fn sidecar_path(&self, source: &Path) -> PathBuf {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let sidecar_name = format!("{}.{}", name, SIDECAR_EXTENSION);
        match &self.dir {
            Some(dir) => dir.join(sidecar_name),
            None => source.with_file_name(sidecar_name),
        }
    }

    fn source_stamp(source: &Path) -> Result<(u64, u64), IndexError> {
        let meta = fs::metadata(source)?;
        let modified_ms = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Ok((meta.len(), modified_ms))
    }

    /// Persist `index` for `source`. Writes to a temp file first and
    /// renames into place, so a crash never leaves a truncated sidecar
    /// that passes the length check.
    pub fn save(&self, index: &TimeIndex, source: &Path) -> Result<(), IndexError> {
        let (source_len, source_modified_ms) = Self::source_stamp(source)?;
        let sidecar = Sidecar {
            schema_version: INDEX_SCHEMA_VERSION,
            source_len,
            source_modified_ms,
            index: index.clone(),
        };

        let path = self.sidecar_path(source);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension(format!("{}.tmp", SIDECAR_EXTENSION));
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            bincode::serialize_into(&mut writer, &sidecar).map_err(|e| {
                IndexError::CorruptSidecar {
                    path: tmp.clone(),
                    reason: e.to_string(),
                }
            })?;
        }
        fs::rename(&tmp, &path)?;
        debug!("Saved sidecar index: {}", path.display());
        Ok(())
    }

    /// Reload the sidecar index for `source`.
    ///
    /// Rejects (and signals an error, triggering a re-scan by the caller)
    /// when the sidecar is absent, unreadable, from another schema version,
    /// or stale relative to the source file.
    pub fn load(&self, source: &Path) -> Result<TimeIndex, IndexError> {
        let path = self.sidecar_path(source);
        if !path.exists() {
            return Err(IndexError::MissingSidecar { path });
        }

        let reader = BufReader::new(File::open(&path)?);
        let sidecar: Sidecar =
            bincode::deserialize_from(reader).map_err(|e| IndexError::CorruptSidecar {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        if sidecar.schema_version != INDEX_SCHEMA_VERSION {
            return Err(IndexError::SchemaMismatch {
                found: sidecar.schema_version,
                supported: INDEX_SCHEMA_VERSION,
            });
        }

        let (source_len, source_modified_ms) = Self::source_stamp(source)?;
        if sidecar.source_len != source_len || sidecar.source_modified_ms != source_modified_ms {
            return Err(IndexError::SourceMismatch);
        }

        debug!("Loaded sidecar index: {}", path.display());
        Ok(sidecar.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_index() -> TimeIndex {
        let mut index = TimeIndex::new(LogFormat::Framed);
        index.note_channel(20, 1000, 0, 100_000.0);
        index.note_channel(20, 1000, 64, 100_000.0);
        index.note_channel(21, 1500, 128, 455_000.0);
        index.navigation.insert(990, 256);
        index
    }

    #[test]
    fn test_note_channel_summary_fields() {
        let index = sample_index();
        assert_eq!(index.first_timestamp, Some(1000));
        assert_eq!(index.last_timestamp, Some(1500));
        assert_eq!(index.record_count, 3);
        assert_eq!(
            index.known_subsystems.iter().copied().collect::<Vec<_>>(),
            vec![20, 21]
        );
        assert_eq!(index.frequencies().len(), 2);
        // Duplicate timestamps keep both offsets, in scan order
        assert_eq!(index.subsystems[&20].entries[&1000], vec![0, 64]);
    }

    #[test]
    fn test_ceiling_and_floor() {
        let mut map = BTreeMap::new();
        map.insert(100u64, 1u64);
        map.insert(200, 2);

        assert_eq!(TimeIndex::ceiling(&map, 150), Some((200, 2)));
        assert_eq!(TimeIndex::ceiling(&map, 200), Some((200, 2)));
        assert_eq!(TimeIndex::ceiling(&map, 201), None);
        assert_eq!(TimeIndex::floor(&map, 150), Some((100, 1)));
        assert_eq!(TimeIndex::floor(&map, 100), Some((100, 1)));
        assert_eq!(TimeIndex::floor(&map, 99), None);
    }

    #[test]
    fn test_sidecar_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("run1.log");
        std::fs::write(&source, b"not a real log, only metadata matters").unwrap();

        let store = IndexStore::new();
        let index = sample_index();
        store.save(&index, &source).unwrap();

        let loaded = store.load(&source).unwrap();
        assert_eq!(loaded, index);
    }

    #[test]
    fn test_missing_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("run1.log");
        std::fs::write(&source, b"x").unwrap();

        let store = IndexStore::new();
        assert!(matches!(
            store.load(&source),
            Err(IndexError::MissingSidecar { .. })
        ));
    }

    #[test]
    fn test_truncated_sidecar_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("run1.log");
        std::fs::write(&source, b"x").unwrap();

        let store = IndexStore::new();
        store.save(&sample_index(), &source).unwrap();

        // Truncate the sidecar
        let sidecar = store.sidecar_path(&source);
        let bytes = std::fs::read(&sidecar).unwrap();
        let mut file = File::create(&sidecar).unwrap();
        file.write_all(&bytes[..bytes.len() / 2]).unwrap();
        drop(file);

        assert!(matches!(
            store.load(&source),
            Err(IndexError::CorruptSidecar { .. })
        ));
    }

    #[test]
    fn test_schema_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("run1.log");
        std::fs::write(&source, b"x").unwrap();

        let store = IndexStore::new();
        let stale = Sidecar {
            schema_version: INDEX_SCHEMA_VERSION - 1,
            source_len: 1,
            source_modified_ms: 0,
            index: sample_index(),
        };
        let bytes = bincode::serialize(&stale).unwrap();
        std::fs::write(store.sidecar_path(&source), bytes).unwrap();

        assert!(matches!(
            store.load(&source),
            Err(IndexError::SchemaMismatch { found, .. }) if found == INDEX_SCHEMA_VERSION - 1
        ));
    }

    #[test]
    fn test_stale_sidecar_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("run1.log");
        std::fs::write(&source, b"original").unwrap();

        let store = IndexStore::new();
        store.save(&sample_index(), &source).unwrap();

        // Grow the source; length check must fire regardless of mtime
        std::fs::write(&source, b"original plus appended records").unwrap();
        assert!(matches!(
            store.load(&source),
            Err(IndexError::SourceMismatch)
        ));
    }

    #[test]
    fn test_with_dir_override() {
        let dir = tempfile::tempdir().unwrap();
        let side_dir = dir.path().join("index");
        let source = dir.path().join("run1.log");
        std::fs::write(&source, b"x").unwrap();

        let store = IndexStore::with_dir(side_dir.clone());
        store.save(&sample_index(), &source).unwrap();
        assert!(side_dir.join("run1.log.slx").exists());
        assert!(store.load(&source).is_ok());
    }
}
