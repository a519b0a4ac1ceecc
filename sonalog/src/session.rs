//! Multi-file query sessions.
//!
//! A [`MultiFileSession`] opens a set of log files as one time-addressable
//! dataset. Each file gets a persisted sidecar index (loaded when valid,
//! rebuilt by scanning otherwise); queries then run against the indices and
//! touch the log files only to decode the records a line actually needs.
//!
//! Two query shapes are supported:
//!
//! * [`line_at`](MultiFileSession::line_at) resolves a single timestamp to
//!   the nearest line at or after it, across all files.
//! * [`lines_between`](MultiFileSession::lines_between) streams all lines in
//!   a half-open time window as a lazy iterator, skipping degenerate and
//!   unreconstructable entries.

use log::{debug, info, warn};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use sonalog_core::format::{framed, tagged};
use sonalog_core::line::DisplayParams;
use sonalog_core::record::RecordPayload;
use sonalog_core::{DecodeError, LogFormat, SidescanLine, HEADER_SIZE};

use thiserror::Error;

use crate::cache::{LineKey, ResultCache, DEFAULT_CACHE_CAPACITY};
use crate::index::{IndexStore, TimeIndex};
use crate::reconstruct::LineReconstructor;
use crate::scanner::StreamScanner;

/// Errors surfaced by line queries. "No line there" is not an error; queries
/// return `Ok(None)` for that.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// One opened log file: its format, its time index and a seekable reader.
pub struct SessionFile {
    id: u32,
    path: PathBuf,
    format: LogFormat,
    index: TimeIndex,
    reader: Mutex<BufReader<File>>,
}

impl SessionFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> LogFormat {
        self.format
    }

    pub fn index(&self) -> &TimeIndex {
        &self.index
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let mut reader = self.reader.lock().unwrap();
        reader.seek(SeekFrom::Start(offset))?;
        reader.read_exact(buf)
    }

    /// Decode the record payload at `offset`, through the payload cache.
    pub(crate) fn payload_at(
        &self,
        cache: &ResultCache,
        offset: u64,
    ) -> Result<Arc<RecordPayload>, QueryError> {
        let key = (self.id, offset);
        if let Some(payload) = cache.payload(&key) {
            return Ok(payload);
        }

        let mut header_buf = [0u8; HEADER_SIZE];
        self.read_exact_at(offset, &mut header_buf)?;
        let header = match self.format {
            LogFormat::Tagged => tagged::parse_header(&header_buf)?,
            LogFormat::Framed => framed::parse_header(&header_buf)?,
        };

        let mut payload_buf = vec![0u8; header.payload_size as usize];
        self.read_exact_at(offset + HEADER_SIZE as u64, &mut payload_buf)?;
        let payload = match self.format {
            LogFormat::Tagged => tagged::parse_payload(&header, &payload_buf)?,
            LogFormat::Framed => framed::parse_payload(&header, &payload_buf)?,
        };

        let payload = Arc::new(payload);
        cache.insert_payload(key, payload.clone());
        Ok(payload)
    }
}

/// A set of log files queried as one time-continuous dataset.
pub struct MultiFileSession {
    files: Vec<SessionFile>,
    cache: ResultCache,
    reconstructor: LineReconstructor,
    params: DisplayParams,
}

impl MultiFileSession {
    /// Open `paths` with sidecar indices stored next to each source file.
    pub fn open<P: AsRef<Path>>(paths: &[P]) -> io::Result<Self> {
        Self::open_with_store(paths, &IndexStore::new())
    }

    /// Open `paths`, placing sidecar indices through `store`.
    ///
    /// Each file's sidecar is loaded when present and consistent with the
    /// source; otherwise the file is scanned and a fresh sidecar written. A
    /// failed sidecar write is logged and tolerated, the in-memory index is
    /// complete either way.
    pub fn open_with_store<P: AsRef<Path>>(paths: &[P], store: &IndexStore) -> io::Result<Self> {
        let params = DisplayParams::default();
        let mut files = Vec::with_capacity(paths.len());
        for (id, path) in paths.iter().enumerate() {
            let path = path.as_ref();
            let index = match store.load(path) {
                Ok(index) => {
                    debug!("Reusing sidecar index for {}", path.display());
                    index
                }
                Err(err) => {
                    debug!("No usable sidecar for {}: {}", path.display(), err);
                    let format = probe_format(path)?;
                    let (index, stats) = StreamScanner::new(format).scan_file(path)?;
                    info!(
                        "Indexed {} ({}): {} records, {} channel, {} resyncs",
                        path.display(),
                        format,
                        stats.records,
                        stats.channel_records,
                        stats.resyncs
                    );
                    if let Err(err) = store.save(&index, path) {
                        warn!("Could not save sidecar for {}: {}", path.display(), err);
                    }
                    index
                }
            };
            files.push(SessionFile {
                id: id as u32,
                path: path.to_path_buf(),
                format: index.format,
                index,
                reader: Mutex::new(BufReader::new(File::open(path)?)),
            });
        }

        Ok(MultiFileSession {
            files,
            cache: ResultCache::new(DEFAULT_CACHE_CAPACITY),
            reconstructor: LineReconstructor::new(&params),
            params,
        })
    }

    pub fn files(&self) -> &[SessionFile] {
        &self.files
    }

    /// Parameters used when a query does not specify its own.
    pub fn default_params(&self) -> DisplayParams {
        self.params
    }

    pub fn set_default_params(&mut self, params: DisplayParams) {
        self.params = params;
    }

    /// All subsystems seen in any file, ascending.
    pub fn list_subsystems(&self) -> Vec<u16> {
        let mut subsystems: Vec<u16> = self
            .files
            .iter()
            .flat_map(|f| f.index.known_subsystems.iter().copied())
            .collect();
        subsystems.sort_unstable();
        subsystems.dedup();
        subsystems
    }

    /// Earliest channel-record timestamp, optionally for one subsystem.
    pub fn first_timestamp(&self, subsystem: Option<u16>) -> Option<u64> {
        self.files
            .iter()
            .filter_map(|f| match subsystem {
                Some(s) => f.index.subsystems.get(&s).and_then(|sub| sub.first_timestamp),
                None => f.index.first_timestamp,
            })
            .min()
    }

    /// Latest channel-record timestamp, optionally for one subsystem.
    pub fn last_timestamp(&self, subsystem: Option<u16>) -> Option<u64> {
        self.files
            .iter()
            .filter_map(|f| match subsystem {
                Some(s) => f.index.subsystems.get(&s).and_then(|sub| sub.last_timestamp),
                None => f.index.last_timestamp,
            })
            .max()
    }

    /// The line at or after `timestamp_ms` for `subsystem`, across all files.
    ///
    /// Ties between files resolve to the earliest candidate timestamp.
    /// Returns `Ok(None)` when no file has data at or after the timestamp,
    /// or when the nearest entry cannot be reconstructed (missing companion
    /// records).
    pub fn line_at(
        &self,
        timestamp_ms: u64,
        subsystem: u16,
        params: &DisplayParams,
    ) -> Result<Option<Arc<SidescanLine>>, QueryError> {
        let mut best: Option<(u64, usize)> = None;
        for (idx, file) in self.files.iter().enumerate() {
            let Some(sub) = file.index.subsystems.get(&subsystem) else {
                continue;
            };
            if let Some((ts, _)) = sub.entries.range(timestamp_ms..).next() {
                if best.map_or(true, |(b, _)| *ts < b) {
                    best = Some((*ts, idx));
                }
            }
        }

        let Some((ts, idx)) = best else {
            return Ok(None);
        };
        let file = &self.files[idx];
        let offsets = &file.index.subsystems[&subsystem].entries[&ts];
        self.resolve(file, ts, subsystem, offsets, params)
    }

    /// Stream all lines for `subsystem` with timestamps in
    /// `[start_ms, end_ms)`, in non-decreasing timestamp order.
    ///
    /// Degenerate (all-black) lines and entries whose companion records are
    /// missing are skipped. Decode failures skip the entry; I/O failures end
    /// the iteration.
    pub fn lines_between(
        &self,
        start_ms: u64,
        end_ms: u64,
        subsystem: u16,
        params: DisplayParams,
    ) -> LineIter<'_> {
        LineIter {
            session: self,
            subsystem,
            params,
            end_ms,
            cursor: start_ms,
            done: false,
            cancel: None,
        }
    }

    /// Release the session and its open file handles.
    pub fn close(self) {
        debug!("Closing session ({} files)", self.files.len());
    }

    fn resolve(
        &self,
        file: &SessionFile,
        timestamp_ms: u64,
        subsystem: u16,
        offsets: &[u64],
        params: &DisplayParams,
    ) -> Result<Option<Arc<SidescanLine>>, QueryError> {
        let key = LineKey {
            timestamp_ms,
            subsystem,
            params: params.cache_key(),
        };
        if let Some(line) = self.cache.line(&key) {
            return Ok(Some(line));
        }

        match self
            .reconstructor
            .reconstruct(file, &self.cache, timestamp_ms, offsets, params)?
        {
            Some(line) => {
                let line = Arc::new(line);
                self.cache.insert_line(key, line.clone());
                Ok(Some(line))
            }
            None => Ok(None),
        }
    }

    /// Next indexed entry at or after `cursor` and before `end_ms`, across
    /// all files; earliest timestamp wins.
    fn next_entry(&self, subsystem: u16, cursor: u64, end_ms: u64) -> Option<(u64, usize)> {
        // Empty and reversed windows yield nothing; BTreeMap::range panics
        // on a start past the end.
        if cursor >= end_ms {
            return None;
        }
        let mut best: Option<(u64, usize)> = None;
        for (idx, file) in self.files.iter().enumerate() {
            let Some(sub) = file.index.subsystems.get(&subsystem) else {
                continue;
            };
            if let Some((ts, _)) = sub.entries.range(cursor..end_ms).next() {
                if best.map_or(true, |(b, _)| *ts < b) {
                    best = Some((*ts, idx));
                }
            }
        }
        best
    }
}

/// Lazy line stream returned by [`MultiFileSession::lines_between`].
pub struct LineIter<'a> {
    session: &'a MultiFileSession,
    subsystem: u16,
    params: DisplayParams,
    end_ms: u64,
    cursor: u64,
    done: bool,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> LineIter<'a> {
    /// Stop the iteration early when `flag` becomes true, checked once per
    /// yielded entry.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }
}

impl<'a> Iterator for LineIter<'a> {
    type Item = Arc<SidescanLine>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if let Some(flag) = &self.cancel {
                if flag.load(Ordering::Relaxed) {
                    self.done = true;
                    return None;
                }
            }

            let (ts, idx) = self
                .session
                .next_entry(self.subsystem, self.cursor, self.end_ms)?;
            self.cursor = ts + 1;

            let file = &self.session.files[idx];
            let offsets = &file.index.subsystems[&self.subsystem].entries[&ts];
            match self.session.resolve(file, ts, self.subsystem, offsets, &self.params) {
                Ok(Some(line)) if !line.is_degenerate() => return Some(line),
                Ok(_) => {
                    debug!("Skipping entry at {} (degenerate or incomplete)", ts);
                }
                Err(QueryError::Decode(err)) => {
                    warn!("Skipping entry at {}: {}", ts, err);
                }
                Err(QueryError::Io(err)) => {
                    warn!("Stopping line stream at {}: {}", ts, err);
                    self.done = true;
                    return None;
                }
            }
        }
    }
}

/// Sniff the wire format from the first header-sized window.
fn probe_format(path: &Path) -> io::Result<LogFormat> {
    let mut window = Vec::with_capacity(HEADER_SIZE);
    File::open(path)?
        .take(HEADER_SIZE as u64)
        .read_to_end(&mut window)?;
    Ok(LogFormat::detect(&window))
}
