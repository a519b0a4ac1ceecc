//! Bounded result caches.
//!
//! Two independent LRU keyspaces: decoded raw payloads keyed by
//! `(file id, byte offset)`, and fully reconstructed lines keyed by
//! `(timestamp, subsystem, reconstruction parameters)`. Entries are
//! immutable once inserted and shared as `Arc` views. A single mutex per
//! keyspace is sufficient; decode cost dominates lookup cost.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use sonalog_core::{RecordPayload, SidescanLine};

/// Reference capacity for both keyspaces.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Origin of a decoded payload: session-local file id and byte offset.
pub type PayloadKey = (u32, u64);

/// Identity of a reconstructed line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineKey {
    pub timestamp_ms: u64,
    pub subsystem: u16,
    /// [`DisplayParams::cache_key`](sonalog_core::DisplayParams::cache_key)
    pub params: u64,
}

/// Bounded caches for decoded payloads and reconstructed lines.
pub struct ResultCache {
    payloads: Mutex<LruCache<PayloadKey, Arc<RecordPayload>>>,
    lines: Mutex<LruCache<LineKey, Arc<SidescanLine>>>,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        ResultCache {
            payloads: Mutex::new(LruCache::new(capacity)),
            lines: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn payload(&self, key: &PayloadKey) -> Option<Arc<RecordPayload>> {
        self.payloads.lock().unwrap().get(key).cloned()
    }

    pub fn insert_payload(&self, key: PayloadKey, payload: Arc<RecordPayload>) {
        self.payloads.lock().unwrap().put(key, payload);
    }

    pub fn line(&self, key: &LineKey) -> Option<Arc<SidescanLine>> {
        self.lines.lock().unwrap().get(key).cloned()
    }

    pub fn insert_line(&self, key: LineKey, line: Arc<SidescanLine>) {
        self.lines.lock().unwrap().put(key, line);
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(n: u16) -> Arc<RecordPayload> {
        Arc::new(RecordPayload::Unknown {
            tag: n as u32,
            declared_size: 0,
        })
    }

    #[test]
    fn test_payload_hit_and_miss() {
        let cache = ResultCache::new(4);
        cache.insert_payload((0, 100), payload(1));

        assert!(cache.payload(&(0, 100)).is_some());
        assert!(cache.payload(&(0, 200)).is_none());
        assert!(cache.payload(&(1, 100)).is_none());
    }

    #[test]
    fn test_lru_eviction_order() {
        let cache = ResultCache::new(2);
        cache.insert_payload((0, 1), payload(1));
        cache.insert_payload((0, 2), payload(2));

        // Touch (0,1) so (0,2) becomes least recently used
        assert!(cache.payload(&(0, 1)).is_some());
        cache.insert_payload((0, 3), payload(3));

        assert!(cache.payload(&(0, 1)).is_some());
        assert!(cache.payload(&(0, 2)).is_none());
        assert!(cache.payload(&(0, 3)).is_some());
    }

    #[test]
    fn test_line_key_includes_params() {
        let cache = ResultCache::new(4);
        let line = Arc::new(SidescanLine {
            timestamp_ms: 10,
            range_meters: 50.0,
            frequency_hz: 455_000.0,
            pose: Default::default(),
            samples: vec![1.0],
        });
        let key = LineKey {
            timestamp_ms: 10,
            subsystem: 1,
            params: 42,
        };
        cache.insert_line(key, line);

        assert!(cache.line(&key).is_some());
        assert!(cache
            .line(&LineKey {
                params: 43,
                ..key
            })
            .is_none());
    }
}
