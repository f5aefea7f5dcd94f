use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::format;
use crate::errors::CoreError;
use crate::models::price::{CacheEntry, PricePoint, Series};
use crate::services::clock::Clock;
use crate::services::day_series::tail;

/// Durable key-value slot per `(coin_id, days)`.
///
/// Stores know nothing about TTLs; [`DaySeriesCache`] applies those.
pub trait SeriesStore: Send + Sync {
    fn load(&self, coin_id: &str, days: u32) -> Result<Option<CacheEntry>, CoreError>;

    /// Overwrite any existing entry for the same key.
    fn save(&self, entry: &CacheEntry) -> Result<(), CoreError>;
}

// ── File store ──────────────────────────────────────────────────────

/// One binary record file per key: `<dir>/<coin_id>_<days>.bin`.
#[derive(Debug, Clone)]
pub struct FileSeriesStore {
    dir: PathBuf,
}

impl FileSeriesStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, coin_id: &str, days: u32) -> PathBuf {
        let safe: String = coin_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{safe}_{days}.bin"))
    }

    /// Serialize an entry into record bytes.
    ///
    /// Flow: Series → bincode → PHCR record (written_at, days, payload)
    pub fn encode(entry: &CacheEntry) -> Result<Vec<u8>, CoreError> {
        let payload = bincode::serialize(&entry.series)
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize series: {e}")))?;
        Ok(format::write_record(
            format::CURRENT_VERSION,
            entry.written_at.timestamp_millis(),
            entry.days,
            &payload,
        ))
    }

    /// Parse record bytes back into an entry for `coin_id`.
    pub fn decode(coin_id: &str, data: &[u8]) -> Result<CacheEntry, CoreError> {
        let (header, payload) = format::read_record(data)?;
        let series: Series = bincode::deserialize(payload)
            .map_err(|e| CoreError::Deserialization(format!("Failed to deserialize series: {e}")))?;
        let written_at = DateTime::<Utc>::from_timestamp_millis(header.written_at_ms)
            .ok_or_else(|| {
                CoreError::InvalidFileFormat(format!(
                    "written_at out of range: {}",
                    header.written_at_ms
                ))
            })?;

        Ok(CacheEntry {
            coin_id: coin_id.to_string(),
            days: header.days,
            series,
            written_at,
        })
    }
}

impl SeriesStore for FileSeriesStore {
    fn load(&self, coin_id: &str, days: u32) -> Result<Option<CacheEntry>, CoreError> {
        let path = self.path_for(coin_id, days);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry = Self::decode(coin_id, &bytes)?;
        if entry.days != days {
            return Err(CoreError::InvalidFileFormat(format!(
                "{} holds a {}-day window, expected {days}",
                path.display(),
                entry.days
            )));
        }
        Ok(Some(entry))
    }

    fn save(&self, entry: &CacheEntry) -> Result<(), CoreError> {
        std::fs::create_dir_all(&self.dir)?;
        let bytes = Self::encode(entry)?;
        let path = self.path_for(&entry.coin_id, entry.days);
        // Atomic replace via temp file.
        let tmp = path.with_extension("bin.tmp");
        let written = std::fs::write(&tmp, bytes).and_then(|()| std::fs::rename(&tmp, &path));
        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

// ── In-memory store ─────────────────────────────────────────────────

/// Process-local store, for tests and cache-less embedding.
#[derive(Debug, Default)]
pub struct MemorySeriesStore {
    entries: Mutex<HashMap<(String, u32), CacheEntry>>,
    writes: AtomicUsize,
}

impl MemorySeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Direct lookup bypassing TTL logic.
    pub fn entry(&self, coin_id: &str, days: u32) -> Option<CacheEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(coin_id.to_string(), days))
            .cloned()
    }
}

impl SeriesStore for MemorySeriesStore {
    fn load(&self, coin_id: &str, days: u32) -> Result<Option<CacheEntry>, CoreError> {
        Ok(self.entry(coin_id, days))
    }

    fn save(&self, entry: &CacheEntry) -> Result<(), CoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((entry.coin_id.clone(), entry.days), entry.clone());
        Ok(())
    }
}

// ── TTL-aware cache ─────────────────────────────────────────────────

/// Day-series cache keyed by `(coin_id, days)`.
///
/// - `get`: exact key, fresh entries only.
/// - `get_raw`: exact key, ignores TTL (derivation source).
/// - `get_sliced`: trailing slice of a fresh, larger cached window.
/// - `put`: best effort; storage failures are logged and swallowed.
///
/// Empty series are never stored and never count as hits.
pub struct DaySeriesCache {
    store: Arc<dyn SeriesStore>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl DaySeriesCache {
    pub fn new(store: Arc<dyn SeriesStore>, ttl: chrono::Duration, clock: Arc<dyn Clock>) -> Self {
        Self { store, ttl, clock }
    }

    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    fn load(&self, coin_id: &str, days: u32) -> Option<CacheEntry> {
        match self.store.load(coin_id, days) {
            Ok(Some(entry)) if !entry.series.is_empty() => Some(entry),
            Ok(_) => None,
            Err(e) => {
                debug!(coin_id, days, error = %e, "unreadable cache entry treated as miss");
                None
            }
        }
    }

    pub fn get(&self, coin_id: &str, days: u32) -> Option<Series> {
        let now = self.clock.now();
        self.load(coin_id, days)
            .filter(|entry| entry.is_fresh(now, self.ttl))
            .map(|entry| entry.series)
    }

    pub fn get_raw(&self, coin_id: &str, days: u32) -> Option<Series> {
        self.load(coin_id, days).map(|entry| entry.series)
    }

    /// First parent window in `parents` (larger than `days`) whose fresh
    /// series has at least `days` points, sliced to its last `days` points.
    pub fn get_sliced(&self, coin_id: &str, days: u32, parents: &[u32]) -> Option<(u32, Series)> {
        parents
            .iter()
            .copied()
            .filter(|&parent| parent > days)
            .find_map(|parent| {
                let series = self.get(coin_id, parent)?;
                (series.len() >= days as usize).then(|| (parent, tail(&series, days)))
            })
    }

    /// Store `series` under `(coin_id, days)`. Returns whether the write landed.
    pub fn put(&self, coin_id: &str, days: u32, series: &[PricePoint]) -> bool {
        if series.is_empty() {
            return false;
        }
        let entry = CacheEntry {
            coin_id: coin_id.to_string(),
            days,
            series: series.to_vec(),
            written_at: self.clock.now(),
        };
        match self.store.save(&entry) {
            Ok(()) => true,
            Err(e) => {
                warn!(coin_id, days, error = %e, "cache write failed, continuing without it");
                false
            }
        }
    }
}
