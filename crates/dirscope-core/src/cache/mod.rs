/// Subtree cache — remembers completed directory totals so an unchanged
/// subtree is not walked again within a session (or, optionally, across runs).
///
/// An entry is keyed by `(path, identity, mtime)` and is only ever served when
/// the live directory still has the same identity and the exact same mtime.
/// A mismatch evicts the entry on the spot: correctness wins over hit rate.
///
/// Memory is capped by an LRU bound on the entry count. Workers read from
/// many threads at once; every access goes through one short `Mutex` section
/// because a hit also bumps the entry's recency.
use crate::error::CacheError;
use crate::model::Identity;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};

/// Cached result for one directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSize {
    pub cumulative_size: u64,
    pub child_count: u64,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries found but rejected because the directory changed.
    pub stale: u64,
    pub evicted: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.stale;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Slot {
    identity: Identity,
    mtime: SystemTime,
    value: CachedSize,
    #[serde(skip)]
    last_access: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<PathBuf, Slot>,
    /// Access tick -> path, oldest first.
    recency: BTreeMap<u64, PathBuf>,
    clock: u64,
    stats: CacheStats,
}

impl Inner {
    fn touch(&mut self, path: &Path) {
        self.clock += 1;
        let tick = self.clock;
        if let Some(slot) = self.entries.get_mut(path) {
            self.recency.remove(&slot.last_access);
            slot.last_access = tick;
            self.recency.insert(tick, path.to_path_buf());
        }
    }

    fn remove(&mut self, path: &Path) -> bool {
        match self.entries.remove(path) {
            Some(slot) => {
                self.recency.remove(&slot.last_access);
                true
            }
            None => false,
        }
    }

    fn evict_to(&mut self, capacity: usize) {
        while self.entries.len() > capacity {
            let Some((_, oldest)) = self.recency.pop_first() else {
                break;
            };
            self.entries.remove(&oldest);
            self.stats.evicted += 1;
        }
    }
}

/// On-disk layout of a persisted cache.
#[derive(Serialize, Deserialize)]
struct Persisted {
    version: u32,
    saved_at: DateTime<Utc>,
    entries: Vec<(PathBuf, Slot)>,
}

const FORMAT_VERSION: u32 = 1;

pub struct SubtreeCache {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl SubtreeCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity: capacity.max(1),
        }
    }

    /// Look up a directory. Returns `None` unless the live identity and mtime
    /// both match what was captured.
    pub fn get(&self, path: &Path, identity: Identity, mtime: SystemTime) -> Option<CachedSize> {
        let mut inner = self.inner.lock();
        let verdict = inner
            .entries
            .get(path)
            .map(|slot| slot.identity == identity && slot.mtime == mtime);
        match verdict {
            Some(true) => {
                inner.stats.hits += 1;
                inner.touch(path);
                inner.entries.get(path).map(|slot| slot.value)
            }
            Some(false) => {
                inner.stats.stale += 1;
                inner.remove(path);
                None
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Record a completed directory.
    pub fn put(
        &self,
        path: &Path,
        identity: Identity,
        mtime: SystemTime,
        cumulative_size: u64,
        child_count: u64,
    ) {
        let mut inner = self.inner.lock();
        inner.remove(path);
        inner.entries.insert(
            path.to_path_buf(),
            Slot {
                identity,
                mtime,
                value: CachedSize {
                    cumulative_size,
                    child_count,
                    captured_at: Utc::now(),
                },
                last_access: 0,
            },
        );
        inner.touch(path);
        inner.evict_to(self.capacity);
    }

    /// Drop the entry for `path`. Returns whether one existed.
    pub fn remove(&self, path: &Path) -> bool {
        self.inner.lock().remove(path)
    }

    /// Drop the entries for `path` and every ancestor directory.
    ///
    /// Deleting something deep inside a tree does not change the mtime of
    /// its grandparents, so their captured totals would otherwise still
    /// verify and under-report the freed space.
    pub fn invalidate_with_ancestors(&self, path: &Path) -> usize {
        let mut inner = self.inner.lock();
        path.ancestors().filter(|p| inner.remove(p)).count()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }

    /// Load a cache persisted by [`SubtreeCache::save`]. A missing file is
    /// not an error and yields an empty cache.
    pub fn load(path: &Path, capacity: usize) -> Result<Self, CacheError> {
        let cache = Self::new(capacity);
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(cache),
            Err(source) => {
                return Err(CacheError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let persisted: Persisted =
            serde_json::from_str(&contents).map_err(|source| CacheError::Format {
                path: path.to_path_buf(),
                source,
            })?;
        if persisted.version != FORMAT_VERSION {
            debug!(
                "Ignoring cache file {} with version {}",
                path.display(),
                persisted.version
            );
            return Ok(cache);
        }
        {
            let mut inner = cache.inner.lock();
            for (dir, slot) in persisted.entries {
                inner.entries.insert(dir.clone(), slot);
                inner.touch(&dir);
            }
            inner.evict_to(cache.capacity);
        }
        info!("Loaded {} cached subtrees from {}", cache.len(), path.display());
        Ok(cache)
    }

    /// Write every entry to `path` as JSON, least recently used first so a
    /// reload preserves the eviction order.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let io_err = |source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        };
        let persisted = {
            let inner = self.inner.lock();
            let entries = inner
                .recency
                .values()
                .filter_map(|p| inner.entries.get(p).map(|slot| (p.clone(), slot.clone())))
                .collect();
            Persisted {
                version: FORMAT_VERSION,
                saved_at: Utc::now(),
                entries,
            }
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string(&persisted).map_err(|source| CacheError::Format {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(io_err)?;
        info!(
            "Saved {} cached subtrees to {}",
            persisted.entries.len(),
            path.display()
        );
        Ok(())
    }
}
