//! Skip cache: remembers, per pattern `cache_key`, which file contents are
//! known to produce no match.
//!
//! Each key owns one table mapping a content hash to the identity of the file
//! that had that content. Tables are loaded lazily on first use and written
//! back by a single [`SkipCache::flush`] at the end of a run. Entries are
//! never evicted; a file whose content changes simply hashes differently.

use crate::edit::atomic_write;
use crate::source::SourceFile;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, warn};

/// Content hash -> file identity.
pub type CacheTable = BTreeMap<String, String>;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed cache table {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Persistence behind the skip cache.
pub trait CacheStore {
    /// Read the table for `key`; a key never saved yields an empty table.
    fn load(&mut self, key: &str) -> Result<CacheTable, CacheError>;

    fn save(&mut self, key: &str, table: &CacheTable) -> Result<(), CacheError>;

    /// Drop every table, returning how many were removed.
    fn clear(&mut self) -> Result<usize, CacheError>;
}

/// One `<key>.json` file per cache key inside a directory.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn table_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl CacheStore for JsonDirStore {
    fn load(&mut self, key: &str) -> Result<CacheTable, CacheError> {
        let path = self.table_path(key);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(CacheTable::new()),
            Err(source) => return Err(CacheError::Io { path, source }),
        };
        serde_json::from_str(&text).map_err(|source| CacheError::Json { path, source })
    }

    fn save(&mut self, key: &str, table: &CacheTable) -> Result<(), CacheError> {
        let path = self.table_path(key);
        fs::create_dir_all(&self.dir).map_err(|source| CacheError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let json = serde_json::to_string_pretty(table).map_err(|source| CacheError::Json {
            path: path.clone(),
            source,
        })?;
        atomic_write(&path, json.as_bytes()).map_err(|source| CacheError::Io { path, source })
    }

    fn clear(&mut self) -> Result<usize, CacheError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(CacheError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut removed = 0;
        for entry in entries {
            let path = entry
                .map_err(|source| CacheError::Io {
                    path: self.dir.clone(),
                    source,
                })?
                .path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                fs::remove_file(&path).map_err(|source| CacheError::Io {
                    path: path.clone(),
                    source,
                })?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    tables: HashMap<String, CacheTable>,
    loads: usize,
    saves: usize,
}

/// In-memory store. Clones share the same tables, so a test can keep a
/// handle and inspect what the cache persisted.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Rc<RefCell<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, key: &str) -> Option<CacheTable> {
        self.inner.borrow().tables.get(key).cloned()
    }

    /// Number of `load` calls served.
    pub fn loads(&self) -> usize {
        self.inner.borrow().loads
    }

    /// Number of `save` calls served.
    pub fn saves(&self) -> usize {
        self.inner.borrow().saves
    }
}

impl CacheStore for MemoryStore {
    fn load(&mut self, key: &str) -> Result<CacheTable, CacheError> {
        let mut inner = self.inner.borrow_mut();
        inner.loads += 1;
        Ok(inner.tables.get(key).cloned().unwrap_or_default())
    }

    fn save(&mut self, key: &str, table: &CacheTable) -> Result<(), CacheError> {
        let mut inner = self.inner.borrow_mut();
        inner.saves += 1;
        inner.tables.insert(key.to_string(), table.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<usize, CacheError> {
        let mut inner = self.inner.borrow_mut();
        let removed = inner.tables.len();
        inner.tables.clear();
        Ok(removed)
    }
}

/// Per-run view over a [`CacheStore`].
pub struct SkipCache {
    store: Option<Box<dyn CacheStore>>,
    tables: HashMap<String, CacheTable>,
    dirty: BTreeSet<String>,
}

impl SkipCache {
    pub fn new(store: impl CacheStore + 'static) -> Self {
        Self {
            store: Some(Box::new(store)),
            tables: HashMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    /// A cache that never reports a file clean and never persists.
    pub fn disabled() -> Self {
        Self {
            store: None,
            tables: HashMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Whether `file`'s current content was recorded clean under `key`.
    ///
    /// A hash recorded for a different file identity does not count.
    pub fn is_clean_before(&mut self, key: &str, file: &SourceFile) -> bool {
        let hash = file.content_hash();
        self.table(key)
            .and_then(|table| table.get(&hash))
            .is_some_and(|identity| *identity == file.identity())
    }

    /// Record that `file`'s current content has no match under `key`.
    pub fn mark_clean(&mut self, key: &str, file: &SourceFile) {
        let hash = file.content_hash();
        let identity = file.identity();
        let Some(table) = self.table(key) else {
            return;
        };
        if table.get(&hash) == Some(&identity) {
            return;
        }
        table.insert(hash, identity);
        self.dirty.insert(key.to_string());
    }

    /// Number of keys with unsaved entries.
    pub fn dirty_keys(&self) -> usize {
        self.dirty.len()
    }

    /// Persist every dirty table. All tables are attempted; the first error
    /// is returned after the rest have been tried.
    pub fn flush(&mut self) -> Result<usize, CacheError> {
        let Some(store) = self.store.as_mut() else {
            return Ok(0);
        };

        let mut written = 0;
        let mut first_err = None;
        for key in std::mem::take(&mut self.dirty) {
            let Some(table) = self.tables.get(&key) else {
                continue;
            };
            match store.save(&key, table) {
                Ok(()) => {
                    debug!(key = %key, entries = table.len(), "flushed skip cache table");
                    written += 1;
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "failed to flush skip cache table");
                    self.dirty.insert(key);
                    first_err.get_or_insert(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    fn table(&mut self, key: &str) -> Option<&mut CacheTable> {
        let store = self.store.as_mut()?;
        if !self.tables.contains_key(key) {
            let table = store.load(key).unwrap_or_else(|e| {
                warn!(key = %key, error = %e, "ignoring unreadable skip cache table");
                CacheTable::new()
            });
            self.tables.insert(key.to_string(), table);
        }
        self.tables.get_mut(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, content: &str) -> SourceFile {
        SourceFile::new(path, content)
    }

    #[test]
    fn unknown_content_is_not_clean() {
        let mut cache = SkipCache::new(MemoryStore::new());
        assert!(!cache.is_clean_before("k", &file("a.php", "x")));
    }

    #[test]
    fn mark_then_query() {
        let mut cache = SkipCache::new(MemoryStore::new());
        let a = file("a.php", "x");
        cache.mark_clean("k", &a);
        assert!(cache.is_clean_before("k", &a));
        assert!(!cache.is_clean_before("other", &a));
        assert!(!cache.is_clean_before("k", &file("a.php", "y")));
    }

    #[test]
    fn same_content_different_identity_is_not_clean() {
        let mut cache = SkipCache::new(MemoryStore::new());
        cache.mark_clean("k", &file("a.php", "x"));
        assert!(!cache.is_clean_before("k", &file("b.php", "x")));
    }

    #[test]
    fn loads_each_key_once() {
        let store = MemoryStore::new();
        let mut cache = SkipCache::new(store.clone());
        for _ in 0..3 {
            cache.is_clean_before("k", &file("a.php", "x"));
        }
        cache.mark_clean("k", &file("a.php", "x"));
        cache.is_clean_before("j", &file("a.php", "x"));
        assert_eq!(store.loads(), 2);
    }

    #[test]
    fn flush_writes_only_dirty_keys() {
        let store = MemoryStore::new();
        let mut cache = SkipCache::new(store.clone());
        cache.is_clean_before("read-only", &file("a.php", "x"));
        cache.mark_clean("k", &file("a.php", "x"));
        cache.mark_clean("k", &file("b.php", "y"));

        assert_eq!(cache.flush().unwrap(), 1);
        assert_eq!(store.saves(), 1);
        assert_eq!(store.table("k").unwrap().len(), 2);
        assert!(store.table("read-only").is_none());

        assert_eq!(cache.flush().unwrap(), 0);
        assert_eq!(store.saves(), 1);
    }

    #[test]
    fn remarking_known_entry_is_not_dirty() {
        let store = MemoryStore::new();
        let mut cache = SkipCache::new(store.clone());
        let a = file("a.php", "x");
        cache.mark_clean("k", &a);
        cache.flush().unwrap();

        let mut next = SkipCache::new(store.clone());
        next.mark_clean("k", &a);
        assert_eq!(next.dirty_keys(), 0);
    }

    #[test]
    fn disabled_cache_never_reports_clean() {
        let mut cache = SkipCache::disabled();
        let a = file("a.php", "x");
        cache.mark_clean("k", &a);
        assert!(!cache.is_clean_before("k", &a));
        assert_eq!(cache.flush().unwrap(), 0);
    }

    #[test]
    fn json_store_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let a = file("src/a.php", "<?php echo 1;");

        let mut cache = SkipCache::new(JsonDirStore::new(dir.path().join("cache")));
        cache.mark_clean("ternary_return", &a);
        cache.flush().unwrap();
        assert!(dir.path().join("cache/ternary_return.json").exists());

        let mut reloaded = SkipCache::new(JsonDirStore::new(dir.path().join("cache")));
        assert!(reloaded.is_clean_before("ternary_return", &a));
    }

    #[test]
    fn json_store_clear_removes_tables() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonDirStore::new(dir.path());
        store.save("a", &CacheTable::new()).unwrap();
        store.save("b", &CacheTable::new()).unwrap();
        fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        assert_eq!(store.clear().unwrap(), 2);
        assert!(dir.path().join("notes.txt").exists());
        assert_eq!(store.load("a").unwrap(), CacheTable::new());
    }

    #[test]
    fn corrupt_table_is_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("k.json"), "{not json").unwrap();

        let mut store = JsonDirStore::new(dir.path());
        assert!(matches!(store.load("k"), Err(CacheError::Json { .. })));

        let mut cache = SkipCache::new(store);
        let a = file("a.php", "x");
        assert!(!cache.is_clean_before("k", &a));
        cache.mark_clean("k", &a);
        cache.flush().unwrap();
        assert!(SkipCache::new(JsonDirStore::new(dir.path())).is_clean_before("k", &a));
    }
}
