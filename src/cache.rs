//! Fingerprint-keyed memoization of derived state
//!
//! Everything the analyzer derives from a log file (its records, token
//! usage, model info, tool usage, status squares) and the whole-corpus
//! aggregates are stored here against a [`Fingerprint`]: the identities
//! (`path`, `modified_at`, `size_bytes`) of the files the value was computed
//! from. A lookup is a hit only when the stored fingerprint equals the
//! current one; any other entry is evicted and recomputed.
//!
//! The storage backend is injectable through [`CacheStore`]. [`MemoryStore`]
//! is a concurrent map safe to share across the worker pool; [`NoopStore`]
//! never stores anything, which makes every lookup a miss.
//!
//! No lock is held while a producer runs. Two workers racing on the same
//! key may both compute the value; the later store wins, and both results
//! are identical for an unchanged file.

use crate::models::{
    CorpusTotals, FileIdentity, LogFile, ModelInfo, Record, StatusSquare, TokenUsage, ToolUsage,
    UsageSession,
};
use anyhow::Result;
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// The per-file values the cache knows how to hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivedKind {
    Records,
    TokenUsage,
    ModelInfo,
    ToolUsage,
    StatusSquares,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    File { path: PathBuf, kind: DerivedKind },
    Computation(String),
}

impl CacheKey {
    pub fn file(file: &LogFile, kind: DerivedKind) -> Self {
        CacheKey::File {
            path: file.path.clone(),
            kind,
        }
    }
}

/// Path-sorted identities of every file a value depends on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(Vec<FileIdentity>);

impl Fingerprint {
    pub fn of_file(file: &LogFile) -> Self {
        Fingerprint(vec![file.identity()])
    }

    pub fn of_files(files: &[LogFile]) -> Self {
        let mut identities: Vec<FileIdentity> = files.iter().map(LogFile::identity).collect();
        identities.sort();
        Fingerprint(identities)
    }

    pub fn identities(&self) -> &[FileIdentity] {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub enum CachedValue {
    Records(Arc<Vec<Record>>),
    TokenUsage(TokenUsage),
    ModelInfo(ModelInfo),
    ToolUsage(ToolUsage),
    StatusSquares(Vec<StatusSquare>),
    Sessions(Vec<UsageSession>),
    Totals(CorpusTotals),
}

/// Conversion between a concrete value and its stored form
pub trait Cacheable: Clone + Sized {
    fn into_cached(self) -> CachedValue;
    fn from_cached(value: &CachedValue) -> Option<Self>;
}

macro_rules! impl_cacheable {
    ($ty:ty, $variant:ident) => {
        impl Cacheable for $ty {
            fn into_cached(self) -> CachedValue {
                CachedValue::$variant(self)
            }

            fn from_cached(value: &CachedValue) -> Option<Self> {
                match value {
                    CachedValue::$variant(inner) => Some(inner.clone()),
                    _ => None,
                }
            }
        }
    };
}

impl_cacheable!(Arc<Vec<Record>>, Records);
impl_cacheable!(TokenUsage, TokenUsage);
impl_cacheable!(ModelInfo, ModelInfo);
impl_cacheable!(ToolUsage, ToolUsage);
impl_cacheable!(Vec<StatusSquare>, StatusSquares);
impl_cacheable!(Vec<UsageSession>, Sessions);
impl_cacheable!(CorpusTotals, Totals);

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub value: CachedValue,
}

/// Storage backend for cache entries
pub trait CacheStore: Send + Sync {
    fn lookup(&self, key: &CacheKey) -> Option<CacheEntry>;
    fn store(&self, key: CacheKey, entry: CacheEntry);
    fn invalidate(&self, key: &CacheKey);
    fn clear(&self);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory store shared across worker threads
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<CacheKey, CacheEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryStore {
    fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        // Clone out so the shard guard is released before the caller continues.
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn store(&self, key: CacheKey, entry: CacheEntry) {
        self.entries.insert(key, entry);
    }

    fn invalidate(&self, key: &CacheKey) {
        self.entries.remove(key);
    }

    fn clear(&self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Store that never holds anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStore;

impl CacheStore for NoopStore {
    fn lookup(&self, _key: &CacheKey) -> Option<CacheEntry> {
        None
    }

    fn store(&self, _key: CacheKey, _entry: CacheEntry) {}

    fn invalidate(&self, _key: &CacheKey) {}

    fn clear(&self) {}

    fn len(&self) -> usize {
        0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

pub struct DerivedStateCache {
    store: Arc<dyn CacheStore>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for DerivedStateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedStateCache")
            .field("stats", &self.stats())
            .finish()
    }
}

impl Default for DerivedStateCache {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl DerivedStateCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopStore))
    }

    /// Return the stored value for `key` if its fingerprint matches,
    /// otherwise run `producer` and store its result.
    ///
    /// Producer errors propagate unchanged and leave nothing behind.
    pub fn get<T, F>(&self, key: CacheKey, fingerprint: Fingerprint, producer: F) -> Result<T>
    where
        T: Cacheable,
        F: FnOnce() -> Result<T>,
    {
        if let Some(entry) = self.store.lookup(&key) {
            if entry.fingerprint == fingerprint {
                if let Some(value) = T::from_cached(&entry.value) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(key = ?key, "Cache hit");
                    return Ok(value);
                }
            }
            debug!(key = ?key, "Evicting stale cache entry");
            self.store.invalidate(&key);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = ?key, "Cache miss");

        let value = producer()?;
        self.store.store(
            key,
            CacheEntry {
                fingerprint,
                value: value.clone().into_cached(),
            },
        );
        Ok(value)
    }

    fn per_file<T, F>(&self, file: &LogFile, kind: DerivedKind, producer: F) -> Result<T>
    where
        T: Cacheable,
        F: FnOnce() -> Result<T>,
    {
        self.get(CacheKey::file(file, kind), Fingerprint::of_file(file), producer)
    }

    pub fn records<F>(&self, file: &LogFile, producer: F) -> Result<Arc<Vec<Record>>>
    where
        F: FnOnce() -> Result<Vec<Record>>,
    {
        self.per_file(file, DerivedKind::Records, || producer().map(Arc::new))
    }

    pub fn token_usage<F>(&self, file: &LogFile, producer: F) -> Result<TokenUsage>
    where
        F: FnOnce() -> Result<TokenUsage>,
    {
        self.per_file(file, DerivedKind::TokenUsage, producer)
    }

    pub fn model_info<F>(&self, file: &LogFile, producer: F) -> Result<ModelInfo>
    where
        F: FnOnce() -> Result<ModelInfo>,
    {
        self.per_file(file, DerivedKind::ModelInfo, producer)
    }

    pub fn tool_usage<F>(&self, file: &LogFile, producer: F) -> Result<ToolUsage>
    where
        F: FnOnce() -> Result<ToolUsage>,
    {
        self.per_file(file, DerivedKind::ToolUsage, producer)
    }

    pub fn status_squares<F>(&self, file: &LogFile, producer: F) -> Result<Vec<StatusSquare>>
    where
        F: FnOnce() -> Result<Vec<StatusSquare>>,
    {
        self.per_file(file, DerivedKind::StatusSquares, producer)
    }

    /// Memoize a whole-corpus aggregate. Any change to the identity of a
    /// dependency, or to the set of dependencies, invalidates it.
    pub fn cached_computation<T, F>(&self, name: &str, producer: F, dependencies: &[LogFile]) -> Result<T>
    where
        T: Cacheable,
        F: FnOnce() -> Result<T>,
    {
        self.get(
            CacheKey::Computation(name.to_string()),
            Fingerprint::of_files(dependencies),
            producer,
        )
    }

    pub fn invalidate(&self, key: &CacheKey) {
        self.store.invalidate(key);
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.store.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::atomic::AtomicUsize;

    fn log_file(name: &str, size: u64) -> LogFile {
        let modified = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        LogFile {
            path: PathBuf::from(format!("/logs/{name}.jsonl")),
            size_bytes: size,
            modified_at: modified,
            created_at: modified,
            project_id: "proj".to_string(),
        }
    }

    fn usage(total: u64) -> TokenUsage {
        TokenUsage {
            total,
            ..TokenUsage::default()
        }
    }

    #[test]
    fn test_hit_skips_producer() {
        let cache = DerivedStateCache::in_memory();
        let file = log_file("a", 10);
        let calls = AtomicUsize::new(0);
        let produce = || -> Result<TokenUsage> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(usage(42))
        };

        assert_eq!(cache.token_usage(&file, produce).unwrap().total, 42);
        assert_eq!(cache.token_usage(&file, produce).unwrap().total, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
    }

    #[test]
    fn test_changed_identity_recomputes() {
        let cache = DerivedStateCache::in_memory();
        let file = log_file("a", 10);
        cache.token_usage(&file, || Ok(usage(1))).unwrap();

        let grown = LogFile {
            size_bytes: 20,
            ..file.clone()
        };
        assert_eq!(cache.token_usage(&grown, || Ok(usage(2))).unwrap().total, 2);

        let touched = LogFile {
            modified_at: grown.modified_at + Duration::seconds(1),
            ..grown.clone()
        };
        assert_eq!(cache.token_usage(&touched, || Ok(usage(3))).unwrap().total, 3);
        assert_eq!(cache.stats().entries, 1);
    }

    #[test]
    fn test_kinds_are_separate_entries() {
        let cache = DerivedStateCache::in_memory();
        let file = log_file("a", 10);
        cache.token_usage(&file, || Ok(usage(1))).unwrap();
        cache.tool_usage(&file, || Ok(ToolUsage::default())).unwrap();
        cache.records(&file, || Ok(Vec::new())).unwrap();
        assert_eq!(cache.stats().entries, 3);
    }

    #[test]
    fn test_producer_error_stores_nothing() {
        let cache = DerivedStateCache::in_memory();
        let file = log_file("a", 10);

        let err = cache
            .token_usage(&file, || Err(anyhow::anyhow!("boom")))
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(cache.stats().entries, 0);

        assert_eq!(cache.token_usage(&file, || Ok(usage(5))).unwrap().total, 5);
    }

    #[test]
    fn test_noop_store_always_misses() {
        let cache = DerivedStateCache::disabled();
        let file = log_file("a", 10);
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            cache
                .token_usage(&file, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(usage(7))
                })
                .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.stats().hits, 0);
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_computation_tracks_dependency_set() {
        let cache = DerivedStateCache::in_memory();
        let a = log_file("a", 10);
        let b = log_file("b", 20);
        let totals = |n: u64| {
            move || -> Result<CorpusTotals> {
                Ok(CorpusTotals {
                    total_tokens: n,
                    total_file_size: n,
                })
            }
        };

        let first: CorpusTotals = cache
            .cached_computation("totals", totals(1), &[a.clone(), b.clone()])
            .unwrap();
        // Dependency order does not matter.
        let same: CorpusTotals = cache
            .cached_computation("totals", totals(2), &[b.clone(), a.clone()])
            .unwrap();
        assert_eq!(first, same);

        let fewer: CorpusTotals = cache
            .cached_computation("totals", totals(3), &[a.clone()])
            .unwrap();
        assert_eq!(fewer.total_tokens, 3);
    }

    #[test]
    fn test_records_share_allocation_on_hit() {
        let cache = DerivedStateCache::in_memory();
        let file = log_file("a", 10);
        let first = cache.records(&file, || Ok(Vec::new())).unwrap();
        let second = cache.records(&file, || Ok(Vec::new())).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_clear_and_invalidate() {
        let cache = DerivedStateCache::in_memory();
        let file = log_file("a", 10);
        cache.token_usage(&file, || Ok(usage(1))).unwrap();
        cache
            .model_info(&file, || Ok(crate::extractor::model_info(&[])))
            .unwrap();

        cache.invalidate(&CacheKey::file(&file, DerivedKind::TokenUsage));
        assert_eq!(cache.stats().entries, 1);
        cache.clear();
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_memory_store_is_shareable_across_threads() {
        let cache = Arc::new(DerivedStateCache::in_memory());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    let file = log_file(&format!("f{i}"), 1);
                    cache.token_usage(&file, || Ok(usage(i))).unwrap().total
                })
            })
            .collect();

        let mut totals: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        totals.sort();
        assert_eq!(totals, vec![0, 1, 2, 3]);
        assert_eq!(cache.stats().entries, 4);
    }
}
