//! The public cache facade: orchestrates the hasher, object store, and
//! index, enforces the LRU-2 eviction policy, and keeps statistics
//! consistent across every lookup/store/eviction path.
//!
//! Not inherently thread-safe at the facade level per se — it is made safe
//! by protecting the index and stats behind a single internal mutex. Blob
//! I/O happens while the lock is held; it would be legal to release it once
//! the target path is known, but the index mutation that follows every blob
//! write needs the same lock anyway, so there is no throughput to gain by
//! splitting it for the access patterns this cache expects (a handful of
//! compiler invocations, not a web server).

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{CacheError, CacheResult};
use crate::hasher::{hash, Digest};
use crate::index::{Index, IndexEntry};
use crate::object_store::ObjectStore;
use crate::stats::{CacheStats, Stats};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

struct Inner {
    initialized: bool,
    enabled: bool,
    max_entries: u64,
    max_size_bytes: u64,
    timeout_seconds: u64,
    index: Index,
    object_store: Option<ObjectStore>,
    stats: Stats,
}

pub struct Cache {
    objects_dir: PathBuf,
    index_path: PathBuf,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl Cache {
    /// Build a cache from `config`. Nothing touches the filesystem until
    /// [`Cache::init`] is called.
    pub fn new(config: Config) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Same as [`Cache::new`] but with an injected clock, for deterministic
    /// tests of timeout sweeps and LRU-2 tie-breaks. The caller keeps its
    /// own handle on the `Arc` to advance a [`ManualClock`](crate::clock::test_support::ManualClock)
    /// after construction.
    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Self {
        let objects_dir = config.objects_dir();
        let index_path = config.index_path();
        Cache {
            objects_dir: objects_dir.clone(),
            index_path: index_path.clone(),
            clock,
            inner: Mutex::new(Inner {
                initialized: false,
                enabled: config.enabled,
                max_entries: config.max_entries,
                max_size_bytes: config.max_size_bytes,
                timeout_seconds: config.timeout_seconds,
                index: Index::empty(index_path),
                object_store: None,
                stats: Stats::new(),
            }),
        }
    }

    /// Create the cache directories, load (or reset) the index, and zero
    /// the counters. Fails only if the directories cannot be created.
    pub fn init(&self) -> CacheResult<()> {
        let object_store = ObjectStore::new(&self.objects_dir)?;
        let index = match Index::load(&self.index_path) {
            Ok(index) => index,
            Err(CacheError::Corrupt(_)) => Index::empty(self.index_path.clone()),
            Err(e) => return Err(e),
        };

        let mut inner = self.inner.lock().unwrap();
        let mut stats = Stats::new();
        stats.total_entries = index.len() as u64;
        stats.total_size = index.total_size();
        inner.index = index;
        inner.object_store = Some(object_store);
        inner.stats = stats;
        inner.initialized = true;
        inner.enabled = true;
        Ok(())
    }

    /// Mark the cache uninitialized. Does not touch on-disk state; a later
    /// `init()` picks the index back up from disk.
    pub fn cleanup(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.initialized = false;
    }

    /// Look up `source`'s compiled artifact. A miss is returned for a
    /// disabled/uninitialized cache, an absent digest, or any blob read
    /// error — never fatal.
    pub fn lookup(&self, source: &[u8]) -> Option<Vec<u8>> {
        let digest = hash(source);
        let mut inner = self.inner.lock().unwrap();
        if !inner.initialized {
            // No stats exist yet for a facade that was never initialized.
            return None;
        }
        if !inner.enabled {
            // A disabled-but-initialized cache still counts: it is a miss
            // like any other, not an absence of stats (§7: "Disabled ...
            // translates to a miss on lookup").
            inner.stats.misses += 1;
            return None;
        }

        let bytes = inner
            .object_store
            .as_ref()
            .and_then(|store| store.get(&digest));

        match bytes {
            Some(bytes) => {
                let now = self.clock.now_secs();
                inner.index.touch(&digest, now);
                // Best-effort persist: a failed save leaves the in-memory
                // touch applied and the on-disk file stale until the next
                // successful save, which is tolerated.
                let _ = inner.index.save();
                inner.stats.hits += 1;
                Some(bytes)
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Persist `code` under the digest of `source`. Fails only if the
    /// cache is disabled/uninitialized or an I/O error occurs; a failed
    /// store never leaves an orphan blob or a dangling index entry.
    pub fn store(&self, source: &[u8], code: &[u8]) -> CacheResult<()> {
        let digest = hash(source);
        let mut inner = self.inner.lock().unwrap();
        if !inner.initialized || !inner.enabled {
            return Err(CacheError::Disabled);
        }

        let now = self.clock.now_secs();
        let object_store = inner
            .object_store
            .as_ref()
            .expect("an initialized cache always has an object store");
        let object_path = object_store.path_for(&digest).to_string_lossy().into_owned();

        if let Err(e) = object_store.put(&digest, code) {
            return Err(CacheError::IoFailure(e));
        }

        let entry = match inner.index.find(&digest) {
            Some(existing) => {
                let mut updated = existing.clone();
                updated.code_size = code.len() as u64;
                updated.object_path = object_path;
                updated.touch(now);
                updated
            }
            None => IndexEntry::new(digest, object_path, code.len() as u64, now),
        };
        inner.index.upsert(entry);

        if let Err(e) = inner.index.save() {
            // Roll back: an index that cannot be persisted must not leave
            // a blob on disk with no corresponding entry.
            inner.index.remove_many(&[digest]);
            if let Some(object_store) = inner.object_store.as_ref() {
                object_store.delete(&digest);
            }
            return Err(e);
        }

        inner.stats.stores += 1;
        recompute_totals(&mut inner);
        self.run_eviction_triggers(&mut inner);
        Ok(())
    }

    /// Delete every object blob and empty the index. Fails only if the
    /// cache has not been initialized.
    pub fn clear(&self) -> CacheResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.initialized {
            return Err(CacheError::Disabled);
        }

        let digests = inner.index.all_digests();
        let removed = digests.len() as u64;
        if let Some(object_store) = inner.object_store.as_ref() {
            for digest in &digests {
                object_store.delete(digest);
            }
        }
        inner.index.remove_many(&digests);
        inner.index.save()?;
        inner.stats.on_clear(removed);
        Ok(())
    }

    pub fn get_stats(&self) -> CacheStats {
        self.inner.lock().unwrap().stats.snapshot()
    }

    pub fn set_enabled(&self, enabled: bool) -> CacheResult<()> {
        self.with_initialized_inner(|inner| inner.enabled = enabled)
    }

    pub fn set_max_entries(&self, max_entries: u64) -> CacheResult<()> {
        self.with_initialized_inner(|inner| inner.max_entries = max_entries)
    }

    pub fn set_max_size_bytes(&self, max_size_bytes: u64) -> CacheResult<()> {
        self.with_initialized_inner(|inner| inner.max_size_bytes = max_size_bytes)
    }

    pub fn set_timeout_seconds(&self, timeout_seconds: u64) -> CacheResult<()> {
        self.with_initialized_inner(|inner| inner.timeout_seconds = timeout_seconds)
    }

    fn with_initialized_inner(&self, f: impl FnOnce(&mut Inner)) -> CacheResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.initialized {
            return Err(CacheError::Disabled);
        }
        f(&mut inner);
        Ok(())
    }

    /// Evict the `n` lowest-ranked entries under LRU-2.
    /// Returns the number actually evicted.
    pub fn evict_lru2(&self, n: usize) -> usize {
        let mut inner = self.inner.lock().unwrap();
        self.evict_lru2_locked(&mut inner, n)
    }

    /// Evict every entry whose `last_access` is older than the configured
    /// `timeout_seconds`. Returns the number actually evicted.
    pub fn evict_timeout(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        self.evict_timeout_locked(&mut inner)
    }

    fn evict_lru2_locked(&self, inner: &mut Inner, n: usize) -> usize {
        if !inner.initialized || n == 0 {
            return 0;
        }
        let candidates = inner.index.lru2_candidates(n);
        self.evict_digests_locked(inner, &candidates)
    }

    fn evict_timeout_locked(&self, inner: &mut Inner) -> usize {
        if !inner.initialized || inner.timeout_seconds == 0 {
            return 0;
        }
        let now = self.clock.now_secs();
        let digests = inner.index.timed_out(now, inner.timeout_seconds as i64);
        self.evict_digests_locked(inner, &digests)
    }

    fn evict_digests_locked(&self, inner: &mut Inner, digests: &[Digest]) -> usize {
        if digests.is_empty() {
            return 0;
        }
        if let Some(object_store) = inner.object_store.as_ref() {
            for digest in digests {
                object_store.delete(digest);
            }
        }
        inner.index.remove_many(digests);
        let _ = inner.index.save();
        inner.stats.evictions += digests.len() as u64;
        recompute_totals(inner);
        digests.len()
    }

    /// Run the post-store eviction sweeps: an entries-cap sweep, a
    /// size-cap sweep, and (if configured) an age-based timeout sweep,
    /// in that order.
    fn run_eviction_triggers(&self, inner: &mut Inner) {
        if inner.max_entries > 0 {
            while inner.index.len() as u64 > inner.max_entries {
                let batch = batch_size(inner.max_entries);
                if self.evict_lru2_locked(inner, batch) == 0 {
                    break;
                }
            }
        }
        if inner.max_size_bytes > 0 {
            while inner.index.total_size() > inner.max_size_bytes {
                let batch = batch_size(inner.max_entries);
                if self.evict_lru2_locked(inner, batch) == 0 {
                    break;
                }
            }
        }
        if inner.timeout_seconds > 0 {
            self.evict_timeout_locked(inner);
        }
    }
}

fn recompute_totals(inner: &mut Inner) {
    inner.stats.total_entries = inner.index.len() as u64;
    inner.stats.total_size = inner.index.total_size();
}

/// Eviction batch size for the entries/size cap sweeps: `max_entries / 10`,
/// at least 1. When `max_entries` itself is unlimited
/// (0) but a size cap still tripped the sweep, fall back to evicting one
/// entry at a time.
fn batch_size(max_entries: u64) -> usize {
    if max_entries > 0 {
        (max_entries / 10).max(1) as usize
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::ManualClock;
    use std::fs;

    fn temp_cache(label: &str) -> (Cache, PathBuf) {
        let root = std::env::temp_dir().join(format!(
            "lumen-cache-facade-test-{}-{}",
            label,
            uuid::Uuid::new_v4()
        ));
        let cache = Cache::new(Config::with_cache_root(&root));
        (cache, root)
    }

    fn temp_cache_with_clock(label: &str, clock: Arc<ManualClock>) -> (Cache, PathBuf) {
        let root = std::env::temp_dir().join(format!(
            "lumen-cache-facade-test-{}-{}",
            label,
            uuid::Uuid::new_v4()
        ));
        let cache = Cache::with_clock(Config::with_cache_root(&root), clock);
        (cache, root)
    }

    #[test]
    fn round_trip_scenario() {
        let (cache, root) = temp_cache("round-trip");
        cache.init().unwrap();
        cache
            .store(b"int main(){return 0;}", &[0x01, 0x02, 0x03])
            .unwrap();
        let result = cache.lookup(b"int main(){return 0;}");
        assert_eq!(result, Some(vec![0x01, 0x02, 0x03]));

        let stats = cache.get_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.stores, 1);
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.total_size, 3);
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn miss_then_hit_scenario() {
        let (cache, root) = temp_cache("miss-then-hit");
        cache.init().unwrap();
        assert_eq!(cache.lookup(b"x"), None);
        cache.store(b"x", &[0xAA]).unwrap();
        assert_eq!(cache.lookup(b"x"), Some(vec![0xAA]));

        let stats = cache.get_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 0.5);
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn content_addressing_does_not_collide() {
        let (cache, root) = temp_cache("content-addressing");
        cache.init().unwrap();
        cache.store(b"a", &[0x01]).unwrap();
        cache.store(b"b", &[0x02]).unwrap();
        assert_eq!(cache.lookup(b"a"), Some(vec![0x01]));
        assert_eq!(cache.lookup(b"b"), Some(vec![0x02]));
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn lru2_eviction_scenario() {
        // §4.4.2 fires the entries-cap sweep *at the store that crosses the
        // cap*, not later — so a freshly stored entry with no access
        // history of its own is ranked against whatever else is in the
        // index at that exact moment. With `max_entries = 3`, the 4th store
        // (s4) immediately pushes `total_entries` to 4 and trips the sweep
        // before s1 is ever looked up. At that instant s1..s4 all have
        // `access_count == 1` (`penultimate_access` ranks as 0 for all of
        // them per §4.4.1), so the tie-break falls through to
        // `last_access` ascending and s1 — stored first — is evicted right
        // there, never s4.
        //
        // To exercise the tie-break deliberately rather than by accident,
        // s2/s3 build real access history *before* the cap is next
        // crossed, while s4 does not. That makes s4 the lowest-ranked
        // never-reaccessed entry when s5's store trips the sweep a second
        // time, and s4 is evicted then. Surviving set: {s2, s3, s5}.
        let clock = Arc::new(ManualClock::new(0));
        let (cache, root) = temp_cache_with_clock("lru2", clock.clone());
        cache.init().unwrap();
        cache.set_max_entries(3).unwrap();

        clock.advance(1);
        cache.store(b"s1", &[1]).unwrap();
        clock.advance(1);
        cache.store(b"s2", &[2]).unwrap();
        clock.advance(1);
        cache.store(b"s3", &[3]).unwrap();
        clock.advance(1);
        // Crosses the cap (4 > 3): s1 is evicted immediately, before it is
        // ever looked up.
        cache.store(b"s4", &[4]).unwrap();
        assert_eq!(cache.lookup(b"s1"), None);

        clock.advance(1);
        cache.lookup(b"s2");
        clock.advance(1);
        cache.lookup(b"s2");
        clock.advance(1);
        cache.lookup(b"s3");
        // s4 is never touched again after its store.

        clock.advance(1);
        // Crosses the cap again: s2/s3 now carry real access history
        // (penultimate_access > 0), so the untouched s4 ranks lowest and is
        // evicted ahead of the just-stored s5.
        cache.store(b"s5", &[5]).unwrap();

        assert_eq!(cache.lookup(b"s4"), None);
        assert_eq!(cache.lookup(b"s2"), Some(vec![2]));
        assert_eq!(cache.lookup(b"s3"), Some(vec![3]));
        assert_eq!(cache.lookup(b"s5"), Some(vec![5]));

        let stats = cache.get_stats();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.evictions, 2);
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn timeout_sweep_scenario() {
        let clock = Arc::new(ManualClock::new(0));
        let (cache, root) = temp_cache_with_clock("timeout", clock.clone());
        cache.init().unwrap();
        cache.set_timeout_seconds(1).unwrap();

        cache.store(b"k", &[0xFF]).unwrap();
        // Advance the clock past the timeout window, then trigger the
        // sweep via another store (the sweep runs after every store).
        clock.advance(2);
        cache.store(b"m", &[0xEE]).unwrap();

        assert_eq!(cache.lookup(b"k"), None);
        assert_eq!(cache.lookup(b"m"), Some(vec![0xEE]));
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn clear_resets_everything() {
        let (cache, root) = temp_cache("clear");
        cache.init().unwrap();
        for i in 0..5u8 {
            cache.store(&[i], &[i]).unwrap();
        }
        cache.clear().unwrap();

        let stats = cache.get_stats();
        assert_eq!(stats.total_entries, 0);
        assert_eq!(stats.total_size, 0);
        assert!(fs::read_dir(root.join("objects"))
            .unwrap()
            .next()
            .is_none());
        for i in 0..5u8 {
            assert_eq!(cache.lookup(&[i]), None);
        }
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn lookup_without_prior_store_is_a_miss() {
        let (cache, root) = temp_cache("never-stored");
        cache.init().unwrap();
        assert_eq!(cache.lookup(b"never stored"), None);
        assert_eq!(cache.get_stats().misses, 1);
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn store_fails_and_lookup_stays_a_miss_when_disabled() {
        let (cache, root) = temp_cache("disabled-store");
        cache.init().unwrap();
        cache.set_enabled(false).unwrap();
        assert!(matches!(
            cache.store(b"x", &[1]),
            Err(CacheError::Disabled)
        ));
        assert_eq!(cache.lookup(b"x"), None);
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn operations_before_init_fail_or_miss_cleanly() {
        let (cache, root) = temp_cache("uninitialized");
        assert_eq!(cache.lookup(b"x"), None);
        assert!(matches!(cache.store(b"x", &[1]), Err(CacheError::Disabled)));
        assert!(matches!(cache.clear(), Err(CacheError::Disabled)));
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn hit_rate_law_counts_every_lookup() {
        let (cache, root) = temp_cache("hit-rate-law");
        cache.init().unwrap();
        cache.store(b"a", &[1]).unwrap();
        cache.lookup(b"a");
        cache.lookup(b"missing-1");
        cache.lookup(b"missing-2");
        let stats = cache.get_stats();
        assert_eq!(stats.hits + stats.misses, 3);
        fs::remove_dir_all(&root).unwrap();
    }
}
