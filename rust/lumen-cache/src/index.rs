//! The persisted metadata table keyed by digest.
//!
//! Every mutation rewrites the whole index file atomically (write-to-temp,
//! rename). That bounds practical cache sizes but makes recovery trivial —
//! a reader either sees the old file in full or the new one in full, never
//! a mix. An in-memory `HashMap<Digest, IndexEntry>` mirrors the file and is
//! the single choke point every other module goes through.

use crate::error::{CacheError, CacheResult};
use crate::hasher::Digest;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Width of the `object_path` field in the on-disk record.
const PATH_FIELD_WIDTH: usize = 256;

/// Total width of one on-disk index record: 16 + 8 + 8 + 4 + 256 + 8.
pub const RECORD_SIZE: usize = 16 + 8 + 8 + 4 + PATH_FIELD_WIDTH + 8;

/// One entry in the index: everything eviction needs to know about a
/// cached artifact, plus where to find its blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub digest: Digest,
    pub last_access: i64,
    pub penultimate_access: i64,
    pub access_count: i32,
    pub object_path: String,
    pub code_size: u64,
}

impl IndexEntry {
    pub fn new(digest: Digest, object_path: String, code_size: u64, now: i64) -> Self {
        IndexEntry {
            digest,
            last_access: now,
            penultimate_access: 0,
            access_count: 1,
            object_path,
            code_size,
        }
    }

    /// Apply the access-time update rule for a hit: the previous
    /// `last_access` becomes `penultimate_access`, `now` becomes the new
    /// `last_access`, and the counter advances. A clock that appears to
    /// have moved backward is not applied: we keep the existing
    /// `last_access` rather than regress it.
    pub fn touch(&mut self, now: i64) {
        if now >= self.last_access {
            self.penultimate_access = self.last_access;
            self.last_access = now;
        }
        self.access_count += 1;
    }

    /// The penultimate-access rank used by LRU-2: an entry
    /// that has never been re-accessed (`access_count == 1`) ranks as if
    /// its penultimate access were time zero, so it is evicted ahead of any
    /// entry that has been reused at all.
    fn eviction_rank(&self) -> (i64, i64, i32, Digest) {
        let penultimate = if self.access_count <= 1 {
            0
        } else {
            self.penultimate_access
        };
        (penultimate, self.last_access, self.access_count, self.digest)
    }

    fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        let mut offset = 0;

        buf[offset..offset + 16].copy_from_slice(&self.digest.0);
        offset += 16;

        buf[offset..offset + 8].copy_from_slice(&self.last_access.to_le_bytes());
        offset += 8;

        buf[offset..offset + 8].copy_from_slice(&self.penultimate_access.to_le_bytes());
        offset += 8;

        buf[offset..offset + 4].copy_from_slice(&self.access_count.to_le_bytes());
        offset += 4;

        let path_bytes = self.object_path.as_bytes();
        let copy_len = path_bytes.len().min(PATH_FIELD_WIDTH - 1);
        buf[offset..offset + copy_len].copy_from_slice(&path_bytes[..copy_len]);
        // Remaining bytes in the path field (including the NUL terminator)
        // are already zero from the buffer initialization.
        offset += PATH_FIELD_WIDTH;

        buf[offset..offset + 8].copy_from_slice(&self.code_size.to_le_bytes());

        buf
    }

    fn decode(buf: &[u8; RECORD_SIZE]) -> CacheResult<Self> {
        let mut offset = 0;

        let mut digest_bytes = [0u8; 16];
        digest_bytes.copy_from_slice(&buf[offset..offset + 16]);
        let digest = Digest(digest_bytes);
        offset += 16;

        let last_access = i64::from_le_bytes(
            buf[offset..offset + 8]
                .try_into()
                .map_err(|_| CacheError::corrupt("truncated last_access field"))?,
        );
        offset += 8;

        let penultimate_access = i64::from_le_bytes(
            buf[offset..offset + 8]
                .try_into()
                .map_err(|_| CacheError::corrupt("truncated penultimate_access field"))?,
        );
        offset += 8;

        let access_count = i32::from_le_bytes(
            buf[offset..offset + 4]
                .try_into()
                .map_err(|_| CacheError::corrupt("truncated access_count field"))?,
        );
        offset += 4;

        let path_field = &buf[offset..offset + PATH_FIELD_WIDTH];
        let nul_pos = path_field.iter().position(|&b| b == 0).unwrap_or(path_field.len());
        let object_path = std::str::from_utf8(&path_field[..nul_pos])
            .map_err(|_| CacheError::corrupt("non-ASCII object_path field"))?
            .to_string();
        offset += PATH_FIELD_WIDTH;

        let code_size = u64::from_le_bytes(
            buf[offset..offset + 8]
                .try_into()
                .map_err(|_| CacheError::corrupt("truncated code_size field"))?,
        );

        Ok(IndexEntry {
            digest,
            last_access,
            penultimate_access,
            access_count,
            object_path,
            code_size,
        })
    }
}

/// The in-memory mirror of the on-disk index, keyed by digest for O(1)
/// lookup (a linear scan would be fine at the expected scale; we keep a
/// map since it costs nothing extra to maintain).
pub struct Index {
    index_path: PathBuf,
    entries: HashMap<Digest, IndexEntry>,
}

impl Index {
    /// Load the index file at `index_path`, or start empty if it does not
    /// exist. A file whose length is not an exact multiple of the record
    /// size is corrupt and is treated as if absent — the caller
    /// sees an empty index and the next `save` rewrites it from scratch.
    pub fn load(index_path: impl Into<PathBuf>) -> CacheResult<Self> {
        let index_path = index_path.into();
        let bytes = match fs::read(&index_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Index {
                    index_path,
                    entries: HashMap::new(),
                })
            }
            Err(e) => return Err(CacheError::IoFailure(e)),
        };

        if bytes.len() % RECORD_SIZE != 0 {
            return Err(CacheError::corrupt(format!(
                "index file length {} is not a multiple of the record size {}",
                bytes.len(),
                RECORD_SIZE
            )));
        }

        let mut entries = HashMap::new();
        for chunk in bytes.chunks_exact(RECORD_SIZE) {
            let record: [u8; RECORD_SIZE] = chunk
                .try_into()
                .expect("chunks_exact guarantees exact record size");
            let entry = IndexEntry::decode(&record)?;
            entries.insert(entry.digest, entry);
        }

        Ok(Index {
            index_path,
            entries,
        })
    }

    /// Build an empty index rooted at `index_path` without reading anything
    /// (used when recovering from a `Corrupt` result).
    pub fn empty(index_path: impl Into<PathBuf>) -> Self {
        Index {
            index_path: index_path.into(),
            entries: HashMap::new(),
        }
    }

    /// Atomically rewrite the whole index file from the in-memory entries.
    pub fn save(&self) -> CacheResult<()> {
        let mut bytes = Vec::with_capacity(self.entries.len() * RECORD_SIZE);
        // Deterministic ordering keeps the on-disk file stable for
        // otherwise-unchanged entries, which is friendly to anyone diffing
        // the cache directory between runs.
        let mut sorted: Vec<&IndexEntry> = self.entries.values().collect();
        sorted.sort_by_key(|e| e.digest);
        for entry in sorted {
            bytes.extend_from_slice(&entry.encode());
        }

        let tmp_path = Self::tmp_path(&self.index_path);
        if let Err(e) = fs::write(&tmp_path, &bytes) {
            let _ = fs::remove_file(&tmp_path);
            return Err(CacheError::IoFailure(e));
        }
        fs::rename(&tmp_path, &self.index_path).map_err(CacheError::IoFailure)
    }

    fn tmp_path(index_path: &Path) -> PathBuf {
        let mut name = index_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        index_path.with_file_name(name)
    }

    pub fn find(&self, digest: &Digest) -> Option<&IndexEntry> {
        self.entries.get(digest)
    }

    pub fn upsert(&mut self, entry: IndexEntry) {
        self.entries.insert(entry.digest, entry);
    }

    /// Apply the access-time update rule to an existing entry. No-op if the
    /// digest is unknown (the caller decides whether that is noteworthy).
    pub fn touch(&mut self, digest: &Digest, now: i64) {
        if let Some(entry) = self.entries.get_mut(digest) {
            entry.touch(now);
        }
    }

    /// Drop all listed digests from the in-memory table. Does not persist;
    /// call [`Index::save`] afterward.
    pub fn remove_many(&mut self, digests: &[Digest]) {
        for digest in digests {
            self.entries.remove(digest);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of every entry's `code_size`. Panics on overflow rather than
    /// wrapping silently — an accounting invariant violation must abort,
    /// not be masked.
    pub fn total_size(&self) -> u64 {
        self.entries.values().map(|e| e.code_size).fold(0u64, |acc, size| {
            acc.checked_add(size)
                .expect("invariant violated: total_size overflowed u64")
        })
    }

    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    pub fn all_digests(&self) -> Vec<Digest> {
        self.entries.keys().copied().collect()
    }

    /// Rank every entry by the LRU-2 order (ascending — oldest first) and
    /// return the digests of the `n` entries that should be evicted first.
    pub fn lru2_candidates(&self, n: usize) -> Vec<Digest> {
        let mut ranked: Vec<&IndexEntry> = self.entries.values().collect();
        ranked.sort_by_key(|e| e.eviction_rank());
        ranked.into_iter().take(n).map(|e| e.digest).collect()
    }

    /// Digests of every entry whose `last_access` is more than
    /// `timeout_seconds` behind `now`.
    pub fn timed_out(&self, now: i64, timeout_seconds: i64) -> Vec<Digest> {
        self.entries
            .values()
            .filter(|e| now.saturating_sub(e.last_access) > timeout_seconds)
            .map(|e| e.digest)
            .collect()
    }
}
