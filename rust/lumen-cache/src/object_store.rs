//! Content-addressed blob storage on disk.
//!
//! One file per artifact, named `<hex(digest)>.o` under the objects
//! directory. Writes go to a sibling temp path and are renamed into place so
//! a concurrent reader never observes a partially written blob (the same
//! discipline `CheckpointStore` uses for snapshots).

use crate::hasher::Digest;
use std::fs;
use std::path::{Path, PathBuf};

pub struct ObjectStore {
    objects_dir: PathBuf,
}

impl ObjectStore {
    /// Open (creating if necessary) an object store rooted at `objects_dir`.
    pub fn new(objects_dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let objects_dir = objects_dir.into();
        fs::create_dir_all(&objects_dir)?;
        Ok(ObjectStore { objects_dir })
    }

    pub fn path_for(&self, digest: &Digest) -> PathBuf {
        self.objects_dir.join(format!("{}.o", digest.to_hex()))
    }

    fn tmp_path_for(&self, digest: &Digest) -> PathBuf {
        self.objects_dir.join(format!("{}.o.tmp", digest.to_hex()))
    }

    /// Write `bytes` under `digest`. Atomic with respect to readers: once the
    /// rename completes, any reader that sees the file sees the full
    /// contents. On a short write the partial temp file is removed and the
    /// error is returned without ever renaming it into place.
    pub fn put(&self, digest: &Digest, bytes: &[u8]) -> std::io::Result<()> {
        let tmp = self.tmp_path_for(digest);
        let final_path = self.path_for(digest);
        let result = fs::write(&tmp, bytes).and_then(|_| fs::rename(&tmp, &final_path));
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }

    /// Read the blob for `digest`, or `None` if absent or unreadable.
    pub fn get(&self, digest: &Digest) -> Option<Vec<u8>> {
        fs::read(self.path_for(digest)).ok()
    }

    /// Best-effort removal. Succeeds (as a no-op) if the file is already
    /// absent.
    pub fn delete(&self, digest: &Digest) {
        let _ = fs::remove_file(self.path_for(digest));
    }

    /// List the `.o` filenames (without extension parsing) currently present.
    pub fn list_all(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.objects_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("o") {
                out.push(path);
            }
        }
        Ok(out)
    }

    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::hash;

    fn temp_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "lumen-cache-object-store-test-{}-{}",
            label,
            uuid::Uuid::new_v4()
        ));
        fs::create_dir_all(&dir).expect("temp dir should be created");
        dir
    }

    #[test]
    fn put_then_get_round_trips() {
        let root = temp_dir("round-trip");
        let store = ObjectStore::new(root.join("objects")).unwrap();
        let digest = hash(b"content");
        store.put(&digest, b"payload").unwrap();
        assert_eq!(store.get(&digest), Some(b"payload".to_vec()));
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn get_miss_on_absent_digest() {
        let root = temp_dir("miss");
        let store = ObjectStore::new(root.join("objects")).unwrap();
        let digest = hash(b"never stored");
        assert_eq!(store.get(&digest), None);
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn delete_is_idempotent() {
        let root = temp_dir("delete");
        let store = ObjectStore::new(root.join("objects")).unwrap();
        let digest = hash(b"x");
        store.put(&digest, b"y").unwrap();
        store.delete(&digest);
        store.delete(&digest);
        assert_eq!(store.get(&digest), None);
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn put_leaves_no_tmp_file_behind() {
        let root = temp_dir("no-tmp");
        let store = ObjectStore::new(root.join("objects")).unwrap();
        let digest = hash(b"z");
        store.put(&digest, b"z-bytes").unwrap();
        assert!(!store.tmp_path_for(&digest).exists());
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn list_all_reports_stored_objects() {
        let root = temp_dir("list");
        let store = ObjectStore::new(root.join("objects")).unwrap();
        store.put(&hash(b"a"), b"1").unwrap();
        store.put(&hash(b"b"), b"2").unwrap();
        assert_eq!(store.list_all().unwrap().len(), 2);
        fs::remove_dir_all(&root).unwrap();
    }
}
