//! Port definition for the persistent key-value byte store behind the disk cache.

use std::io::{Read, Write};
use std::path::Path;

use crate::domain::errors::StoreError;

/// Result type for byte store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Versioned, directory-backed store holding a fixed number of blobs per key.
///
/// Writes are transactional through [`StoreEditor`]: nothing written to an editor
/// is visible to readers until `commit` returns, and `abort` (or dropping the
/// editor) leaves the previous value untouched.
pub trait ByteStore: Send + Sync {
    /// Opens an editor for `key`. Returns `None` while another editor holds the key.
    fn edit(&self, key: &str) -> StoreResult<Option<Box<dyn StoreEditor>>>;

    /// Opens a read snapshot of `key`. Returns `None` if the key is absent.
    fn get(&self, key: &str) -> StoreResult<Option<Box<dyn StoreSnapshot>>>;

    /// Removes `key`. Returns whether anything was removed.
    fn remove(&self, key: &str) -> StoreResult<bool>;

    /// Persists pending bookkeeping and enforces the size limit.
    fn flush(&self) -> StoreResult<()>;

    /// Deletes every entry.
    fn delete(&self) -> StoreResult<()>;

    /// Total bytes of committed entries.
    fn size(&self) -> u64;

    /// Configured maximum size in bytes.
    fn max_size(&self) -> u64;

    /// Directory backing the store, if any.
    fn directory(&self) -> Option<&Path> {
        None
    }
}

/// Write transaction for a single key.
pub trait StoreEditor: Send {
    /// Returns the output stream for `slot`, creating it on first use.
    fn output(&mut self, slot: usize) -> StoreResult<&mut dyn Write>;

    /// Atomically publishes everything written.
    fn commit(self: Box<Self>) -> StoreResult<()>;

    /// Discards everything written.
    fn abort(self: Box<Self>) -> StoreResult<()>;
}

/// Read view of a single key. Closing is dropping.
pub trait StoreSnapshot: Send {
    /// Returns the input stream for `slot`.
    fn input(&mut self, slot: usize) -> StoreResult<&mut dyn Read>;

    /// Reads a whole slot into memory.
    fn read_slot(&mut self, slot: usize) -> StoreResult<Vec<u8>> {
        let mut bytes = Vec::new();
        self.input(slot)?.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

/// Returns true if `key` is acceptable to a byte store.
#[must_use]
pub fn is_valid_key(key: &str) -> bool {
    (1..=120).contains(&key.len())
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
}


#[cfg(test)]
mod tests {
    use super::mock::MemoryByteStore;
    use super::*;

    #[test]
    fn test_key_validation() {
        assert!(is_valid_key("0123abcdef"));
        assert!(is_valid_key("thumb_01-a"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("UPPER"));
        assert!(!is_valid_key("has space"));
        assert!(!is_valid_key("dots.not.allowed"));
        assert!(!is_valid_key(&"a".repeat(121)));
    }

    #[test]
    fn test_mock_store_commit_and_read() {
        let store = MemoryByteStore::new();
        let mut editor = store.edit("k").unwrap().unwrap();
        editor.output(0).unwrap().write_all(b"hello").unwrap();
        editor.commit().unwrap();

        let mut snapshot = store.get("k").unwrap().unwrap();
        assert_eq!(snapshot.read_slot(0).unwrap(), b"hello");
    }

    #[test]
    fn test_mock_store_single_editor_per_key() {
        let store = MemoryByteStore::new();
        let first = store.edit("k").unwrap();
        assert!(first.is_some());
        assert!(store.edit("k").unwrap().is_none());
        drop(first);
        assert!(store.edit("k").unwrap().is_some());
    }
}
