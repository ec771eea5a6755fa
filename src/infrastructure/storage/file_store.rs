//! Directory-backed byte store with transactional writes and size-bounded LRU trimming.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, trace, warn};

use crate::domain::errors::StoreError;
use crate::domain::ports::{ByteStore, StoreEditor, StoreResult, StoreSnapshot, is_valid_key};

const HEADER_FILE: &str = "store.toml";
const STORE_MAGIC: &str = "asyncloader.store";
const TEMP_SUFFIX: &str = ".tmp";

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
struct StoreHeader {
    magic: String,
    app_version: u32,
    value_count: usize,
}

impl StoreHeader {
    fn new(app_version: u32, value_count: usize) -> Self {
        Self {
            magic: STORE_MAGIC.to_string(),
            app_version,
            value_count,
        }
    }
}

struct StoreState {
    entries: LruCache<String, u64>,
    size: u64,
    editing: HashSet<String>,
}

struct StoreShared {
    directory: PathBuf,
    value_count: usize,
    max_size: u64,
    state: Mutex<StoreState>,
}

impl StoreShared {
    fn slot_path(&self, key: &str, slot: usize) -> PathBuf {
        self.directory.join(format!("{key}.{slot}"))
    }

    fn remove_files(&self, key: &str) {
        for slot in 0..self.value_count {
            let path = self.slot_path(key, slot);
            if let Err(e) = fs::remove_file(&path)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!(path = %path.display(), error = %e, "Failed to remove store file");
            }
        }
    }

    fn trim(&self, state: &mut StoreState) {
        while state.size > self.max_size {
            let Some((key, size)) = state.entries.pop_lru() else {
                break;
            };
            self.remove_files(&key);
            state.size = state.size.saturating_sub(size);
            debug!(key = %key, size, "Evicted entry from byte store");
        }
    }
}

/// Byte store keeping one file per slot under a versioned directory.
///
/// Edits write to temporary files in the same directory and are renamed into
/// place on commit, so readers never observe a partially written value.
pub struct FileByteStore {
    shared: Arc<StoreShared>,
}

impl FileByteStore {
    /// Opens (or creates) a store in `directory`.
    ///
    /// Entries written under a different `app_version` or slot count are
    /// discarded, as are temporary files left behind by interrupted edits.
    ///
    /// # Errors
    /// Returns error if the directory or header cannot be created or read.
    pub fn open(
        directory: impl Into<PathBuf>,
        app_version: u32,
        value_count: usize,
        max_size: u64,
    ) -> StoreResult<Self> {
        let directory = directory.into();
        let value_count = value_count.max(1);
        fs::create_dir_all(&directory)?;

        let expected = StoreHeader::new(app_version, value_count);
        let header_path = directory.join(HEADER_FILE);
        match read_header(&header_path) {
            Some(header) if header == expected => {}
            found => {
                if let Some(header) = found {
                    info!(
                        dir = %directory.display(),
                        old_version = header.app_version,
                        new_version = app_version,
                        "Byte store format changed, discarding entries"
                    );
                }
                wipe_directory(&directory)?;
                write_header(&directory, &expected)?;
            }
        }

        let (entries, size) = scan_entries(&directory, value_count)?;
        debug!(
            dir = %directory.display(),
            entries = entries.len(),
            size,
            max_size,
            "Opened byte store"
        );

        let shared = Arc::new(StoreShared {
            directory,
            value_count,
            max_size,
            state: Mutex::new(StoreState {
                entries,
                size,
                editing: HashSet::new(),
            }),
        });
        {
            let mut state = shared.state.lock();
            shared.trim(&mut state);
        }

        Ok(Self { shared })
    }

    /// Returns the number of committed entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    /// Returns true if the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for FileByteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileByteStore")
            .field("directory", &self.shared.directory)
            .field("value_count", &self.shared.value_count)
            .field("max_size", &self.shared.max_size)
            .finish_non_exhaustive()
    }
}

fn check_key(key: &str) -> StoreResult<()> {
    if is_valid_key(key) {
        Ok(())
    } else {
        Err(StoreError::invalid_key(key))
    }
}

impl ByteStore for FileByteStore {
    fn edit(&self, key: &str) -> StoreResult<Option<Box<dyn StoreEditor>>> {
        check_key(key)?;
        let mut state = self.shared.state.lock();
        if !state.editing.insert(key.to_string()) {
            trace!(key = %key, "Store entry busy");
            return Ok(None);
        }
        Ok(Some(Box::new(FileEditor {
            shared: self.shared.clone(),
            key: key.to_string(),
            slots: (0..self.shared.value_count).map(|_| None).collect(),
            done: false,
        })))
    }

    fn get(&self, key: &str) -> StoreResult<Option<Box<dyn StoreSnapshot>>> {
        check_key(key)?;
        let mut state = self.shared.state.lock();
        if state.entries.get(key).is_none() {
            return Ok(None);
        }

        let mut readers = Vec::with_capacity(self.shared.value_count);
        for slot in 0..self.shared.value_count {
            match File::open(self.shared.slot_path(key, slot)) {
                Ok(file) => readers.push(BufReader::new(file)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(key = %key, slot, "Store file vanished, dropping entry");
                    if let Some(size) = state.entries.pop(key) {
                        state.size = state.size.saturating_sub(size);
                    }
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Some(Box::new(FileSnapshot { readers })))
    }

    fn remove(&self, key: &str) -> StoreResult<bool> {
        check_key(key)?;
        let mut state = self.shared.state.lock();
        if state.editing.contains(key) {
            return Ok(false);
        }
        let Some(size) = state.entries.pop(key) else {
            return Ok(false);
        };
        self.shared.remove_files(key);
        state.size = state.size.saturating_sub(size);
        Ok(true)
    }

    fn flush(&self) -> StoreResult<()> {
        let mut state = self.shared.state.lock();
        self.shared.trim(&mut state);
        Ok(())
    }

    fn delete(&self) -> StoreResult<()> {
        let mut state = self.shared.state.lock();
        let keys: Vec<String> = state.entries.iter().map(|(key, _)| key.clone()).collect();
        for key in &keys {
            self.shared.remove_files(key);
        }
        state.entries.clear();
        state.size = 0;
        debug!(removed = keys.len(), "Deleted all byte store entries");
        Ok(())
    }

    fn size(&self) -> u64 {
        self.shared.state.lock().size
    }

    fn max_size(&self) -> u64 {
        self.shared.max_size
    }

    fn directory(&self) -> Option<&Path> {
        Some(&self.shared.directory)
    }
}

struct FileEditor {
    shared: Arc<StoreShared>,
    key: String,
    slots: Vec<Option<BufWriter<NamedTempFile>>>,
    done: bool,
}

impl FileEditor {
    fn publish(&mut self) -> StoreResult<()> {
        let mut staged = Vec::with_capacity(self.slots.len());
        for (slot, writer) in self.slots.iter_mut().enumerate() {
            let Some(writer) = writer.take() else {
                continue;
            };
            let temp = writer.into_inner().map_err(|e| StoreError::Io(e.into_error()))?;
            temp.as_file().sync_all()?;
            let len = temp.as_file().metadata()?.len();
            staged.push((slot, temp, len));
        }

        // Files are renamed into place under the lock so a concurrent trim
        // cannot remove them between the rename and the size bookkeeping.
        let mut state = self.shared.state.lock();
        let is_new = !state.entries.contains(&self.key);
        if is_new && staged.len() < self.shared.value_count {
            return Err(StoreError::IncompleteEdit {
                key: self.key.clone(),
            });
        }

        let kept: u64 = (0..self.shared.value_count)
            .filter(|slot| !staged.iter().any(|(staged_slot, _, _)| staged_slot == slot))
            .filter_map(|slot| fs::metadata(self.shared.slot_path(&self.key, slot)).ok())
            .map(|meta| meta.len())
            .sum();
        let size = kept + staged.iter().map(|(_, _, len)| len).sum::<u64>();
        if size > self.shared.max_size {
            debug!(
                key = %self.key,
                size,
                max_size = self.shared.max_size,
                "Entry exceeds store capacity"
            );
            return Err(StoreError::too_large(&self.key, size, self.shared.max_size));
        }

        for (slot, temp, _) in staged {
            temp.persist(self.shared.slot_path(&self.key, slot))
                .map_err(|e| StoreError::Io(e.error))?;
        }

        let previous = state.entries.put(self.key.clone(), size).unwrap_or(0);
        state.size = state.size.saturating_sub(previous) + size;
        debug!(key = %self.key, size, total = state.size, "Committed store entry");
        if state.size > self.shared.max_size {
            self.shared.trim(&mut state);
        }
        Ok(())
    }

    fn finish(&mut self) {
        self.done = true;
        self.slots.clear();
        self.shared.state.lock().editing.remove(&self.key);
    }
}

impl StoreEditor for FileEditor {
    fn output(&mut self, slot: usize) -> StoreResult<&mut dyn Write> {
        let count = self.slots.len();
        if slot >= count {
            return Err(StoreError::SlotOutOfRange { slot, count });
        }
        if self.slots[slot].is_none() {
            let temp = tempfile::Builder::new()
                .prefix(&format!("{}.", self.key))
                .suffix(TEMP_SUFFIX)
                .tempfile_in(&self.shared.directory)?;
            self.slots[slot] = Some(BufWriter::new(temp));
        }
        match self.slots[slot].as_mut() {
            Some(writer) => Ok(writer),
            None => Err(StoreError::SlotOutOfRange { slot, count }),
        }
    }

    fn commit(mut self: Box<Self>) -> StoreResult<()> {
        let result = self.publish();
        self.finish();
        result
    }

    fn abort(mut self: Box<Self>) -> StoreResult<()> {
        trace!(key = %self.key, "Aborted store edit");
        self.finish();
        Ok(())
    }
}

impl Drop for FileEditor {
    fn drop(&mut self) {
        if !self.done {
            self.finish();
        }
    }
}

struct FileSnapshot {
    readers: Vec<BufReader<File>>,
}

impl StoreSnapshot for FileSnapshot {
    fn input(&mut self, slot: usize) -> StoreResult<&mut dyn Read> {
        let count = self.readers.len();
        self.readers
            .get_mut(slot)
            .map(|reader| reader as &mut dyn Read)
            .ok_or(StoreError::SlotOutOfRange { slot, count })
    }
}

fn read_header(path: &Path) -> Option<StoreHeader> {
    let content = fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

fn write_header(directory: &Path, header: &StoreHeader) -> StoreResult<()> {
    let content = toml::to_string(header).map_err(|e| StoreError::header(e.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix("store.")
        .suffix(TEMP_SUFFIX)
        .tempfile_in(directory)?;
    temp.write_all(content.as_bytes())?;
    temp.as_file().sync_all()?;
    temp.persist(directory.join(HEADER_FILE))
        .map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

/// Matches `<key>.<slot>` value files, whatever the slot count they were written with.
fn is_value_file(name: &str) -> bool {
    name.rsplit_once('.').is_some_and(|(key, slot)| {
        is_valid_key(key) && !slot.is_empty() && slot.bytes().all(|b| b.is_ascii_digit())
    })
}

/// Matches `<key>.<random>.tmp` files left by edits and header writes.
fn is_temp_file(name: &str) -> bool {
    name.strip_suffix(TEMP_SUFFIX)
        .and_then(|stem| stem.rsplit_once('.'))
        .is_some_and(|(key, random)| {
            is_valid_key(key)
                && !random.is_empty()
                && random.bytes().all(|b| b.is_ascii_alphanumeric())
        })
}

/// Removes the files this store writes. Anything else in the directory is left alone.
fn wipe_directory(directory: &Path) -> StoreResult<()> {
    for entry in fs::read_dir(directory)? {
        let path = entry?.path();
        let owned = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| is_value_file(name) || is_temp_file(name));
        if owned && path.is_file() {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

struct ScannedEntry {
    slots: Vec<bool>,
    size: u64,
    modified: SystemTime,
}

fn scan_entries(directory: &Path, value_count: usize) -> StoreResult<(LruCache<String, u64>, u64)> {
    let mut found: HashMap<String, ScannedEntry> = HashMap::new();

    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name == HEADER_FILE {
            continue;
        }
        if is_temp_file(name) {
            trace!(path = %path.display(), "Removing abandoned temp file");
            let _ = fs::remove_file(&path);
            continue;
        }
        let Some((key, slot)) = name.rsplit_once('.') else {
            continue;
        };
        let Ok(slot) = slot.parse::<usize>() else {
            continue;
        };
        if slot >= value_count || !is_valid_key(key) {
            continue;
        }
        let meta = entry.metadata()?;
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let scanned = found.entry(key.to_string()).or_insert_with(|| ScannedEntry {
            slots: vec![false; value_count],
            size: 0,
            modified: SystemTime::UNIX_EPOCH,
        });
        scanned.slots[slot] = true;
        scanned.size += meta.len();
        scanned.modified = scanned.modified.max(modified);
    }

    let mut complete: Vec<(String, ScannedEntry)> = Vec::with_capacity(found.len());
    for (key, scanned) in found {
        if scanned.slots.iter().all(|present| *present) {
            complete.push((key, scanned));
        } else {
            debug!(key = %key, "Removing incomplete store entry");
            for slot in 0..value_count {
                let _ = fs::remove_file(directory.join(format!("{key}.{slot}")));
            }
        }
    }
    complete.sort_by_key(|(_, scanned)| scanned.modified);

    let mut entries = LruCache::unbounded();
    let mut size = 0u64;
    for (key, scanned) in complete {
        size += scanned.size;
        entries.put(key, scanned.size);
    }
    Ok((entries, size))
}
