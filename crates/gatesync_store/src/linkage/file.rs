//! File-backed linkage store.

use super::table::LinkageTable;
use super::{Linkage, LinkageStore};
use crate::error::{LinkageError, LinkageResult};
use crate::id::{EntityId, RemoteId};
use fs2::FileExt;
use gatesync_codec::{from_snapshot_bytes, to_snapshot_bytes, Record};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Magic bytes opening every journal frame.
const FRAME_MAGIC: [u8; 4] = *b"GSLJ";

/// Magic plus payload length.
const HEADER_SIZE: usize = 8;

const CRC_SIZE: usize = 4;

/// Upper bound on one payload; larger lengths are treated as corruption.
const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// One journal entry.
///
/// Each entry is written as one frame:
///
/// ```text
/// | magic (4) | length (4) | payload (N, CBOR) | crc32 (4) |
/// ```
///
/// The CRC covers the header and the payload.
#[derive(Debug, Serialize, Deserialize)]
enum JournalEntry {
    Put {
        entity_type: String,
        local_id: [u8; 16],
        remote_id: String,
        snapshot: Vec<u8>,
    },
    Delete {
        entity_type: String,
        local_id: [u8; 16],
    },
}

impl JournalEntry {
    fn put(linkage: &Linkage) -> LinkageResult<Self> {
        Ok(JournalEntry::Put {
            entity_type: linkage.entity_type.clone(),
            local_id: *linkage.local_id.as_bytes(),
            remote_id: linkage.remote_id.as_str().to_string(),
            snapshot: to_snapshot_bytes(&linkage.snapshot)?,
        })
    }

    fn apply(self, table: &mut LinkageTable) -> LinkageResult<()> {
        match self {
            JournalEntry::Put {
                entity_type,
                local_id,
                remote_id,
                snapshot,
            } => {
                let remote_id = RemoteId::new(&remote_id)
                    .ok_or_else(|| LinkageError::Corrupted("blank remote id".into()))?;
                table.put(Linkage {
                    entity_type,
                    local_id: EntityId::from_bytes(local_id),
                    remote_id,
                    snapshot: from_snapshot_bytes(&snapshot)?,
                });
            }
            JournalEntry::Delete {
                entity_type,
                local_id,
            } => {
                table.remove(&entity_type, EntityId::from_bytes(local_id));
            }
        }
        Ok(())
    }
}

/// A [`LinkageStore`] persisted to an append-only journal file.
///
/// Every write appends one entry; the table is rebuilt by replaying the
/// journal on open.
///
/// Replay tolerates exactly one kind of damage: an incomplete frame at the
/// end of the file, left by a write interrupted by a crash. That frame is
/// discarded and the file is cut back to the last complete entry. A bad
/// magic, a checksum mismatch or an undecodable payload anywhere else fails
/// the open with [`LinkageError::Corrupted`] and leaves the file untouched.
///
/// The file is locked exclusively while the store is open, so two
/// processes cannot write the same journal.
///
/// # Example
///
/// ```no_run
/// use gatesync_store::{FileLinkageStore, LinkageStore};
/// use std::path::Path;
///
/// let store = FileLinkageStore::open(Path::new("linkage.journal")).unwrap();
/// let rows = store.list("book").unwrap();
/// ```
#[derive(Debug)]
pub struct FileLinkageStore {
    path: PathBuf,
    file: Mutex<File>,
    table: RwLock<LinkageTable>,
    sync_on_write: bool,
}

impl FileLinkageStore {
    /// Opens or creates a journal at the given path and replays it.
    ///
    /// # Errors
    ///
    /// Returns [`LinkageError::Locked`] if another handle holds the journal,
    /// [`LinkageError::Corrupted`] if a complete entry fails validation, or
    /// an I/O error if the file cannot be read.
    pub fn open(path: &Path) -> LinkageResult<Self> {
        let mut file = Self::open_locked(path)?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let mut table = LinkageTable::default();
        let valid_len = Self::replay(&bytes, &mut table)?;
        if valid_len < bytes.len() as u64 {
            warn!(
                path = %path.display(),
                discarded = bytes.len() as u64 - valid_len,
                "discarding incomplete trailing linkage journal entry"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        debug!(path = %path.display(), rows = table.len(), "opened linkage journal");

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            table: RwLock::new(table),
            sync_on_write: true,
        })
    }

    /// Opens a journal, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the journal
    /// cannot be opened.
    pub fn open_with_create_dirs(path: &Path) -> LinkageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Sets whether every write is synced to disk (default: true).
    #[must_use]
    pub fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Returns the path to the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total number of rows across all entity types.
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    /// Returns true if the store has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rewrites the journal so it holds one entry per live row.
    ///
    /// # Errors
    ///
    /// Returns an error if the compacted journal cannot be written.
    pub fn compact(&self) -> LinkageResult<()> {
        let table = self.table.read();
        let mut file = self.file.lock();

        let mut buffer = Vec::new();
        for row in table.rows() {
            Self::encode(&JournalEntry::put(row)?, &mut buffer)?;
        }

        let tmp_path = self.path.with_extension("compact");
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&buffer)?;
            tmp.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        *file = Self::open_locked(&self.path)?;

        debug!(path = %self.path.display(), rows = table.len(), "compacted linkage journal");
        Ok(())
    }

    fn open_locked(path: &Path) -> LinkageResult<File> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.try_lock_exclusive().map_err(|_| LinkageError::Locked)?;
        Ok(file)
    }

    /// Replays entries into `table` and returns the length of the complete
    /// prefix of `bytes`.
    fn replay(bytes: &[u8], table: &mut LinkageTable) -> LinkageResult<u64> {
        let mut offset = 0usize;

        while offset < bytes.len() {
            let rest = &bytes[offset..];

            let magic_len = rest.len().min(FRAME_MAGIC.len());
            if rest[..magic_len] != FRAME_MAGIC[..magic_len] {
                return Err(LinkageError::Corrupted(format!(
                    "invalid entry magic at offset {offset}"
                )));
            }
            if rest.len() < HEADER_SIZE {
                debug!(offset, "incomplete entry header at end of journal");
                break;
            }

            let payload_len = u32::from_le_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;
            if payload_len > MAX_PAYLOAD_SIZE {
                return Err(LinkageError::Corrupted(format!(
                    "entry length {payload_len} out of range at offset {offset}"
                )));
            }
            let payload_end = HEADER_SIZE + payload_len;
            let frame_len = payload_end + CRC_SIZE;
            if rest.len() < frame_len {
                debug!(offset, frame_len, "incomplete entry at end of journal");
                break;
            }

            let stored = u32::from_le_bytes([
                rest[payload_end],
                rest[payload_end + 1],
                rest[payload_end + 2],
                rest[payload_end + 3],
            ]);
            let computed = crc32(&rest[..payload_end]);
            if stored != computed {
                return Err(LinkageError::Corrupted(format!(
                    "checksum mismatch at offset {offset}: expected {stored:#010x}, found {computed:#010x}"
                )));
            }

            let entry: JournalEntry = ciborium::de::from_reader(&rest[HEADER_SIZE..payload_end])
                .map_err(|e| {
                    LinkageError::Corrupted(format!("undecodable entry at offset {offset}: {e}"))
                })?;
            entry.apply(table)?;
            offset += frame_len;
        }

        Ok(offset as u64)
    }

    /// Appends one framed entry to `buffer`.
    fn encode(entry: &JournalEntry, buffer: &mut Vec<u8>) -> LinkageResult<()> {
        let mut payload = Vec::new();
        ciborium::ser::into_writer(entry, &mut payload)
            .map_err(|e| LinkageError::Corrupted(format!("cannot encode entry: {e}")))?;
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(LinkageError::Corrupted(format!(
                "entry of {} bytes exceeds the journal limit",
                payload.len()
            )));
        }
        let payload_len = payload.len() as u32;

        let start = buffer.len();
        buffer.extend_from_slice(&FRAME_MAGIC);
        buffer.extend_from_slice(&payload_len.to_le_bytes());
        buffer.extend_from_slice(&payload);
        let crc = crc32(&buffer[start..]);
        buffer.extend_from_slice(&crc.to_le_bytes());
        Ok(())
    }

    fn append(&self, entry: &JournalEntry) -> LinkageResult<()> {
        let mut buffer = Vec::new();
        Self::encode(entry, &mut buffer)?;

        let mut file = self.file.lock();
        file.seek(SeekFrom::End(0))?;
        file.write_all(&buffer)?;
        file.flush()?;
        if self.sync_on_write {
            file.sync_data()?;
        }
        Ok(())
    }
}

/// CRC-32 (IEEE polynomial).
fn crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut bit = 0;
            while bit < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                bit += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    !data.iter().fold(0xFFFF_FFFF_u32, |crc, &byte| {
        (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize]
    })
}

impl LinkageStore for FileLinkageStore {
    fn find(&self, entity_type: &str, remote_id: &RemoteId) -> LinkageResult<Option<Linkage>> {
        Ok(self.table.read().find(entity_type, remote_id).cloned())
    }

    fn find_by_local(
        &self,
        entity_type: &str,
        local_id: EntityId,
    ) -> LinkageResult<Option<Linkage>> {
        Ok(self.table.read().find_by_local(entity_type, local_id).cloned())
    }

    fn create(&self, linkage: Linkage) -> LinkageResult<()> {
        let mut table = self.table.write();
        table.check_insert(&linkage)?;
        self.append(&JournalEntry::put(&linkage)?)?;
        table.put(linkage);
        Ok(())
    }

    fn update_snapshot(
        &self,
        entity_type: &str,
        local_id: EntityId,
        snapshot: Record,
    ) -> LinkageResult<()> {
        let mut table = self.table.write();
        let mut row = table
            .find_by_local(entity_type, local_id)
            .cloned()
            .ok_or_else(|| LinkageError::NotFound {
                entity_type: entity_type.to_string(),
                local_id,
            })?;
        row.snapshot = snapshot;
        self.append(&JournalEntry::put(&row)?)?;
        table.put(row);
        Ok(())
    }

    fn delete(&self, entity_type: &str, local_id: EntityId) -> LinkageResult<bool> {
        let mut table = self.table.write();
        if table.find_by_local(entity_type, local_id).is_none() {
            return Ok(false);
        }
        self.append(&JournalEntry::Delete {
            entity_type: entity_type.to_string(),
            local_id: *local_id.as_bytes(),
        })?;
        table.remove(entity_type, local_id);
        Ok(true)
    }

    fn list(&self, entity_type: &str) -> LinkageResult<Vec<Linkage>> {
        Ok(self.table.read().list(entity_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatesync_codec::Value;
    use tempfile::tempdir;

    fn rid(s: &str) -> RemoteId {
        RemoteId::new(s).unwrap()
    }

    fn snapshot(title: &str) -> Record {
        let mut record = Record::new();
        record.insert("title", title);
        record.insert("status", "active");
        record
    }

    #[test]
    fn rows_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("linkage.journal");
        let first = EntityId::new();
        let second = EntityId::new();

        {
            let store = FileLinkageStore::open(&path).unwrap();
            store
                .create(Linkage::new("book", first, rid("A"), snapshot("Dune")))
                .unwrap();
            store
                .create(Linkage::new("book", second, rid("B"), snapshot("Emma")))
                .unwrap();
            store
                .update_snapshot("book", first, snapshot("Dune Messiah"))
                .unwrap();
            assert!(store.delete("book", second).unwrap());
        }

        let store = FileLinkageStore::open(&path).unwrap();
        assert_eq!(store.len(), 1);
        let row = store.find("book", &rid("A")).unwrap().unwrap();
        assert_eq!(row.local_id, first);
        assert_eq!(row.snapshot.get("title"), Some(&Value::from("Dune Messiah")));
        assert!(row.snapshot.same_fields(&snapshot("Dune Messiah")));
        assert!(store.find("book", &rid("B")).unwrap().is_none());
    }

    #[test]
    fn journal_is_locked_while_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("linkage.journal");

        let _store = FileLinkageStore::open(&path).unwrap();
        assert!(matches!(
            FileLinkageStore::open(&path),
            Err(LinkageError::Locked)
        ));
    }

    #[test]
    fn torn_tail_is_discarded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("linkage.journal");
        let local = EntityId::new();

        {
            let store = FileLinkageStore::open(&path).unwrap();
            store
                .create(Linkage::new("book", local, rid("A"), snapshot("Dune")))
                .unwrap();
        }
        let intact_len = std::fs::metadata(&path).unwrap().len();

        // Simulate a crash in the middle of the next append
        let mut frame = Vec::new();
        let next = Linkage::new("book", EntityId::new(), rid("B"), snapshot("Emma"));
        FileLinkageStore::encode(&JournalEntry::put(&next).unwrap(), &mut frame).unwrap();
        for cut in [2, HEADER_SIZE, frame.len() - 1] {
            {
                let mut file = OpenOptions::new().append(true).open(&path).unwrap();
                file.write_all(&frame[..cut]).unwrap();
            }

            let store = FileLinkageStore::open(&path).unwrap();
            assert_eq!(store.len(), 1);
            assert_eq!(std::fs::metadata(&path).unwrap().len(), intact_len);
        }
    }

    fn journal_with_rows(path: &Path, count: usize) -> Vec<u8> {
        {
            let store = FileLinkageStore::open(path).unwrap();
            for i in 0..count {
                store
                    .create(Linkage::new(
                        "book",
                        EntityId::new(),
                        rid(&i.to_string()),
                        snapshot("title"),
                    ))
                    .unwrap();
            }
        }
        std::fs::read(path).unwrap()
    }

    #[test]
    fn corrupt_header_fails_open_and_keeps_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("linkage.journal");
        let mut bytes = journal_with_rows(&path, 6);

        bytes[0] = 0xff;
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            FileLinkageStore::open(&path),
            Err(LinkageError::Corrupted(_))
        ));
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
    }

    #[test]
    fn corrupt_length_is_not_mistaken_for_a_torn_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("linkage.journal");
        let mut bytes = journal_with_rows(&path, 4);

        bytes[7] = 0xff;
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            FileLinkageStore::open(&path),
            Err(LinkageError::Corrupted(_))
        ));
        assert_eq!(std::fs::read(&path).unwrap().len(), bytes.len());
    }

    #[test]
    fn corrupt_payload_in_the_middle_fails_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("linkage.journal");
        let mut bytes = journal_with_rows(&path, 3);

        // Last byte of the first payload, just before its checksum
        let first_len = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        bytes[HEADER_SIZE + first_len - 1] ^= 0x01;
        std::fs::write(&path, &bytes).unwrap();

        let err = FileLinkageStore::open(&path).unwrap_err();
        assert!(matches!(&err, LinkageError::Corrupted(m) if m.contains("checksum")));
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
    }

    #[test]
    fn garbage_after_the_last_entry_is_not_a_torn_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("linkage.journal");
        let mut bytes = journal_with_rows(&path, 1);

        bytes.extend_from_slice(&[0xa1, 0x63, b'P']);
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            FileLinkageStore::open(&path),
            Err(LinkageError::Corrupted(_))
        ));
    }

    #[test]
    fn crc32_check_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn compact_keeps_live_rows_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("linkage.journal");
        let keep = EntityId::new();

        {
            let store = FileLinkageStore::open(&path).unwrap().sync_on_write(false);
            store
                .create(Linkage::new("book", keep, rid("A"), snapshot("Dune")))
                .unwrap();
            for i in 0..10 {
                let id = EntityId::new();
                store
                    .create(Linkage::new("book", id, rid(&format!("tmp-{i}")), Record::new()))
                    .unwrap();
                store.delete("book", id).unwrap();
            }
            let before = std::fs::metadata(&path).unwrap().len();
            store.compact().unwrap();
            assert!(std::fs::metadata(&path).unwrap().len() < before);

            // Still writable after compaction
            store
                .create(Linkage::new("book", EntityId::new(), rid("B"), Record::new()))
                .unwrap();
        }

        let store = FileLinkageStore::open(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.find("book", &rid("A")).unwrap().unwrap().local_id, keep);
    }

    #[test]
    fn duplicate_is_not_journaled() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("linkage.journal");
        let store = FileLinkageStore::open(&path).unwrap();

        store
            .create(Linkage::new("book", EntityId::new(), rid("A"), Record::new()))
            .unwrap();
        let len = std::fs::metadata(&path).unwrap().len();

        let dup = store.create(Linkage::new("book", EntityId::new(), rid("A"), Record::new()));
        assert!(matches!(dup, Err(LinkageError::Duplicate { .. })));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), len);
    }
}
