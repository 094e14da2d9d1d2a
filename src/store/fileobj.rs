//! File objects (spec §3 "File object"). The payload is a separate blob
//! keyed by id, stored under the grouped payload directory
//! ([`super::registry::payload_path`]); a missing payload makes the object
//! observable as deleted (spec §3 invariant).

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::registry;
use super::StoreError;

#[derive(Debug, Clone)]
pub struct FileObject {
    pub id: u32,
    pub base_id: u32,
    pub area_id: u32,
    pub deleted: bool,
    pub access_level: u8,
    pub access_keys: u32,
    pub display_name: String,
    pub description: String,
    pub uploader_id: u32,
    pub uploaded_at: i64,
    pub size: u64,
    pub download_count: u32,
    pub payload_present: bool,
}

impl FileObject {
    pub fn is_observably_deleted(&self) -> bool {
        self.deleted || !self.payload_present
    }
}

const DISPLAY_NAME_LEN: usize = 64;
const DESCRIPTION_LEN: usize = 160;
const FILE_RECORD_LEN: usize = 4 // id
    + 4 // base_id
    + 4 // area_id
    + 1 // deleted
    + 1 // access_level
    + 4 // access_keys
    + DISPLAY_NAME_LEN
    + DESCRIPTION_LEN
    + 4 // uploader_id
    + 8 // uploaded_at
    + 8 // size
    + 4; // download_count

fn encode_file(f: &FileObject) -> Vec<u8> {
    let mut buf = Vec::with_capacity(FILE_RECORD_LEN);
    buf.extend_from_slice(&f.id.to_le_bytes());
    buf.extend_from_slice(&f.base_id.to_le_bytes());
    buf.extend_from_slice(&f.area_id.to_le_bytes());
    buf.push(f.deleted as u8);
    buf.push(f.access_level);
    buf.extend_from_slice(&f.access_keys.to_le_bytes());
    super::put_fixed(&mut buf, &f.display_name, DISPLAY_NAME_LEN);
    super::put_fixed(&mut buf, &f.description, DESCRIPTION_LEN);
    buf.extend_from_slice(&f.uploader_id.to_le_bytes());
    buf.extend_from_slice(&f.uploaded_at.to_le_bytes());
    buf.extend_from_slice(&f.size.to_le_bytes());
    buf.extend_from_slice(&f.download_count.to_le_bytes());
    debug_assert_eq!(buf.len(), FILE_RECORD_LEN);
    buf
}

fn decode_file(rec: &[u8]) -> Result<FileObject, StoreError> {
    if rec.len() != FILE_RECORD_LEN {
        return Err(StoreError::Corrupt("unexpected file object record length"));
    }
    let mut off = 0;
    let id = u32::from_le_bytes(rec[0..4].try_into().unwrap());
    off += 4;
    let base_id = u32::from_le_bytes(rec[off..off + 4].try_into().unwrap());
    off += 4;
    let area_id = u32::from_le_bytes(rec[off..off + 4].try_into().unwrap());
    off += 4;
    let deleted = rec[off] != 0;
    off += 1;
    let access_level = rec[off];
    off += 1;
    let access_keys = u32::from_le_bytes(rec[off..off + 4].try_into().unwrap());
    off += 4;
    let display_name = super::get_fixed(&rec[off..off + DISPLAY_NAME_LEN]);
    off += DISPLAY_NAME_LEN;
    let description = super::get_fixed(&rec[off..off + DESCRIPTION_LEN]);
    off += DESCRIPTION_LEN;
    let uploader_id = u32::from_le_bytes(rec[off..off + 4].try_into().unwrap());
    off += 4;
    let uploaded_at = i64::from_le_bytes(rec[off..off + 8].try_into().unwrap());
    off += 8;
    let size = u64::from_le_bytes(rec[off..off + 8].try_into().unwrap());
    off += 8;
    let download_count = u32::from_le_bytes(rec[off..off + 4].try_into().unwrap());
    Ok(FileObject {
        id,
        base_id,
        area_id,
        deleted,
        access_level,
        access_keys,
        display_name,
        description,
        uploader_id,
        uploaded_at,
        size,
        download_count,
        payload_present: true,
    })
}

fn decode_all_files(bytes: &[u8]) -> Result<Vec<Vec<u8>>, StoreError> {
    if bytes.len() % FILE_RECORD_LEN != 0 {
        return Err(StoreError::Corrupt("file registry length not a multiple of record size"));
    }
    Ok(bytes.chunks(FILE_RECORD_LEN).map(|c| c.to_vec()).collect())
}

fn encode_all_files(records: &[Vec<u8>]) -> Vec<u8> {
    records.concat()
}

/// The file base (spec §4.6): a registry of [`FileObject`] records plus a
/// grouped payload directory, built on the same copy-update-rename
/// primitive as [`super::UserStore`].
pub struct FileBaseStore {
    registry_path: PathBuf,
    index_path: PathBuf,
    payload_base: PathBuf,
    write_lock: Mutex<()>,
}

impl FileBaseStore {
    pub fn new(base: &Path) -> Self {
        FileBaseStore {
            registry_path: base.join("FileDB"),
            index_path: base.join("FileIDX"),
            payload_base: base.join("FilePayload"),
            write_lock: Mutex::new(()),
        }
    }

    pub fn find_by_id(&self, id: u32) -> Result<Option<FileObject>, StoreError> {
        let records = registry::read_registry(&self.registry_path, decode_all_files)?;
        for r in &records {
            let mut obj = decode_file(r)?;
            if obj.id == id {
                obj.payload_present = registry::payload_path(&self.payload_base, obj.id).is_file();
                return Ok(Some(obj));
            }
        }
        Ok(None)
    }

    pub fn read_payload(&self, id: u32) -> Result<Vec<u8>, StoreError> {
        let path = registry::payload_path(&self.payload_base, id);
        std::fs::read(path).map_err(StoreError::Io)
    }

    /// Registers a new file object and writes its payload, assigning the
    /// id (spec §4.6 "the index file holds a single 32-bit next-id
    /// counter").
    pub fn add(&self, mut new_file: FileObject, payload: &[u8]) -> Result<FileObject, StoreError> {
        let _guard = self.write_lock.lock();
        new_file.id = registry::next_id(&self.index_path)?;
        new_file.size = payload.len() as u64;
        new_file.payload_present = true;
        registry::write_atomic(&registry::payload_path(&self.payload_base, new_file.id), payload)?;
        registry::mutate_registry(&self.registry_path, decode_all_files, encode_all_files, |records| {
            records.push(encode_file(&new_file));
            Ok(())
        })?;
        Ok(new_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_payload_counts_as_deleted() {
        let f = FileObject {
            id: 1,
            base_id: 1,
            area_id: 1,
            deleted: false,
            access_level: 0,
            access_keys: 0,
            display_name: "x.zip".into(),
            description: String::new(),
            uploader_id: 1,
            uploaded_at: 0,
            size: 0,
            download_count: 0,
            payload_present: false,
        };
        assert!(f.is_observably_deleted());
    }

    #[test]
    fn add_find_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBaseStore::new(dir.path());

        let new_file = FileObject {
            id: 0,
            base_id: 1,
            area_id: 1,
            deleted: false,
            access_level: 10,
            access_keys: 0,
            display_name: "readme.txt".into(),
            description: "a file".into(),
            uploader_id: 1,
            uploaded_at: 1_700_000_000,
            download_count: 0,
            size: 0,
            payload_present: false,
        };
        let added = store.add(new_file, b"hello world").unwrap();
        assert_eq!(added.id, 1);
        assert_eq!(added.size, 11);

        let found = store.find_by_id(1).unwrap().unwrap();
        assert_eq!(found.display_name, "readme.txt");
        assert!(found.payload_present);

        let payload = store.read_payload(1).unwrap();
        assert_eq!(payload, b"hello world");

        assert!(store.find_by_id(2).unwrap().is_none());
    }
}
