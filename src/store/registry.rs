//! Copy-update-rename atomicity primitive shared by every registry
//! (users, messages, file objects) in the object store (spec §4.6).
//!
//! Readers always see either the pre-mutation or the post-mutation file,
//! never a mix, because the only thing that changes the live path is a
//! same-directory rename (spec §8 "Registry atomicity").

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::StoreError;

/// Reads the whole registry file, applies `mutate` to the decoded records,
/// re-encodes, and atomically replaces the live file via a temp-file
/// rename in the same directory.
pub fn mutate_registry<T, Enc, Dec, Mut>(
    path: &Path,
    decode: Dec,
    encode: Enc,
    mutate: Mut,
) -> Result<T, StoreError>
where
    Dec: FnOnce(&[u8]) -> Result<Vec<Vec<u8>>, StoreError>,
    Enc: FnOnce(&[Vec<u8>]) -> Vec<u8>,
    Mut: FnOnce(&mut Vec<Vec<u8>>) -> Result<T, StoreError>,
{
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(StoreError::Io(e)),
    };
    let mut records = decode(&bytes)?;
    let result = mutate(&mut records)?;
    let encoded = encode(&records);

    write_atomic(path, &encoded)?;
    Ok(result)
}

pub fn read_registry<Dec>(path: &Path, decode: Dec) -> Result<Vec<Vec<u8>>, StoreError>
where
    Dec: FnOnce(&[u8]) -> Result<Vec<Vec<u8>>, StoreError>,
{
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::Io(e)),
    };
    decode(&bytes)
}

/// Writes `data` to a temp file beside `path` then renames over it. The
/// temp file is cleaned up on any failure before the rename (spec §7
/// "Storage" policy: "The temp-file artefact is removed on failure").
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(StoreError::Io)?;
    }
    let tmp = tmp_path(path);
    let write_result = fs::write(&tmp, data);
    if let Err(e) = write_result {
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::Io(e));
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::Io(e));
    }
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    tmp.set_file_name(format!(".{name}.tmp"));
    tmp
}

/// Grouped payload directory layout: objects are sharded sixty-per-subdir
/// so the backing filesystem's per-directory entry limits are never hit
/// (spec §4.6).
pub fn payload_path(base: &Path, id: u32) -> PathBuf {
    const GROUP_SIZE: u32 = 60;
    let group = id / GROUP_SIZE;
    base.join(format!("{group:05}")).join(format!("{id:08}"))
}

/// The index file holds a single 32-bit next-id counter (spec §4.6).
pub fn next_id(path: &Path) -> Result<u32, StoreError> {
    let current = match fs::read(path) {
        Ok(bytes) if bytes.len() >= 4 => {
            u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
        }
        _ => 0,
    };
    let next = current + 1;
    write_atomic(path, &next.to_le_bytes())?;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_atomic_never_leaves_a_temp_file_on_success() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.bin");
        write_atomic(&path, b"hello").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"hello");
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn next_id_increments_and_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("idx");
        assert_eq!(next_id(&path).unwrap(), 1);
        assert_eq!(next_id(&path).unwrap(), 2);
        assert_eq!(next_id(&path).unwrap(), 3);
    }

    #[test]
    fn payload_path_groups_sixty_per_directory() {
        assert_eq!(payload_path(Path::new("base"), 0), PathBuf::from("base/00000/00000000"));
        assert_eq!(payload_path(Path::new("base"), 59), PathBuf::from("base/00000/00000059"));
        assert_eq!(payload_path(Path::new("base"), 60), PathBuf::from("base/00001/00000060"));
    }
}
