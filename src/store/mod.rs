//! C6: the object store.
//!
//! A semantic "database" implemented over a plain filesystem (spec §4.6):
//! user records, message bases, and file bases each live under their own
//! directory with a registry (flat array of fixed-size records), an index
//! (next-id counter), and a payload directory. [`registry`] carries the
//! copy-update-rename atomicity primitive every store in this module is
//! built on.

pub mod fileobj;
pub mod message;
pub mod registry;
pub mod user;

use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use user::{mask_password, unmask_password, AccessKeys, AuthResult, User, UserFlags};

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Corrupt(&'static str),
    NotFound(u32),
    DuplicateUsername(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "i/o error: {e}"),
            StoreError::Corrupt(why) => write!(f, "registry corrupt: {why}"),
            StoreError::NotFound(id) => write!(f, "no record with id {id}"),
            StoreError::DuplicateUsername(name) => write!(f, "username already taken: {name}"),
        }
    }
}
impl std::error::Error for StoreError {}

/// Fixed on-disk record: resolves the "user records padded to a fixed
/// size?" open question in favour of an explicit, documented layout
/// rather than relying on compiler-defined padding (spec §9).
const USERNAME_LEN: usize = 32;
const REALNAME_LEN: usize = 64;
const CONTACT_LEN: usize = 64;
const PASSWORD_LEN: usize = 64;
pub const USER_RECORD_LEN: usize = 4 // id
    + USERNAME_LEN
    + REALNAME_LEN
    + CONTACT_LEN
    + 1 // password length
    + PASSWORD_LEN
    + 1 // access level
    + 4 // keys bitmap
    + 1 // flags
    + 2 // screen height
    + 4 * 4 // stats
    + 4 * 4; // selection

/// Writes `s` into a zero-padded fixed-width field, truncating if it is
/// too long. Shared by every fixed-record registry in this module (user,
/// file object).
pub(crate) fn put_fixed(buf: &mut Vec<u8>, s: &str, width: usize) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(width);
    buf.extend_from_slice(&bytes[..n]);
    buf.resize(buf.len() + (width - n), 0);
}

pub(crate) fn get_fixed(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

fn encode_user(user: &User) -> Vec<u8> {
    let mut buf = Vec::with_capacity(USER_RECORD_LEN);
    buf.extend_from_slice(&user.id.to_le_bytes());
    put_fixed(&mut buf, &user.username, USERNAME_LEN);
    put_fixed(&mut buf, &user.real_name, REALNAME_LEN);
    put_fixed(&mut buf, &user.contact, CONTACT_LEN);
    let masked = mask_password(user.id, &user.password);
    buf.push(masked.len().min(PASSWORD_LEN) as u8);
    let mut pw = masked;
    pw.resize(PASSWORD_LEN, 0);
    buf.extend_from_slice(&pw);
    buf.push(user.access_level);
    buf.extend_from_slice(&user.keys.bits().to_le_bytes());
    buf.push(user.flags.bits());
    buf.extend_from_slice(&user.screen_height.to_le_bytes());
    for v in [
        user.stats.call_count,
        user.stats.last_scan as u32,
        user.stats.uploads,
        user.stats.downloads,
    ] {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    for v in [
        user.selection.message_base_id,
        user.selection.message_base_area_id,
        user.selection.file_base_id,
        user.selection.file_base_area_id,
    ] {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    debug_assert_eq!(buf.len(), USER_RECORD_LEN);
    buf
}

fn decode_user(rec: &[u8]) -> Result<User, StoreError> {
    if rec.len() != USER_RECORD_LEN {
        return Err(StoreError::Corrupt("unexpected user record length"));
    }
    let mut off = 0;
    let id = u32::from_le_bytes(rec[0..4].try_into().unwrap());
    off += 4;
    let username = get_fixed(&rec[off..off + USERNAME_LEN]);
    off += USERNAME_LEN;
    let real_name = get_fixed(&rec[off..off + REALNAME_LEN]);
    off += REALNAME_LEN;
    let contact = get_fixed(&rec[off..off + CONTACT_LEN]);
    off += CONTACT_LEN;
    let pw_len = rec[off] as usize;
    off += 1;
    let password = unmask_password(id, &rec[off..off + pw_len]);
    off += PASSWORD_LEN;
    let access_level = rec[off];
    off += 1;
    let keys = AccessKeys::from_bits_truncate(u32::from_le_bytes(rec[off..off + 4].try_into().unwrap()));
    off += 4;
    let flags = UserFlags::from_bits_truncate(rec[off]);
    off += 1;
    let screen_height = u16::from_le_bytes(rec[off..off + 2].try_into().unwrap());
    off += 2;
    let stat = |off: usize| u32::from_le_bytes(rec[off..off + 4].try_into().unwrap());
    let stats = user::UserStats {
        call_count: stat(off),
        last_scan: stat(off + 4) as i64,
        uploads: stat(off + 8),
        downloads: stat(off + 12),
    };
    off += 16;
    let selection = user::UserSelection {
        message_base_id: stat(off),
        message_base_area_id: stat(off + 4),
        file_base_id: stat(off + 8),
        file_base_area_id: stat(off + 12),
    };
    Ok(User {
        id,
        username,
        real_name,
        contact,
        password,
        access_level,
        keys,
        flags,
        selection,
        stats,
        screen_height,
    })
}

fn decode_all_users(bytes: &[u8]) -> Result<Vec<Vec<u8>>, StoreError> {
    if bytes.len() % USER_RECORD_LEN != 0 {
        return Err(StoreError::Corrupt("user registry length not a multiple of record size"));
    }
    Ok(bytes.chunks(USER_RECORD_LEN).map(|c| c.to_vec()).collect())
}

fn encode_all_users(records: &[Vec<u8>]) -> Vec<u8> {
    records.concat()
}

/// Single-writer user store (spec §4.6 "Concurrency: single-writer").
/// Multiple readers observe a stale-but-consistent snapshot because every
/// mutation goes through [`registry::mutate_registry`].
pub struct UserStore {
    registry_path: PathBuf,
    index_path: PathBuf,
    write_lock: Mutex<()>,
}

impl UserStore {
    pub fn new(base: &Path) -> Self {
        UserStore {
            registry_path: base.join("UserDB"),
            index_path: base.join("UserIDX"),
            write_lock: Mutex::new(()),
        }
    }

    pub fn iter(&self) -> Result<Vec<User>, StoreError> {
        let records = registry::read_registry(&self.registry_path, decode_all_users)?;
        records.iter().map(|r| decode_user(r)).collect()
    }

    pub fn find_by_id(&self, id: u32) -> Result<Option<User>, StoreError> {
        Ok(self.iter()?.into_iter().find(|u| u.id == id))
    }

    pub fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .iter()?
            .into_iter()
            .find(|u| u.username_eq(username)))
    }

    pub fn authenticate(&self, username: &str, password: &str) -> Result<(AuthResult, Option<User>), StoreError> {
        let users = self.iter()?;
        let (result, found) = user::authenticate(&users, username, password);
        Ok((result, found.cloned()))
    }

    /// Adds a new user, enforcing the case-insensitive username uniqueness
    /// invariant (spec §3, §8).
    pub fn add(&self, mut new_user: User) -> Result<User, StoreError> {
        let _guard = self.write_lock.lock();
        new_user.id = registry::next_id(&self.index_path)?;
        registry::mutate_registry(
            &self.registry_path,
            decode_all_users,
            encode_all_users,
            |records| {
                for r in records.iter() {
                    let existing = decode_user(r)?;
                    if existing.username_eq(&new_user.username) {
                        return Err(StoreError::DuplicateUsername(new_user.username.clone()));
                    }
                }
                records.push(encode_user(&new_user));
                Ok(())
            },
        )?;
        Ok(new_user)
    }

    pub fn update(&self, updated: User) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        registry::mutate_registry(
            &self.registry_path,
            decode_all_users,
            encode_all_users,
            |records| {
                let mut found = false;
                for r in records.iter_mut() {
                    let existing = decode_user(r)?;
                    if existing.id == updated.id {
                        *r = encode_user(&updated);
                        found = true;
                        break;
                    }
                }
                if found {
                    Ok(())
                } else {
                    Err(StoreError::NotFound(updated.id))
                }
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn add_find_update_round_trip() {
        let dir = tempdir().unwrap();
        let store = UserStore::new(dir.path());

        let added = store.add(User::new(0, "alice", "secret")).unwrap();
        assert_eq!(added.id, 1);

        let found = store.find_by_username("ALICE").unwrap().unwrap();
        assert_eq!(found.password, "secret");

        let mut updated = found;
        updated.access_level = 50;
        store.update(updated).unwrap();

        let reloaded = store.find_by_id(1).unwrap().unwrap();
        assert_eq!(reloaded.access_level, 50);
    }

    #[test]
    fn duplicate_username_rejected_case_insensitively() {
        let dir = tempdir().unwrap();
        let store = UserStore::new(dir.path());
        store.add(User::new(0, "bob", "a")).unwrap();
        let err = store.add(User::new(0, "BOB", "b")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateUsername(_)));
    }

    #[test]
    fn authenticate_through_the_store() {
        let dir = tempdir().unwrap();
        let store = UserStore::new(dir.path());
        store.add(User::new(0, "carol", "pw")).unwrap();
        let (result, user) = store.authenticate("carol", "pw").unwrap();
        assert_eq!(result, AuthResult::Success);
        assert_eq!(user.unwrap().username, "carol");
    }
}
