//! User records (spec §3 "User", §4.6 "User records").
//!
//! Stored form is the plaintext password transformed by a reversible XOR
//! mask keyed by the record id. This is explicitly *not* a security
//! boundary (spec §9 Open Questions); it only keeps the password out of a
//! casual `cat` of the registry file.

use bitflags::bitflags;

bitflags! {
    /// 26-slot access-key bitmap, bit 0 = 'A' ... bit 25 = 'Z' (spec §3).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AccessKeys: u32 {
        const A = 1 << 0;
        const B = 1 << 1;
        const C = 1 << 2;
        const D = 1 << 3;
        const E = 1 << 4;
        const F = 1 << 5;
        const G = 1 << 6;
        const H = 1 << 7;
        const I = 1 << 8;
        const J = 1 << 9;
        const K = 1 << 10;
        const L = 1 << 11;
        const M = 1 << 12;
        const N = 1 << 13;
        const O = 1 << 14;
        const P = 1 << 15;
        const Q = 1 << 16;
        const R = 1 << 17;
        const S = 1 << 18;
        const T = 1 << 19;
        const U = 1 << 20;
        const V = 1 << 21;
        const W = 1 << 22;
        const X = 1 << 23;
        const Y = 1 << 24;
        const Z = 1 << 25;
    }
}

impl AccessKeys {
    pub fn from_letter(letter: char) -> Option<Self> {
        let letter = letter.to_ascii_uppercase();
        if !letter.is_ascii_uppercase() {
            return None;
        }
        let shift = letter as u32 - b'A' as u32;
        Self::from_bits(1 << shift)
    }

    pub fn has_letter(self, letter: char) -> bool {
        Self::from_letter(letter).is_some_and(|bit| self.contains(bit))
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct UserFlags: u8 {
        const SYSOP = 0b0000_0001;
        const LOCKED = 0b0000_0010;
        const NO_PAGING = 0b0000_0100;
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserStats {
    pub call_count: u32,
    pub last_scan: i64,
    pub uploads: u32,
    pub downloads: u32,
}

#[derive(Debug, Clone, Default)]
pub struct UserSelection {
    pub message_base_id: u32,
    pub message_base_area_id: u32,
    pub file_base_id: u32,
    pub file_base_area_id: u32,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: u32,
    pub username: String,
    pub real_name: String,
    pub contact: String,
    /// Plaintext in memory; only the on-disk registry form is XOR-masked.
    pub password: String,
    pub access_level: u8,
    pub keys: AccessKeys,
    pub flags: UserFlags,
    pub selection: UserSelection,
    pub stats: UserStats,
    /// Preferred "more?" paging screen height, default 24 (spec §4.3).
    pub screen_height: u16,
}

impl User {
    pub fn new(id: u32, username: &str, password: &str) -> Self {
        User {
            id,
            username: username.to_string(),
            real_name: String::new(),
            contact: String::new(),
            password: password.to_string(),
            access_level: 10,
            keys: AccessKeys::default(),
            flags: UserFlags::default(),
            selection: UserSelection::default(),
            stats: UserStats::default(),
            screen_height: 24,
        }
    }

    pub fn is_sysop(&self) -> bool {
        self.flags.contains(UserFlags::SYSOP)
    }

    pub fn is_locked(&self) -> bool {
        self.flags.contains(UserFlags::LOCKED)
    }

    pub fn username_eq(&self, other: &str) -> bool {
        self.username.eq_ignore_ascii_case(other)
    }
}

/// Derives a per-record XOR keystream from the user id. Not cryptographic;
/// documented as obfuscation-at-rest only (spec §3, §9).
fn mask_keystream(id: u32, len: usize) -> Vec<u8> {
    let seed = id.wrapping_mul(0x9E37_79B9).to_le_bytes();
    (0..len).map(|i| seed[i % seed.len()] ^ (i as u8)).collect()
}

pub fn mask_password(id: u32, plaintext: &str) -> Vec<u8> {
    let key = mask_keystream(id, plaintext.len());
    plaintext
        .bytes()
        .zip(key)
        .map(|(b, k)| b ^ k)
        .collect()
}

pub fn unmask_password(id: u32, masked: &[u8]) -> String {
    let key = mask_keystream(id, masked.len());
    let bytes: Vec<u8> = masked.iter().zip(key).map(|(b, k)| b ^ k).collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthResult {
    Success,
    NoUser,
    BadPassword,
    Locked,
}

pub fn authenticate<'a>(
    users: impl IntoIterator<Item = &'a User>,
    username: &str,
    password: &str,
) -> (AuthResult, Option<&'a User>) {
    let Some(user) = users
        .into_iter()
        .find(|u| u.username_eq(username))
    else {
        return (AuthResult::NoUser, None);
    };
    if user.is_locked() {
        return (AuthResult::Locked, Some(user));
    }
    if user.password != password {
        return (AuthResult::BadPassword, Some(user));
    }
    (AuthResult::Success, Some(user))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_obfuscation_round_trips() {
        let masked = mask_password(42, "hunter2");
        assert_eq!(unmask_password(42, &masked), "hunter2");
        assert_ne!(masked, b"hunter2");
    }

    #[test]
    fn username_uniqueness_is_case_insensitive() {
        let a = User::new(1, "Sysop", "x");
        let b = User::new(2, "sysop", "y");
        assert!(a.username_eq(&b.username));
    }

    #[test]
    fn authenticate_reports_every_taxonomy_result() {
        let mut locked = User::new(2, "bob", "pw");
        locked.flags |= UserFlags::LOCKED;
        let users = vec![User::new(1, "alice", "secret"), locked];

        assert_eq!(
            authenticate(&users, "alice", "secret").0,
            AuthResult::Success
        );
        assert_eq!(
            authenticate(&users, "alice", "wrong").0,
            AuthResult::BadPassword
        );
        assert_eq!(authenticate(&users, "nobody", "x").0, AuthResult::NoUser);
        assert_eq!(authenticate(&users, "bob", "pw").0, AuthResult::Locked);
    }

    #[test]
    fn access_key_bitmap_round_trips_letters() {
        let keys = AccessKeys::from_letter('c').unwrap() | AccessKeys::from_letter('Z').unwrap();
        assert!(keys.has_letter('C'));
        assert!(keys.has_letter('z'));
        assert!(!keys.has_letter('A'));
    }
}
