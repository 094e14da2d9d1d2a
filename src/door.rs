//! Door ABI boundary (spec §9: "a separate, stable door ABI ... independent
//! of the internal storage shape"). Door programs themselves are out of
//! scope (spec §1); this module only defines the value types a door-run
//! suspension point in the script interpreter would serialise across.

use crate::store::user::User;

/// Caller-facing snapshot of a user record, stable regardless of how
/// [`crate::store`] actually lays the record out on disk.
#[derive(Debug, Clone)]
pub struct DoorUserInfo {
    pub id: u32,
    pub username: String,
    pub real_name: String,
    pub access_level: u8,
    pub keys: u32,
    pub line: usize,
}

impl DoorUserInfo {
    pub fn from_user(user: &User, line: usize) -> Self {
        DoorUserInfo {
            id: user.id,
            username: user.username.clone(),
            real_name: user.real_name.clone(),
            access_level: user.access_level,
            keys: user.keys.bits(),
            line,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DoorSystemInfo {
    pub bbs_name: String,
    pub line_count: usize,
    pub node_address: Option<String>,
}

/// Sent to a running door subprocess when its line is cancelled out from
/// under it (spec §5 "Cancellation": "Active door subprocesses are
/// signalled with the 'force disconnect requested' message and reaped").
#[derive(Debug, Clone, Copy)]
pub struct ForceDisconnectRequested;
