//! C10: the BinkP session protocol over TCP (spec §4.10, §6).

pub mod auth;
pub mod frame;
pub mod freq;
pub mod session;
