//! C2: line transport adapters (spec §4.2) that pump bytes between
//! sockets/UARTs and the pipe plane (C1).

pub mod local;
pub mod serial;
pub mod telnet;
