//! Cross-subsystem error type.
//!
//! Each subsystem defines its own error enum with a hand-rolled `Display`
//! and `std::error::Error` impl (see `xfer::TransferError`,
//! `mail::packet::PacketError`, `binkp::frame::FrameError`, ...). This type
//! exists only for code that has to cross a subsystem boundary, such as the
//! scheduler, and wraps the subsystem error without losing it.

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Pipe(crate::pipeline::PipeError),
    Script(crate::script::ScriptError),
    Transfer(crate::xfer::TransferError),
    Store(crate::store::StoreError),
    Packet(crate::mail::packet::PacketError),
    Frame(crate::binkp::frame::FrameError),
    Nodelist(crate::nodelist::NodelistError),
    Config(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "i/o error: {e}"),
            Error::Pipe(e) => write!(f, "pipe error: {e}"),
            Error::Script(e) => write!(f, "script error: {e}"),
            Error::Transfer(e) => write!(f, "transfer error: {e}"),
            Error::Store(e) => write!(f, "store error: {e}"),
            Error::Packet(e) => write!(f, "packet error: {e}"),
            Error::Frame(e) => write!(f, "binkp frame error: {e}"),
            Error::Nodelist(e) => write!(f, "nodelist error: {e}"),
            Error::Config(msg) => write!(f, "configuration error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Pipe(e) => Some(e),
            Error::Script(e) => Some(e),
            Error::Transfer(e) => Some(e),
            Error::Store(e) => Some(e),
            Error::Packet(e) => Some(e),
            Error::Frame(e) => Some(e),
            Error::Nodelist(e) => Some(e),
            Error::Config(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
impl From<crate::pipeline::PipeError> for Error {
    fn from(e: crate::pipeline::PipeError) -> Self {
        Error::Pipe(e)
    }
}
impl From<crate::script::ScriptError> for Error {
    fn from(e: crate::script::ScriptError) -> Self {
        Error::Script(e)
    }
}
impl From<crate::xfer::TransferError> for Error {
    fn from(e: crate::xfer::TransferError) -> Self {
        Error::Transfer(e)
    }
}
impl From<crate::store::StoreError> for Error {
    fn from(e: crate::store::StoreError) -> Self {
        Error::Store(e)
    }
}
impl From<crate::mail::packet::PacketError> for Error {
    fn from(e: crate::mail::packet::PacketError) -> Self {
        Error::Packet(e)
    }
}
impl From<crate::binkp::frame::FrameError> for Error {
    fn from(e: crate::binkp::frame::FrameError) -> Self {
        Error::Frame(e)
    }
}
impl From<crate::nodelist::NodelistError> for Error {
    fn from(e: crate::nodelist::NodelistError) -> Self {
        Error::Nodelist(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
