//! C11: FTS-0005 nodelist parsing and routing lookups (spec §4.11).

pub mod index;
pub mod parse;

use std::fmt;
use std::path::Path;

pub use index::NodelistIndex;
pub use parse::{parse, NodelistEntry, Status};

#[derive(Debug)]
pub enum NodelistError {
    Io(std::io::Error),
    Empty,
}

impl fmt::Display for NodelistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodelistError::Io(e) => write!(f, "i/o error: {e}"),
            NodelistError::Empty => write!(f, "nodelist contains no entries"),
        }
    }
}
impl std::error::Error for NodelistError {}
impl From<std::io::Error> for NodelistError {
    fn from(e: std::io::Error) -> Self {
        NodelistError::Io(e)
    }
}

/// Loads and indexes a raw FTS-0005 nodelist file (spec §6
/// `FTN/Nodelists/<network>/Nodelist`).
pub fn load_file(path: &Path) -> Result<NodelistIndex, NodelistError> {
    let text = std::fs::read_to_string(path)?;
    let entries = parse(&text);
    if entries.is_empty() {
        return Err(NodelistError::Empty);
    }
    Ok(NodelistIndex::build(entries))
}
