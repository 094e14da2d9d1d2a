//! C1: the byte pipe plane.
//!
//! A fixed array of `N` pipe pairs (input: transport -> session, output:
//! session -> transport). This is the only shared mutable state between
//! the transport layer and the session layer (spec §5 "Shared state").
//! Each direction is single-writer/single-reader, so the plane itself
//! needs no internal locking beyond what [`PipePlane`] exposes for
//! whole-line operations like `reset`.

mod ring;

pub use ring::{RingBuffer, Status, Watermark, RING_CAPACITY};

use parking_lot::Mutex;
use std::fmt;

pub const MAX_LINES: usize = 32;

#[derive(Debug)]
pub enum PipeError {
    NoSuchLine(usize),
}

impl fmt::Display for PipeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipeError::NoSuchLine(n) => write!(f, "no such line: {n}"),
        }
    }
}
impl std::error::Error for PipeError {}

struct PipePair {
    input: Mutex<RingBuffer>,
    output: Mutex<RingBuffer>,
}

impl PipePair {
    fn new() -> Self {
        PipePair {
            input: Mutex::new(RingBuffer::new(RING_CAPACITY)),
            output: Mutex::new(RingBuffer::new(RING_CAPACITY)),
        }
    }
}

/// The plane of pipe pairs for every configured line.
///
/// `new` sizes the plane to `line_count` (<= [`MAX_LINES`]); lines beyond
/// that are simply absent, and every accessor returns [`PipeError::NoSuchLine`]
/// for an out-of-range index rather than panicking (spec §7 "Resource" policy:
/// callers are required to handle the failure, no panic path).
pub struct PipePlane {
    pairs: Vec<PipePair>,
}

impl PipePlane {
    pub fn new(line_count: usize) -> Self {
        let line_count = line_count.min(MAX_LINES);
        PipePlane {
            pairs: (0..line_count).map(|_| PipePair::new()).collect(),
        }
    }

    fn pair(&self, line: usize) -> Result<&PipePair, PipeError> {
        self.pairs.get(line).ok_or(PipeError::NoSuchLine(line))
    }

    pub fn enqueue_input(&self, line: usize, data: &[u8]) -> Result<usize, PipeError> {
        Ok(self.pair(line)?.input.lock().write(data))
    }

    pub fn enqueue_input_byte(&self, line: usize, byte: u8) -> Result<bool, PipeError> {
        Ok(self.pair(line)?.input.lock().write_byte(byte))
    }

    pub fn dequeue_input(&self, line: usize) -> Result<Option<u8>, PipeError> {
        Ok(self.pair(line)?.input.lock().read_byte())
    }

    pub fn dequeue_input_block(&self, line: usize, out: &mut [u8]) -> Result<usize, PipeError> {
        Ok(self.pair(line)?.input.lock().read(out))
    }

    pub fn peek_input(&self, line: usize) -> Result<Option<u8>, PipeError> {
        Ok(self.pair(line)?.input.lock().peek_byte())
    }

    pub fn input_bytes_available(&self, line: usize) -> Result<usize, PipeError> {
        Ok(self.pair(line)?.input.lock().len())
    }

    pub fn input_space_free(&self, line: usize) -> Result<usize, PipeError> {
        Ok(self.pair(line)?.input.lock().space_free())
    }

    pub fn enqueue_output(&self, line: usize, data: &[u8]) -> Result<usize, PipeError> {
        Ok(self.pair(line)?.output.lock().write(data))
    }

    pub fn dequeue_output_block(&self, line: usize, out: &mut [u8]) -> Result<usize, PipeError> {
        Ok(self.pair(line)?.output.lock().read(out))
    }

    pub fn output_bytes_available(&self, line: usize) -> Result<usize, PipeError> {
        Ok(self.pair(line)?.output.lock().len())
    }

    pub fn output_space_free(&self, line: usize) -> Result<usize, PipeError> {
        Ok(self.pair(line)?.output.lock().space_free())
    }

    /// Empties both rings atomically and clears the status byte. Called on
    /// disconnect (spec §4.1).
    pub fn reset(&self, line: usize) -> Result<(), PipeError> {
        let pair = self.pair(line)?;
        pair.input.lock().reset();
        pair.output.lock().reset();
        Ok(())
    }

    pub fn input_status(&self, line: usize) -> Result<Status, PipeError> {
        Ok(self.pair(line)?.input.lock().status())
    }

    pub fn output_status(&self, line: usize) -> Result<Status, PipeError> {
        Ok(self.pair(line)?.output.lock().status())
    }

    pub fn line_count(&self) -> usize {
        self.pairs.len()
    }
}

impl fmt::Debug for PipePlane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipePlane")
            .field("line_count", &self.pairs.len())
            .finish()
    }
}
