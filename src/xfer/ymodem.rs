//! YMODEM / YMODEM-G (spec §4.5.2).
//!
//! Block 0 carries `<filename>\0<size-ascii> <mod-time-octal>\0...`; an
//! empty block 0 ends the batch. After block 0 the wire format is
//! XMODEM-CRC with 1K blocks, so this module is built on top of
//! [`super::xmodem`] rather than duplicating its framing.

use super::xmodem::{Mode, XmodemReceiver, XmodemSender, C};

pub const G: u8 = 0x47;

pub fn encode_header_block(filename: &str, size: u64, mtime_unix: u64) -> Vec<u8> {
    format!("{filename}\0{size} {mtime_unix:o}\0").into_bytes()
}

pub fn decode_header_block(block: &[u8]) -> Option<(String, u64, u64)> {
    if block.iter().all(|&b| b == 0) {
        return None;
    }
    let filename_end = block.iter().position(|&b| b == 0)?;
    let filename = String::from_utf8_lossy(&block[..filename_end]).into_owned();
    let rest_start = filename_end + 1;
    let rest_end = block[rest_start..]
        .iter()
        .position(|&b| b == 0)
        .map(|p| rest_start + p)
        .unwrap_or(block.len());
    let rest = String::from_utf8_lossy(&block[rest_start..rest_end]);
    let mut parts = rest.split_whitespace();
    let size: u64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let mtime: u64 = parts
        .next()
        .and_then(|s| u64::from_str_radix(s, 8).ok())
        .unwrap_or(0);
    Some((filename, size, mtime))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendPhase {
    Header,
    File,
    Done,
}

/// A YMODEM batch sender: one [`XmodemSender`] per file, preceded by its
/// header block, followed by an empty block 0 to close the batch. Each
/// file's header and body are sent back-to-back on the same connection,
/// re-priming with a fresh `C`/`G` between blocks the way a real terminal
/// program drives it (spec §4.5.2).
pub struct YmodemBatchSender {
    files: Vec<(String, Vec<u8>, u64)>,
    index: usize,
    inner: Option<XmodemSender>,
    phase: SendPhase,
    streaming: bool,
}

impl YmodemBatchSender {
    pub fn new(files: Vec<(String, Vec<u8>, u64)>, streaming: bool) -> Self {
        YmodemBatchSender {
            files,
            index: 0,
            inner: None,
            phase: SendPhase::Header,
            streaming,
        }
    }

    /// `start_byte` selects the flow variant: `G` for YMODEM-G (spec
    /// §4.5.2: receiver sends `G` instead of `C` and the sender does not
    /// wait for per-block ACKs).
    pub fn begin(&mut self, start_byte: u8) -> Vec<u8> {
        self.streaming = start_byte == G;
        self.send_header()
    }

    fn send_header(&mut self) -> Vec<u8> {
        self.phase = SendPhase::Header;
        if self.index >= self.files.len() {
            let mut sender = XmodemSender::new(Vec::new(), true);
            let out = sender.on_bytes(&[C]);
            self.inner = Some(sender);
            self.phase = SendPhase::Done;
            return out;
        }
        let (name, data, mtime) = self.files[self.index].clone();
        let header = encode_header_block(&name, data.len() as u64, mtime);
        let mut sender = XmodemSender::new(header, true);
        let out = sender.on_bytes(&[C]);
        self.inner = Some(sender);
        out
    }

    /// Feeds wire bytes to whichever phase is active, advancing from
    /// header to file body to the next file's header as each inner
    /// transfer completes.
    pub fn on_bytes(&mut self, input: &[u8]) -> Vec<u8> {
        let Some(inner) = &mut self.inner else { return Vec::new() };
        let out = inner.on_bytes(input);
        if !inner.is_complete() {
            return out;
        }
        match self.phase {
            SendPhase::Header => {
                let (_, data, _) = self.files[self.index].clone();
                self.phase = SendPhase::File;
                let mut sender = XmodemSender::new(data, true);
                let primed = sender.on_bytes(&[C]);
                self.inner = Some(sender);
                let mut out = out;
                out.extend(primed);
                out
            }
            SendPhase::File => {
                self.index += 1;
                let mut next = self.send_header();
                next.splice(0..0, out);
                next
            }
            SendPhase::Done => out,
        }
    }

    pub fn on_timeout(&mut self) -> Vec<u8> {
        self.inner.as_mut().map(|s| s.on_timeout()).unwrap_or_default()
    }

    pub fn is_started(&self) -> bool {
        self.inner.is_some()
    }

    pub fn is_batch_complete(&self) -> bool {
        self.phase == SendPhase::Done && self.inner.as_ref().is_some_and(|s| s.is_complete())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecvPhase {
    Header,
    File,
    Done,
}

/// Drives the receive side of a YMODEM batch: block 0 of each
/// sub-transfer is the filename header, the rest is the file body, an
/// empty header ends the batch (spec §4.5.2, §8 scenario 6).
pub struct YmodemReceiver {
    inner: XmodemReceiver,
    phase: RecvPhase,
    current_name: Option<String>,
    completed: Vec<(String, Vec<u8>)>,
}

impl YmodemReceiver {
    pub fn new() -> Self {
        YmodemReceiver {
            inner: XmodemReceiver::new(Mode::Crc),
            phase: RecvPhase::Header,
            current_name: None,
            completed: Vec::new(),
        }
    }

    pub fn start_byte(&self) -> u8 {
        self.inner.start_byte()
    }

    /// Feeds wire bytes to the current sub-transfer, promoting from
    /// header to file body and back to the next header as blocks
    /// complete.
    pub fn on_bytes(&mut self, input: &[u8]) -> Vec<u8> {
        let out = self.inner.on_bytes(input);
        if !self.inner.is_complete() {
            return out;
        }
        match self.phase {
            RecvPhase::Header => {
                if let Some((name, _size, _mtime)) = decode_header_block(self.inner.received_data()) {
                    self.current_name = Some(name);
                    self.phase = RecvPhase::File;
                    self.inner = XmodemReceiver::new(Mode::Crc);
                    let mut out = out;
                    out.push(self.inner.start_byte());
                    out
                } else {
                    self.phase = RecvPhase::Done;
                    out
                }
            }
            RecvPhase::File => {
                if let Some(name) = self.current_name.take() {
                    self.completed.push((name, self.inner.received_data().to_vec()));
                }
                self.phase = RecvPhase::Header;
                self.inner = XmodemReceiver::new(Mode::Crc);
                let mut out = out;
                out.push(self.inner.start_byte());
                out
            }
            RecvPhase::Done => out,
        }
    }

    pub fn on_timeout(&mut self) -> Vec<u8> {
        self.inner.on_timeout()
    }

    pub fn on_header_complete(&mut self) -> bool {
        matches!(self.phase, RecvPhase::File)
    }

    pub fn batch_done(&self) -> bool {
        self.phase == RecvPhase::Done
    }

    pub fn current_name(&self) -> Option<&str> {
        self.current_name.as_deref()
    }

    /// Files completed so far, in arrival order.
    pub fn completed_files(&self) -> &[(String, Vec<u8>)] {
        &self.completed
    }
}

impl Default for YmodemReceiver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_block_round_trips() {
        let block = encode_header_block("readme.txt", 4096, 1_700_000_000);
        let (name, size, mtime) = decode_header_block(&block).unwrap();
        assert_eq!(name, "readme.txt");
        assert_eq!(size, 4096);
        assert_eq!(mtime, 1_700_000_000);
    }

    /// spec §8 scenario 6: an all-zero block 0 ends the batch.
    #[test]
    fn all_zero_block_ends_batch() {
        let mut block = vec![0u8; 128];
        block.resize(128, 0);
        assert!(decode_header_block(&block).is_none());
    }

    #[test]
    fn batch_sender_emits_empty_block_after_last_file() {
        let mut batch = YmodemBatchSender::new(
            vec![("a.txt".to_string(), b"hi".to_vec(), 0)],
            false,
        );
        let first = batch.begin(C);
        assert!(!first.is_empty());
        assert!(!batch.is_batch_complete());
    }
}
