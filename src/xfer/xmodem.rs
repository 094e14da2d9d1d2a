//! XMODEM / XMODEM-CRC / XMODEM-1K (spec §4.5.1).
//!
//! Both sender and receiver are non-blocking state machines: `on_bytes`
//! feeds newly arrived input-pipe bytes in and returns bytes to push onto
//! the output pipe. The caller (the scheduler, spec §5) is responsible for
//! calling [`XmodemSender::on_timeout`] / [`XmodemReceiver::on_timeout`]
//! when a round-trip deadline expires; this module only counts retries and
//! decides when to give up.

use super::crc::{checksum_mod256, crc16_ccitt};

pub const SOH: u8 = 0x01;
pub const STX: u8 = 0x02;
pub const EOT: u8 = 0x04;
pub const ACK: u8 = 0x06;
pub const NAK: u8 = 0x15;
pub const CAN: u8 = 0x18;
pub const C: u8 = 0x43;

pub const MAX_RETRIES: u32 = 10;
pub const ROUND_TRIP_TIMEOUT_SECS: u64 = 10;
pub const START_TIMEOUT_SECS: u64 = 60;

const PAD: u8 = 0x1A;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Checksum,
    Crc,
}

fn block_bytes(mode: Mode, use_1k: bool, seq: u8, data: &[u8]) -> Vec<u8> {
    let block_size = if use_1k { 1024 } else { 128 };
    let mut payload = data.to_vec();
    payload.resize(block_size, PAD);

    let mut out = Vec::with_capacity(block_size + 5);
    out.push(if use_1k { STX } else { SOH });
    out.push(seq);
    out.push(255u8.wrapping_sub(seq));
    out.extend_from_slice(&payload);
    match mode {
        Mode::Checksum => out.push(checksum_mod256(&payload)),
        Mode::Crc => out.extend_from_slice(&crc16_ccitt(&payload).to_be_bytes()),
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    WaitStart,
    SendBlock,
    WaitAck,
    SendEot,
    WaitEotAck,
    Complete,
    Aborted,
}

#[derive(Debug)]
pub struct XmodemSender {
    state: SenderState,
    data: Vec<u8>,
    pos: usize,
    seq: u8,
    mode: Option<Mode>,
    use_1k: bool,
    retries: u32,
    cancel_streak: u32,
    pending_block: Vec<u8>,
}

impl XmodemSender {
    pub fn new(data: Vec<u8>, use_1k: bool) -> Self {
        XmodemSender {
            state: SenderState::WaitStart,
            data,
            pos: 0,
            seq: 1,
            mode: None,
            use_1k,
            retries: 0,
            cancel_streak: 0,
            pending_block: Vec::new(),
        }
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    fn next_chunk(&mut self) -> Option<&[u8]> {
        if self.pos >= self.data.len() {
            return None;
        }
        let block_size = if self.use_1k { 1024 } else { 128 };
        let end = (self.pos + block_size).min(self.data.len());
        let start = self.pos;
        self.pos = end;
        Some(&self.data[start..end])
    }

    /// Feeds newly received bytes and returns bytes to transmit.
    pub fn on_bytes(&mut self, input: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for &b in input {
            if b == CAN {
                self.cancel_streak += 1;
                if self.cancel_streak >= 2 {
                    self.state = SenderState::Aborted;
                    return out;
                }
                continue;
            }
            self.cancel_streak = 0;
            match self.state {
                SenderState::WaitStart => {
                    self.mode = match b {
                        C => Some(Mode::Crc),
                        NAK => Some(Mode::Checksum),
                        _ => None,
                    };
                    if self.mode.is_some() {
                        self.retries = 0;
                        out.extend(self.emit_block());
                    }
                }
                SenderState::WaitAck => match b {
                    ACK => {
                        self.retries = 0;
                        out.extend(self.emit_block());
                    }
                    NAK => {
                        self.retries += 1;
                        if self.retries > MAX_RETRIES {
                            self.state = SenderState::Aborted;
                        } else {
                            out.extend_from_slice(&self.pending_block);
                        }
                    }
                    _ => {}
                },
                SenderState::WaitEotAck => {
                    if b == ACK {
                        self.state = SenderState::Complete;
                    }
                }
                _ => {}
            }
        }
        out
    }

    fn emit_block(&mut self) -> Vec<u8> {
        let Some(mode) = self.mode else {
            return Vec::new();
        };
        match self.next_chunk() {
            Some(chunk) => {
                let chunk = chunk.to_vec();
                let bytes = block_bytes(mode, self.use_1k, self.seq, &chunk);
                self.pending_block = bytes.clone();
                self.seq = self.seq.wrapping_add(1);
                self.state = SenderState::WaitAck;
                bytes
            }
            None => {
                self.state = SenderState::WaitEotAck;
                vec![EOT]
            }
        }
    }

    /// A round-trip deadline expired without a reply; retries or aborts.
    pub fn on_timeout(&mut self) -> Vec<u8> {
        self.retries += 1;
        if self.retries > MAX_RETRIES {
            self.state = SenderState::Aborted;
            return Vec::new();
        }
        match self.state {
            SenderState::WaitAck | SenderState::WaitEotAck => self.pending_block.clone(),
            _ => Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == SenderState::Complete
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    SendStart,
    WaitBlock,
    SendAck,
    Complete,
    Aborted,
}

#[derive(Debug)]
pub struct XmodemReceiver {
    state: ReceiverState,
    mode: Mode,
    expected_seq: u8,
    out: Vec<u8>,
    buf: Vec<u8>,
    retries: u32,
}

impl XmodemReceiver {
    pub fn new(mode: Mode) -> Self {
        XmodemReceiver {
            state: ReceiverState::SendStart,
            mode,
            expected_seq: 1,
            out: Vec::new(),
            buf: Vec::new(),
            retries: 0,
        }
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn received_data(&self) -> &[u8] {
        &self.out
    }

    /// First byte to send: `C` for CRC mode, `NAK` for checksum mode
    /// (spec §4.5.1: "The first received byte selects mode").
    pub fn start_byte(&self) -> u8 {
        match self.mode {
            Mode::Crc => C,
            Mode::Checksum => NAK,
        }
    }

    fn header_len(&self) -> usize {
        3
    }

    fn check_len(&self) -> usize {
        match self.mode {
            Mode::Crc => 2,
            Mode::Checksum => 1,
        }
    }

    pub fn on_bytes(&mut self, input: &[u8]) -> Vec<u8> {
        self.buf.extend_from_slice(input);
        let mut out = Vec::new();
        loop {
            if self.buf.is_empty() {
                break;
            }
            match self.buf[0] {
                EOT => {
                    self.buf.remove(0);
                    self.state = ReceiverState::Complete;
                    out.push(ACK);
                    break;
                }
                SOH | STX => {
                    let block_size = if self.buf[0] == STX { 1024 } else { 128 };
                    let total = self.header_len() + block_size + self.check_len();
                    if self.buf.len() < total {
                        break;
                    }
                    let frame: Vec<u8> = self.buf.drain(..total).collect();
                    let seq = frame[1];
                    let seq_complement = frame[2];
                    let payload = &frame[self.header_len()..self.header_len() + block_size];
                    let valid_seq = seq == 255u8.wrapping_sub(seq_complement);
                    let valid_check = match self.mode {
                        Mode::Checksum => {
                            frame[self.header_len() + block_size] == checksum_mod256(payload)
                        }
                        Mode::Crc => {
                            let got = u16::from_be_bytes([
                                frame[self.header_len() + block_size],
                                frame[self.header_len() + block_size + 1],
                            ]);
                            got == crc16_ccitt(payload)
                        }
                    };
                    if valid_seq && valid_check && seq == self.expected_seq {
                        self.out.extend_from_slice(payload);
                        self.expected_seq = self.expected_seq.wrapping_add(1);
                        self.retries = 0;
                        out.push(ACK);
                    } else if valid_seq && seq == self.expected_seq.wrapping_sub(1) {
                        // Duplicate of the block we already accepted: our
                        // ACK must have been lost. Re-ACK without storing.
                        out.push(ACK);
                    } else {
                        self.retries += 1;
                        out.push(NAK);
                    }
                }
                _ => {
                    // Garbage byte while hunting for a header; drop it.
                    self.buf.remove(0);
                }
            }
        }
        out
    }

    pub fn on_timeout(&mut self) -> Vec<u8> {
        self.retries += 1;
        if self.retries > MAX_RETRIES {
            self.state = ReceiverState::Aborted;
            Vec::new()
        } else {
            vec![self.start_byte()]
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == ReceiverState::Complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// spec §8 scenario 1, literal bytes.
    #[test]
    fn crc_single_block_matches_spec_example() {
        let mut sender = XmodemSender::new(b"hello world\n".to_vec(), false);
        let first_block = sender.on_bytes(&[C]);

        assert_eq!(first_block[0], SOH);
        assert_eq!(first_block[1], 0x01);
        assert_eq!(first_block[2], 0xFE);
        assert_eq!(&first_block[3..15], b"hello world\n");
        assert_eq!(&first_block[15..131], &[PAD; 116][..]);
        assert_eq!(&first_block[131..133], &[0x0D, 0x79]);

        let eot = sender.on_bytes(&[ACK]);
        assert_eq!(eot, vec![EOT]);

        let done = sender.on_bytes(&[ACK]);
        assert!(done.is_empty());
        assert!(sender.is_complete());
    }

    #[test]
    fn receiver_accepts_sender_output_end_to_end() {
        let mut sender = XmodemSender::new(b"hello world\n".to_vec(), false);
        let receiver_start = XmodemReceiver::new(Mode::Crc).start_byte();
        let mut receiver = XmodemReceiver::new(Mode::Crc);

        let block = sender.on_bytes(&[receiver_start]);
        let ack = receiver.on_bytes(&block);
        let eot = sender.on_bytes(&ack);
        let final_ack = receiver.on_bytes(&eot);
        sender.on_bytes(&final_ack);

        assert!(sender.is_complete());
        assert!(receiver.is_complete());
        assert_eq!(receiver.received_data(), b"hello world\n");
    }

    #[test]
    fn block_number_wraps_from_255_to_0() {
        let mut receiver = XmodemReceiver::new(Mode::Crc);
        receiver.expected_seq = 255;
        let block = block_bytes(Mode::Crc, false, 255, b"a");
        let ack = receiver.on_bytes(&block);
        assert_eq!(ack, vec![ACK]);
        assert_eq!(receiver.expected_seq, 0);

        let block0 = block_bytes(Mode::Crc, false, 0, b"b");
        let ack0 = receiver.on_bytes(&block0);
        assert_eq!(ack0, vec![ACK]);
    }

    #[test]
    fn crc_mismatch_triggers_nak() {
        let mut receiver = XmodemReceiver::new(Mode::Crc);
        let mut block = block_bytes(Mode::Crc, false, 1, b"x");
        let last = block.len() - 1;
        block[last] ^= 0xFF;
        assert_eq!(receiver.on_bytes(&block), vec![NAK]);
    }

    #[test]
    fn two_consecutive_cans_abort() {
        let mut sender = XmodemSender::new(b"data".to_vec(), false);
        sender.on_bytes(&[C]);
        sender.on_bytes(&[CAN]);
        assert_eq!(sender.state(), SenderState::WaitAck);
        sender.on_bytes(&[CAN]);
        assert_eq!(sender.state(), SenderState::Aborted);
    }
}
