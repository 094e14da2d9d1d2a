//! ZMODEM (spec §4.5.3).
//!
//! This module implements framing (hex and binary32 headers, ZDLE escaping,
//! CRC-32) and the send/receive flow state machines described in spec
//! §4.5.3. It does not attempt byte-exact fidelity with every historical
//! ZMODEM implementation quirk; it implements the wire behaviour the
//! specification pins down.

use super::crc::crc32_reflected;

pub const ZDLE: u8 = 0x18;
const ZPAD: u8 = b'*';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    ZRqInit = 0,
    ZRInit = 1,
    ZSInit = 2,
    ZAck = 3,
    ZFile = 4,
    ZSkip = 5,
    ZNak = 6,
    ZAbort = 7,
    ZFin = 8,
    ZRPos = 9,
    ZData = 10,
    ZEof = 11,
    ZFErr = 12,
    ZCrc = 13,
    ZCompl = 15,
    ZCan = 16,
}

impl FrameType {
    pub fn from_u8(v: u8) -> Option<Self> {
        use FrameType::*;
        Some(match v {
            0 => ZRqInit,
            1 => ZRInit,
            2 => ZSInit,
            3 => ZAck,
            4 => ZFile,
            5 => ZSkip,
            6 => ZNak,
            7 => ZAbort,
            8 => ZFin,
            9 => ZRPos,
            10 => ZData,
            11 => ZEof,
            12 => ZFErr,
            13 => ZCrc,
            15 => ZCompl,
            16 => ZCan,
            _ => return None,
        })
    }
}

/// Subpacket terminators (spec §4.5.3 table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubpacketEnd {
    /// 'h' — end of frame, CRC of this subpacket only.
    Crce,
    /// 'i' — more subpackets follow without requiring an ACK.
    Crcg,
    /// 'j' — more subpackets follow; requests a ZACK.
    Crcq,
    /// 'k' — end of this frame; requests a ZACK (used for the final block).
    Crcw,
}

impl SubpacketEnd {
    pub fn byte(self) -> u8 {
        match self {
            SubpacketEnd::Crce => b'h',
            SubpacketEnd::Crcg => b'i',
            SubpacketEnd::Crcq => b'j',
            SubpacketEnd::Crcw => b'k',
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'h' => Some(SubpacketEnd::Crce),
            b'i' => Some(SubpacketEnd::Crcg),
            b'j' => Some(SubpacketEnd::Crcq),
            b'k' => Some(SubpacketEnd::Crcw),
            _ => None,
        }
    }
}

/// `CANFDX|CANOVIO|CANFC32` advertised by a receiver (spec §4.5.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReceiverCapabilities {
    pub can_full_duplex: bool,
    pub can_overlap_io: bool,
    pub can_crc32: bool,
    pub escape_control_chars: bool,
}

pub fn needs_escape(byte: u8, escctl: bool) -> bool {
    matches!(byte, 0x18 | 0x11 | 0x13 | 0x91 | 0x93) || (escctl && byte < 0x20)
}

/// ZDLE-escapes a buffer for transmission inside a binary32 frame.
pub fn escape(data: &[u8], escctl: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &b in data {
        if needs_escape(b, escctl) {
            out.push(ZDLE);
            out.push(b ^ 0x40);
        } else {
            out.push(b);
        }
    }
    out
}

/// Reverses [`escape`]. Returns `None` on a dangling ZDLE.
pub fn unescape(data: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len());
    let mut iter = data.iter().copied();
    while let Some(b) = iter.next() {
        if b == ZDLE {
            let next = iter.next()?;
            out.push(next ^ 0x40);
        } else {
            out.push(b);
        }
    }
    Some(out)
}

/// A binary32 header: `ZPAD ZDLE 'C'` then the escaped type byte, four data
/// bytes, and a little-endian CRC-32 of (type || data), all escaped.
pub fn encode_binary32_header(frame_type: FrameType, arg: u32, escctl: bool) -> Vec<u8> {
    let mut body = vec![frame_type as u8];
    body.extend_from_slice(&arg.to_le_bytes());
    let crc = crc32_reflected(&body);

    let mut raw = body;
    raw.extend_from_slice(&crc.to_le_bytes());

    let mut out = vec![ZPAD, ZDLE, b'C'];
    out.extend(escape(&raw, escctl));
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedHeader {
    pub frame_type: FrameType,
    pub arg: u32,
}

pub fn decode_binary32_header(frame: &[u8]) -> Option<DecodedHeader> {
    if frame.len() < 3 || frame[0] != ZPAD || frame[1] != ZDLE || frame[2] != b'C' {
        return None;
    }
    let unescaped = unescape(&frame[3..])?;
    if unescaped.len() < 9 {
        return None;
    }
    let body = &unescaped[..5];
    let crc = u32::from_le_bytes(unescaped[5..9].try_into().ok()?);
    if crc32_reflected(body) != crc {
        return None;
    }
    let frame_type = FrameType::from_u8(body[0])?;
    let arg = u32::from_le_bytes(body[1..5].try_into().ok()?);
    Some(DecodedHeader { frame_type, arg })
}

/// A hex header (used for negotiation): `ZPAD ZPAD ZDLE 'B'` then four
/// ASCII-hex bytes for type+arg, four ASCII-hex CRC-16 digits, CR LF.
pub fn encode_hex_header(frame_type: FrameType, arg: u32) -> Vec<u8> {
    let mut body = vec![frame_type as u8];
    body.extend_from_slice(&arg.to_le_bytes());
    let crc = super::crc::crc16_ccitt(&body);

    let mut out = vec![ZPAD, ZPAD, ZDLE, b'B'];
    for &byte in body.iter().chain(crc.to_be_bytes().iter()) {
        out.extend(format!("{byte:02x}").into_bytes());
    }
    out.extend_from_slice(b"\r\n");
    out
}

pub fn decode_hex_header(frame: &[u8]) -> Option<DecodedHeader> {
    if frame.len() < 4 || frame[0] != ZPAD || frame[1] != ZPAD || frame[2] != ZDLE || frame[3] != b'B'
    {
        return None;
    }
    let hex = &frame[4..];
    if hex.len() < 14 {
        return None;
    }
    let mut bytes = Vec::with_capacity(7);
    for chunk in hex[..14].chunks(2) {
        let s = std::str::from_utf8(chunk).ok()?;
        bytes.push(u8::from_str_radix(s, 16).ok()?);
    }
    let body = &bytes[..5];
    let crc = u16::from_be_bytes([bytes[5], bytes[6]]);
    if super::crc::crc16_ccitt(body) != crc {
        return None;
    }
    let frame_type = FrameType::from_u8(body[0])?;
    let arg = u32::from_le_bytes(body[1..5].try_into().ok()?);
    Some(DecodedHeader { frame_type, arg })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    Init,
    WaitRInit,
    WaitRPos,
    Sending,
    WaitDataAck,
    WaitFin,
    Done,
}

/// Sender flow (spec §4.5.3 "Send flow").
pub struct ZmodemSender {
    state: SendState,
    data: Vec<u8>,
    pos: usize,
    escctl: bool,
}

impl ZmodemSender {
    pub fn new(data: Vec<u8>) -> Self {
        ZmodemSender {
            state: SendState::Init,
            data,
            pos: 0,
            escctl: false,
        }
    }

    pub fn state(&self) -> SendState {
        self.state
    }

    pub fn begin(&mut self) -> Vec<u8> {
        self.state = SendState::WaitRInit;
        encode_hex_header(FrameType::ZRqInit, 0)
    }

    /// Called with a decoded ZRINIT; emits ZFILE.
    pub fn on_rinit(&mut self, filename: &str) -> Vec<u8> {
        self.state = SendState::WaitRPos;
        let mut frame = encode_binary32_header(FrameType::ZFile, 0, self.escctl);
        let mut name_field = filename.as_bytes().to_vec();
        name_field.push(0);
        name_field.extend_from_slice(self.data.len().to_string().as_bytes());
        frame.extend(escape(&name_field, self.escctl));
        frame
    }

    /// Called with a ZRPOS offset; seeks and starts streaming ZDATA.
    pub fn on_rpos(&mut self, offset: u32) -> Vec<u8> {
        self.pos = (offset as usize).min(self.data.len());
        self.state = SendState::Sending;
        let mut out = encode_binary32_header(FrameType::ZData, offset, self.escctl);
        out.extend(self.next_subpacket());
        out
    }

    fn next_subpacket(&mut self) -> Vec<u8> {
        const MAX_SUBPACKET: usize = 1024;
        let remaining = self.data.len() - self.pos;
        let take = remaining.min(MAX_SUBPACKET);
        let chunk = self.data[self.pos..self.pos + take].to_vec();
        self.pos += take;
        let end = if self.pos >= self.data.len() {
            SubpacketEnd::Crce
        } else {
            SubpacketEnd::Crcg
        };

        let mut crc_input = chunk.clone();
        crc_input.push(end.byte());
        let crc = crc32_reflected(&crc_input);

        let mut out = escape(&chunk, self.escctl);
        out.push(ZDLE);
        out.push(end.byte());
        out.extend(escape(&crc.to_le_bytes(), self.escctl));
        out
    }

    pub fn on_data_ack(&mut self) -> Vec<u8> {
        if self.pos >= self.data.len() {
            self.state = SendState::WaitDataAck;
            encode_binary32_header(FrameType::ZEof, self.pos as u32, self.escctl)
        } else {
            self.next_subpacket()
        }
    }

    pub fn on_rinit_after_eof(&mut self) -> Vec<u8> {
        self.state = SendState::WaitFin;
        encode_hex_header(FrameType::ZFin, 0)
    }

    pub fn on_peer_fin(&mut self) -> Vec<u8> {
        self.state = SendState::Done;
        b"OO".to_vec()
    }

    pub fn is_done(&self) -> bool {
        self.state == SendState::Done
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvState {
    Init,
    WaitFile,
    Receiving,
    WaitFin,
    Done,
}

/// Receiver flow (spec §4.5.3 "Receive flow").
pub struct ZmodemReceiver {
    state: RecvState,
    pub capabilities: ReceiverCapabilities,
    out: Vec<u8>,
    resume_offset: u32,
}

impl ZmodemReceiver {
    pub fn new(existing_bytes: u32) -> Self {
        ZmodemReceiver {
            state: RecvState::Init,
            capabilities: ReceiverCapabilities {
                can_full_duplex: true,
                can_overlap_io: true,
                can_crc32: true,
                escape_control_chars: false,
            },
            out: Vec::new(),
            resume_offset: existing_bytes,
        }
    }

    pub fn state(&self) -> RecvState {
        self.state
    }

    pub fn received_data(&self) -> &[u8] {
        &self.out
    }

    pub fn on_rqinit(&mut self) -> Vec<u8> {
        self.state = RecvState::WaitFile;
        encode_hex_header(FrameType::ZRInit, 0)
    }

    /// Replies ZRPOS with the resumption offset, possibly nonzero if the
    /// same file is partially present (spec §4.5.3 "Crash recovery").
    pub fn on_file(&mut self) -> Vec<u8> {
        self.state = RecvState::Receiving;
        encode_binary32_header(FrameType::ZRPos, self.resume_offset, false)
    }

    /// Accepts one escaped data subpacket body (chunk + ZDLE + end byte +
    /// escaped CRC), returns `Some(end)` on success.
    pub fn on_data_subpacket(&mut self, chunk: &[u8], _end: SubpacketEnd) {
        self.out.extend_from_slice(chunk);
    }

    pub fn on_eof(&mut self) -> Vec<u8> {
        encode_hex_header(FrameType::ZRInit, 0)
    }

    pub fn on_peer_fin(&mut self) -> Vec<u8> {
        self.state = RecvState::WaitFin;
        encode_hex_header(FrameType::ZFin, 0)
    }

    pub fn on_oo(&mut self) {
        self.state = RecvState::Done;
    }

    pub fn is_done(&self) -> bool {
        self.state == RecvState::Done
    }
}

/// One frame pulled off the wire by [`scan_frame`]: a header, or a data
/// subpacket body with its terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingFrame {
    Header(DecodedHeader),
    Data { chunk: Vec<u8>, end: SubpacketEnd },
}

/// Scans `buf` for the next complete frame, returning it along with how
/// many leading bytes were consumed. `expect_data` selects data-subpacket
/// scanning (no `ZPAD` marker, a raw ZDLE-escaped stream terminated by
/// `ZDLE <end-byte>` and a trailing escaped CRC-32) versus header
/// scanning, matching which side of the flow the caller is in (spec
/// §4.5.3: after `ZDATA` the sender streams subpackets with no header in
/// front of each one).
pub fn scan_frame(buf: &[u8], expect_data: bool) -> Option<(IncomingFrame, usize)> {
    if expect_data {
        return scan_data_subpacket(buf);
    }
    let start = buf.iter().position(|&b| b == ZPAD)?;
    let rest = &buf[start..];
    if rest.len() >= 4 && rest[1] == ZPAD && rest[2] == ZDLE && rest[3] == b'B' {
        let total = 4 + 14 + 2;
        if rest.len() < total {
            return None;
        }
        let decoded = decode_hex_header(&rest[..total])?;
        Some((IncomingFrame::Header(decoded), start + total))
    } else if rest.len() >= 3 && rest[1] == ZDLE && rest[2] == b'C' {
        let mut i = 3;
        let mut unescaped = Vec::with_capacity(9);
        while unescaped.len() < 9 {
            if i >= rest.len() {
                return None;
            }
            if rest[i] == ZDLE {
                if i + 1 >= rest.len() {
                    return None;
                }
                unescaped.push(rest[i + 1] ^ 0x40);
                i += 2;
            } else {
                unescaped.push(rest[i]);
                i += 1;
            }
        }
        let body = &unescaped[..5];
        let crc = u32::from_le_bytes(unescaped[5..9].try_into().ok()?);
        if crc32_reflected(body) != crc {
            return None;
        }
        let frame_type = FrameType::from_u8(body[0])?;
        let arg = u32::from_le_bytes(body[1..5].try_into().ok()?);
        Some((IncomingFrame::Header(DecodedHeader { frame_type, arg }), start + i))
    } else {
        None
    }
}

fn scan_data_subpacket(buf: &[u8]) -> Option<(IncomingFrame, usize)> {
    let mut chunk = Vec::new();
    let mut i = 0;
    loop {
        if i >= buf.len() {
            return None;
        }
        if buf[i] == ZDLE {
            if i + 1 >= buf.len() {
                return None;
            }
            if let Some(end) = SubpacketEnd::from_byte(buf[i + 1]) {
                i += 2;
                let mut crc_bytes = Vec::with_capacity(4);
                while crc_bytes.len() < 4 {
                    if i >= buf.len() {
                        return None;
                    }
                    if buf[i] == ZDLE {
                        if i + 1 >= buf.len() {
                            return None;
                        }
                        crc_bytes.push(buf[i + 1] ^ 0x40);
                        i += 2;
                    } else {
                        crc_bytes.push(buf[i]);
                        i += 1;
                    }
                }
                let mut crc_input = chunk.clone();
                crc_input.push(end.byte());
                let expected = u32::from_le_bytes(crc_bytes.try_into().ok()?);
                if crc32_reflected(&crc_input) != expected {
                    return None;
                }
                return Some((IncomingFrame::Data { chunk, end }, i));
            }
            chunk.push(buf[i + 1] ^ 0x40);
            i += 2;
        } else {
            chunk.push(buf[i]);
            i += 1;
        }
    }
}

/// Drives [`ZmodemSender`] against a raw input byte stream the way
/// [`super::xmodem::XmodemSender`] drives its block state machine: feed in
/// whatever the input pipe has, get back whatever belongs on the output
/// pipe. Unlike XMODEM/YMODEM, ZMODEM's sender speaks first (spec §4.5.3
/// "Send flow" opens with "emit ZRQINIT"), so [`Self::new`] primes the
/// outgoing buffer immediately instead of waiting to be kicked off.
pub struct ZmodemSendSession {
    sender: ZmodemSender,
    filename: String,
    buf: Vec<u8>,
    pending: Vec<u8>,
    failed: bool,
}

impl ZmodemSendSession {
    pub fn new(filename: String, data: Vec<u8>) -> Self {
        let mut sender = ZmodemSender::new(data);
        let pending = sender.begin();
        ZmodemSendSession { sender, filename, buf: Vec::new(), pending, failed: false }
    }

    /// The ZRQINIT this side owes the wire before anything else; the
    /// caller sends this immediately on transfer start rather than waiting
    /// for input, the mirror image of an XMODEM/YMODEM receiver's
    /// `start_byte`.
    pub fn take_pending(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }

    pub fn on_bytes(&mut self, input: &[u8]) -> Vec<u8> {
        self.buf.extend_from_slice(input);
        let mut out = std::mem::take(&mut self.pending);
        loop {
            let Some((frame, consumed)) = scan_frame(&self.buf, false) else { break };
            self.buf.drain(..consumed);
            let IncomingFrame::Header(header) = frame else { continue };
            match (self.sender.state(), header.frame_type) {
                (SendState::WaitRInit, FrameType::ZRInit) => {
                    out.extend(self.sender.on_rinit(&self.filename))
                }
                (SendState::WaitRPos, FrameType::ZRPos) => out.extend(self.sender.on_rpos(header.arg)),
                (SendState::WaitDataAck, FrameType::ZRInit) => {
                    out.extend(self.sender.on_rinit_after_eof())
                }
                (SendState::WaitFin, FrameType::ZFin) => out.extend(self.sender.on_peer_fin()),
                (_, FrameType::ZCan) | (_, FrameType::ZAbort) => self.failed = true,
                _ => {}
            }
        }
        // No per-subpacket ACK in this flow (spec §4.5.3): once ZRPOS
        // starts the stream, keep emitting subpackets until ZEOF.
        while self.sender.state() == SendState::Sending {
            out.extend(self.sender.on_data_ack());
        }
        out
    }

    pub fn on_timeout(&mut self) -> Vec<u8> {
        match self.sender.state() {
            SendState::WaitRInit => encode_hex_header(FrameType::ZRqInit, 0),
            SendState::WaitFin => encode_hex_header(FrameType::ZFin, 0),
            _ => Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.sender.is_done()
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }
}

/// Drives [`ZmodemReceiver`] the same way. The receiver never speaks first;
/// it only replies once the sender's ZRQINIT arrives (spec §4.5.3 "Receive
/// flow").
pub struct ZmodemRecvSession {
    receiver: ZmodemReceiver,
    buf: Vec<u8>,
    in_data_frame: bool,
    failed: bool,
}

impl ZmodemRecvSession {
    pub fn new(existing_bytes: u32) -> Self {
        ZmodemRecvSession {
            receiver: ZmodemReceiver::new(existing_bytes),
            buf: Vec::new(),
            in_data_frame: false,
            failed: false,
        }
    }

    pub fn received_data(&self) -> &[u8] {
        self.receiver.received_data()
    }

    pub fn on_bytes(&mut self, input: &[u8]) -> Vec<u8> {
        self.buf.extend_from_slice(input);
        let mut out = Vec::new();
        loop {
            let Some((frame, consumed)) = scan_frame(&self.buf, self.in_data_frame) else {
                break;
            };
            self.buf.drain(..consumed);
            match frame {
                IncomingFrame::Header(header) => match (self.receiver.state(), header.frame_type) {
                    (RecvState::Init, FrameType::ZRqInit) => out.extend(self.receiver.on_rqinit()),
                    (RecvState::WaitFile, FrameType::ZFile) => out.extend(self.receiver.on_file()),
                    (RecvState::Receiving, FrameType::ZData) => self.in_data_frame = true,
                    (RecvState::Receiving, FrameType::ZEof) => {
                        self.in_data_frame = false;
                        out.extend(self.receiver.on_eof());
                    }
                    (RecvState::WaitFile, FrameType::ZFin) | (RecvState::Receiving, FrameType::ZFin) => {
                        out.extend(self.receiver.on_peer_fin());
                    }
                    (_, FrameType::ZCan) | (_, FrameType::ZAbort) => self.failed = true,
                    _ => {}
                },
                IncomingFrame::Data { chunk, end } => {
                    self.receiver.on_data_subpacket(&chunk, end);
                    if matches!(end, SubpacketEnd::Crce | SubpacketEnd::Crcw) {
                        self.in_data_frame = false;
                    }
                }
            }
        }
        if self.receiver.state() == RecvState::WaitFin {
            if let Some(pos) = self.buf.windows(2).position(|w| w == b"OO") {
                self.buf.drain(..pos + 2);
                self.receiver.on_oo();
            }
        }
        out
    }

    pub fn on_timeout(&mut self) -> Vec<u8> {
        Vec::new()
    }

    pub fn is_complete(&self) -> bool {
        self.receiver.is_done()
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_and_unescape_round_trip_all_control_bytes() {
        let data: Vec<u8> = (0..=255u8).collect();
        let escaped = escape(&data, true);
        assert_eq!(unescape(&escaped).unwrap(), data);
    }

    #[test]
    fn zdle_itself_is_always_escaped() {
        let escaped = escape(&[ZDLE], false);
        assert_eq!(escaped, vec![ZDLE, ZDLE ^ 0x40]);
    }

    #[test]
    fn escctl_off_leaves_low_control_bytes_untouched() {
        let escaped = escape(&[0x05], false);
        assert_eq!(escaped, vec![0x05]);
        let escaped_on = escape(&[0x05], true);
        assert_eq!(escaped_on, vec![ZDLE, 0x05 ^ 0x40]);
    }

    #[test]
    fn binary32_header_round_trips() {
        let frame = encode_binary32_header(FrameType::ZRPos, 1234, false);
        let decoded = decode_binary32_header(&frame).unwrap();
        assert_eq!(decoded.frame_type, FrameType::ZRPos);
        assert_eq!(decoded.arg, 1234);
    }

    #[test]
    fn hex_header_round_trips() {
        let frame = encode_hex_header(FrameType::ZRInit, 0);
        let decoded = decode_hex_header(&frame).unwrap();
        assert_eq!(decoded.frame_type, FrameType::ZRInit);
        assert_eq!(decoded.arg, 0);
    }

    #[test]
    fn binary32_header_rejects_corrupted_crc() {
        let mut frame = encode_binary32_header(FrameType::ZData, 0, false);
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert!(decode_binary32_header(&frame).is_none());
    }

    #[test]
    fn last_subpacket_of_a_file_uses_zcrce() {
        let mut sender = ZmodemSender::new(b"short".to_vec());
        sender.begin();
        sender.on_rinit("short.txt");
        let frame = sender.on_rpos(0);
        // ZCRCE == 'h'; the subpacket terminator is the byte after ZDLE.
        let zdle_pos = frame.windows(2).rposition(|w| w[0] == ZDLE && w[1] == b'h');
        assert!(zdle_pos.is_some());
        assert_eq!(sender.pos, 5);
    }

    #[test]
    fn scan_frame_finds_a_hex_header_and_reports_its_length() {
        let frame = encode_hex_header(FrameType::ZRInit, 7);
        let mut buf = vec![0, 0, 0];
        buf.extend_from_slice(&frame);
        let (found, consumed) = scan_frame(&buf, false).unwrap();
        assert_eq!(found, IncomingFrame::Header(DecodedHeader { frame_type: FrameType::ZRInit, arg: 7 }));
        assert_eq!(consumed, 3 + frame.len());
    }

    #[test]
    fn scan_frame_finds_a_binary32_header() {
        let frame = encode_binary32_header(FrameType::ZRPos, 42, false);
        let (found, consumed) = scan_frame(&frame, false).unwrap();
        assert_eq!(found, IncomingFrame::Header(DecodedHeader { frame_type: FrameType::ZRPos, arg: 42 }));
        assert_eq!(consumed, frame.len());
    }

    #[test]
    fn scan_frame_reads_a_data_subpacket() {
        let mut sender = ZmodemSender::new(b"short".to_vec());
        sender.begin();
        sender.on_rinit("short.txt");
        let frame = sender.on_rpos(0);
        // Strip the leading ZDATA header, leaving only the subpacket.
        let header_len = encode_binary32_header(FrameType::ZData, 0, false).len();
        let subpacket = &frame[header_len..];
        let (found, consumed) = scan_frame(subpacket, true).unwrap();
        assert_eq!(found, IncomingFrame::Data { chunk: b"short".to_vec(), end: SubpacketEnd::Crce });
        assert_eq!(consumed, subpacket.len());
    }

    #[test]
    fn send_session_and_recv_session_drive_each_other_to_completion() {
        let mut sender = ZmodemSendSession::new("greeting.txt".to_string(), b"hello zmodem".to_vec());
        let mut receiver = ZmodemRecvSession::new(0);

        let mut on_wire = sender.take_pending();
        for _ in 0..10 {
            if on_wire.is_empty() {
                break;
            }
            let reply = receiver.on_bytes(&on_wire);
            on_wire = sender.on_bytes(&reply);
            if sender.is_complete() && receiver.is_complete() {
                break;
            }
        }

        assert!(sender.is_complete());
        assert!(receiver.is_complete());
        assert_eq!(receiver.received_data(), b"hello zmodem");
    }
}
