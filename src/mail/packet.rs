//! C7: FTN packet type 2+ header and message header codec (spec §4.7, §6).
//! Field layout is byte-exact to the published FSC specification.

use std::fmt;

use crate::config::FtnAddress;

pub const PACKET_HEADER_LEN: usize = 58;
pub const MESSAGE_HEADER_LEN: usize = 14;
const PACKET_TYPE: u16 = 2;
const CAPABILITY_WORD: u16 = 0x0100;

#[derive(Debug)]
pub enum PacketError {
    Truncated,
    BadMagic,
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketError::Truncated => write!(f, "packet truncated"),
            PacketError::BadMagic => write!(f, "malformed packet header"),
        }
    }
}
impl std::error::Error for PacketError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    pub origin: FtnAddress,
    pub destination: FtnAddress,
    pub year: u16,
    pub month: u16,
    pub day: u16,
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
    pub baud: u16,
    pub product_code: u16,
    pub product_rev: u16,
    pub password: [u8; 8],
}

fn le16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

impl PacketHeader {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(PACKET_HEADER_LEN);
        let push = |buf: &mut Vec<u8>, v: u16| buf.extend_from_slice(&v.to_le_bytes());
        push(&mut buf, self.origin.node);
        push(&mut buf, self.destination.node);
        push(&mut buf, self.year);
        push(&mut buf, self.month);
        push(&mut buf, self.day);
        push(&mut buf, self.hour);
        push(&mut buf, self.minute);
        push(&mut buf, self.second);
        push(&mut buf, self.baud);
        push(&mut buf, PACKET_TYPE);
        push(&mut buf, self.origin.net);
        push(&mut buf, self.destination.net);
        buf.push((self.product_code & 0xFF) as u8);
        buf.push((self.product_rev & 0xFF) as u8);
        buf.extend_from_slice(&self.password);
        push(&mut buf, self.origin.zone);
        push(&mut buf, self.destination.zone);
        push(&mut buf, CAPABILITY_WORD);
        buf.push(((self.product_code >> 8) & 0xFF) as u8);
        buf.push(((self.product_rev >> 8) & 0xFF) as u8);
        push(&mut buf, self.origin.zone);
        push(&mut buf, self.destination.zone);
        push(&mut buf, self.origin.point);
        push(&mut buf, self.destination.point);
        buf.extend_from_slice(&0u32.to_le_bytes());
        debug_assert_eq!(buf.len(), PACKET_HEADER_LEN);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < PACKET_HEADER_LEN {
            return Err(PacketError::Truncated);
        }
        let packet_type = le16(buf, 18);
        if packet_type != PACKET_TYPE {
            return Err(PacketError::BadMagic);
        }
        let origin_zone = le16(buf, 42);
        let dest_zone = le16(buf, 44);
        let origin_point = le16(buf, 48);
        let dest_point = le16(buf, 50);
        let mut password = [0u8; 8];
        password.copy_from_slice(&buf[24..32]);
        Ok(PacketHeader {
            origin: FtnAddress { zone: origin_zone, net: le16(buf, 20), node: le16(buf, 0), point: origin_point },
            destination: FtnAddress { zone: dest_zone, net: le16(buf, 22), node: le16(buf, 2), point: dest_point },
            year: le16(buf, 4),
            month: le16(buf, 6),
            day: le16(buf, 8),
            hour: le16(buf, 10),
            minute: le16(buf, 12),
            second: le16(buf, 14),
            baud: le16(buf, 16),
            product_code: buf[32] as u16 | ((buf[46] as u16) << 8),
            product_rev: buf[33] as u16 | ((buf[47] as u16) << 8),
            password,
        })
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MessageAttributes: u16 {
        const PRIVATE = 0x0001;
        const CRASH = 0x0002;
        const RECEIVED = 0x0004;
        const SENT = 0x0008;
        const FILE_ATTACH = 0x0010;
        const IN_TRANSIT = 0x0020;
        const ORPHAN = 0x0040;
        const KILL_SENT = 0x0080;
        const LOCAL = 0x0100;
        const HOLD = 0x0200;
    }
}

#[derive(Debug, Clone)]
pub struct PacketMessage {
    pub origin: FtnAddress,
    pub destination: FtnAddress,
    pub attributes: MessageAttributes,
    pub cost: u16,
    pub date_time: String,
    pub to_user: String,
    pub from_user: String,
    pub subject: String,
    pub body: String,
}

fn nul_terminated(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}

fn read_nul_terminated(buf: &[u8], off: &mut usize) -> Result<String, PacketError> {
    let end = buf[*off..].iter().position(|&b| b == 0).ok_or(PacketError::Truncated)?;
    let s = String::from_utf8_lossy(&buf[*off..*off + end]).into_owned();
    *off += end + 1;
    Ok(s)
}

impl PacketMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MESSAGE_HEADER_LEN + self.body.len());
        let push16 = |buf: &mut Vec<u8>, v: u16| buf.extend_from_slice(&v.to_le_bytes());
        push16(&mut buf, 2);
        push16(&mut buf, self.origin.node);
        push16(&mut buf, self.destination.node);
        push16(&mut buf, self.origin.net);
        push16(&mut buf, self.destination.net);
        push16(&mut buf, self.attributes.bits());
        push16(&mut buf, self.cost);
        nul_terminated(&mut buf, &self.date_time);
        nul_terminated(&mut buf, &self.to_user);
        nul_terminated(&mut buf, &self.from_user);
        nul_terminated(&mut buf, &self.subject);
        buf.extend_from_slice(self.body.as_bytes());
        buf.push(0);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<(Self, usize), PacketError> {
        if buf.len() < MESSAGE_HEADER_LEN {
            return Err(PacketError::Truncated);
        }
        let attributes = MessageAttributes::from_bits_truncate(le16(buf, 10));
        let origin = FtnAddress { zone: 0, net: le16(buf, 6), node: le16(buf, 2), point: 0 };
        let destination = FtnAddress { zone: 0, net: le16(buf, 8), node: le16(buf, 4), point: 0 };
        let cost = le16(buf, 12);
        let mut off = MESSAGE_HEADER_LEN;
        let date_time = read_nul_terminated(buf, &mut off)?;
        let to_user = read_nul_terminated(buf, &mut off)?;
        let from_user = read_nul_terminated(buf, &mut off)?;
        let subject = read_nul_terminated(buf, &mut off)?;
        let body_end = buf[off..].iter().position(|&b| b == 0).ok_or(PacketError::Truncated)?;
        let body = String::from_utf8_lossy(&buf[off..off + body_end]).into_owned();
        off += body_end + 1;
        Ok((
            PacketMessage { origin, destination, attributes, cost, date_time, to_user, from_user, subject, body },
            off,
        ))
    }

    /// Extracts the `AREA:<tag>` kludge line used to route echomail (spec
    /// §4.8 step 3). Kludge lines begin with SOH (0x01).
    pub fn area_tag(&self) -> Option<&str> {
        self.body.lines().find_map(|line| {
            let line = line.strip_prefix('\u{1}').unwrap_or(line);
            line.strip_prefix("AREA:").map(str::trim)
        })
    }

    pub fn seen_by(&self) -> Vec<&str> {
        self.body
            .lines()
            .filter_map(|l| l.strip_prefix('\u{1}').unwrap_or(l).strip_prefix("SEEN-BY:"))
            .flat_map(|s| s.split_whitespace())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> PacketHeader {
        PacketHeader {
            origin: FtnAddress { zone: 1, net: 2, node: 3, point: 0 },
            destination: FtnAddress { zone: 1, net: 4, node: 5, point: 0 },
            year: 2026,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            second: 0,
            baud: 0,
            product_code: 0x0F00,
            product_rev: 0x0102,
            password: *b"pass\0\0\0\0",
        }
    }

    #[test]
    fn packet_header_round_trips_byte_exact() {
        let header = sample_header();
        let encoded = header.encode();
        assert_eq!(encoded.len(), PACKET_HEADER_LEN);
        let decoded = PacketHeader::decode(&encoded).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn bad_type_word_is_rejected() {
        let mut encoded = sample_header().encode();
        encoded[18] = 3;
        assert!(matches!(PacketHeader::decode(&encoded), Err(PacketError::BadMagic)));
    }

    #[test]
    fn message_round_trips_and_extracts_area_tag() {
        let msg = PacketMessage {
            origin: FtnAddress { zone: 1, net: 2, node: 3, point: 0 },
            destination: FtnAddress { zone: 1, net: 4, node: 5, point: 0 },
            attributes: MessageAttributes::LOCAL,
            cost: 0,
            date_time: "01 Jan 26  00:00:00".to_string(),
            to_user: "All".to_string(),
            from_user: "Sysop".to_string(),
            subject: "hello".to_string(),
            body: "\u{1}AREA:GENERAL\r\nhello world\r\n\u{1}SEEN-BY: 1/2 1/3\r\n".to_string(),
        };
        let encoded = msg.encode();
        let (decoded, consumed) = PacketMessage::decode(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded.subject, "hello");
        assert_eq!(decoded.area_tag(), Some("GENERAL"));
        assert_eq!(decoded.seen_by(), vec!["1/2", "1/3"]);
    }
}
