//! C10 wire framing: two header bytes, bit 15 of the first distinguishing
//! command (1) from data (0) frames, the remaining 15 bits a payload
//! length 0..32767 (spec §4.10, §6).

use std::fmt;

pub const MAX_PAYLOAD: usize = 32767;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandId {
    Nul = 0,
    Adr = 1,
    Pwd = 2,
    File = 3,
    Ok = 4,
    Eob = 5,
    Got = 6,
    Err = 7,
    Bsy = 8,
    Get = 9,
    Skip = 10,
}

impl CommandId {
    pub fn from_u8(v: u8) -> Option<Self> {
        use CommandId::*;
        Some(match v {
            0 => Nul,
            1 => Adr,
            2 => Pwd,
            3 => File,
            4 => Ok,
            5 => Eob,
            6 => Got,
            7 => Err,
            8 => Bsy,
            9 => Get,
            10 => Skip,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Command(CommandId, String),
    Data(Vec<u8>),
}

#[derive(Debug)]
pub enum FrameError {
    TooLarge,
    UnknownCommand(u8),
    Truncated,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::TooLarge => write!(f, "frame payload exceeds 32767 bytes"),
            FrameError::UnknownCommand(id) => write!(f, "unknown binkp command id {id}"),
            FrameError::Truncated => write!(f, "truncated binkp frame"),
        }
    }
}
impl std::error::Error for FrameError {}

pub fn encode(frame: &Frame) -> Result<Vec<u8>, FrameError> {
    let payload: Vec<u8> = match frame {
        Frame::Command(id, args) => {
            let mut p = vec![*id as u8];
            p.extend_from_slice(args.as_bytes());
            p
        }
        Frame::Data(bytes) => bytes.clone(),
    };
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::TooLarge);
    }
    let is_command = matches!(frame, Frame::Command(..));
    let len = payload.len() as u16;
    let mut header = len;
    if is_command {
        header |= 0x8000;
    }
    let mut out = Vec::with_capacity(2 + payload.len());
    out.extend_from_slice(&header.to_be_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decodes one frame from the front of `buf`, returning the frame and the
/// number of bytes consumed, or `None` if the header/payload is not yet
/// fully buffered.
pub fn decode(buf: &[u8]) -> Result<Option<(Frame, usize)>, FrameError> {
    if buf.len() < 2 {
        return Ok(None);
    }
    let header = u16::from_be_bytes([buf[0], buf[1]]);
    let is_command = header & 0x8000 != 0;
    let len = (header & 0x7FFF) as usize;
    if buf.len() < 2 + len {
        return Ok(None);
    }
    let payload = &buf[2..2 + len];
    let frame = if is_command {
        if payload.is_empty() {
            return Err(FrameError::Truncated);
        }
        let id = CommandId::from_u8(payload[0]).ok_or(FrameError::UnknownCommand(payload[0]))?;
        let args = String::from_utf8_lossy(&payload[1..]).into_owned();
        Frame::Command(id, args)
    } else {
        Frame::Data(payload.to_vec())
    };
    Ok(Some((frame, 2 + len)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_frame_round_trips_with_bit_15_set() {
        let frame = Frame::Command(CommandId::Adr, "1:2/3".to_string());
        let encoded = encode(&frame).unwrap();
        assert_eq!(encoded[0] & 0x80, 0x80);
        let (decoded, consumed) = decode(&encoded).unwrap().unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn data_frame_has_bit_15_clear() {
        let frame = Frame::Data(b"raw file bytes".to_vec());
        let encoded = encode(&frame).unwrap();
        assert_eq!(encoded[0] & 0x80, 0);
        let (decoded, _) = decode(&encoded).unwrap().unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn decode_reports_incomplete_buffers_as_none() {
        let frame = Frame::Command(CommandId::Ok, String::new());
        let encoded = encode(&frame).unwrap();
        assert!(decode(&encoded[..encoded.len() - 1]).unwrap().is_none());
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let frame = Frame::Data(vec![0u8; MAX_PAYLOAD + 1]);
        assert!(matches!(encode(&frame), Err(FrameError::TooLarge)));
    }
}
