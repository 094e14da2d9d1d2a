//! Message records (spec §3 "Message").

use std::path::{Path, PathBuf};

use bitflags::bitflags;
use parking_lot::Mutex;

use crate::config::FtnAddress;

use super::registry;
use super::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Local,
    Echo,
    Net,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RoutingFlags: u16 {
        const PRIVATE       = 0b0000_0000_0001;
        const CRASH         = 0b0000_0000_0010;
        const HOLD          = 0b0000_0000_0100;
        const DIRECT        = 0b0000_0000_1000;
        const IMMEDIATE     = 0b0000_0001_0000;
        const KILLSENT      = 0b0000_0010_0000;
        const FILE_ATTACH   = 0b0000_0100_0000;
        const FILE_REQUEST  = 0b0000_1000_0000;
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub id: u32,
    pub base_id: u32,
    pub area_id: u32,
    pub message_type: MessageType,
    pub deleted: bool,
    pub access_level: u8,
    pub access_keys: u32,
    pub subject: String,
    pub sender_id: u32,
    pub receiver_id: u32,
    pub origin: Option<FtnAddress>,
    pub destination: Option<FtnAddress>,
    pub imported_at: i64,
    pub sent_at: i64,
    pub read_at: Option<i64>,
    pub read_count: u32,
    pub body: String,
    pub exported: bool,
    pub flags: RoutingFlags,
}

impl Message {
    /// spec §3 invariant: "A Message cannot have both deleted=true and
    /// exported=false observable to scanners" — a soft-deleted message must
    /// already have been exported (or is local-only and will never be).
    pub fn violates_deleted_exported_invariant(&self) -> bool {
        self.deleted && !self.exported && self.message_type != MessageType::Local
    }

    pub fn is_private(&self) -> bool {
        self.flags.contains(RoutingFlags::PRIVATE)
    }
}

const SUBJECT_LEN: usize = 72;
const MESSAGE_RECORD_LEN: usize = 4 // id
    + 4 // base_id
    + 4 // area_id
    + 1 // message_type
    + 1 // deleted
    + 1 // access_level
    + 4 // access_keys
    + SUBJECT_LEN
    + 4 // sender_id
    + 4 // receiver_id
    + 1 + 8 // origin present + zone/net/node/point packed as u16s
    + 1 + 8 // destination present + zone/net/node/point
    + 8 // imported_at
    + 8 // sent_at
    + 1 + 8 // read_at present + value
    + 4 // read_count
    + 1 // exported
    + 2; // flags

fn encode_addr(buf: &mut Vec<u8>, addr: Option<FtnAddress>) {
    match addr {
        Some(a) => {
            buf.push(1);
            buf.extend_from_slice(&a.zone.to_le_bytes());
            buf.extend_from_slice(&a.net.to_le_bytes());
            buf.extend_from_slice(&a.node.to_le_bytes());
            buf.extend_from_slice(&a.point.to_le_bytes());
        }
        None => {
            buf.push(0);
            buf.extend_from_slice(&[0u8; 8]);
        }
    }
}

fn decode_addr(rec: &[u8], off: &mut usize) -> Option<FtnAddress> {
    let present = rec[*off] != 0;
    *off += 1;
    let u16_at = |o: usize| u16::from_le_bytes(rec[o..o + 2].try_into().unwrap());
    let addr = FtnAddress { zone: u16_at(*off), net: u16_at(*off + 2), node: u16_at(*off + 4), point: u16_at(*off + 6) };
    *off += 8;
    if present { Some(addr) } else { None }
}

fn encode_message(m: &Message) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MESSAGE_RECORD_LEN);
    buf.extend_from_slice(&m.id.to_le_bytes());
    buf.extend_from_slice(&m.base_id.to_le_bytes());
    buf.extend_from_slice(&m.area_id.to_le_bytes());
    buf.push(match m.message_type {
        MessageType::Local => 0,
        MessageType::Echo => 1,
        MessageType::Net => 2,
    });
    buf.push(m.deleted as u8);
    buf.push(m.access_level);
    buf.extend_from_slice(&m.access_keys.to_le_bytes());
    super::put_fixed(&mut buf, &m.subject, SUBJECT_LEN);
    buf.extend_from_slice(&m.sender_id.to_le_bytes());
    buf.extend_from_slice(&m.receiver_id.to_le_bytes());
    encode_addr(&mut buf, m.origin);
    encode_addr(&mut buf, m.destination);
    buf.extend_from_slice(&m.imported_at.to_le_bytes());
    buf.extend_from_slice(&m.sent_at.to_le_bytes());
    match m.read_at {
        Some(t) => {
            buf.push(1);
            buf.extend_from_slice(&t.to_le_bytes());
        }
        None => {
            buf.push(0);
            buf.extend_from_slice(&0i64.to_le_bytes());
        }
    }
    buf.extend_from_slice(&m.read_count.to_le_bytes());
    buf.push(m.exported as u8);
    buf.extend_from_slice(&m.flags.bits().to_le_bytes());
    debug_assert_eq!(buf.len(), MESSAGE_RECORD_LEN);
    buf
}

fn decode_message(rec: &[u8]) -> Result<Message, StoreError> {
    if rec.len() != MESSAGE_RECORD_LEN {
        return Err(StoreError::Corrupt("unexpected message record length"));
    }
    let mut off = 0;
    let id = u32::from_le_bytes(rec[0..4].try_into().unwrap());
    off += 4;
    let base_id = u32::from_le_bytes(rec[off..off + 4].try_into().unwrap());
    off += 4;
    let area_id = u32::from_le_bytes(rec[off..off + 4].try_into().unwrap());
    off += 4;
    let message_type = match rec[off] {
        0 => MessageType::Local,
        1 => MessageType::Echo,
        _ => MessageType::Net,
    };
    off += 1;
    let deleted = rec[off] != 0;
    off += 1;
    let access_level = rec[off];
    off += 1;
    let access_keys = u32::from_le_bytes(rec[off..off + 4].try_into().unwrap());
    off += 4;
    let subject = super::get_fixed(&rec[off..off + SUBJECT_LEN]);
    off += SUBJECT_LEN;
    let sender_id = u32::from_le_bytes(rec[off..off + 4].try_into().unwrap());
    off += 4;
    let receiver_id = u32::from_le_bytes(rec[off..off + 4].try_into().unwrap());
    off += 4;
    let origin = decode_addr(rec, &mut off);
    let destination = decode_addr(rec, &mut off);
    let imported_at = i64::from_le_bytes(rec[off..off + 8].try_into().unwrap());
    off += 8;
    let sent_at = i64::from_le_bytes(rec[off..off + 8].try_into().unwrap());
    off += 8;
    let read_at_present = rec[off] != 0;
    off += 1;
    let read_at_value = i64::from_le_bytes(rec[off..off + 8].try_into().unwrap());
    off += 8;
    let read_at = if read_at_present { Some(read_at_value) } else { None };
    let read_count = u32::from_le_bytes(rec[off..off + 4].try_into().unwrap());
    off += 4;
    let exported = rec[off] != 0;
    off += 1;
    let flags = RoutingFlags::from_bits_truncate(u16::from_le_bytes(rec[off..off + 2].try_into().unwrap()));
    Ok(Message {
        id,
        base_id,
        area_id,
        message_type,
        deleted,
        access_level,
        access_keys,
        subject,
        sender_id,
        receiver_id,
        origin,
        destination,
        imported_at,
        sent_at,
        read_at,
        read_count,
        body: String::new(),
        exported,
        flags,
    })
}

fn decode_all_messages(bytes: &[u8]) -> Result<Vec<Vec<u8>>, StoreError> {
    if bytes.len() % MESSAGE_RECORD_LEN != 0 {
        return Err(StoreError::Corrupt("message registry length not a multiple of record size"));
    }
    Ok(bytes.chunks(MESSAGE_RECORD_LEN).map(|c| c.to_vec()).collect())
}

fn encode_all_messages(records: &[Vec<u8>]) -> Vec<u8> {
    records.concat()
}

/// Message-base store (spec §4.6, §4.8): metadata lives in a fixed-record
/// registry the same way [`super::UserStore`] does; the body is large and
/// variable-length so it is kept as a separate payload blob, the same
/// split [`super::fileobj::FileBaseStore`] uses for file contents.
pub struct MessageStore {
    registry_path: PathBuf,
    index_path: PathBuf,
    payload_base: PathBuf,
    write_lock: Mutex<()>,
}

impl MessageStore {
    pub fn new(base: &Path) -> Self {
        MessageStore {
            registry_path: base.join("MsgDB"),
            index_path: base.join("MsgIDX"),
            payload_base: base.join("MsgBody"),
            write_lock: Mutex::new(()),
        }
    }

    fn read_body(&self, id: u32) -> String {
        std::fs::read(registry::payload_path(&self.payload_base, id))
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .unwrap_or_default()
    }

    pub fn find_by_id(&self, id: u32) -> Result<Option<Message>, StoreError> {
        let records = registry::read_registry(&self.registry_path, decode_all_messages)?;
        for r in &records {
            let mut m = decode_message(r)?;
            if m.id == id {
                m.body = self.read_body(id);
                return Ok(Some(m));
            }
        }
        Ok(None)
    }

    /// All non-deleted messages in one area, for scan/export (spec §4.9).
    pub fn find_by_area(&self, base_id: u32, area_id: u32) -> Result<Vec<Message>, StoreError> {
        let records = registry::read_registry(&self.registry_path, decode_all_messages)?;
        let mut out = Vec::new();
        for r in &records {
            let m = decode_message(r)?;
            if m.base_id == base_id && m.area_id == area_id && !m.deleted {
                out.push(m);
            }
        }
        for m in out.iter_mut() {
            m.body = self.read_body(m.id);
        }
        Ok(out)
    }

    pub fn add(&self, mut new_message: Message) -> Result<Message, StoreError> {
        let _guard = self.write_lock.lock();
        new_message.id = registry::next_id(&self.index_path)?;
        registry::write_atomic(
            &registry::payload_path(&self.payload_base, new_message.id),
            new_message.body.as_bytes(),
        )?;
        registry::mutate_registry(&self.registry_path, decode_all_messages, encode_all_messages, |records| {
            records.push(encode_message(&new_message));
            Ok(())
        })?;
        Ok(new_message)
    }

    pub fn update(&self, updated: Message) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        registry::write_atomic(
            &registry::payload_path(&self.payload_base, updated.id),
            updated.body.as_bytes(),
        )?;
        registry::mutate_registry(&self.registry_path, decode_all_messages, encode_all_messages, |records| {
            let mut found = false;
            for r in records.iter_mut() {
                let existing = decode_message(r)?;
                if existing.id == updated.id {
                    *r = encode_message(&updated);
                    found = true;
                    break;
                }
            }
            if found {
                Ok(())
            } else {
                Err(StoreError::NotFound(updated.id))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Message {
        Message {
            id: 1,
            base_id: 1,
            area_id: 1,
            message_type: MessageType::Echo,
            deleted: false,
            access_level: 0,
            access_keys: 0,
            subject: "hi".into(),
            sender_id: 1,
            receiver_id: 0,
            origin: None,
            destination: None,
            imported_at: 0,
            sent_at: 0,
            read_at: None,
            read_count: 0,
            body: String::new(),
            exported: false,
            flags: RoutingFlags::empty(),
        }
    }

    #[test]
    fn deleted_unexported_echomail_violates_invariant() {
        let mut m = sample();
        m.deleted = true;
        assert!(m.violates_deleted_exported_invariant());
        m.exported = true;
        assert!(!m.violates_deleted_exported_invariant());
    }

    #[test]
    fn local_mail_is_exempt_since_it_never_exports() {
        let mut m = sample();
        m.message_type = MessageType::Local;
        m.deleted = true;
        assert!(!m.violates_deleted_exported_invariant());
    }

    #[test]
    fn add_find_update_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::new(dir.path());

        let mut m = sample();
        m.id = 0;
        m.origin = Some(FtnAddress { zone: 1, net: 2, node: 3, point: 0 });
        m.body = "hello area".to_string();
        let added = store.add(m).unwrap();
        assert_eq!(added.id, 1);

        let found = store.find_by_id(1).unwrap().unwrap();
        assert_eq!(found.body, "hello area");
        assert_eq!(found.origin, Some(FtnAddress { zone: 1, net: 2, node: 3, point: 0 }));

        let mut updated = found;
        updated.read_count = 3;
        updated.body = "hello area, edited".to_string();
        store.update(updated).unwrap();

        let reloaded = store.find_by_id(1).unwrap().unwrap();
        assert_eq!(reloaded.read_count, 3);
        assert_eq!(reloaded.body, "hello area, edited");
    }

    #[test]
    fn find_by_area_filters_base_and_area_and_skips_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::new(dir.path());

        let mut a = sample();
        a.id = 0;
        a.base_id = 1;
        a.area_id = 1;
        store.add(a).unwrap();

        let mut b = sample();
        b.id = 0;
        b.base_id = 1;
        b.area_id = 2;
        store.add(b).unwrap();

        let mut c = sample();
        c.id = 0;
        c.base_id = 1;
        c.area_id = 1;
        c.deleted = true;
        store.add(c).unwrap();

        let found = store.find_by_area(1, 1).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].area_id, 1);
    }
}
