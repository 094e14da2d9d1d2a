//! C8: the tosser. Routes inbound packet messages into message-base
//! areas, detects duplicates and echomail loops, and quarantines
//! unrouteable or malformed artefacts (spec §4.8).

use std::collections::HashSet;
use std::path::Path;

use crate::config::FtnAddress;
use crate::mail::arcmail;
use crate::mail::packet::{PacketError, PacketHeader, PacketMessage};
use crate::store::message::{Message, MessageStore, MessageType, RoutingFlags};
use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TossOutcome {
    Stored { area_tag_lower: bool },
    Duplicate,
    LoopDetected,
    UnknownArea,
    RoutedToEchoFix,
}

/// Case-insensitive lookup from configured area tag to the message base it
/// lives in; callers own the actual area table and C6 handoff.
pub trait AreaResolver {
    fn resolve_echomail_area(&self, tag: &str) -> Option<(u32, u32)>;
    fn resolve_netmail_area(&self, destination: &FtnAddress) -> Option<(u32, u32)>;
    fn is_request_address(&self, destination: &FtnAddress) -> bool;
}

fn format_address(addr: &FtnAddress) -> String {
    if addr.point == 0 {
        format!("{}/{}", addr.net, addr.node)
    } else {
        format!("{}/{}.{}", addr.net, addr.node, addr.point)
    }
}

/// Appends this system's AKAs to SEEN-BY and PATH kludges before storage
/// (spec §4.8 step 5, FTS-0004): SEEN-BY records every system the message
/// has passed through for loop detection, PATH the route it actually took.
fn append_seen_by_and_path(msg: &mut PacketMessage, local_akas: &[FtnAddress]) {
    let already_seen: HashSet<&str> = msg.seen_by().into_iter().collect();
    let mut new_seen_by = String::new();
    for aka in local_akas {
        let formatted = format_address(aka);
        if !already_seen.contains(formatted.as_str()) {
            new_seen_by.push_str(&format!("\u{1}SEEN-BY: {formatted}\r"));
        }
    }
    if !new_seen_by.is_empty() {
        msg.body.push_str(&new_seen_by);
    }
    if let Some(aka) = local_akas.first() {
        msg.body.push_str(&format!("\u{1}PATH: {}\r", format_address(aka)));
    }
}

/// Bounded recent-history set for duplicate detection (spec §4.8 step 4):
/// `(origin, message-id-kludge, subject-hash, body-hash)`.
pub struct DuplicateHistory {
    seen: HashSet<(FtnAddress, String, u64, u64)>,
    order: std::collections::VecDeque<(FtnAddress, String, u64, u64)>,
    capacity: usize,
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

impl DuplicateHistory {
    pub fn new(capacity: usize) -> Self {
        DuplicateHistory { seen: HashSet::new(), order: std::collections::VecDeque::new(), capacity }
    }

    fn key(msg: &PacketMessage) -> (FtnAddress, String, u64, u64) {
        let msgid = msg
            .body
            .lines()
            .find_map(|l| l.strip_prefix('\u{1}').unwrap_or(l).strip_prefix("MSGID:"))
            .unwrap_or("")
            .trim()
            .to_string();
        (msg.origin, msgid, fnv1a(msg.subject.as_bytes()), fnv1a(msg.body.as_bytes()))
    }

    /// Returns true if this is a new message (and records it); false if
    /// it was already seen.
    pub fn observe(&mut self, msg: &PacketMessage) -> bool {
        let key = Self::key(msg);
        if self.seen.contains(&key) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.seen.remove(&old);
            }
        }
        self.order.push_back(key.clone());
        self.seen.insert(key);
        true
    }
}

fn has_loop(msg: &PacketMessage, local_akas: &[FtnAddress]) -> bool {
    let seen_by = msg.seen_by();
    local_akas.iter().any(|aka| seen_by.iter().any(|entry| *entry == format_address(aka)))
}

fn store_message(
    store: &MessageStore,
    msg: &PacketMessage,
    base_id: u32,
    area_id: u32,
    message_type: MessageType,
) -> Result<(), StoreError> {
    let now = chrono::Utc::now().timestamp();
    store.add(Message {
        id: 0,
        base_id,
        area_id,
        message_type,
        deleted: false,
        access_level: 0,
        access_keys: 0,
        subject: msg.subject.clone(),
        sender_id: 0,
        receiver_id: 0,
        origin: Some(msg.origin),
        destination: Some(msg.destination),
        imported_at: now,
        sent_at: now,
        read_at: None,
        read_count: 0,
        body: msg.body.clone(),
        exported: false,
        flags: RoutingFlags::empty(),
    })?;
    Ok(())
}

/// Processes one packet's messages. `_header` is accepted (and validated
/// by the caller via [`PacketHeader::decode`]) for symmetry with the spec's
/// per-file pipeline even though routing only consults the message.
///
/// On a `Stored` outcome the message (with SEEN-BY/PATH appended for
/// echomail) is persisted through `store` before returning, so `Stored`
/// reflects the message actually landing in the message base rather than
/// just being routable.
pub fn toss_message(
    msg: &PacketMessage,
    resolver: &dyn AreaResolver,
    history: &mut DuplicateHistory,
    local_akas: &[FtnAddress],
    store: &MessageStore,
) -> TossOutcome {
    if resolver.is_request_address(&msg.destination) {
        return TossOutcome::RoutedToEchoFix;
    }
    if !history.observe(msg) {
        return TossOutcome::Duplicate;
    }
    if let Some(tag) = msg.area_tag() {
        if has_loop(msg, local_akas) {
            return TossOutcome::LoopDetected;
        }
        return match resolver.resolve_echomail_area(tag) {
            Some((base_id, area_id)) => {
                let mut stamped = msg.clone();
                append_seen_by_and_path(&mut stamped, local_akas);
                if store_message(store, &stamped, base_id, area_id, MessageType::Echo).is_err() {
                    return TossOutcome::UnknownArea;
                }
                TossOutcome::Stored { area_tag_lower: tag.chars().any(|c| c.is_lowercase()) }
            }
            None => TossOutcome::UnknownArea,
        };
    }
    match resolver.resolve_netmail_area(&msg.destination) {
        Some((base_id, area_id)) => {
            if store_message(store, msg, base_id, area_id, MessageType::Net).is_err() {
                return TossOutcome::UnknownArea;
            }
            TossOutcome::Stored { area_tag_lower: false }
        }
        None => TossOutcome::UnknownArea,
    }
}

#[derive(Debug)]
pub enum ProcessError {
    Packet(PacketError),
}
impl std::fmt::Display for ProcessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessError::Packet(e) => write!(f, "{e}"),
        }
    }
}
impl std::error::Error for ProcessError {}
impl From<PacketError> for ProcessError {
    fn from(e: PacketError) -> Self {
        ProcessError::Packet(e)
    }
}

/// Parses a raw `.pkt` buffer and tosses every message in it.
pub fn process_packet(
    bytes: &[u8],
    resolver: &dyn AreaResolver,
    history: &mut DuplicateHistory,
    local_akas: &[FtnAddress],
    store: &MessageStore,
) -> Result<Vec<TossOutcome>, ProcessError> {
    let _header = PacketHeader::decode(bytes)?;
    let mut offset = crate::mail::packet::PACKET_HEADER_LEN;
    let mut outcomes = Vec::new();
    while offset + 2 <= bytes.len() {
        // A two-zero-byte marker ends the message stream (FTS-0001).
        if bytes[offset] == 0 && bytes[offset + 1] == 0 {
            break;
        }
        let (msg, consumed) = PacketMessage::decode(&bytes[offset..])?;
        offset += consumed;
        outcomes.push(toss_message(&msg, resolver, history, local_akas, store));
    }
    Ok(outcomes)
}

/// Walks the inbound directory (spec §4.8 "Directory walking"): every
/// `.pkt` file is tossed directly, every arcmail bundle is extracted with
/// [`arcmail::extract`] and each entry tossed in turn. A file with at
/// least one unrouteable/malformed message moves to `bad_dir`; everything
/// else moves to `processed_dir` so a crashed run never re-tosses the same
/// file twice.
pub fn process_inbound_directory(
    inbound_dir: &Path,
    processed_dir: &Path,
    bad_dir: &Path,
    resolver: &dyn AreaResolver,
    history: &mut DuplicateHistory,
    local_akas: &[FtnAddress],
    store: &MessageStore,
) -> std::io::Result<Vec<(std::path::PathBuf, Vec<TossOutcome>)>> {
    std::fs::create_dir_all(processed_dir)?;
    std::fs::create_dir_all(bad_dir)?;
    let mut results = Vec::new();
    let mut entries: Vec<_> = std::fs::read_dir(inbound_dir)?.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(_) => continue,
        };
        let is_bundle = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| !ext.eq_ignore_ascii_case("pkt"))
            .unwrap_or(true);

        let packets: Vec<Vec<u8>> = if is_bundle {
            match arcmail::extract(&bytes) {
                Ok(entries) => entries.into_iter().map(|(_, data)| data).collect(),
                Err(_) => {
                    move_to(&path, bad_dir)?;
                    results.push((path, Vec::new()));
                    continue;
                }
            }
        } else {
            vec![bytes]
        };

        let mut outcomes = Vec::new();
        let mut bad = packets.is_empty();
        for packet in &packets {
            match process_packet(packet, resolver, history, local_akas, store) {
                Ok(o) => {
                    bad |= o.iter().any(|outcome| *outcome == TossOutcome::UnknownArea);
                    outcomes.extend(o);
                }
                Err(_) => bad = true,
            }
        }

        let dest = if bad { bad_dir } else { processed_dir };
        move_to(&path, dest)?;
        results.push((path, outcomes));
    }
    Ok(results)
}

fn move_to(path: &Path, dir: &Path) -> std::io::Result<()> {
    let dest = dir.join(path.file_name().unwrap_or_default());
    if std::fs::rename(path, &dest).is_err() {
        std::fs::copy(path, &dest)?;
        std::fs::remove_file(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedResolver {
        known_area: Option<(u32, u32)>,
    }
    impl AreaResolver for FixedResolver {
        fn resolve_echomail_area(&self, _tag: &str) -> Option<(u32, u32)> {
            self.known_area
        }
        fn resolve_netmail_area(&self, _destination: &FtnAddress) -> Option<(u32, u32)> {
            self.known_area
        }
        fn is_request_address(&self, _destination: &FtnAddress) -> bool {
            false
        }
    }

    fn sample_msg(body: &str) -> PacketMessage {
        PacketMessage {
            origin: FtnAddress { zone: 1, net: 2, node: 3, point: 0 },
            destination: FtnAddress { zone: 1, net: 9, node: 9, point: 0 },
            attributes: crate::mail::packet::MessageAttributes::empty(),
            cost: 0,
            date_time: String::new(),
            to_user: "All".into(),
            from_user: "Sysop".into(),
            subject: "hi".into(),
            body: body.to_string(),
        }
    }

    #[test]
    fn unknown_area_tag_is_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::new(dir.path());
        let msg = sample_msg("\u{1}AREA:NOPE\r\nhello\r\n");
        let resolver = FixedResolver { known_area: None };
        let mut history = DuplicateHistory::new(16);
        assert_eq!(
            toss_message(&msg, &resolver, &mut history, &[], &store),
            TossOutcome::UnknownArea
        );
    }

    #[test]
    fn duplicate_message_is_dropped_on_second_sighting() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::new(dir.path());
        let msg = sample_msg("\u{1}AREA:GENERAL\r\nhello\r\n");
        let resolver = FixedResolver { known_area: Some((1, 1)) };
        let mut history = DuplicateHistory::new(16);
        assert!(matches!(
            toss_message(&msg, &resolver, &mut history, &[], &store),
            TossOutcome::Stored { .. }
        ));
        assert_eq!(
            toss_message(&msg, &resolver, &mut history, &[], &store),
            TossOutcome::Duplicate
        );
        let stored = store.find_by_area(1, 1).unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].body.contains("SEEN-BY"));
    }

    #[test]
    fn seen_by_matching_local_aka_is_a_loop() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::new(dir.path());
        let msg = sample_msg("\u{1}AREA:GENERAL\r\n\u{1}SEEN-BY: 2/3\r\n");
        let resolver = FixedResolver { known_area: Some((1, 1)) };
        let mut history = DuplicateHistory::new(16);
        let local = [FtnAddress { zone: 1, net: 2, node: 3, point: 0 }];
        assert_eq!(
            toss_message(&msg, &resolver, &mut history, &local, &store),
            TossOutcome::LoopDetected
        );
    }

    struct TagResolver;
    impl AreaResolver for TagResolver {
        fn resolve_echomail_area(&self, tag: &str) -> Option<(u32, u32)> {
            if tag.eq_ignore_ascii_case("GENERAL") {
                Some((1, 1))
            } else {
                None
            }
        }
        fn resolve_netmail_area(&self, _destination: &FtnAddress) -> Option<(u32, u32)> {
            Some((1, 0))
        }
        fn is_request_address(&self, _destination: &FtnAddress) -> bool {
            false
        }
    }

    #[test]
    fn process_inbound_directory_sorts_packets_into_processed_and_bad() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::new(dir.path());
        let inbound = dir.path().join("Inbound");
        let processed = dir.path().join("Processed");
        let bad = dir.path().join("Bad");
        std::fs::create_dir_all(&inbound).unwrap();

        let header = PacketHeader {
            origin: FtnAddress { zone: 1, net: 2, node: 3, point: 0 },
            destination: FtnAddress { zone: 1, net: 9, node: 9, point: 0 },
            year: 2026,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            second: 0,
            baud: 0,
            product_code: 0x0f00,
            product_rev: 0x0102,
            password: *b"\0\0\0\0\0\0\0\0",
        };
        let mut good_bytes = header.encode();
        good_bytes.extend(sample_msg("\u{1}AREA:GENERAL\r\nhello\r\n").encode());
        good_bytes.extend_from_slice(&[0, 0]);
        std::fs::write(inbound.join("0000001.pkt"), &good_bytes).unwrap();

        let mut bad_bytes = header.encode();
        bad_bytes.extend(sample_msg("\u{1}AREA:NOPE\r\nhello\r\n").encode());
        bad_bytes.extend_from_slice(&[0, 0]);
        std::fs::write(inbound.join("0000002.pkt"), &bad_bytes).unwrap();

        let resolver = TagResolver;
        let mut history = DuplicateHistory::new(16);
        let results = process_inbound_directory(&inbound, &processed, &bad, &resolver, &mut history, &[], &store)
            .unwrap();
        assert_eq!(results.len(), 2);

        assert!(processed.join("0000001.pkt").is_file());
        assert!(bad.join("0000002.pkt").is_file());
        assert!(!inbound.join("0000001.pkt").exists());
    }
}
