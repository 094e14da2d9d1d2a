//! C9: scan/pack. Turns unexported messages into outbound packets grouped
//! by destination and flavour (spec §4.9).

use crate::config::FtnAddress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Flavour {
    Immediate,
    Crash,
    Direct,
    Hold,
    Normal,
}

impl Flavour {
    pub fn prefix(self) -> &'static str {
        match self {
            Flavour::Normal => "",
            Flavour::Hold => "h",
            Flavour::Direct => "d",
            Flavour::Crash => "c",
            Flavour::Immediate => "i",
        }
    }

    pub fn packet_extension(self) -> &'static str {
        match self {
            Flavour::Normal => "pkt",
            Flavour::Hold => "hpkt",
            Flavour::Direct => "dpkt",
            Flavour::Crash => "cpkt",
            Flavour::Immediate => "ipkt",
        }
    }

    pub fn bundle_extension(self) -> &'static str {
        match self {
            Flavour::Normal => "out",
            Flavour::Hold => "hut",
            Flavour::Direct => "dut",
            Flavour::Crash => "cut",
            Flavour::Immediate => "iut",
        }
    }

    /// Lower value = higher priority (spec §4.9 priority column).
    pub fn priority(self) -> u8 {
        match self {
            Flavour::Immediate => 0,
            Flavour::Crash => 1,
            Flavour::Direct => 2,
            Flavour::Hold => 3,
            Flavour::Normal => 4,
        }
    }
}

/// Builds the outbound file name: `<monotonic-timestamp><prefix>.<ext>`,
/// e.g. `0a1b2c3dc.pkt` for a CRASH packet.
pub fn outbound_filename(timestamp: u32, flavour: Flavour, is_bundle: bool) -> String {
    let ext = if is_bundle { flavour.bundle_extension() } else { flavour.packet_extension() };
    format!("{timestamp:08x}{}.{ext}", flavour.prefix())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Groups(u32);

impl Groups {
    pub const NONE: Groups = Groups(0);

    pub fn from_letters(letters: &str) -> Self {
        let mut bits = 0u32;
        for c in letters.chars() {
            if c.is_ascii_alphabetic() {
                bits |= 1 << (c.to_ascii_uppercase() as u32 - 'A' as u32);
            }
        }
        Groups(bits)
    }

    /// Empty on either side means "match all" (spec §4.9).
    pub fn overlaps(self, other: Groups) -> bool {
        self.0 == 0 || other.0 == 0 || self.0 & other.0 != 0
    }
}

pub fn wildcard_matches(pattern: &str, candidate: &str) -> bool {
    fn matches(p: &[u8], c: &[u8]) -> bool {
        match (p.first(), c.first()) {
            (None, None) => true,
            (Some(b'*'), _) => matches(&p[1..], c) || (!c.is_empty() && matches(p, &c[1..])),
            (Some(b'?'), Some(_)) => matches(&p[1..], &c[1..]),
            (Some(pb), Some(cb)) if pb.to_ascii_uppercase() == cb.to_ascii_uppercase() => matches(&p[1..], &c[1..]),
            _ => false,
        }
    }
    matches(pattern.as_bytes(), candidate.as_bytes())
}

#[derive(Debug, Clone)]
pub struct Uplink {
    pub address: FtnAddress,
    pub groups: Groups,
}

#[derive(Debug, Clone)]
pub struct Downlink {
    pub address: FtnAddress,
    pub area_subscriptions: Vec<String>,
    pub allowed_echoes_pattern: String,
}

pub fn echomail_subscribers<'a>(
    area_tag: &str,
    area_groups: Groups,
    uplinks: &'a [Uplink],
    downlinks: &'a [Downlink],
) -> Vec<FtnAddress> {
    let mut out: Vec<FtnAddress> = uplinks
        .iter()
        .filter(|u| u.groups.overlaps(area_groups))
        .map(|u| u.address)
        .collect();
    out.extend(downlinks.iter().filter(|d| {
        d.area_subscriptions.iter().any(|s| s.eq_ignore_ascii_case(area_tag))
            && wildcard_matches(&d.allowed_echoes_pattern, area_tag)
    }).map(|d| d.address));
    out
}

/// Netmail routing (spec §4.9 "Netmail routing").
pub fn route_netmail(
    destination: &FtnAddress,
    local_akas: &[FtnAddress],
    uplinks: &[Uplink],
    default_uplink: Option<FtnAddress>,
) -> Option<FtnAddress> {
    if local_akas.iter().any(|a| a == destination) {
        return None; // local: store, do not export
    }
    let boss = destination.boss();
    if let Some(u) = uplinks.iter().find(|u| u.address == boss) {
        return Some(u.address);
    }
    uplinks
        .iter()
        .find(|u| u.address.zone == boss.zone)
        .map(|u| u.address)
        .or(default_uplink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flavour_file_extensions_match_the_priority_table() {
        assert_eq!(Flavour::Crash.packet_extension(), "cpkt");
        assert_eq!(Flavour::Crash.bundle_extension(), "cut");
        assert!(Flavour::Immediate.priority() < Flavour::Normal.priority());
    }

    #[test]
    fn groups_overlap_when_either_side_is_empty() {
        assert!(Groups::NONE.overlaps(Groups::from_letters("A")));
        assert!(Groups::from_letters("AB").overlaps(Groups::from_letters("BC")));
        assert!(!Groups::from_letters("A").overlaps(Groups::from_letters("B")));
    }

    #[test]
    fn wildcard_matching_supports_star_and_question_mark() {
        assert!(wildcard_matches("GEN*", "GENERAL"));
        assert!(wildcard_matches("G?N", "gen"));
        assert!(!wildcard_matches("GEN*", "SPORTS"));
    }

    #[test]
    fn netmail_routes_to_zone_matching_uplink_then_default() {
        let dest = FtnAddress { zone: 2, net: 5, node: 10, point: 0 };
        let uplinks = vec![Uplink {
            address: FtnAddress { zone: 2, net: 1, node: 1, point: 0 },
            groups: Groups::NONE,
        }];
        let route = route_netmail(&dest, &[], &uplinks, None);
        assert_eq!(route, Some(uplinks[0].address));
    }
}
