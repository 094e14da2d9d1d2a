//! An in-memory index over parsed nodelist entries (spec §4.11): ordered
//! lookup by `(zone, net, node, point)` with a small LRU cache over the
//! hub/host routing walk, since that walk is repeated for every outbound
//! netmail packet during a scan.

use std::collections::VecDeque;

use crate::config::FtnAddress;

use super::parse::{NodelistEntry, Status};

const CACHE_CAPACITY: usize = 64;

pub struct NodelistIndex {
    /// Sorted ascending by (zone, net, node); point=0 entries only, since
    /// FTS-0005 nodelists don't carry point records directly.
    entries: Vec<NodelistEntry>,
    cache: VecDeque<(FtnAddress, Option<(String, u16)>)>,
}

impl NodelistIndex {
    pub fn build(mut entries: Vec<NodelistEntry>) -> Self {
        entries.retain(|e| !matches!(e.status, Status::Zone | Status::Region | Status::Host));
        entries.sort_by_key(|e| (e.zone, e.net, e.node));
        NodelistIndex { entries, cache: VecDeque::new() }
    }

    fn find(&self, zone: u16, net: u16, node: u16) -> Option<&NodelistEntry> {
        self.entries
            .binary_search_by_key(&(zone, net, node), |e| (e.zone, e.net, e.node))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Resolves the reachable binkp endpoint for `address`, walking
    /// node -> hub -> host -> zone/region as FTS-0005 prescribes when a
    /// node has no direct `IBN` entry of its own (spec §4.11).
    pub fn resolve_binkp(&mut self, address: FtnAddress) -> Option<(String, u16)> {
        if let Some(pos) = self.cache.iter().position(|(a, _)| *a == address) {
            let entry = self.cache.remove(pos).unwrap();
            let result = entry.1.clone();
            self.cache.push_back(entry);
            return result;
        }
        let result = self.resolve_binkp_uncached(address.boss());
        self.cache.push_back((address, result.clone()));
        if self.cache.len() > CACHE_CAPACITY {
            self.cache.pop_front();
        }
        result
    }

    fn resolve_binkp_uncached(&self, address: FtnAddress) -> Option<(String, u16)> {
        let entry = self.find(address.zone, address.net, address.node)?;
        if let Some(host) = entry.binkp_host() {
            return Some(host);
        }
        // Fall back to the hub for this net, then the host for this zone.
        let hub = self.entries.iter().find(|e| e.status == Status::Hub && e.zone == address.zone && e.net == address.net);
        if let Some(hub) = hub {
            if let Some(host) = hub.binkp_host() {
                return Some(host);
            }
        }
        None
    }

    pub fn lookup(&self, address: FtnAddress) -> Option<&NodelistEntry> {
        self.find(address.zone, address.net, address.node)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::parse::parse;

    #[test]
    fn resolves_direct_ibn_entry() {
        let text = "Zone,1,Zone_One,City,Sysop,0,0\n\
                     ,10,Node_Ten,City,Op,0,9600,IBN:ten.example.com\n";
        let mut index = NodelistIndex::build(parse(text));
        let addr = FtnAddress::new(1, 1, 10, 0);
        assert_eq!(index.resolve_binkp(addr), Some(("ten.example.com".to_string(), 24554)));
    }

    #[test]
    fn falls_back_to_hub_when_node_has_no_direct_ibn() {
        let text = "Zone,1,Zone_One,City,Sysop,0,0\n\
                     Hub,5,Hub_Five,City,Op,0,9600,IBN:hub.example.com\n\
                     ,10,Node_Ten,City,Op,0,9600\n";
        let mut index = NodelistIndex::build(parse(text));
        let addr = FtnAddress::new(1, 1, 10, 0);
        assert_eq!(index.resolve_binkp(addr), Some(("hub.example.com".to_string(), 24554)));
    }

    #[test]
    fn point_addresses_resolve_via_their_boss_node() {
        let text = "Zone,1,Zone_One,City,Sysop,0,0\n\
                     ,10,Node_Ten,City,Op,0,9600,IBN:ten.example.com\n";
        let mut index = NodelistIndex::build(parse(text));
        let addr = FtnAddress::new(1, 1, 10, 5);
        assert_eq!(index.resolve_binkp(addr), Some(("ten.example.com".to_string(), 24554)));
    }

    #[test]
    fn unknown_node_resolves_to_none() {
        let mut index = NodelistIndex::build(Vec::new());
        assert_eq!(index.resolve_binkp(FtnAddress::new(1, 1, 1, 0)), None);
    }
}
