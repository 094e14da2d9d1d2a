//! FTS-0005 nodelist line parsing (spec §4.11): comma-separated fields,
//! a keyword column that both classifies the record and carries
//! zone/region/host context forward to subsequent lines.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Zone,
    Region,
    Host,
    Hub,
    Pvt,
    Hold,
    Down,
    Normal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodelistEntry {
    pub status: Status,
    pub zone: u16,
    pub net: u16,
    pub node: u16,
    pub name: String,
    pub location: String,
    pub sysop: String,
    pub phone: String,
    pub baud: u32,
    pub flags: Vec<String>,
}

impl NodelistEntry {
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f.eq_ignore_ascii_case(flag) || f.starts_with(&format!("{flag}:")))
    }

    /// Binkp hostname/port from an `IBN[:host[:port]]` flag, default port
    /// 24554 (spec §4.11).
    pub fn binkp_host(&self) -> Option<(String, u16)> {
        self.flags.iter().find(|f| f.eq_ignore_ascii_case("IBN") || f.to_ascii_uppercase().starts_with("IBN:")).map(|f| {
            let mut parts = f.splitn(3, ':');
            parts.next();
            let host = parts.next().unwrap_or("").to_string();
            let port = parts.next().and_then(|p| p.parse().ok()).unwrap_or(24554);
            (host, port)
        })
    }
}

fn parse_status(keyword: &str) -> Status {
    match keyword.to_ascii_lowercase().as_str() {
        "zone" => Status::Zone,
        "region" => Status::Region,
        "host" => Status::Host,
        "hub" => Status::Hub,
        "pvt" => Status::Pvt,
        "hold" => Status::Hold,
        "down" => Status::Down,
        _ => Status::Normal,
    }
}

/// Parses a full nodelist buffer, maintaining the current zone/net as it
/// advances through Zone/Region/Host header lines (spec §4.11).
pub fn parse(text: &str) -> Vec<NodelistEntry> {
    let mut entries = Vec::new();
    let mut zone = 0u16;
    let mut net = 0u16;
    for line in text.lines() {
        if line.starts_with(';') || line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 7 {
            continue;
        }
        let status = parse_status(fields[0]);
        let node_num: u16 = fields[1].trim().parse().unwrap_or(0);
        match status {
            Status::Zone => {
                zone = node_num;
                net = node_num;
            }
            Status::Region | Status::Host => {
                net = node_num;
            }
            _ => {}
        }
        let entry = NodelistEntry {
            status,
            zone,
            net,
            node: if matches!(status, Status::Zone | Status::Region | Status::Host) { 0 } else { node_num },
            name: fields[2].replace('_', " "),
            location: fields[3].replace('_', " "),
            sysop: fields[4].replace('_', " "),
            phone: fields[5].to_string(),
            baud: fields[6].trim().parse().unwrap_or(0),
            flags: fields[7..].iter().map(|s| s.to_string()).collect(),
        };
        entries.push(entry);
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_zone_then_node_with_inherited_context() {
        let text = "Zone,1,Zone_One,City,Sysop,1-555-5555,33600,CM\n\
                     ,10,Some_Node,City,Op,000-000-0000,9600,IBN:node.example.com:24555\n";
        let entries = parse(text);
        assert_eq!(entries[0].status, Status::Zone);
        assert_eq!(entries[1].zone, 1);
        assert_eq!(entries[1].net, 1);
        assert_eq!(entries[1].node, 10);
        assert_eq!(entries[1].name, "Some Node");
        assert_eq!(entries[1].binkp_host(), Some(("node.example.com".to_string(), 24555)));
    }

    #[test]
    fn comment_lines_are_skipped() {
        let text = ";this is a comment\nZone,1,A,B,C,D,0\n";
        assert_eq!(parse(text).len(), 1);
    }

    #[test]
    fn bare_ibn_flag_defaults_to_standard_port() {
        let text = "Zone,1,A,B,C,D,0,IBN\n";
        let entries = parse(text);
        assert_eq!(entries[0].binkp_host(), Some((String::new(), 24554)));
    }
}
