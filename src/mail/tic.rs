//! TIC file parsing (spec §4.9 "TIC"): line-oriented, case-insensitive
//! keys, with a CRC-32 check against the companion file.

use crate::xfer::crc::crc32_reflected;

#[derive(Debug, Clone, Default)]
pub struct TicFile {
    pub file: String,
    pub area: String,
    pub desc: String,
    pub size: u64,
    pub crc: Option<u32>,
    pub origin: String,
    pub from: String,
    pub to: String,
    pub seenby: Vec<String>,
    pub path: Vec<String>,
    pub password: Option<String>,
    pub release: Option<String>,
    pub magic: Option<String>,
    pub replaces: Option<String>,
}

pub fn parse(text: &str) -> TicFile {
    let mut tic = TicFile::default();
    for line in text.lines() {
        let Some((key, value)) = line.split_once(' ') else {
            continue;
        };
        let value = value.trim();
        match key.to_ascii_lowercase().as_str() {
            "file" => tic.file = value.to_string(),
            "area" => tic.area = value.to_string(),
            "desc" => tic.desc = value.to_string(),
            "size" => tic.size = value.parse().unwrap_or(0),
            "crc" => tic.crc = u32::from_str_radix(value, 16).ok(),
            "origin" => tic.origin = value.to_string(),
            "from" => tic.from = value.to_string(),
            "to" => tic.to = value.to_string(),
            "seenby" => tic.seenby.push(value.to_string()),
            "path" => tic.path.push(value.to_string()),
            "password" => tic.password = Some(value.to_string()),
            "release" => tic.release = Some(value.to_string()),
            "magic" => tic.magic = Some(value.to_string()),
            "replaces" => tic.replaces = Some(value.to_string()),
            _ => {}
        }
    }
    tic
}

pub fn verify_crc(tic: &TicFile, companion_bytes: &[u8]) -> bool {
    match tic.crc {
        Some(expected) => crc32_reflected(companion_bytes) == expected,
        None => false,
    }
}

/// Renders a fresh TIC for forwarding to a downstream destination, with
/// the local AKA prepended to PATH and appended to SEENBY (spec §4.9).
pub fn forward(tic: &TicFile, local_aka: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("File {}\n", tic.file));
    out.push_str(&format!("Area {}\n", tic.area));
    out.push_str(&format!("Desc {}\n", tic.desc));
    out.push_str(&format!("Size {}\n", tic.size));
    if let Some(crc) = tic.crc {
        out.push_str(&format!("Crc {crc:08X}\n"));
    }
    out.push_str(&format!("Origin {}\n", tic.origin));
    out.push_str(&format!("From {}\n", tic.from));
    out.push_str(&format!("To {}\n", tic.to));
    out.push_str(&format!("Path {local_aka}\n"));
    for p in &tic.path {
        out.push_str(&format!("Path {p}\n"));
    }
    for s in &tic.seenby {
        out.push_str(&format!("Seenby {s}\n"));
    }
    out.push_str(&format!("Seenby {local_aka}\n"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_picks_up_known_fields_case_insensitively() {
        let text = "FILE game.zip\nAREA GAMES\nDesc A fun game\nSIZE 1024\nCRC DEADBEEF\nOrigin 1:2/3\n";
        let tic = parse(text);
        assert_eq!(tic.file, "game.zip");
        assert_eq!(tic.area, "GAMES");
        assert_eq!(tic.size, 1024);
        assert_eq!(tic.crc, Some(0xDEADBEEF));
    }

    #[test]
    fn crc_verification_matches_companion_bytes() {
        let data = b"the file contents";
        let crc = crc32_reflected(data);
        let tic = TicFile { crc: Some(crc), ..Default::default() };
        assert!(verify_crc(&tic, data));
        assert!(!verify_crc(&tic, b"different"));
    }

    #[test]
    fn forward_prepends_local_aka_to_path_and_appends_to_seenby() {
        let tic = TicFile {
            path: vec!["1:1/1".to_string()],
            seenby: vec!["1:1/1".to_string()],
            ..Default::default()
        };
        let forwarded = forward(&tic, "1:2/3");
        let path_lines: Vec<&str> = forwarded.lines().filter(|l| l.starts_with("Path")).collect();
        assert_eq!(path_lines[0], "Path 1:2/3");
        let seenby_lines: Vec<&str> = forwarded.lines().filter(|l| l.starts_with("Seenby")).collect();
        assert_eq!(*seenby_lines.last().unwrap(), "Seenby 1:2/3");
    }
}
