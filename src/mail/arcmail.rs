//! Arcmail bundling: a bundle is a ZIP archive whose entries are packets
//! (spec §4.7). DEFLATE (method 8) and Store (method 0) are both accepted
//! on extraction; DEFLATE is used when packing.

use std::io::{Cursor, Read, Write};

use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

#[derive(Debug)]
pub enum ArcmailError {
    Zip(zip::result::ZipError),
    Io(std::io::Error),
}

impl std::fmt::Display for ArcmailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArcmailError::Zip(e) => write!(f, "arcmail archive error: {e}"),
            ArcmailError::Io(e) => write!(f, "i/o error: {e}"),
        }
    }
}
impl std::error::Error for ArcmailError {}
impl From<zip::result::ZipError> for ArcmailError {
    fn from(e: zip::result::ZipError) -> Self {
        ArcmailError::Zip(e)
    }
}
impl From<std::io::Error> for ArcmailError {
    fn from(e: std::io::Error) -> Self {
        ArcmailError::Io(e)
    }
}

/// Day-of-week/day-of-month cycling extension, `<two-letter-weekday><digit>`
/// (`mo0`…`su9`), used for both arcmail bundles and packets so concurrent
/// bundles to the same destination on the same day don't collide (spec
/// §4.7, §4.9).
pub fn cycle_extension(weekday: chrono::Weekday, day_of_month: u32) -> String {
    use chrono::Weekday::*;
    let prefix = match weekday {
        Sun => "su",
        Mon => "mo",
        Tue => "tu",
        Wed => "we",
        Thu => "th",
        Fri => "fr",
        Sat => "sa",
    };
    format!("{prefix}{}", day_of_month % 10)
}

/// Extracts every entry from a bundle, returning (name, bytes) pairs.
pub fn extract(bundle: &[u8]) -> Result<Vec<(String, Vec<u8>)>, ArcmailError> {
    let mut archive = ZipArchive::new(Cursor::new(bundle))?;
    let mut out = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        out.push((name, data));
    }
    Ok(out)
}

/// Packs one or more packets into a single bundle using DEFLATE.
pub fn pack(entries: &[(String, Vec<u8>)]) -> Result<Vec<u8>, ArcmailError> {
    let mut buf = Vec::new();
    {
        let mut writer = ZipWriter::new(Cursor::new(&mut buf));
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, data) in entries {
            writer.start_file(name, options)?;
            writer.write_all(data)?;
        }
        writer.finish()?;
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_then_extract_round_trips() {
        let entries = vec![
            ("0000001.pkt".to_string(), b"packet one".to_vec()),
            ("0000002.pkt".to_string(), b"packet two".to_vec()),
        ];
        let bundle = pack(&entries).unwrap();
        let extracted = extract(&bundle).unwrap();
        assert_eq!(extracted.len(), 2);
        assert_eq!(extracted[0].1, b"packet one");
        assert_eq!(extracted[1].1, b"packet two");
    }

    #[test]
    fn cycle_extension_follows_weekday_letter_table() {
        assert_eq!(cycle_extension(chrono::Weekday::Sun, 15), "su5");
        assert_eq!(cycle_extension(chrono::Weekday::Mon, 3), "mo3");
    }
}
