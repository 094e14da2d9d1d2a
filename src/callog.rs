//! The call log (spec §6 "Call-log CSV"): one line appended per
//! connection lifecycle, `DD/MM/YYYY,HH:MM:SS,<line>,<user-id>,<status>`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Local};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Answered,
    Hungup,
    Aborted,
    Rejected,
}

impl CallStatus {
    fn as_str(self) -> &'static str {
        match self {
            CallStatus::Answered => "Answered",
            CallStatus::Hungup => "Hungup",
            CallStatus::Aborted => "Aborted",
            CallStatus::Rejected => "Rejected",
        }
    }
}

pub fn format_row(line: usize, user_id: u32, status: CallStatus, when: DateTime<Local>) -> String {
    format!(
        "{},{},{},{},{}",
        when.format("%d/%m/%Y"),
        when.format("%H:%M:%S"),
        line,
        user_id,
        status.as_str(),
    )
}

/// Appends one row, creating the file (and its parent directory) if
/// needed. A log write failure is logged, not propagated: losing a call
/// record must never take a line down (spec §7 "no unwrap/expect outside
/// tests").
pub fn record(path: &Path, line: usize, user_id: u32, status: CallStatus, when: DateTime<Local>) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            log::warn!("call log: could not create {}: {e}", parent.display());
            return;
        }
    }
    let row = format_row(line, user_id, status, when);
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(mut file) => {
            if let Err(e) = writeln!(file, "{row}") {
                log::warn!("call log: write to {} failed: {e}", path.display());
            }
        }
        Err(e) => log::warn!("call log: could not open {}: {e}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn row_matches_the_documented_format() {
        let when = Local.with_ymd_and_hms(2026, 3, 5, 21, 7, 9).unwrap();
        assert_eq!(format_row(3, 42, CallStatus::Hungup, when), "05/03/2026,21:07:09,3,42,Hungup");
    }

    #[test]
    fn record_appends_rather_than_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Logs/Calls");
        let when = Local.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        record(&path, 0, 1, CallStatus::Answered, when);
        record(&path, 0, 1, CallStatus::Hungup, when);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
