//! File request (FREQ, spec §4.10 "FREQ"): an outbound `.req` lists
//! wanted filenames, one per line, wildcards allowed. Sent during
//! exchange as `M_GET` with size=0, time=0.

use crate::mail::scanner::wildcard_matches;

pub fn parse_request(body: &str) -> Vec<String> {
    body.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FreqResult {
    Found(String),
    NotFound(String),
}

/// Resolves each requested pattern against the available file names under
/// the configured FREQ path, returning one result per request (the
/// answering side queues `Found` for send and replies `M_SKIP` for
/// `NotFound`, spec §4.10).
pub fn resolve<'a>(requests: &[String], available: &'a [String]) -> Vec<FreqResult> {
    requests
        .iter()
        .map(|pattern| {
            available
                .iter()
                .find(|name| wildcard_matches(pattern, name))
                .map(|name| FreqResult::Found(name.clone()))
                .unwrap_or_else(|| FreqResult::NotFound(pattern.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_matches_wildcards_against_available_files() {
        let requests = parse_request("game*.zip\nmissing.txt\n");
        let available = vec!["game1.zip".to_string(), "readme.txt".to_string()];
        let results = resolve(&requests, &available);
        assert_eq!(results[0], FreqResult::Found("game1.zip".to_string()));
        assert_eq!(results[1], FreqResult::NotFound("missing.txt".to_string()));
    }
}
