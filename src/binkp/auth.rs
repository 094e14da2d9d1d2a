//! CRAM-MD5 authentication (spec §4.10): `M_PWD CRAM-MD5-<digest>` where
//! `digest = HMAC-MD5(password, challenge)`, hex-encoded.

use hmac::{Hmac, Mac};
use md5::Md5;

type HmacMd5 = Hmac<Md5>;

pub fn digest(password: &str, challenge: &str) -> String {
    let mut mac = HmacMd5::new_from_slice(password.as_bytes()).expect("HMAC accepts any key length");
    mac.update(challenge.as_bytes());
    let bytes = mac.finalize().into_bytes();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn format_response(password: &str, challenge: &str) -> String {
    format!("CRAM-MD5-{}", digest(password, challenge))
}

/// Parses the `OPT` argument of a greeting `M_NUL` line for a `CRAM-MD5-`
/// challenge token, e.g. `"OPT CRAM-MD5-3a9f…"`.
pub fn parse_challenge(opt_args: &str) -> Option<&str> {
    opt_args
        .split_whitespace()
        .find_map(|tok| tok.strip_prefix("CRAM-MD5-"))
}

pub fn verify(password: &str, challenge: &str, response: &str) -> bool {
    match response.strip_prefix("CRAM-MD5-") {
        Some(got) => got.eq_ignore_ascii_case(&digest(password, challenge)),
        None => response == password,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic_and_hex_encoded() {
        let d = digest("hunter2", "abc123");
        assert_eq!(d.len(), 32);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn verify_accepts_matching_response_and_rejects_wrong_password() {
        let challenge = "abc123";
        let response = format_response("hunter2", challenge);
        assert!(verify("hunter2", challenge, &response));
        assert!(!verify("wrongpw", challenge, &response));
    }

    #[test]
    fn verify_falls_back_to_plain_password_without_a_challenge() {
        assert!(verify("plain", "", "plain"));
    }

    #[test]
    fn parse_challenge_extracts_token_from_opt_args() {
        assert_eq!(parse_challenge("SYS STUFF CRAM-MD5-deadbeef"), Some("deadbeef"));
        assert_eq!(parse_challenge("SYS STUFF"), None);
    }
}
