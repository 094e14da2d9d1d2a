//! Telnet framing for C2 (spec §4.2, RFC 854): IAC command/option handling
//! on the way in, IAC doubling and CR translation on the way out. Pure
//! byte-buffer filters so the line driver can run them without blocking.

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

pub const DEFAULT_PORT: u16 = 23;

const OPT_ECHO: u8 = 1;
const OPT_SUPPRESS_GA: u8 = 3;
const OPT_BINARY: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    Data,
    Iac,
    Negotiate(u8),
    SubNegotiation,
    SubNegotiationIac,
}

/// An outbound negotiation reply the line driver should write to the
/// socket (`WILL`/`WONT`/`DO`/`DONT` plus the option byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiation {
    pub verb: u8,
    pub option: u8,
}

impl Negotiation {
    pub fn encode(self) -> [u8; 3] {
        [IAC, self.verb, self.option]
    }
}

/// Strips Telnet IAC sequences from inbound bytes, translating `CR LF`
/// and `CR NUL` to a bare `CR` (spec §4.2), and surfaces any negotiation
/// replies the caller should send back.
pub struct TelnetFilter {
    state: ParseState,
    pub binary_mode: bool,
    /// Forces binary framing for the duration of a C5 transfer even if the
    /// peer never negotiated `BINARY`, independent of `binary_mode` so the
    /// negotiated state survives the transfer ending (spec §4.2, §4.5).
    pub transfer_override: bool,
    saw_cr: bool,
}

impl Default for TelnetFilter {
    fn default() -> Self {
        TelnetFilter { state: ParseState::Data, binary_mode: false, transfer_override: false, saw_cr: false }
    }
}

impl TelnetFilter {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_binary(&self) -> bool {
        self.binary_mode || self.transfer_override
    }

    /// Filters inbound bytes, appending clean application data to `out`
    /// and negotiation replies to `replies`.
    pub fn feed_inbound(&mut self, data: &[u8], out: &mut Vec<u8>, replies: &mut Vec<Negotiation>) {
        for &byte in data {
            match self.state {
                ParseState::Data => {
                    if byte == IAC {
                        self.state = ParseState::Iac;
                        continue;
                    }
                    if self.saw_cr {
                        self.saw_cr = false;
                        if byte == 0 || byte == b'\n' {
                            continue;
                        }
                    }
                    if byte == b'\r' && !self.is_binary() {
                        self.saw_cr = true;
                        out.push(b'\r');
                        continue;
                    }
                    out.push(byte);
                }
                ParseState::Iac => match byte {
                    IAC => {
                        out.push(IAC);
                        self.state = ParseState::Data;
                    }
                    WILL | WONT | DO | DONT => {
                        self.state = ParseState::Negotiate(byte);
                    }
                    SB => {
                        self.state = ParseState::SubNegotiation;
                    }
                    _ => {
                        self.state = ParseState::Data;
                    }
                },
                ParseState::Negotiate(verb) => {
                    if let Some(reply) = self.handle_negotiation(verb, byte) {
                        replies.push(reply);
                    }
                    self.state = ParseState::Data;
                }
                ParseState::SubNegotiation => {
                    if byte == IAC {
                        self.state = ParseState::SubNegotiationIac;
                    }
                }
                ParseState::SubNegotiationIac => {
                    self.state = if byte == SE { ParseState::Data } else { ParseState::SubNegotiation };
                }
            }
        }
    }

    fn handle_negotiation(&mut self, verb: u8, option: u8) -> Option<Negotiation> {
        match verb {
            DO if option == OPT_BINARY => {
                self.binary_mode = true;
                Some(Negotiation { verb: WILL, option })
            }
            DO => Some(Negotiation { verb: WONT, option }),
            WILL if option == OPT_BINARY => {
                self.binary_mode = true;
                Some(Negotiation { verb: DO, option })
            }
            WILL if option == OPT_SUPPRESS_GA => Some(Negotiation { verb: DO, option }),
            WILL => Some(Negotiation { verb: DONT, option }),
            DONT | WONT if option == OPT_BINARY => {
                self.binary_mode = false;
                None
            }
            DONT | WONT => None,
            _ => None,
        }
    }

    /// Negotiation offers to send right after accept: server echoes,
    /// suppresses go-ahead, and asks the client to send binary so transfer
    /// traffic doesn't get CR/NUL-mangled (spec §4.2).
    pub fn initial_offers() -> Vec<Negotiation> {
        vec![
            Negotiation { verb: WILL, option: OPT_ECHO },
            Negotiation { verb: WILL, option: OPT_SUPPRESS_GA },
            Negotiation { verb: DO, option: OPT_BINARY },
        ]
    }

    /// Doubles any literal `0xFF` byte and, outside binary mode, maps a
    /// bare `CR` to `CR NUL` per RFC 854, ready to write to the socket.
    pub fn encode_outbound(&self, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(data.len());
        for &byte in data {
            if byte == IAC {
                out.push(IAC);
                out.push(IAC);
            } else if byte == b'\r' && !self.is_binary() {
                out.push(b'\r');
                out.push(0);
            } else {
                out.push(byte);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubled_iac_in_data_decodes_to_one() {
        let mut filter = TelnetFilter::new();
        let mut out = Vec::new();
        let mut replies = Vec::new();
        filter.feed_inbound(&[b'a', IAC, IAC, b'b'], &mut out, &mut replies);
        assert_eq!(out, vec![b'a', IAC, b'b']);
        assert!(replies.is_empty());
    }

    #[test]
    fn do_binary_is_accepted_and_flips_binary_mode() {
        let mut filter = TelnetFilter::new();
        let mut out = Vec::new();
        let mut replies = Vec::new();
        filter.feed_inbound(&[IAC, DO, OPT_BINARY], &mut out, &mut replies);
        assert!(filter.binary_mode);
        assert_eq!(replies, vec![Negotiation { verb: WILL, option: OPT_BINARY }]);
    }

    #[test]
    fn unsupported_will_is_refused() {
        let mut filter = TelnetFilter::new();
        let mut out = Vec::new();
        let mut replies = Vec::new();
        filter.feed_inbound(&[IAC, WILL, 99], &mut out, &mut replies);
        assert_eq!(replies, vec![Negotiation { verb: DONT, option: 99 }]);
    }

    #[test]
    fn cr_nul_collapses_to_bare_cr() {
        let mut filter = TelnetFilter::new();
        let mut out = Vec::new();
        let mut replies = Vec::new();
        filter.feed_inbound(b"hi\r\0there", &mut out, &mut replies);
        assert_eq!(out, b"hi\rthere");
    }

    #[test]
    fn subnegotiation_bytes_are_absorbed() {
        let mut filter = TelnetFilter::new();
        let mut out = Vec::new();
        let mut replies = Vec::new();
        filter.feed_inbound(&[IAC, SB, 1, 2, 3, IAC, SE, b'x'], &mut out, &mut replies);
        assert_eq!(out, vec![b'x']);
    }

    #[test]
    fn outbound_cr_becomes_cr_nul_outside_binary_mode() {
        let filter = TelnetFilter::new();
        assert_eq!(filter.encode_outbound(b"a\rb"), vec![b'a', b'\r', 0, b'b']);
    }
}
