//! C10 BinkP session state machines (spec §4.10): the answerer greets and
//! challenges, the caller authenticates, both sides then interleave file
//! exchange until mutual EOB.

use std::collections::VecDeque;

use super::auth;
use super::frame::{CommandId, Frame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswererState {
    SendGreeting,
    WaitAdr,
    WaitPwd,
    SendOk,
    Exchange,
    Failed,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerState {
    WaitGreeting,
    SendAdr,
    SendPwd,
    WaitOk,
    Exchange,
    Failed,
    Closed,
}

#[derive(Debug, Clone)]
pub struct OutboundFile {
    pub name: String,
    pub size: u64,
    pub mtime: u64,
    pub data: Vec<u8>,
    pub offset: u64,
}

#[derive(Debug, Clone)]
pub struct InboundFile {
    pub name: String,
    pub size: u64,
    pub mtime: u64,
    pub data: Vec<u8>,
}

/// Shared exchange-phase bookkeeping used by both roles once
/// authentication succeeds.
#[derive(Default)]
pub struct Exchange {
    pub outbound: VecDeque<OutboundFile>,
    pub current_send: Option<OutboundFile>,
    pub inbound: Option<InboundFile>,
    pub our_eob_sent: bool,
    pub their_eob_received: bool,
}

impl Exchange {
    /// One exchange-phase step: emits whatever frames the current state
    /// calls for. `incoming` is drained of any newly-arrived frames.
    pub fn step(&mut self, incoming: &mut Vec<Frame>) -> Vec<Frame> {
        let mut out = Vec::new();
        for frame in incoming.drain(..) {
            match frame {
                Frame::Command(CommandId::File, args) => {
                    let mut parts = args.split_whitespace();
                    let name = parts.next().unwrap_or("").to_string();
                    let size = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
                    let mtime = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
                    self.inbound = Some(InboundFile { name, size, mtime, data: Vec::new() });
                }
                Frame::Data(bytes) => {
                    if let Some(inbound) = &mut self.inbound {
                        inbound.data.extend_from_slice(&bytes);
                        if inbound.data.len() as u64 >= inbound.size {
                            out.push(Frame::Command(
                                CommandId::Got,
                                format!("{} {} {}", inbound.name, inbound.size, inbound.mtime),
                            ));
                            self.inbound = None;
                        }
                    }
                }
                Frame::Command(CommandId::Eob, _) => {
                    self.their_eob_received = true;
                }
                Frame::Command(CommandId::Get, args) => {
                    if let Some(offset) = args.split_whitespace().nth(3).and_then(|s| s.parse::<u64>().ok()) {
                        if let Some(send) = &mut self.current_send {
                            send.offset = offset;
                        }
                    }
                }
                Frame::Command(CommandId::Skip, _) => {
                    self.current_send = None;
                }
                _ => {}
            }
        }

        if self.current_send.is_none() {
            self.current_send = self.outbound.pop_front();
            if let Some(send) = &self.current_send {
                out.push(Frame::Command(CommandId::File, format!("{} {} {}", send.name, send.size, send.mtime)));
            }
        }
        if let Some(send) = &mut self.current_send {
            let remaining = &send.data[send.offset as usize..];
            if remaining.is_empty() {
                out.push(Frame::Command(
                    CommandId::Got,
                    format!("{} {} {}", send.name, send.size, send.mtime),
                ));
                self.current_send = None;
            } else {
                let chunk_len = remaining.len().min(super::frame::MAX_PAYLOAD);
                out.push(Frame::Data(remaining[..chunk_len].to_vec()));
                send.offset += chunk_len as u64;
            }
        }
        if self.current_send.is_none() && self.outbound.is_empty() && !self.our_eob_sent {
            out.push(Frame::Command(CommandId::Eob, String::new()));
            self.our_eob_sent = true;
        }
        out
    }

    pub fn is_done(&self) -> bool {
        self.our_eob_sent && self.their_eob_received
    }
}

pub struct Answerer {
    pub state: AnswererState,
    pub challenge: String,
    pub local_addresses: Vec<String>,
    pub password: String,
    pub peer_address: Option<String>,
    pub exchange: Exchange,
}

impl Answerer {
    pub fn new(local_addresses: Vec<String>, password: String, challenge: String) -> Self {
        Answerer {
            state: AnswererState::SendGreeting,
            challenge,
            local_addresses,
            password,
            peer_address: None,
            exchange: Exchange::default(),
        }
    }

    pub fn greeting(&mut self) -> Vec<Frame> {
        self.state = AnswererState::WaitAdr;
        vec![
            Frame::Command(CommandId::Nul, "SYS bbsd".to_string()),
            Frame::Command(CommandId::Nul, format!("OPT CRAM-MD5-{}", self.challenge)),
            Frame::Command(CommandId::Adr, self.local_addresses.join(" ")),
        ]
    }

    pub fn on_frame(&mut self, frame: Frame) -> Vec<Frame> {
        match (self.state, &frame) {
            (AnswererState::WaitAdr, Frame::Command(CommandId::Adr, addr)) => {
                self.peer_address = Some(addr.clone());
                self.state = AnswererState::WaitPwd;
                Vec::new()
            }
            (AnswererState::WaitPwd, Frame::Command(CommandId::Pwd, response)) => {
                if auth::verify(&self.password, &self.challenge, response) {
                    self.state = AnswererState::Exchange;
                    vec![Frame::Command(CommandId::Ok, String::new())]
                } else {
                    self.state = AnswererState::Failed;
                    vec![Frame::Command(CommandId::Err, "bad password".to_string())]
                }
            }
            _ => Vec::new(),
        }
    }
}

pub struct Caller {
    pub state: CallerState,
    pub local_addresses: Vec<String>,
    pub password: String,
    pub exchange: Exchange,
}

impl Caller {
    pub fn new(local_addresses: Vec<String>, password: String) -> Self {
        Caller {
            state: CallerState::WaitGreeting,
            local_addresses,
            password,
            exchange: Exchange::default(),
        }
    }

    /// Feeds greeting frames from the answerer; returns our ADR/PWD
    /// response frames once the greeting is fully seen.
    pub fn on_greeting_frame(&mut self, frame: Frame) -> Vec<Frame> {
        if let Frame::Command(CommandId::Nul, args) = &frame {
            if let Some(challenge) = args.strip_prefix("OPT ").and_then(auth::parse_challenge) {
                self.state = CallerState::SendPwd;
                return vec![
                    Frame::Command(CommandId::Adr, self.local_addresses.join(" ")),
                    Frame::Command(CommandId::Pwd, auth::format_response(&self.password, challenge)),
                ];
            }
        }
        if let Frame::Command(CommandId::Ok, _) = &frame {
            self.state = CallerState::Exchange;
        }
        if let Frame::Command(CommandId::Err, _) = &frame {
            self.state = CallerState::Failed;
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answerer_accepts_correct_cram_md5_response() {
        let mut answerer = Answerer::new(vec!["1:1/1".into()], "secret".into(), "chal123".into());
        answerer.greeting();
        answerer.on_frame(Frame::Command(CommandId::Adr, "1:2/3".into()));
        let response = auth::format_response("secret", "chal123");
        let reply = answerer.on_frame(Frame::Command(CommandId::Pwd, response));
        assert_eq!(answerer.state, AnswererState::Exchange);
        assert_eq!(reply, vec![Frame::Command(CommandId::Ok, String::new())]);
    }

    #[test]
    fn answerer_rejects_wrong_password() {
        let mut answerer = Answerer::new(vec!["1:1/1".into()], "secret".into(), "chal123".into());
        answerer.greeting();
        answerer.on_frame(Frame::Command(CommandId::Adr, "1:2/3".into()));
        let reply = answerer.on_frame(Frame::Command(CommandId::Pwd, "CRAM-MD5-deadbeef".into()));
        assert_eq!(answerer.state, AnswererState::Failed);
        assert!(matches!(reply[0], Frame::Command(CommandId::Err, _)));
    }

    #[test]
    fn exchange_sends_a_queued_file_and_acks_on_got() {
        let mut ex = Exchange::default();
        ex.outbound.push_back(OutboundFile {
            name: "test.txt".into(),
            size: 4,
            mtime: 0,
            data: b"data".to_vec(),
            offset: 0,
        });
        let mut incoming = Vec::new();
        let first = ex.step(&mut incoming);
        assert!(matches!(first[0], Frame::Command(CommandId::File, _)));
        assert!(matches!(first[1], Frame::Data(_)));
    }

    #[test]
    fn mutual_eob_marks_exchange_done() {
        let mut ex = Exchange::default();
        let mut incoming = vec![Frame::Command(CommandId::Eob, String::new())];
        let out = ex.step(&mut incoming);
        assert!(out.iter().any(|f| matches!(f, Frame::Command(CommandId::Eob, _))));
        assert!(ex.is_done());
    }
}
