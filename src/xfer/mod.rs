//! C5: the file-transfer engine.
//!
//! Non-blocking state machines for XMODEM/YMODEM/ZMODEM (spec §4.5). A
//! [`Transfer`] ties one protocol state machine to a line's pipe pair; the
//! scheduler calls [`Transfer::poll`] once per visit, advancing the state
//! machine by feeding it whatever bytes are sitting in the input pipe and
//! writing its reply straight to the output pipe (spec §5: "advancing the
//! state machine by at most one protocol step per iteration").

pub mod crc;
pub mod xmodem;
pub mod ymodem;
pub mod zmodem;

use std::fmt;
use std::time::{Duration, Instant};

use crate::pipeline::PipePlane;

#[derive(Debug)]
pub enum TransferError {
    Pipe(crate::pipeline::PipeError),
    Aborted,
    TimedOut,
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::Pipe(e) => write!(f, "{e}"),
            TransferError::Aborted => write!(f, "transfer aborted"),
            TransferError::TimedOut => write!(f, "transfer timed out"),
        }
    }
}
impl std::error::Error for TransferError {}
impl From<crate::pipeline::PipeError> for TransferError {
    fn from(e: crate::pipeline::PipeError) -> Self {
        TransferError::Pipe(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Xmodem,
    XmodemCrc,
    Xmodem1k,
    Ymodem,
    YmodemG,
    Zmodem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Receive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Active,
    Complete,
    Failed,
}

enum Engine {
    XmodemSend(xmodem::XmodemSender),
    XmodemRecv(xmodem::XmodemReceiver),
    YmodemSend(ymodem::YmodemBatchSender),
    YmodemRecv(ymodem::YmodemReceiver),
    ZmodemSend(zmodem::ZmodemSendSession),
    ZmodemRecv(zmodem::ZmodemRecvSession),
}

/// ZMODEM has no fixed round-trip budget of its own in spec §4.5.3 beyond
/// "header round-trip 10s"; reuse XMODEM/YMODEM's constants rather than
/// inventing a fourth set of timeout numbers.
const ZMODEM_START_TIMEOUT_SECS: u64 = xmodem::START_TIMEOUT_SECS;
const ZMODEM_ROUND_TRIP_TIMEOUT_SECS: u64 = 10;

/// One active transfer bound to a line. Setting the line's transfer-active
/// flag (spec §4.5: "On transfer start the Line's transfer-active flag is
/// set, suppressing idle timeout and switching C2 to binary mode") is the
/// caller's responsibility, done when the `Transfer` is created.
pub struct Transfer {
    pub line: usize,
    pub protocol: Protocol,
    pub direction: Direction,
    engine: Engine,
    deadline: Instant,
    round_trip_timeout: Duration,
}

impl Transfer {
    pub fn xmodem_send(line: usize, data: Vec<u8>, use_1k: bool, now: Instant) -> Self {
        Transfer {
            line,
            protocol: if use_1k { Protocol::Xmodem1k } else { Protocol::XmodemCrc },
            direction: Direction::Send,
            engine: Engine::XmodemSend(xmodem::XmodemSender::new(data, use_1k)),
            deadline: now + Duration::from_secs(xmodem::START_TIMEOUT_SECS),
            round_trip_timeout: Duration::from_secs(xmodem::ROUND_TRIP_TIMEOUT_SECS),
        }
    }

    pub fn xmodem_receive(line: usize, mode: xmodem::Mode, now: Instant) -> Self {
        Transfer {
            line,
            protocol: match mode {
                xmodem::Mode::Crc => Protocol::XmodemCrc,
                xmodem::Mode::Checksum => Protocol::Xmodem,
            },
            direction: Direction::Receive,
            engine: Engine::XmodemRecv(xmodem::XmodemReceiver::new(mode)),
            deadline: now + Duration::from_secs(xmodem::START_TIMEOUT_SECS),
            round_trip_timeout: Duration::from_secs(xmodem::ROUND_TRIP_TIMEOUT_SECS),
        }
    }

    pub fn ymodem_send(line: usize, files: Vec<(String, Vec<u8>, u64)>, streaming: bool, now: Instant) -> Self {
        Transfer {
            line,
            protocol: if streaming { Protocol::YmodemG } else { Protocol::Ymodem },
            direction: Direction::Send,
            engine: Engine::YmodemSend(ymodem::YmodemBatchSender::new(files, streaming)),
            deadline: now + Duration::from_secs(xmodem::START_TIMEOUT_SECS),
            round_trip_timeout: Duration::from_secs(xmodem::ROUND_TRIP_TIMEOUT_SECS),
        }
    }

    pub fn ymodem_receive(line: usize, now: Instant) -> Self {
        Transfer {
            line,
            protocol: Protocol::Ymodem,
            direction: Direction::Receive,
            engine: Engine::YmodemRecv(ymodem::YmodemReceiver::new()),
            deadline: now + Duration::from_secs(xmodem::START_TIMEOUT_SECS),
            round_trip_timeout: Duration::from_secs(xmodem::ROUND_TRIP_TIMEOUT_SECS),
        }
    }

    pub fn zmodem_send(line: usize, filename: String, data: Vec<u8>, now: Instant) -> Self {
        Transfer {
            line,
            protocol: Protocol::Zmodem,
            direction: Direction::Send,
            engine: Engine::ZmodemSend(zmodem::ZmodemSendSession::new(filename, data)),
            deadline: now + Duration::from_secs(ZMODEM_START_TIMEOUT_SECS),
            round_trip_timeout: Duration::from_secs(ZMODEM_ROUND_TRIP_TIMEOUT_SECS),
        }
    }

    pub fn zmodem_receive(line: usize, existing_bytes: u32, now: Instant) -> Self {
        Transfer {
            line,
            protocol: Protocol::Zmodem,
            direction: Direction::Receive,
            engine: Engine::ZmodemRecv(zmodem::ZmodemRecvSession::new(existing_bytes)),
            deadline: now + Duration::from_secs(ZMODEM_START_TIMEOUT_SECS),
            round_trip_timeout: Duration::from_secs(ZMODEM_ROUND_TRIP_TIMEOUT_SECS),
        }
    }

    /// One scheduler step: drain whatever the pipe plane has for this
    /// line's input, feed it to the protocol state machine, and push
    /// whatever it produces onto the output pipe.
    pub fn poll(&mut self, plane: &PipePlane, now: Instant) -> Result<TransferStatus, TransferError> {
        let mut input = [0u8; 4096];
        let n = plane.dequeue_input_block(self.line, &mut input)?;
        let had_input = n > 0;
        if had_input {
            self.deadline = now + self.round_trip_timeout;
        }

        let out = match &mut self.engine {
            Engine::XmodemSend(s) => {
                let bytes = if had_input {
                    s.on_bytes(&input[..n])
                } else if now >= self.deadline {
                    self.deadline = now + self.round_trip_timeout;
                    s.on_timeout()
                } else {
                    Vec::new()
                };
                if !bytes.is_empty() {
                    plane.enqueue_output(self.line, &bytes)?;
                }
                if s.is_complete() {
                    return Ok(TransferStatus::Complete);
                }
                if matches!(s.state(), xmodem::SenderState::Aborted) {
                    return Ok(TransferStatus::Failed);
                }
                TransferStatus::Active
            }
            Engine::XmodemRecv(r) => {
                let bytes = if had_input {
                    r.on_bytes(&input[..n])
                } else if now >= self.deadline {
                    self.deadline = now + self.round_trip_timeout;
                    r.on_timeout()
                } else {
                    Vec::new()
                };
                if !bytes.is_empty() {
                    plane.enqueue_output(self.line, &bytes)?;
                }
                if r.is_complete() {
                    return Ok(TransferStatus::Complete);
                }
                if matches!(r.state(), xmodem::ReceiverState::Aborted) {
                    return Ok(TransferStatus::Failed);
                }
                TransferStatus::Active
            }
            Engine::YmodemSend(s) => {
                let bytes = if had_input {
                    if s.is_started() {
                        s.on_bytes(&input[..n])
                    } else {
                        s.begin(input[0])
                    }
                } else if now >= self.deadline {
                    self.deadline = now + self.round_trip_timeout;
                    s.on_timeout()
                } else {
                    Vec::new()
                };
                if !bytes.is_empty() {
                    plane.enqueue_output(self.line, &bytes)?;
                }
                if s.is_batch_complete() {
                    return Ok(TransferStatus::Complete);
                }
                TransferStatus::Active
            }
            Engine::YmodemRecv(r) => {
                let bytes = if had_input {
                    r.on_bytes(&input[..n])
                } else if now >= self.deadline {
                    self.deadline = now + self.round_trip_timeout;
                    r.on_timeout()
                } else {
                    Vec::new()
                };
                if !bytes.is_empty() {
                    plane.enqueue_output(self.line, &bytes)?;
                }
                if r.batch_done() {
                    return Ok(TransferStatus::Complete);
                }
                TransferStatus::Active
            }
            Engine::ZmodemSend(s) => {
                let bytes = if had_input {
                    s.on_bytes(&input[..n])
                } else if now >= self.deadline {
                    self.deadline = now + self.round_trip_timeout;
                    s.on_timeout()
                } else {
                    Vec::new()
                };
                if !bytes.is_empty() {
                    plane.enqueue_output(self.line, &bytes)?;
                }
                if s.is_complete() {
                    return Ok(TransferStatus::Complete);
                }
                if s.is_failed() {
                    return Ok(TransferStatus::Failed);
                }
                TransferStatus::Active
            }
            Engine::ZmodemRecv(r) => {
                let bytes = if had_input {
                    r.on_bytes(&input[..n])
                } else if now >= self.deadline {
                    self.deadline = now + self.round_trip_timeout;
                    r.on_timeout()
                } else {
                    Vec::new()
                };
                if !bytes.is_empty() {
                    plane.enqueue_output(self.line, &bytes)?;
                }
                if r.is_complete() {
                    return Ok(TransferStatus::Complete);
                }
                if r.is_failed() {
                    return Ok(TransferStatus::Failed);
                }
                TransferStatus::Active
            }
        };
        Ok(out)
    }

    /// Primes the wire for whichever side speaks first. XMODEM/YMODEM's
    /// receiver sends the mode-select byte first (spec §4.5.1); ZMODEM
    /// inverts this — its sender emits ZRQINIT before the receiver has
    /// said anything (spec §4.5.3) — so this also drives the ZMODEM send
    /// engine's queued opening frame.
    pub fn kickoff(&mut self, plane: &PipePlane) -> Result<(), TransferError> {
        match &mut self.engine {
            Engine::XmodemRecv(r) => plane.enqueue_output(self.line, &[r.start_byte()])?,
            Engine::YmodemRecv(r) => plane.enqueue_output(self.line, &[r.start_byte()])?,
            Engine::ZmodemSend(s) => plane.enqueue_output(self.line, &s.take_pending())?,
            _ => return Ok(()),
        };
        Ok(())
    }

    pub fn received_data(&self) -> Option<&[u8]> {
        match &self.engine {
            Engine::XmodemRecv(r) => Some(r.received_data()),
            Engine::ZmodemRecv(r) => Some(r.received_data()),
            _ => None,
        }
    }

    /// Files completed so far by a YMODEM batch receive (spec §4.5.2).
    pub fn received_files(&self) -> Option<&[(String, Vec<u8>)]> {
        match &self.engine {
            Engine::YmodemRecv(r) => Some(r.completed_files()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn send_and_receive_drive_each_other_through_the_pipe_plane() {
        let plane = PipePlane::new(2);
        let now = Instant::now();
        let mut sender = Transfer::xmodem_send(0, b"hello world\n".to_vec(), false, now);
        let mut receiver = Transfer::xmodem_receive(1, xmodem::Mode::Crc, now);

        // Receiver kicks off by sending 'C' onto its own output pipe; we
        // relay it into the sender's input pipe to simulate the wire.
        receiver.kickoff(&plane).unwrap();
        let mut relay = [0u8; 64];
        let n = plane.dequeue_output_block(1, &mut relay).unwrap();
        plane.enqueue_input(0, &relay[..n]).unwrap();

        for _ in 0..10 {
            sender.poll(&plane, now).unwrap();
            let n = plane.dequeue_output_block(0, &mut relay).unwrap();
            if n > 0 {
                plane.enqueue_input(1, &relay[..n]).unwrap();
            }
            let status = receiver.poll(&plane, now).unwrap();
            let n = plane.dequeue_output_block(1, &mut relay).unwrap();
            if n > 0 {
                plane.enqueue_input(0, &relay[..n]).unwrap();
            }
            if status == TransferStatus::Complete {
                break;
            }
        }

        assert_eq!(receiver.received_data().unwrap(), b"hello world\n");
    }

    #[test]
    fn ymodem_batch_delivers_every_file_through_the_pipe_plane() {
        let plane = PipePlane::new(2);
        let now = Instant::now();
        let files = vec![
            ("one.txt".to_string(), b"first file".to_vec(), 0),
            ("two.txt".to_string(), b"second file, a bit longer".to_vec(), 0),
        ];
        let mut sender = Transfer::ymodem_send(0, files, false, now);
        let mut receiver = Transfer::ymodem_receive(1, now);

        receiver.kickoff(&plane).unwrap();
        let mut relay = [0u8; 4096];
        let n = plane.dequeue_output_block(1, &mut relay).unwrap();
        plane.enqueue_input(0, &relay[..n]).unwrap();

        for _ in 0..60 {
            sender.poll(&plane, now).unwrap();
            let n = plane.dequeue_output_block(0, &mut relay).unwrap();
            if n > 0 {
                plane.enqueue_input(1, &relay[..n]).unwrap();
            }
            let status = receiver.poll(&plane, now).unwrap();
            let n = plane.dequeue_output_block(1, &mut relay).unwrap();
            if n > 0 {
                plane.enqueue_input(0, &relay[..n]).unwrap();
            }
            if status == TransferStatus::Complete {
                break;
            }
        }

        let received = receiver.received_files().unwrap();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0], ("one.txt".to_string(), b"first file".to_vec()));
        assert_eq!(received[1], ("two.txt".to_string(), b"second file, a bit longer".to_vec()));
    }

    #[test]
    fn zmodem_send_and_receive_drive_each_other_through_the_pipe_plane() {
        let plane = PipePlane::new(2);
        let now = Instant::now();
        let mut sender = Transfer::zmodem_send(0, "greeting.txt".to_string(), b"hello zmodem".to_vec(), now);
        let mut receiver = Transfer::zmodem_receive(1, 0, now);

        // Unlike XMODEM/YMODEM, the sender speaks first here.
        sender.kickoff(&plane).unwrap();
        let mut relay = [0u8; 4096];
        let n = plane.dequeue_output_block(0, &mut relay).unwrap();
        plane.enqueue_input(1, &relay[..n]).unwrap();

        for _ in 0..20 {
            let r_status = receiver.poll(&plane, now).unwrap();
            let n = plane.dequeue_output_block(1, &mut relay).unwrap();
            if n > 0 {
                plane.enqueue_input(0, &relay[..n]).unwrap();
            }
            let s_status = sender.poll(&plane, now).unwrap();
            let n = plane.dequeue_output_block(0, &mut relay).unwrap();
            if n > 0 {
                plane.enqueue_input(1, &relay[..n]).unwrap();
            }
            if r_status == TransferStatus::Complete && s_status == TransferStatus::Complete {
                break;
            }
        }

        assert_eq!(receiver.received_data().unwrap(), b"hello zmodem");
    }
}
