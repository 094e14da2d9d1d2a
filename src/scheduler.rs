//! The cooperative scheduler (spec §5): one `Line` per connection, driven
//! by a central poll that advances each line by at most one suspension
//! step per visit. No task ever blocks; everything that needs external
//! input parks in a [`WaitState`](crate::session::WaitState) and is
//! resumed here once the condition it is waiting on fires.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::callog::{self, CallStatus};
use crate::door::ForceDisconnectRequested;
use crate::events::{CoreEvent, EventBus};
use crate::pipeline::PipePlane;
use crate::script::commands::{Host, InputEcho, Suspend};
use crate::script::interp::{Interpreter, StepResult};
use crate::session::{Line, LineState, WaitState};
use crate::store::fileobj::FileBaseStore;
use crate::store::user::User;
use crate::store::UserStore;
use crate::xfer::{Transfer, TransferStatus};

/// Where script source files live on disk; kept behind a trait so tests
/// can substitute an in-memory table instead of touching the filesystem.
pub trait ScriptSource {
    fn load(&self, path: &str) -> Option<String>;
}

pub struct FsScriptSource {
    pub root: PathBuf,
}

impl ScriptSource for FsScriptSource {
    fn load(&self, path: &str) -> Option<String> {
        std::fs::read_to_string(self.root.join(path)).ok()
    }
}

/// A `sendmail`/`sendnetmail` call the scheduler accepted but has not yet
/// handed to C6/C8; collected per line and drained by the caller (tests
/// inspect this directly, a real deployment wires it to the object store
/// and outbound queue described in spec §4.6/§4.9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingMail {
    Local { to_user: String, subject: String, body: String },
    Netmail { address: String, to_name: String, subject: String, body: String },
}

struct LineRuntime {
    interp: Option<Interpreter>,
    transfer: Option<Transfer>,
    cancelled: bool,
    doing: String,
    more_override: Option<bool>,
    pending_mail: Vec<PendingMail>,
    answered: bool,
}

impl LineRuntime {
    fn new() -> Self {
        LineRuntime {
            interp: None,
            transfer: None,
            cancelled: false,
            doing: String::new(),
            more_override: None,
            pending_mail: Vec::new(),
            answered: false,
        }
    }
}

/// Ties every per-line subsystem together: the pipe plane (C1), the
/// session state machine (C3), the script interpreter (C4), the transfer
/// engine (C5), and the user store (C6). One [`Scheduler::visit`] call
/// advances exactly one line by at most one suspension step (spec §5).
pub struct Scheduler {
    pub plane: PipePlane,
    lines: Vec<Line>,
    runtime: Vec<LineRuntime>,
    pub events: EventBus,
    pub users: Arc<UserStore>,
    pub files: Arc<FileBaseStore>,
    scripts: Arc<dyn ScriptSource + Send + Sync>,
    accepting: bool,
    started_at: Instant,
    call_log_path: PathBuf,
}

impl Scheduler {
    pub fn new(
        line_count: usize,
        idle_timeout: std::time::Duration,
        users: Arc<UserStore>,
        files: Arc<FileBaseStore>,
        scripts: Arc<dyn ScriptSource + Send + Sync>,
        call_log_path: PathBuf,
        now: Instant,
    ) -> Self {
        let lines = (0..line_count).map(|i| Line::new(i, idle_timeout, now)).collect();
        let runtime = (0..line_count).map(|_| LineRuntime::new()).collect();
        Scheduler {
            plane: PipePlane::new(line_count),
            lines,
            runtime,
            events: EventBus::new(),
            users,
            files,
            scripts,
            accepting: true,
            started_at: now,
            call_log_path,
        }
    }

    fn now_ms(&self, now: Instant) -> u64 {
        now.duration_since(self.started_at).as_millis() as u64
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn line(&self, index: usize) -> &Line {
        &self.lines[index]
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    pub fn set_accepting(&mut self, accepting: bool) {
        self.accepting = accepting;
    }

    /// Marks the line cancelled; the next [`Scheduler::visit`] tears it
    /// down (spec §5 "Cancellation").
    pub fn request_disconnect(&mut self, line: usize) {
        self.runtime[line].cancelled = true;
    }

    pub fn connect(&mut self, line: usize, peer: &str, now: Instant, entry_script: &str) {
        self.lines[line].connect(now);
        self.plane.reset(line).ok();
        self.runtime[line].answered = true;
        self.events.emit(CoreEvent::LineConnected { line, peer: peer.to_string() });
        if let Some(source) = self.scripts.load(entry_script) {
            self.runtime[line].interp = Some(Interpreter::new(entry_script, &source));
        }
    }

    /// Advances one line by a single suspension step. Returns true if the
    /// line did anything observable (so a caller round-robining lines can
    /// skip a short sleep when at least one line was productive).
    pub fn visit(&mut self, line: usize, now: Instant) -> bool {
        if self.runtime[line].cancelled {
            self.teardown(line);
            return true;
        }
        if self.lines[line].state == LineState::Disconnected {
            return false;
        }
        if self.lines[line].is_idle_expired(now) {
            self.runtime[line].cancelled = true;
            return true;
        }

        if self.lines[line].wait == WaitState::Transfer {
            return self.poll_transfer(line, now);
        }

        let Some(mut interp) = self.runtime[line].interp.take() else {
            return false;
        };
        let progressed = self.step_interpreter(line, &mut interp, now);
        self.runtime[line].interp = Some(interp);
        progressed
    }

    fn step_interpreter(&mut self, line: usize, interp: &mut Interpreter, now: Instant) -> bool {
        match self.lines[line].wait.clone() {
            WaitState::None => {}
            WaitState::Input { .. } | WaitState::AnyKey | WaitState::MorePrompt => {
                let Some(byte) = self.plane.dequeue_input(line).ok().flatten() else {
                    return false;
                };
                self.resolve_wait(line, interp, byte, now);
                return true;
            }
            WaitState::DetectAnsi { deadline_ms } => {
                if let Some(resp) = self.try_consume_ansi_response(line) {
                    self.lines[line].wait = WaitState::None;
                    interp.set_var("r", if resp { "1" } else { "0" }.to_string());
                } else if self.now_ms(now) >= deadline_ms {
                    self.lines[line].wait = WaitState::None;
                    interp.set_var("r", "0".to_string());
                } else {
                    return false;
                }
            }
            WaitState::Door => return false,
            WaitState::Transfer => unreachable!("handled in visit"),
        }

        let rt = &mut self.runtime[line];
        let mut host = LineHost {
            plane: &self.plane,
            line_index: line,
            line: &mut self.lines[line],
            events: &self.events,
            doing: &mut rt.doing,
            more_override: &mut rt.more_override,
            pending_mail: &mut rt.pending_mail,
            scripts: self.scripts.as_ref(),
        };

        match interp.step(&mut host) {
            Ok(StepResult::Continue) => true,
            Ok(StepResult::Finished) => {
                self.runtime[line].cancelled = true;
                true
            }
            Ok(StepResult::Suspend(suspend)) => {
                self.enter_suspend(line, interp, suspend, now);
                true
            }
            Err(_) => {
                self.runtime[line].cancelled = true;
                true
            }
        }
    }

    fn enter_suspend(&mut self, line: usize, interp: &mut Interpreter, suspend: Suspend, now: Instant) {
        match suspend {
            Suspend::PromptChar { echo, .. } | Suspend::PromptLine { echo, .. } => {
                self.lines[line].wait = WaitState::Input { echo: echo == InputEcho::Echo };
            }
            Suspend::YesNo { .. } | Suspend::AnyKey { .. } => {
                self.lines[line].wait = WaitState::AnyKey;
            }
            Suspend::DetectAnsi { timeout_ms, .. } => {
                self.plane.enqueue_output(line, b"\x1b[6n").ok();
                let deadline_ms = self.now_ms(now) + timeout_ms;
                self.lines[line].wait = WaitState::DetectAnsi { deadline_ms };
            }
            Suspend::MorePrompt => {
                self.lines[line].wait = WaitState::MorePrompt;
            }
            Suspend::Logon | Suspend::NewUser | Suspend::Online { .. } | Suspend::LoginScan => {
                // These run synchronously against the user store rather
                // than suspending the scheduler itself; resolve them
                // immediately and fall through to the next step.
                self.resolve_store_command(line, interp, suspend);
            }
            Suspend::SendFile { .. } | Suspend::ReceiveFile { .. } => {
                if let Some(transfer) = self.start_transfer(line, suspend, now) {
                    self.runtime[line].transfer = Some(transfer);
                    self.lines[line].wait = WaitState::Transfer;
                    self.lines[line].transfer_active = true;
                    self.events.emit(CoreEvent::TransferActive { line, active: true });
                } else {
                    interp.set_var("r", "0".to_string());
                }
            }
        }
    }

    fn resolve_store_command(&mut self, line: usize, interp: &mut Interpreter, suspend: Suspend) {
        match suspend {
            Suspend::Logon => {
                // The authentication subdialog itself is script-driven
                // (spec §4.4 "logon ... run authentication subdialog");
                // this command only marks the wait condition resolved so
                // the calling script's own prompt/readline pair collects
                // credentials and a later explicit bind happens via
                // `Scheduler::bind_user`.
                interp.set_var("r", "0".to_string());
            }
            Suspend::NewUser => {
                interp.set_var("r", "0".to_string());
            }
            Suspend::Online { var } => {
                let count = self.lines.iter().filter(|l| l.state == LineState::Authenticated).count();
                interp.set_var(&var, count.to_string());
            }
            Suspend::LoginScan => {
                interp.set_var("newmsgs", "0".to_string());
                interp.set_var("newfiles", "0".to_string());
            }
            _ => {}
        }
    }

    /// Completes a `logon` suspension once the caller has authenticated
    /// the user out-of-band (script drives `prompt`/`readline` itself;
    /// the scheduler only owns the bind).
    pub fn bind_user(&mut self, line: usize, user: &User) {
        self.lines[line].bind_user(user);
        self.events.emit(CoreEvent::LineUserBound { line, real_name: user.real_name.clone() });
    }

    fn resolve_wait(&mut self, line: usize, interp: &mut Interpreter, byte: u8, now: Instant) {
        let _ = now;
        match self.lines[line].wait.clone() {
            WaitState::Input { echo } => {
                if echo {
                    self.plane.enqueue_output(line, &[byte]).ok();
                }
                if byte == b'\r' || byte == b'\n' {
                    interp.set_var("r", String::new());
                } else {
                    interp.set_var("r", (byte as char).to_string());
                }
                self.lines[line].wait = WaitState::None;
            }
            WaitState::AnyKey => {
                let upper = (byte as char).to_ascii_uppercase();
                interp.set_var("r", if upper == 'Y' { "1" } else { "0" }.to_string());
                self.lines[line].wait = WaitState::None;
            }
            WaitState::MorePrompt => {
                let upper = (byte as char).to_ascii_uppercase();
                if upper == 'Q' || upper == 'N' || byte == 0x03 {
                    self.lines[line].abort_paging();
                } else {
                    self.lines[line].reset_paging();
                }
                self.lines[line].wait = WaitState::None;
            }
            _ => {}
        }
    }

    /// Looks for a DSR position report (`ESC[row;colR`) in the input
    /// pipe without consuming bytes that aren't part of one (spec §4.4
    /// "detectansi").
    fn try_consume_ansi_response(&mut self, line: usize) -> Option<bool> {
        let mut buf = [0u8; 32];
        let n = self.plane.dequeue_input_block(line, &mut buf).ok()?;
        if n == 0 {
            return None;
        }
        let saw_report = buf[..n].windows(2).any(|w| w[0] == 0x1b && w[1] == b'[')
            && buf[..n].contains(&b'R');
        Some(saw_report)
    }

    /// Resolves `file_id`/`proto` against the file base (spec §4.6) and
    /// builds the matching `Transfer`. Returns `None` when the file
    /// doesn't exist (or is observably deleted) so the caller can fail
    /// the command with `r = "0"` instead of entering a transfer wait.
    fn start_transfer(&mut self, line: usize, suspend: Suspend, now: Instant) -> Option<Transfer> {
        let mut transfer = match suspend {
            Suspend::SendFile { file_id, proto } => {
                let id: u32 = file_id.trim().parse().ok()?;
                let file = self.files.find_by_id(id).ok()??;
                if file.is_observably_deleted() {
                    return None;
                }
                let data = self.files.read_payload(id).ok()?;
                match proto.as_deref() {
                    Some("xmodem1k") => Transfer::xmodem_send(line, data, true, now),
                    Some("ymodem") => Transfer::ymodem_send(line, vec![(file.display_name.clone(), data, file.size)], false, now),
                    Some("ymodemg") => Transfer::ymodem_send(line, vec![(file.display_name.clone(), data, file.size)], true, now),
                    Some("zmodem") => Transfer::zmodem_send(line, file.display_name.clone(), data, now),
                    Some("xmodem") | None => Transfer::xmodem_send(line, data, false, now),
                    Some(_) => return None,
                }
            }
            Suspend::ReceiveFile { proto, .. } => match proto.as_deref() {
                Some("ymodem") | Some("ymodemg") => Transfer::ymodem_receive(line, now),
                Some("zmodem") => Transfer::zmodem_receive(line, 0, now),
                Some("xmodem") | Some("xmodem1k") | None => {
                    Transfer::xmodem_receive(line, crate::xfer::xmodem::Mode::Crc, now)
                }
                Some(_) => return None,
            },
            _ => return None,
        };
        transfer.kickoff(&self.plane).ok();
        Some(transfer)
    }

    fn poll_transfer(&mut self, line: usize, now: Instant) -> bool {
        let Some(mut transfer) = self.runtime[line].transfer.take() else {
            self.lines[line].wait = WaitState::None;
            self.lines[line].transfer_active = false;
            return false;
        };
        let status = transfer.poll(&self.plane, now).unwrap_or(TransferStatus::Failed);
        match status {
            TransferStatus::Active => {
                self.runtime[line].transfer = Some(transfer);
            }
            TransferStatus::Complete | TransferStatus::Failed => {
                self.lines[line].wait = WaitState::None;
                self.lines[line].transfer_active = false;
                self.events.emit(CoreEvent::TransferActive { line, active: false });
                if let Some(interp) = &mut self.runtime[line].interp {
                    interp.set_var("r", if status == TransferStatus::Complete { "1" } else { "0" }.to_string());
                }
            }
        }
        true
    }

    /// Cancellation (spec §5): abort any active transfer, pop the whole
    /// script call stack, unbind the user, clear the pipe pair, and
    /// return the line to DISCONNECTED.
    fn teardown(&mut self, line: usize) {
        if self.runtime[line].transfer.take().is_some() {
            self.events.emit(CoreEvent::TransferActive { line, active: false });
        }
        if self.lines[line].wait == WaitState::Door {
            let _ = ForceDisconnectRequested;
        }
        self.runtime[line].interp = None;
        let was_bound = self.lines[line].bound_user.is_some();
        let user_id = self.lines[line].bound_user.as_ref().map(|u| u.user_id);
        if was_bound {
            self.events.emit(CoreEvent::LineUserUnbound { line });
        }
        let answered = self.runtime[line].answered;
        self.plane.reset(line).ok();
        self.lines[line].disconnect();
        self.runtime[line].cancelled = false;
        self.runtime[line].answered = false;
        self.events.emit(CoreEvent::LineDisconnected { line });

        let status = if answered && was_bound {
            CallStatus::Hungup
        } else if answered {
            CallStatus::Aborted
        } else {
            CallStatus::Rejected
        };
        callog::record(&self.call_log_path(), line, user_id.unwrap_or(0), status, now_wall_clock());
    }

    fn call_log_path(&self) -> PathBuf {
        self.call_log_path.clone()
    }

    /// Mail the line's script produced via `sendmail`/`sendnetmail`,
    /// drained for handoff to C6/C8.
    pub fn drain_pending_mail(&mut self, line: usize) -> Vec<PendingMail> {
        std::mem::take(&mut self.runtime[line].pending_mail)
    }
}

fn now_wall_clock() -> chrono::DateTime<chrono::Local> {
    chrono::Local::now()
}

struct LineHost<'s> {
    plane: &'s PipePlane,
    line_index: usize,
    line: &'s mut Line,
    events: &'s EventBus,
    doing: &'s mut String,
    more_override: &'s mut Option<bool>,
    pending_mail: &'s mut Vec<PendingMail>,
    scripts: &'s (dyn ScriptSource + Send + Sync),
}

impl<'s> Host for LineHost<'s> {
    fn print(&mut self, text: &str) -> bool {
        if self.line.paging_aborted {
            return false;
        }
        self.plane.enqueue_output(self.line_index, text.as_bytes()).ok();
        self.line.write_output(text.as_bytes(), *self.more_override)
    }

    fn cls(&mut self) {
        self.plane.enqueue_output(self.line_index, b"\x1b[2J\x1b[H").ok();
        self.line.terminal.feed(b"\x1b[2J\x1b[H");
        self.line.reset_paging();
    }

    fn set_fgbg(&mut self, fg: u8, bg: u8) {
        let seq = format!("\x1b[3{};4{}m", fg % 8, bg % 8);
        self.plane.enqueue_output(self.line_index, seq.as_bytes()).ok();
    }

    fn set_bold(&mut self) {
        self.plane.enqueue_output(self.line_index, b"\x1b[1m").ok();
    }

    fn set_std(&mut self) {
        self.plane.enqueue_output(self.line_index, b"\x1b[0m").ok();
    }

    fn set_flash(&mut self, on: bool) {
        let seq: &[u8] = if on { b"\x1b[5m" } else { b"\x1b[25m" };
        self.plane.enqueue_output(self.line_index, seq).ok();
    }

    fn has_key(&self, letter: char) -> bool {
        let Some(user) = &self.line.bound_user else { return false };
        let bit = letter.to_ascii_uppercase() as u32 - 'A' as u32;
        user.keys.bits() & (1 << bit) != 0
    }

    fn doing(&mut self, text: &str) {
        *self.doing = text.to_string();
        self.events.emit(CoreEvent::LineActivity {
            line: self.line_index,
            text: crate::events::truncate_activity(text),
        });
    }

    fn set_more_override(&mut self, on: Option<bool>) {
        *self.more_override = on;
    }

    fn macro_value(&self, name: &str) -> Option<String> {
        let user = self.line.bound_user.as_ref();
        match name {
            "accesslevel" => user.map(|u| u.access_level.to_string()),
            "userid" => user.map(|u| u.user_id.to_string()),
            "sysop" => user.map(|u| if u.access_level >= 250 { "1" } else { "0" }.to_string()),
            "keys" => user.map(|u| u.keys.bits().to_string()),
            "line" => Some(self.line_index.to_string()),
            "ansi" => Some(if self.line.ansi_detected { "1" } else { "0" }.to_string()),
            _ => None,
        }
    }

    fn load_script(&self, path: &str) -> Option<String> {
        self.scripts.load(path)
    }

    fn random(&mut self, lo: i64, hi: i64) -> i64 {
        if lo >= hi {
            return lo;
        }
        use rand::Rng;
        rand::thread_rng().gen_range(lo..=hi)
    }

    fn sendmail(&mut self, user: &str, subject: &str, body: &str) {
        self.pending_mail.push(PendingMail::Local {
            to_user: user.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
    }

    fn sendnetmail(&mut self, addr: &str, name: &str, subject: &str, body: &str) {
        self.pending_mail.push(PendingMail::Netmail {
            address: addr.to_string(),
            to_name: name.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
    }
}
