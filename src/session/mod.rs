//! C3: the per-line session state machine.
//!
//! A [`Line`] owns the ANSI terminal model, the bound user slot, idle
//! timeout bookkeeping, and the paging counter that C4 consults. It knows
//! nothing about bytes on the wire; the scheduler feeds it terminal output
//! through [`Line::apply_terminal_output`] and reads input through the
//! pipe plane directly.

pub mod terminal;

use std::time::{Duration, Instant};

use crate::store::user::{AccessKeys, User, UserFlags};
use terminal::Terminal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineState {
    Disconnected,
    Prelogon,
    Authenticated,
}

/// A session is never blocked on I/O; instead it parks in a named wait
/// state and the scheduler resumes it once the condition is satisfied
/// (spec §4.4 "Suspension model").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitState {
    None,
    Input { echo: bool },
    DetectAnsi { deadline_ms: u64 },
    AnyKey,
    MorePrompt,
    Transfer,
    Door,
}

#[derive(Debug, Clone)]
pub struct BoundUser {
    pub user_id: u32,
    pub username: String,
    pub access_level: u8,
    pub keys: AccessKeys,
    pub flags: UserFlags,
    pub screen_height: u16,
}

impl BoundUser {
    pub fn from_user(user: &User) -> Self {
        BoundUser {
            user_id: user.id,
            username: user.username.clone(),
            access_level: user.access_level,
            keys: user.keys,
            flags: user.flags,
            screen_height: user.screen_height,
        }
    }
}

pub struct Line {
    pub index: usize,
    pub state: LineState,
    pub terminal: Terminal,
    pub bound_user: Option<BoundUser>,
    pub ansi_detected: bool,
    pub transfer_active: bool,
    pub wait: WaitState,
    pub idle_timeout: Duration,
    last_activity: Instant,
    /// Newlines written since the last "More?" prompt or CLS.
    pub line_count: u32,
    pub paging_enabled: bool,
    pub paging_aborted: bool,
}

impl Line {
    pub fn new(index: usize, idle_timeout: Duration, now: Instant) -> Self {
        Line {
            index,
            state: LineState::Disconnected,
            terminal: Terminal::new(),
            bound_user: None,
            ansi_detected: false,
            transfer_active: false,
            wait: WaitState::None,
            idle_timeout,
            last_activity: now,
            line_count: 0,
            paging_enabled: true,
            paging_aborted: false,
        }
    }

    pub fn connect(&mut self, now: Instant) {
        self.state = LineState::Prelogon;
        self.last_activity = now;
    }

    pub fn bind_user(&mut self, user: &User) {
        self.paging_enabled = !user.flags.contains(UserFlags::NO_PAGING);
        self.bound_user = Some(BoundUser::from_user(user));
        self.state = LineState::Authenticated;
    }

    pub fn disconnect(&mut self) {
        self.state = LineState::Disconnected;
        self.bound_user = None;
        self.transfer_active = false;
        self.wait = WaitState::None;
        self.terminal = Terminal::new();
        self.line_count = 0;
        self.paging_aborted = false;
    }

    pub fn note_activity(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// Idle timeout is paused while a transfer is active (spec §4.3).
    pub fn is_idle_expired(&self, now: Instant) -> bool {
        !self.transfer_active && now.duration_since(self.last_activity) >= self.idle_timeout
    }

    pub fn screen_height(&self) -> u16 {
        self.bound_user.as_ref().map(|u| u.screen_height).unwrap_or(24)
    }

    /// Feeds freshly written output bytes through the terminal model and
    /// updates the paging line counter. Returns true if paging should
    /// suspend the session now.
    pub fn write_output(&mut self, bytes: &[u8], more_override: Option<bool>) -> bool {
        self.terminal.feed(bytes);
        let paging_on = more_override.unwrap_or(self.paging_enabled);
        if !paging_on || self.paging_aborted {
            return false;
        }
        self.line_count += bytes.iter().filter(|&&b| b == b'\n').count() as u32;
        let threshold = self.screen_height().saturating_sub(1) as u32;
        threshold > 0 && self.line_count >= threshold
    }

    pub fn reset_paging(&mut self) {
        self.line_count = 0;
    }

    pub fn abort_paging(&mut self) {
        self.paging_aborted = true;
        self.line_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::user::User;

    #[test]
    fn connect_moves_to_prelogon() {
        let mut line = Line::new(0, Duration::from_secs(300), Instant::now());
        line.connect(Instant::now());
        assert_eq!(line.state, LineState::Prelogon);
    }

    #[test]
    fn bind_user_moves_to_authenticated() {
        let mut line = Line::new(0, Duration::from_secs(300), Instant::now());
        line.connect(Instant::now());
        let user = User::new(1, "sysop".into(), "pw");
        line.bind_user(&user);
        assert_eq!(line.state, LineState::Authenticated);
        assert_eq!(line.bound_user.as_ref().unwrap().username, "sysop");
    }

    #[test]
    fn idle_timeout_is_suppressed_during_transfer() {
        let start = Instant::now();
        let mut line = Line::new(0, Duration::from_secs(1), start);
        line.transfer_active = true;
        let later = start + Duration::from_secs(5);
        assert!(!line.is_idle_expired(later));
        line.transfer_active = false;
        assert!(line.is_idle_expired(later));
    }

    #[test]
    fn paging_triggers_at_screen_height_minus_one() {
        let mut line = Line::new(0, Duration::from_secs(300), Instant::now());
        line.bind_user(&User::new(1, "x".into(), "pw"));
        line.bound_user.as_mut().unwrap().screen_height = 3;
        assert!(!line.write_output(b"a\n", None));
        assert!(line.write_output(b"b\n", None));
    }

    #[test]
    fn abort_paging_suppresses_future_prompts() {
        let mut line = Line::new(0, Duration::from_secs(300), Instant::now());
        line.abort_paging();
        assert!(!line.write_output(b"a\nb\nc\nd\n", None));
    }
}
