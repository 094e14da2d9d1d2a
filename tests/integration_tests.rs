use std::sync::Arc;
use std::time::{Duration, Instant};

use bbsd::scheduler::{PendingMail, Scheduler, ScriptSource};
use bbsd::session::{LineState, WaitState};
use bbsd::store::fileobj::FileBaseStore;
use bbsd::store::user::User;
use bbsd::store::UserStore;

struct OneScript(String, String);

impl ScriptSource for OneScript {
    fn load(&self, path: &str) -> Option<String> {
        if path == self.0 {
            Some(self.1.clone())
        } else {
            None
        }
    }
}

fn fresh_scheduler(entry: &str, source: &str) -> (Scheduler, Instant, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let users = Arc::new(UserStore::new(dir.path()));
    let files = Arc::new(FileBaseStore::new(dir.path()));
    let scheduler = Scheduler::new(
        2,
        Duration::from_secs(300),
        users,
        files,
        Arc::new(OneScript(entry.to_string(), source.to_string())),
        dir.path().join("Logs/Calls"),
        Instant::now(),
    );
    (scheduler, Instant::now(), dir)
}

/// End-to-end walk of a logon-style script across the pipe plane: the
/// scheduler prints a banner, parks on `anykey`, and resumes once the
/// caller feeds a byte through the input pipe, exactly the path a real
/// telnet connection would take (spec §5).
#[test]
fn a_connected_line_runs_its_script_and_waits_for_keyboard_input() {
    let (mut sched, now, _dir) = fresh_scheduler(
        "logon.scr",
        "print Welcome\nanykey\n",
    );
    sched.connect(0, "127.0.0.1:1234", now, "logon.scr");
    assert_eq!(sched.line(0).state, LineState::Prelogon);

    while sched.visit(0, now) {}
    assert_eq!(sched.line(0).wait, WaitState::AnyKey);

    let mut out = [0u8; 64];
    let n = sched.plane.dequeue_output_block(0, &mut out).unwrap();
    assert!(out[..n].starts_with(b"Welcome"));

    sched.plane.enqueue_input(0, b"y").unwrap();
    while sched.visit(0, now) {}
    assert_eq!(sched.line(0).wait, WaitState::None);
}

/// Idle timeout tears a line down without it ever sending a byte,
/// mirroring a dropped carrier (spec §4.3).
#[test]
fn idle_timeout_disconnects_a_silent_line() {
    let dir = tempfile::tempdir().unwrap();
    let users = Arc::new(UserStore::new(dir.path()));
    let files = Arc::new(FileBaseStore::new(dir.path()));
    let start = Instant::now();
    let mut sched = Scheduler::new(
        1,
        Duration::from_millis(1),
        users,
        files,
        Arc::new(OneScript("x.scr".to_string(), "prompt v line\n".to_string())),
        dir.path().join("Logs/Calls"),
        start,
    );
    sched.connect(0, "peer", start, "x.scr");
    let later = start + Duration::from_secs(1);
    while sched.visit(0, later) {}
    assert_eq!(sched.line(0).state, LineState::Disconnected);
}

/// `sendmail` from script reaches the scheduler's outbound queue intact,
/// ready for handoff to the mail subsystem (spec §4.6/§4.9).
#[test]
fn mail_sent_from_a_script_is_queued_and_drained_once() {
    let (mut sched, now, _dir) = fresh_scheduler("mail.scr", "sendmail sysop hello world body\n");
    sched.connect(0, "peer", now, "mail.scr");
    while sched.visit(0, now) {}

    let mail = sched.drain_pending_mail(0);
    assert_eq!(mail.len(), 1);
    assert!(matches!(&mail[0], PendingMail::Local { to_user, .. } if to_user == "sysop"));
    assert!(sched.drain_pending_mail(0).is_empty());
}

/// A user added to the store can later be bound to a connected line,
/// exercising C6 and C3 together the way a real logon completes.
#[test]
fn a_stored_user_can_be_bound_to_a_connected_line() {
    let (mut sched, now, dir) = fresh_scheduler("x.scr", "prompt v line\n");
    let users = UserStore::new(dir.path());
    let added = users.add(User::new(0, "carol", "hunter2")).unwrap();

    sched.connect(0, "peer", now, "x.scr");
    sched.bind_user(0, &added);
    assert_eq!(sched.line(0).state, LineState::Authenticated);
    assert_eq!(sched.line(0).bound_user.as_ref().unwrap().username, "carol");
}
