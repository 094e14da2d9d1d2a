//! §6 "UI contract (to the out-of-scope desktop shell)".
//!
//! The desktop status window, iconbar, and sysop snoop view are explicitly
//! out of scope (spec §1). What the core owns is the boundary: a typed
//! event stream out, and a typed command stream in. `tokio::sync::broadcast`
//! gives every interested shell a copy without the core needing to know how
//! many are listening, mirroring the out-of-process UI split described in
//! spec §9.

use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub enum CoreEvent {
    LineRegistered { line: usize },
    LineActivity { line: usize, text: String },
    LineUserBound { line: usize, real_name: String },
    LineUserUnbound { line: usize },
    LineConnected { line: usize, peer: String },
    LineDisconnected { line: usize },
    TransferActive { line: usize, active: bool },
}

#[derive(Debug, Clone)]
pub enum CoreCommand {
    DisconnectLine { line: usize },
    ViewLine { line: usize },
    LogonLine { line: usize },
    SetAcceptingNewConnections { accepting: bool },
    SetChatPager { enabled: bool },
}

/// Truncated to 96 bytes per spec §3 ("activity" label ≤ 96 bytes).
pub fn truncate_activity(text: &str) -> String {
    if text.len() <= 96 {
        text.to_string()
    } else {
        let mut end = 96;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text[..end].to_string()
    }
}

#[derive(Clone)]
pub struct EventBus {
    events: broadcast::Sender<CoreEvent>,
    commands: broadcast::Sender<CoreCommand>,
}

impl EventBus {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        let (commands, _) = broadcast::channel(32);
        EventBus { events, commands }
    }

    pub fn emit(&self, event: CoreEvent) {
        // No subscribers is not an error: the shell is optional by design.
        let _ = self.events.send(event);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<CoreEvent> {
        self.events.subscribe()
    }

    pub fn send_command(&self, command: CoreCommand) {
        let _ = self.commands.send(command);
    }

    pub fn subscribe_commands(&self) -> broadcast::Receiver<CoreCommand> {
        self.commands.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_label_is_truncated_to_96_bytes() {
        let long = "x".repeat(200);
        assert_eq!(truncate_activity(&long).len(), 96);
    }

    #[tokio::test]
    async fn events_fan_out_to_all_subscribers() {
        let bus = EventBus::new();
        let mut a = bus.subscribe_events();
        let mut b = bus.subscribe_events();
        bus.emit(CoreEvent::LineRegistered { line: 0 });
        assert!(matches!(
            a.recv().await.unwrap(),
            CoreEvent::LineRegistered { line: 0 }
        ));
        assert!(matches!(
            b.recv().await.unwrap(),
            CoreEvent::LineRegistered { line: 0 }
        ));
    }
}
