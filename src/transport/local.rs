//! The `local` line type (spec §4.2): never accepts an external
//! connection. Connect/disconnect is driven entirely by a sysop UI
//! command at the console.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalEvent {
    Connected,
    Disconnected,
}

/// A console line with no transport underneath it; `connect`/`disconnect`
/// are called directly by the UI rather than discovered by polling.
#[derive(Default)]
pub struct LocalLine {
    connected: bool,
}

impl LocalLine {
    pub fn new() -> Self {
        LocalLine::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn connect(&mut self) -> Option<LocalEvent> {
        if self.connected {
            None
        } else {
            self.connected = true;
            Some(LocalEvent::Connected)
        }
    }

    pub fn disconnect(&mut self) -> Option<LocalEvent> {
        if self.connected {
            self.connected = false;
            Some(LocalEvent::Disconnected)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_is_idempotent() {
        let mut line = LocalLine::new();
        assert_eq!(line.connect(), Some(LocalEvent::Connected));
        assert_eq!(line.connect(), None);
    }

    #[test]
    fn disconnect_only_fires_while_connected() {
        let mut line = LocalLine::new();
        assert_eq!(line.disconnect(), None);
        line.connect();
        assert_eq!(line.disconnect(), Some(LocalEvent::Disconnected));
    }
}
