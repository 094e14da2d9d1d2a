//! Serial line transport for C2 (spec §4.2): a "BlockDriver" abstraction
//! over a UART, initialised from `SerialConfig`, polled for DCD (carrier
//! detect) transitions that drive connect/disconnect.

use std::os::unix::io::RawFd;

use nix::sys::termios::{self, BaudRate, SetArg, Termios};

use crate::config::{FlowControl, Parity, SerialConfig};

#[derive(Debug)]
pub enum SerialError {
    UnsupportedBaud(u32),
    Termios(nix::Error),
}

impl std::fmt::Display for SerialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SerialError::UnsupportedBaud(b) => write!(f, "unsupported baud rate {b}"),
            SerialError::Termios(e) => write!(f, "termios error: {e}"),
        }
    }
}

impl std::error::Error for SerialError {}

impl From<nix::Error> for SerialError {
    fn from(e: nix::Error) -> Self {
        SerialError::Termios(e)
    }
}

/// Whatever the port driver needs to provide: configure the line,
/// report carrier detect, and move bytes.
pub trait BlockDriver {
    fn configure(&mut self, config: &SerialConfig) -> Result<(), SerialError>;
    fn dcd(&self) -> bool;
    fn read_bytes(&mut self, buf: &mut [u8]) -> usize;
    fn write_bytes(&mut self, buf: &[u8]) -> usize;
}

fn baud_rate(baud: u32) -> Result<BaudRate, SerialError> {
    match baud {
        300 => Ok(BaudRate::B300),
        1200 => Ok(BaudRate::B1200),
        2400 => Ok(BaudRate::B2400),
        4800 => Ok(BaudRate::B4800),
        9600 => Ok(BaudRate::B9600),
        19200 => Ok(BaudRate::B19200),
        38400 => Ok(BaudRate::B38400),
        57600 => Ok(BaudRate::B57600),
        115200 => Ok(BaudRate::B115200),
        other => Err(SerialError::UnsupportedBaud(other)),
    }
}

/// Applies word format, baud, and flow control to a termios structure the
/// way the real UART driver would (spec §4.2, §6).
pub fn apply_config(termios: &mut Termios, config: &SerialConfig) -> Result<(), SerialError> {
    use termios::{ControlFlags, InputFlags, OutputFlags, LocalFlags};

    termios::cfmakeraw(termios);
    let rate = baud_rate(config.baud)?;
    termios::cfsetspeed(termios, rate)?;

    termios.control_flags.remove(ControlFlags::CSIZE);
    termios.control_flags.insert(match config.bits {
        5 => ControlFlags::CS5,
        6 => ControlFlags::CS6,
        7 => ControlFlags::CS7,
        _ => ControlFlags::CS8,
    });

    termios.control_flags.remove(ControlFlags::PARENB | ControlFlags::PARODD);
    match config.parity {
        Parity::N => {}
        Parity::E => termios.control_flags.insert(ControlFlags::PARENB),
        Parity::O => termios.control_flags.insert(ControlFlags::PARENB | ControlFlags::PARODD),
    }

    if config.stop_bits == 2 {
        termios.control_flags.insert(ControlFlags::CSTOPB);
    } else {
        termios.control_flags.remove(ControlFlags::CSTOPB);
    }

    termios.control_flags.remove(ControlFlags::CRTSCTS);
    termios.input_flags.remove(InputFlags::IXON | InputFlags::IXOFF);
    match config.flow_control {
        FlowControl::None | FlowControl::Dtr => {}
        FlowControl::Rts => termios.control_flags.insert(ControlFlags::CRTSCTS),
        FlowControl::Xon => termios.input_flags.insert(InputFlags::IXON | InputFlags::IXOFF),
    }

    termios.control_flags.insert(ControlFlags::CLOCAL | ControlFlags::CREAD);
    termios.local_flags.remove(LocalFlags::ECHO | LocalFlags::ICANON | LocalFlags::ISIG);
    termios.output_flags.remove(OutputFlags::OPOST);

    Ok(())
}

/// A real UART reached through a raw file descriptor, configured via
/// termios and polled for carrier detect through `TIOCM_CD`.
pub struct UartDriver {
    fd: RawFd,
}

impl UartDriver {
    pub fn new(fd: RawFd) -> Self {
        UartDriver { fd }
    }
}

impl BlockDriver for UartDriver {
    fn configure(&mut self, config: &SerialConfig) -> Result<(), SerialError> {
        let mut termios = termios::tcgetattr(unsafe { std::os::fd::BorrowedFd::borrow_raw(self.fd) })?;
        apply_config(&mut termios, config)?;
        termios::tcsetattr(unsafe { std::os::fd::BorrowedFd::borrow_raw(self.fd) }, SetArg::TCSANOW, &termios)?;
        Ok(())
    }

    fn dcd(&self) -> bool {
        let mut status: libc::c_int = 0;
        let rc = unsafe { libc::ioctl(self.fd, libc::TIOCMGET, &mut status) };
        rc == 0 && (status & libc::TIOCM_CD) != 0
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> usize {
        let n = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n < 0 {
            0
        } else {
            n as usize
        }
    }

    fn write_bytes(&mut self, buf: &[u8]) -> usize {
        let n = unsafe { libc::write(self.fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
        if n < 0 {
            0
        } else {
            n as usize
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialEvent {
    Connected,
    Disconnected,
}

/// Tracks DCD transitions across poll calls, driving connect/disconnect
/// events the way the line session (C3) expects (spec §4.2).
pub struct SerialLine<D> {
    driver: D,
    dcd_high: bool,
    config: SerialConfig,
}

impl<D: BlockDriver> SerialLine<D> {
    pub fn new(mut driver: D, config: SerialConfig) -> Result<Self, SerialError> {
        config.validate().map_err(|_| SerialError::UnsupportedBaud(config.baud))?;
        driver.configure(&config)?;
        Ok(SerialLine { driver, dcd_high: false, config })
    }

    /// Polls the carrier state; returns an event only on a transition.
    pub fn poll(&mut self) -> Result<Option<SerialEvent>, SerialError> {
        let now_high = self.driver.dcd();
        let event = match (self.dcd_high, now_high) {
            (false, true) => Some(SerialEvent::Connected),
            (true, false) => {
                self.driver.configure(&self.config)?;
                Some(SerialEvent::Disconnected)
            }
            _ => None,
        };
        self.dcd_high = now_high;
        Ok(event)
    }

    pub fn read_bytes(&mut self, buf: &mut [u8]) -> usize {
        self.driver.read_bytes(buf)
    }

    pub fn write_bytes(&mut self, buf: &[u8]) -> usize {
        self.driver.write_bytes(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct FakeDriver {
        dcd: bool,
        configured: u32,
        inbound: VecDeque<u8>,
        outbound: Vec<u8>,
    }

    impl BlockDriver for FakeDriver {
        fn configure(&mut self, _config: &SerialConfig) -> Result<(), SerialError> {
            self.configured += 1;
            Ok(())
        }

        fn dcd(&self) -> bool {
            self.dcd
        }

        fn read_bytes(&mut self, buf: &mut [u8]) -> usize {
            let mut n = 0;
            while n < buf.len() {
                if let Some(b) = self.inbound.pop_front() {
                    buf[n] = b;
                    n += 1;
                } else {
                    break;
                }
            }
            n
        }

        fn write_bytes(&mut self, buf: &[u8]) -> usize {
            self.outbound.extend_from_slice(buf);
            buf.len()
        }
    }

    fn config() -> SerialConfig {
        SerialConfig {
            driver: "fake".into(),
            port: 0,
            baud: 9600,
            bits: 8,
            parity: Parity::N,
            stop_bits: 1,
            flow_control: FlowControl::None,
        }
    }

    #[test]
    fn dcd_low_to_high_emits_connected() {
        let mut line = SerialLine::new(FakeDriver::default(), config()).unwrap();
        assert_eq!(line.poll().unwrap(), None);
        line.driver.dcd = true;
        assert_eq!(line.poll().unwrap(), Some(SerialEvent::Connected));
    }

    #[test]
    fn dcd_high_to_low_emits_disconnected_and_reinitialises() {
        let mut line = SerialLine::new(FakeDriver::default(), config()).unwrap();
        line.driver.dcd = true;
        line.poll().unwrap();
        let configured_before = line.driver.configured;
        line.driver.dcd = false;
        assert_eq!(line.poll().unwrap(), Some(SerialEvent::Disconnected));
        assert!(line.driver.configured > configured_before);
    }

    #[test]
    fn invalid_baud_is_rejected_at_construction() {
        let mut bad = config();
        bad.baud = 42;
        assert!(SerialLine::new(FakeDriver::default(), bad).is_err());
    }

    #[test]
    fn bytes_flow_through_the_driver() {
        let mut line = SerialLine::new(FakeDriver::default(), config()).unwrap();
        line.driver.inbound.push_back(b'x');
        let mut buf = [0u8; 4];
        assert_eq!(line.read_bytes(&mut buf), 1);
        assert_eq!(buf[0], b'x');
        line.write_bytes(b"hi");
        assert_eq!(line.driver.outbound, b"hi");
    }
}
