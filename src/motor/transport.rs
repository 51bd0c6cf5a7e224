// Line-oriented serial transport for G-code style firmware
//
// Each command is one ASCII line terminated by '\n'. The firmware answers
// with a line starting "ok" once it accepted the command (or, for M400,
// once motion finished). Anything else it prints is ignored.

use serialport::{self, ClearBuffer, SerialPort};
use std::io::{self, Read, Write};
use std::thread::sleep;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::ArmConfig;

/// Wait after opening before talking to the board (it resets on open)
pub const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Serial read timeout; bounds each blocking read while waiting for an ack
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Error types for the serial link
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Hardware control is disabled")]
    Disabled,

    #[error("Failed to open {address}: {source}")]
    OpenFailed {
        address: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Write failed: {0}")]
    WriteFailed(#[source] io::Error),

    #[error("Read failed: {0}")]
    ReadFailed(#[source] io::Error),

    #[error("No acknowledgement for `{command}` within {timeout:?}")]
    AckTimeout { command: String, timeout: Duration },

    #[error("Serial link is not connected")]
    NotConnected,
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// An open byte stream to the firmware
pub trait LinePort: Read + Write + Send {
    /// Discard anything already received but not yet read
    fn clear_input(&mut self) -> io::Result<()>;
}

impl LinePort for Box<dyn SerialPort> {
    fn clear_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

/// Opens the device behind an address
pub trait PortOpener: Send {
    fn open(&self, address: &str, baudrate: u32) -> Result<Box<dyn LinePort>>;
}

/// Opens real serial devices
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialOpener;

impl PortOpener for SerialOpener {
    fn open(&self, address: &str, baudrate: u32) -> Result<Box<dyn LinePort>> {
        let port = serialport::new(address, baudrate)
            .timeout(POLL_INTERVAL)
            .open()
            .map_err(|source| TransportError::OpenFailed {
                address: address.to_string(),
                source,
            })?;
        Ok(Box::new(port))
    }
}

/// The single serial session to the arm controller board
pub struct Transport {
    opener: Box<dyn PortOpener>,
    address: String,
    baudrate: u32,
    timeout: Duration,
    enabled: bool,
    settle_delay: Duration,
    port: Option<Box<dyn LinePort>>,
    // bytes received after the last complete line
    pending: Vec<u8>,
}

impl Transport {
    pub fn new(opener: Box<dyn PortOpener>, config: &ArmConfig) -> Self {
        Self {
            opener,
            address: config.port.clone(),
            baudrate: config.baudrate,
            timeout: config.response_timeout,
            enabled: config.hardware_enabled,
            settle_delay: SETTLE_DELAY,
            port: None,
            pending: Vec::new(),
        }
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Point the session at another device, closing the current one if it changed
    pub fn set_address(&mut self, address: &str) {
        if self.address != address {
            if self.is_connected() {
                info!("Serial port changed to {}, closing {}", address, self.address);
            }
            self.disconnect();
            self.address = address.to_string();
        }
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Enable or disable hardware control. Disabling closes the session.
    pub fn set_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.disconnect();
        }
        self.enabled = enabled;
    }

    /// Open the configured device, let it settle, then drop stray input
    pub fn try_connect(&mut self) -> Result<()> {
        if !self.enabled {
            return Err(TransportError::Disabled);
        }
        self.disconnect();

        info!("Opening serial link on {} @ {} baud", self.address, self.baudrate);
        let mut port = self.opener.open(&self.address, self.baudrate)?;

        if !self.settle_delay.is_zero() {
            sleep(self.settle_delay);
        }
        if let Err(e) = port.clear_input() {
            warn!("Failed to drain serial input on {}: {}", self.address, e);
        }

        self.port = Some(port);
        info!("Serial link on {} open", self.address);
        Ok(())
    }

    /// Like `try_connect`, but reports failure as `false`
    pub fn connect(&mut self) -> bool {
        match self.try_connect() {
            Ok(()) => true,
            Err(TransportError::Disabled) => {
                debug!("Not connecting: hardware control disabled");
                false
            }
            Err(e) => {
                warn!("Serial connect failed: {}", e);
                false
            }
        }
    }

    /// Close the session; safe to call when already closed
    pub fn disconnect(&mut self) {
        if self.port.take().is_some() {
            info!("Closed serial link on {}", self.address);
        }
        self.pending.clear();
    }

    /// Send one command line and wait for its acknowledgement
    pub fn send_command(&mut self, command: &str) -> Result<()> {
        let port = self.port.as_mut().ok_or(TransportError::NotConnected)?;

        // a late ack for an earlier, timed-out line must not answer this one
        self.pending.clear();
        if let Err(e) = port.clear_input() {
            warn!("Failed to drain serial input on {}: {}", self.address, e);
        }

        debug!(">> {}", command);
        let line = format!("{}\n", command);
        let written = port.write_all(line.as_bytes()).and_then(|_| port.flush());
        if let Err(e) = written {
            self.drop_after_error();
            return Err(TransportError::WriteFailed(e));
        }

        self.await_ack(command)
    }

    /// Like `send_command`, but reports failure as `false`
    pub fn send_line(&mut self, command: &str) -> bool {
        match self.send_command(command) {
            Ok(()) => true,
            Err(e) => {
                warn!("Command `{}` failed: {}", command, e);
                false
            }
        }
    }

    /// Read until an "ok" line arrives or the response timeout passes
    fn await_ack(&mut self, command: &str) -> Result<()> {
        let deadline = Instant::now() + self.timeout;
        let mut buf = [0u8; 256];

        loop {
            while let Some(line) = self.next_line() {
                if is_ack(&line) {
                    debug!("<< {} (ack)", line);
                    return Ok(());
                }
                debug!("<< {}", line);
            }

            if Instant::now() >= deadline {
                return Err(TransportError::AckTimeout {
                    command: command.to_string(),
                    timeout: self.timeout,
                });
            }

            let read = match self.port.as_mut() {
                Some(port) => port.read(&mut buf),
                None => return Err(TransportError::NotConnected),
            };
            match read {
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(e) if is_idle(&e) => {}
                Err(e) => {
                    self.drop_after_error();
                    return Err(TransportError::ReadFailed(e));
                }
            }
        }
    }

    /// Pop the next complete line from the receive buffer
    fn next_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let raw: Vec<u8> = self.pending.drain(..=end).collect();
        Some(String::from_utf8_lossy(&raw).trim().to_string())
    }

    fn drop_after_error(&mut self) {
        warn!("Serial link on {} lost, marking disconnected", self.address);
        self.port = None;
        self.pending.clear();
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Firmware acknowledgement: trimmed line starting with "ok", any case
pub fn is_ack(line: &str) -> bool {
    line.trim()
        .get(..2)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("ok"))
}

fn is_idle(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
