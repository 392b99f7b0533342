//! Error types for the valve controller driver.
//!
//! Every fallible operation returns [`Result`]. Variants are grouped by
//! [`ErrorKind`] so callers can react to a class of failure (bad argument,
//! broken link, garbled reply) without matching each variant.

use std::io;
use thiserror::Error;

/// Convenience alias for results using the driver error type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A numeric argument is outside the range the controller accepts.
    #[error("{name} {value} is out of range ({min}..={max})")]
    OutOfRange {
        name: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    /// The controller only knows a fixed set of baud rates.
    #[error("cannot set baud rate {0}: supported rates are 9600, 19200, 38400, 57600, 115200, 230400")]
    UnsupportedBaudRate(u32),

    /// Valve index other than 0 or 1.
    #[error("invalid valve {0}: must be 0 or 1")]
    InvalidValve(u8),

    /// No port name was configured.
    #[error("no serial port configured (set VALVE_PORT)")]
    MissingPort,

    #[error("invalid value {value:?} for {name}")]
    InvalidSetting { name: &'static str, value: String },

    #[error("failed to open serial port '{port}'")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("serial I/O error")]
    Io(#[from] io::Error),

    /// The transport reported end of stream.
    #[error("serial transport closed unexpectedly")]
    Disconnected,

    /// The session was closed with [`crate::Session::close`].
    #[error("session is not connected")]
    NotConnected,

    /// A reply could not be interpreted.
    #[error("unexpected reply {reply:?} to command {command:?}")]
    Protocol { command: String, reply: String },

    /// The operation exists on the controller but the driver does not implement it.
    #[error("{0} is not supported by this driver")]
    Unsupported(&'static str),

    /// Reset gave up waiting for the terminal mode banner.
    #[error("no TERMINAL-Mode banner after {lines} lines")]
    NoBanner { lines: u32 },

    /// A line read gave up after consecutive empty reads.
    #[error("no complete line after {reads} empty reads")]
    ReadTimeout { reads: u32 },
}

/// Coarse classification of [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before anything was sent.
    Validation,
    /// The transport could not be opened, failed, or is closed.
    Connection,
    /// The device answered with something unparseable.
    Protocol,
    /// Explicitly unimplemented operation.
    Unsupported,
    /// A configured wait limit was exhausted.
    Timeout,
}

impl Error {
    pub(crate) fn out_of_range(name: &'static str, value: u64, min: u64, max: u64) -> Self {
        Error::OutOfRange {
            name,
            value,
            min,
            max,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::OutOfRange { .. }
            | Error::UnsupportedBaudRate(_)
            | Error::InvalidValve(_)
            | Error::MissingPort
            | Error::InvalidSetting { .. } => ErrorKind::Validation,
            Error::Open { .. } | Error::Io(_) | Error::Disconnected | Error::NotConnected => {
                ErrorKind::Connection
            }
            Error::Protocol { .. } => ErrorKind::Protocol,
            Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::NoBanner { .. } | Error::ReadTimeout { .. } => ErrorKind::Timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(Error::out_of_range("address", 9, 0, 8).kind(), ErrorKind::Validation);
        assert_eq!(Error::UnsupportedBaudRate(1200).kind(), ErrorKind::Validation);
        assert_eq!(Error::Disconnected.kind(), ErrorKind::Connection);
        assert_eq!(
            Error::Io(io::Error::new(io::ErrorKind::BrokenPipe, "gone")).kind(),
            ErrorKind::Connection
        );
        assert_eq!(
            Error::Protocol {
                command: "=".into(),
                reply: "?".into()
            }
            .kind(),
            ErrorKind::Protocol
        );
        assert_eq!(Error::Unsupported("zero shot counter").kind(), ErrorKind::Unsupported);
        assert_eq!(Error::ReadTimeout { reads: 3 }.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn out_of_range_message_names_the_parameter() {
        let msg = Error::out_of_range("peak time", 9, 10, 65535).to_string();
        assert_eq!(msg, "peak time 9 is out of range (10..=65535)");
    }
}
