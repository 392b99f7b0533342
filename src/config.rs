//! Connection settings for a [`crate::Session`].

use crate::error::{Error, Result};
use std::env;
use std::time::Duration;

/// Environment variable holding the serial port path or name.
pub const PORT_ENV: &str = "VALVE_PORT";
/// Optional environment variable overriding the baud rate.
pub const BAUD_ENV: &str = "VALVE_BAUD";

pub const DEFAULT_BAUD_RATE: u32 = 38400;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Serial port path or name (e.g. "/dev/ttyUSB0", "COM3").
    pub port: String,
    pub baud_rate: u32,
    /// Timeout of a single transport read.
    pub read_timeout: Duration,
    /// Consecutive empty reads tolerated while waiting for a line. `None` waits forever.
    pub idle_read_limit: Option<u32>,
    /// Lines skipped while waiting for the terminal banner. `None` waits forever.
    pub banner_line_limit: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            idle_read_limit: None,
            banner_line_limit: None,
        }
    }
}

impl SessionConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    /// Reads `VALVE_PORT` and, if set, `VALVE_BAUD`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port = lookup(PORT_ENV)
            .filter(|p| !p.trim().is_empty())
            .ok_or(Error::MissingPort)?;
        let mut config = Self::new(port.trim());

        if let Some(baud) = lookup(BAUD_ENV) {
            config.baud_rate = baud.trim().parse().map_err(|_| Error::InvalidSetting {
                name: BAUD_ENV,
                value: baud.clone(),
            })?;
        }
        Ok(config)
    }

    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn idle_read_limit(mut self, reads: u32) -> Self {
        self.idle_read_limit = Some(reads);
        self
    }

    pub fn banner_line_limit(mut self, lines: u32) -> Self {
        self.banner_line_limit = Some(lines);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = SessionConfig::new("/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 38400);
        assert_eq!(config.read_timeout, Duration::from_secs(1));
        assert_eq!(config.idle_read_limit, None);
        assert_eq!(config.banner_line_limit, None);
    }

    #[test]
    fn port_from_environment() {
        let config = SessionConfig::from_lookup(lookup(&[("VALVE_PORT", "COM3")])).unwrap();
        assert_eq!(config.port, "COM3");
        assert_eq!(config.baud_rate, DEFAULT_BAUD_RATE);
    }

    #[test]
    fn baud_override_from_environment() {
        let config = SessionConfig::from_lookup(lookup(&[
            ("VALVE_PORT", "/dev/ttyACM0"),
            ("VALVE_BAUD", "115200"),
        ]))
        .unwrap();
        assert_eq!(config.baud_rate, 115200);
    }

    #[test]
    fn unparseable_baud_is_rejected() {
        let err = SessionConfig::from_lookup(lookup(&[("VALVE_PORT", "COM3"), ("VALVE_BAUD", "fast")]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSetting { name: "VALVE_BAUD", .. }));
    }

    #[test]
    fn missing_port_is_an_error() {
        let err = SessionConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, Error::MissingPort));
        let err = SessionConfig::from_lookup(lookup(&[("VALVE_PORT", "  ")])).unwrap_err();
        assert!(matches!(err, Error::MissingPort));
    }

    #[test]
    fn builder_sets_limits() {
        let config = SessionConfig::new("x").idle_read_limit(5).banner_line_limit(20);
        assert_eq!(config.idle_read_limit, Some(5));
        assert_eq!(config.banner_line_limit, Some(20));
    }
}
