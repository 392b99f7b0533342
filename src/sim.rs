//! # VC Mini Simulator
//!
//! A software stand-in for the valve controller. It implements `Read` and
//! `Write` like a serial port, so a [`crate::Session`] can drive it without
//! hardware. It keeps just enough internal state to answer the way the real
//! controller does: the selected bus address, the active shot parameters and
//! the eight parameter banks.

use crate::command::{Unit, RESET_SEQUENCE, TERMINAL_BANNER};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

/// First line printed after a reset, before the terminal banner.
pub const POWER_ON_LINE: &str = "VC Mini Valve Controller";

const ACK: &str = ">";
const NAK: &str = "?";

/// How long a read waits before reporting a timeout when nothing is pending.
pub const IDLE_READ_DELAY: Duration = Duration::from_millis(10);

/// Shot parameters of one valve, as held by the controller.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ShotParameters {
    pub peak_time: u32,
    pub open_time: u32,
    pub cycle_time: u32,
    pub peak_current: u32,
    pub shot_count: u32,
}

#[derive(Debug, Clone)]
pub struct Simulator {
    /// Currently selected bus address.
    pub address: u8,
    /// Whether the reset/escape sequence has been seen.
    pub terminal_mode: bool,
    pub parameters: ShotParameters,
    pub banks: [ShotParameters; 8],
    /// Last trigger mode letter received (X, T, P or L).
    pub trigger_mode: Option<char>,
    /// Last PLC mode argument received by the master.
    pub plc_mode: Option<u32>,
    /// Last baud rate code received by the master.
    pub baud_code: Option<u32>,
    pub single_shots: u32,
    pub series_started: u32,
    // Every byte written by the host.
    received: Vec<u8>,
    // Complete commands, in arrival order.
    history: Vec<String>,
    // Digits seen since the last command character.
    argument: String,
    outbox: VecDeque<u8>,
    chunk_size: Option<usize>,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulator {
    /// A controller that has just been powered up and ignores commands until reset.
    pub fn new() -> Self {
        Self {
            address: Unit::Valve.address(),
            terminal_mode: false,
            parameters: ShotParameters::default(),
            banks: Default::default(),
            trigger_mode: None,
            plc_mode: None,
            baud_code: None,
            single_shots: 0,
            series_started: 0,
            received: Vec::new(),
            history: Vec::new(),
            argument: String::new(),
            outbox: VecDeque::new(),
            chunk_size: None,
        }
    }

    /// A controller already in terminal mode.
    pub fn ready() -> Self {
        Self {
            terminal_mode: true,
            ..Self::new()
        }
    }

    /// Limits how many bytes a single read hands out.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = Some(size.max(1));
        self
    }

    /// Queues raw output, as if the controller had printed it.
    pub fn queue_output(&mut self, text: &str) {
        self.outbox.extend(text.bytes());
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn received(&self) -> &[u8] {
        &self.received
    }

    fn reply(&mut self, text: &str) {
        self.queue_output(text);
        self.queue_output("\r\n");
    }

    fn process_byte(&mut self, byte: u8) {
        if byte == RESET_SEQUENCE[0] {
            self.terminal_mode = false;
            self.argument.clear();
            self.queue_output("\r\n");
            self.reply(POWER_ON_LINE);
            return;
        }
        if byte == RESET_SEQUENCE[1] {
            self.terminal_mode = true;
            self.reply(TERMINAL_BANNER);
            return;
        }
        if !self.terminal_mode {
            return;
        }
        if byte.is_ascii_digit() {
            self.argument.push(byte as char);
            return;
        }

        let argument = std::mem::take(&mut self.argument);
        self.history.push(format!("{}{}", argument, byte as char));
        let value = if argument.is_empty() {
            None
        } else {
            argument.parse::<u32>().ok()
        };

        match self.execute(byte as char, value) {
            Some(reply) => self.reply(&reply),
            None => self.reply(NAK),
        }
    }

    /// Applies one command and returns the reply line, or `None` to reject it.
    fn execute(&mut self, letter: char, value: Option<u32>) -> Option<String> {
        match letter {
            '*' => {
                let address = u8::try_from(value?).ok().filter(|a| *a <= Unit::Master.address())?;
                self.address = address;
                Some(ACK.to_string())
            }
            '=' if value.is_none() => Some(self.address.to_string()),
            'F' | '%' => {
                if self.address != Unit::Master.address() {
                    return None;
                }
                if letter == 'F' {
                    self.plc_mode = Some(value?);
                } else {
                    self.baud_code = Some(value.filter(|c| *c <= 5)?);
                }
                Some(ACK.to_string())
            }
            _ if self.address == Unit::Master.address() => None,
            'X' | 'T' | 'P' | 'L' => {
                self.trigger_mode = Some(letter);
                Some(ACK.to_string())
            }
            'S' => Some(ACK.to_string()),
            'V' | 'Y' | 'Z' => {
                self.single_shots += 1;
                Some(ACK.to_string())
            }
            'U' | 'Q' | 'R' => {
                self.series_started += 1;
                Some(ACK.to_string())
            }
            'n' | 'N' => {
                let slot = usize::try_from(value?).ok().filter(|s| *s < self.banks.len())?;
                if letter == 'n' {
                    self.parameters = self.banks[slot];
                } else {
                    self.banks[slot] = self.parameters;
                }
                Some(ACK.to_string())
            }
            'A' => {
                self.parameters.peak_time = value?;
                Some(ACK.to_string())
            }
            'B' => {
                self.parameters.open_time = value?;
                Some(ACK.to_string())
            }
            'C' => {
                self.parameters.cycle_time = value?;
                Some(ACK.to_string())
            }
            'D' => {
                self.parameters.peak_current = value?;
                Some(ACK.to_string())
            }
            'G' => {
                self.parameters.shot_count = value?;
                Some(ACK.to_string())
            }
            _ => None,
        }
    }
}

impl Write for Simulator {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &byte in buf {
            self.received.push(byte);
            self.process_byte(byte);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for Simulator {
    /// Hands out pending output; times out when there is none, like a serial port.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.outbox.is_empty() {
            thread::sleep(IDLE_READ_DELAY);
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data pending"));
        }
        let limit = self.chunk_size.unwrap_or(usize::MAX);
        let count = buf.len().min(limit).min(self.outbox.len());
        for (slot, byte) in buf.iter_mut().zip(self.outbox.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn drain(sim: &mut Simulator) -> String {
        let mut out = Vec::new();
        let mut buf = [0u8; 32];
        while let Ok(n) = sim.read(&mut buf) {
            out.extend_from_slice(&buf[..n]);
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn ignores_commands_before_reset() {
        let mut sim = Simulator::new();
        sim.write_all(b"400A").unwrap();
        assert!(sim.history().is_empty());
        assert_eq!(drain(&mut sim), "");
    }

    #[test]
    fn reset_prints_power_on_line_then_banner() {
        let mut sim = Simulator::new();
        sim.write_all(&RESET_SEQUENCE).unwrap();
        assert!(sim.terminal_mode);
        assert_eq!(drain(&mut sim), "\r\nVC Mini Valve Controller\r\nTERMINAL-Mode\r\n");
    }

    #[test]
    fn commands_are_split_on_command_letter() {
        let mut sim = Simulator::ready();
        sim.write_all(b"400A1000B13D").unwrap();
        assert_eq!(sim.history(), ["400A", "1000B", "13D"]);
        assert_eq!(sim.parameters.peak_time, 400);
        assert_eq!(sim.parameters.open_time, 1000);
        assert_eq!(sim.parameters.peak_current, 13);
        assert_eq!(drain(&mut sim), ">\r\n>\r\n>\r\n");
    }

    #[test]
    fn address_query_reports_selected_unit() {
        let mut sim = Simulator::ready();
        sim.write_all(b"8*=").unwrap();
        assert_eq!(drain(&mut sim), ">\r\n8\r\n");
    }

    #[test]
    fn master_commands_need_master_address() {
        let mut sim = Simulator::ready();
        sim.write_all(b"00F").unwrap();
        assert_eq!(drain(&mut sim), "?\r\n");
        sim.write_all(b"8*4%").unwrap();
        assert_eq!(drain(&mut sim), ">\r\n>\r\n");
        assert_eq!(sim.baud_code, Some(4));
    }

    #[test]
    fn banks_store_and_load() {
        let mut sim = Simulator::ready();
        sim.write_all(b"500A6N").unwrap();
        sim.write_all(b"10A").unwrap();
        sim.write_all(b"6n").unwrap();
        assert_eq!(sim.parameters.peak_time, 500);
        assert_eq!(sim.banks[6].peak_time, 500);
    }

    #[test]
    fn chunked_reads() {
        let mut sim = Simulator::ready().with_chunk_size(2);
        sim.write_all(b"X").unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(sim.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b">\r");
        assert_eq!(sim.read(&mut buf).unwrap(), 1);
        assert_eq!(sim.read(&mut buf).unwrap_err().kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn empty_read_waits_before_timing_out() {
        let mut sim = Simulator::ready();
        let mut buf = [0u8; 4];
        let start = Instant::now();
        let err = sim.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(start.elapsed() >= IDLE_READ_DELAY);
    }
}
