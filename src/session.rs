//! The device session: one serial link to one controller.
//!
//! All traffic goes through [`Session::command`], which writes a command and
//! reads back exactly one reply line. Replies are returned as received; the
//! driver does not check the controller's acknowledgment character.

use crate::command::{
    BaudRate, Command, PlcMode, TriggerMode, Unit, RESET_SEQUENCE, TERMINAL_BANNER,
};
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use log::{debug, info, trace};
use serialport::SerialPort;
use std::io::{self, Read, Write};

const READ_CHUNK: usize = 64;

/// A connection to a VC Mini controller.
///
/// The session remembers which bus address it last selected and only sends an
/// addressing command when an operation targets a different unit. It is not
/// meant to be shared between threads without external locking.
#[derive(Debug)]
pub struct Session<T = Box<dyn SerialPort>> {
    port: Option<T>,
    // Bytes received after the last complete line.
    buffer: Vec<u8>,
    current_address: u8,
    idle_read_limit: Option<u32>,
    banner_line_limit: Option<u32>,
}

impl Session<Box<dyn SerialPort>> {
    /// Opens the serial port described by `config`.
    ///
    /// A port that exists but cannot be opened fails with [`Error::Open`]
    /// (a connection error). An empty port name is rejected up front with
    /// [`Error::MissingPort`], which is a validation error: no open was attempted.
    pub fn open(config: &SessionConfig) -> Result<Self> {
        if config.port.is_empty() {
            return Err(Error::MissingPort);
        }
        let port = serialport::new(&config.port, config.baud_rate)
            .timeout(config.read_timeout)
            .open()
            .map_err(|source| Error::Open {
                port: config.port.clone(),
                source,
            })?;

        info!(
            "Serial port '{}' opened at {} baud",
            config.port, config.baud_rate
        );
        Ok(Self::with_config(port, config))
    }
}

impl<T: Read + Write> Session<T> {
    /// Wraps an already open transport with unbounded waits.
    ///
    /// The transport must report a read timeout as an `Err` of kind
    /// `TimedOut` or `WouldBlock`, as `serialport` does. A read returning
    /// `Ok(0)` is taken as end of stream and fails with [`Error::Disconnected`].
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, &SessionConfig::default())
    }

    /// Wraps an already open transport, taking the wait limits from `config`.
    /// The transport requirements of [`Session::new`] apply.
    pub fn with_config(transport: T, config: &SessionConfig) -> Self {
        Self {
            port: Some(transport),
            buffer: Vec::new(),
            current_address: Unit::Valve.address(),
            idle_read_limit: config.idle_read_limit,
            banner_line_limit: config.banner_line_limit,
        }
    }

    pub fn current_address(&self) -> u8 {
        self.current_address
    }

    pub fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    /// Borrows the transport, if the session is still open.
    pub fn get_ref(&self) -> Option<&T> {
        self.port.as_ref()
    }

    /// Releases the transport. Closing an already closed session does nothing.
    pub fn close(&mut self) {
        if self.port.take().is_some() {
            self.buffer.clear();
            info!("Serial session closed");
        }
    }

    /// Same as [`Session::close`].
    pub fn disconnect(&mut self) {
        self.close();
    }

    fn transmit(&mut self, bytes: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    /// Blocks until a full line has arrived and returns it without the `\n`.
    ///
    /// Bytes after the terminator stay buffered for the next call. Transport
    /// read timeouts are retried; with an idle read limit configured the call
    /// gives up after that many consecutive empty reads.
    pub fn read_line(&mut self) -> Result<String> {
        let mut idle_reads = 0;
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                let rest = self.buffer.split_off(pos + 1);
                let mut line = std::mem::replace(&mut self.buffer, rest);
                line.pop();
                return Ok(String::from_utf8_lossy(&line).into_owned());
            }

            let port = self.port.as_mut().ok_or(Error::NotConnected)?;
            let mut chunk = [0u8; READ_CHUNK];
            match port.read(&mut chunk) {
                Ok(0) => return Err(Error::Disconnected),
                Ok(n) => {
                    idle_reads = 0;
                    self.buffer.extend_from_slice(&chunk[..n]);
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::Interrupted
                    ) =>
                {
                    idle_reads += 1;
                    trace!("No data from serial port ({} empty reads)", idle_reads);
                    if self.idle_read_limit.is_some_and(|limit| idle_reads >= limit) {
                        return Err(Error::ReadTimeout { reads: idle_reads });
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Resets the controller and waits for it to enter terminal mode.
    pub fn reset(&mut self) -> Result<()> {
        debug!("tx: <reset>");
        self.transmit(&RESET_SEQUENCE)?;

        let mut skipped = 0;
        loop {
            let line = self.read_line()?;
            if line.trim() == TERMINAL_BANNER {
                debug!("Controller entered terminal mode");
                return Ok(());
            }
            trace!("Skipping line while waiting for banner: {:?}", line);
            skipped += 1;
            if self.banner_line_limit.is_some_and(|limit| skipped >= limit) {
                return Err(Error::NoBanner { lines: skipped });
            }
        }
    }

    /// Resets the controller, selects the valve and loads parameter bank 0.
    pub fn init(&mut self) -> Result<()> {
        self.reset()?;
        self.set_address(Unit::Valve.address())?;
        self.command(&Command::LoadParameters { valve: 0, bank: 0 }.to_string())?;
        Ok(())
    }

    /// Sends `text` and returns the single reply line, unchecked.
    pub fn command(&mut self, text: &str) -> Result<String> {
        self.transmit(text.as_bytes())?;
        debug!("tx: {}", text);
        let reply = self.read_line()?;
        debug!("rx: {}", reply.trim_end());
        Ok(reply)
    }

    // Validates before anything goes out, then switches units if needed.
    fn execute(&mut self, command: Command) -> Result<String> {
        let wire = command.encode()?;
        if let Some(unit) = command.target() {
            self.ensure_addressed(unit)?;
        }
        self.command(&wire)
    }

    fn ensure_addressed(&mut self, unit: Unit) -> Result<()> {
        if self.current_address != unit.address() {
            debug!("Switching bus address {} -> {}", self.current_address, unit.address());
            self.set_address(unit.address())?;
        }
        Ok(())
    }

    /// Selects the bus address (0 = valve, 8 = master) for later commands.
    pub fn set_address(&mut self, address: u8) -> Result<String> {
        let wire = Command::SelectAddress(address).encode()?;
        let reply = self.command(&wire)?;
        self.current_address = address;
        Ok(reply)
    }

    /// Asks the controller which address is selected.
    pub fn get_address(&mut self) -> Result<u8> {
        let wire = Command::QueryAddress.to_string();
        let reply = self.command(&wire)?;
        reply.trim().parse().map_err(|_| Error::Protocol {
            command: wire,
            reply,
        })
    }

    pub fn set_plc_standard_mode(&mut self) -> Result<String> {
        self.execute(Command::PlcMode(PlcMode::Standard))
    }

    pub fn set_plc_last_state_restore_mode(&mut self) -> Result<String> {
        self.execute(Command::PlcMode(PlcMode::LastStateRestore))
    }

    /// Changes the controller's baud rate. The local port keeps its speed.
    pub fn set_baud_rate(&mut self, baud_rate: u32) -> Result<String> {
        let rate = BaudRate::try_from(baud_rate)?;
        self.execute(Command::BaudRate(rate))
    }

    /// One shot per positive edge on the hardware input.
    pub fn set_shot_trigger_mode(&mut self) -> Result<String> {
        self.execute(Command::TriggerMode(TriggerMode::SingleShot))
    }

    /// Valve open as long as the hardware input is high.
    pub fn set_continuous_trigger_mode(&mut self) -> Result<String> {
        self.execute(Command::TriggerMode(TriggerMode::Continuous))
    }

    /// A series of shot-count shots per positive edge on the hardware input.
    pub fn set_series_trigger_mode(&mut self) -> Result<String> {
        self.execute(Command::TriggerMode(TriggerMode::Series))
    }

    /// Shots repeat while the hardware input is high.
    pub fn set_endless_trigger_mode(&mut self) -> Result<String> {
        self.execute(Command::TriggerMode(TriggerMode::Endless))
    }

    pub fn stop_triggering(&mut self) -> Result<String> {
        self.execute(Command::Stop)
    }

    /// Fires one shot on valve 1, valve 2 or both.
    ///
    /// Only `v1` is honoured unless both are set: `(false, true)` sends the
    /// same command as `(false, false)`.
    pub fn single_shot(&mut self, v1: bool, v2: bool) -> Result<String> {
        self.execute(Command::SingleShot { v1, v2 })
    }

    /// Starts a shot series; same valve selection rules as [`Session::single_shot`].
    pub fn series_shot(&mut self, v1: bool, v2: bool) -> Result<String> {
        self.execute(Command::SeriesShot { v1, v2 })
    }

    pub fn series_shot_stop(&mut self) -> Result<String> {
        self.execute(Command::Stop)
    }

    /// Loads parameter bank `bank` (0..=3) of `valve` (0 or 1).
    pub fn load_parameters(&mut self, valve: u8, bank: u8) -> Result<String> {
        self.execute(Command::LoadParameters { valve, bank })
    }

    /// Stores the active parameters into bank `bank` (0..=3) of `valve` (0 or 1).
    pub fn store_parameters(&mut self, valve: u8, bank: u8) -> Result<String> {
        self.execute(Command::StoreParameters { valve, bank })
    }

    /// Peak time in µs, 10..=65535.
    pub fn set_peak_time(&mut self, micros: u32) -> Result<String> {
        self.execute(Command::PeakTime(micros))
    }

    /// Open time in µs, 10..=9999999.
    pub fn set_open_time(&mut self, micros: u32) -> Result<String> {
        self.execute(Command::OpenTime(micros))
    }

    /// Cycle time in µs, 10..=9999999.
    pub fn set_cycle_time(&mut self, micros: u32) -> Result<String> {
        self.execute(Command::CycleTime(micros))
    }

    /// Peak current index 0..=15; see [`crate::command::peak_current_milliamps`].
    pub fn set_peak_current(&mut self, index: u8) -> Result<String> {
        self.execute(Command::PeakCurrent(index))
    }

    pub fn set_shot_count(&mut self, count: u32) -> Result<String> {
        self.execute(Command::ShotCount(count))
    }

    pub fn set_param_selection_type(&mut self, _selection_type: u8) -> Result<String> {
        Err(Error::Unsupported("setting the parameter selection type"))
    }

    pub fn get_param_selection_type(&mut self) -> Result<u8> {
        Err(Error::Unsupported("reading the parameter selection type"))
    }

    pub fn zero_shot_counter(&mut self, _valve: u8) -> Result<String> {
        Err(Error::Unsupported("zeroing the shot counter"))
    }

    pub fn get_peak_time(&mut self) -> Result<u32> {
        Err(Error::Unsupported("reading the peak time"))
    }

    pub fn get_open_time(&mut self) -> Result<u32> {
        Err(Error::Unsupported("reading the open time"))
    }

    pub fn get_cycle_time(&mut self) -> Result<u32> {
        Err(Error::Unsupported("reading the cycle time"))
    }

    pub fn get_peak_current(&mut self) -> Result<u8> {
        Err(Error::Unsupported("reading the peak current"))
    }

    pub fn get_shot_count(&mut self) -> Result<u32> {
        Err(Error::Unsupported("reading the shot count"))
    }
}
