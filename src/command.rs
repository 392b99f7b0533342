//! The controller's ASCII command vocabulary.
//!
//! A command is a decimal argument (possibly empty) followed by a single
//! command character, e.g. `400A` sets the peak time to 400 µs. Commands are
//! sent without a terminator; the controller answers with one line.

use crate::error::{Error, Result};
use std::fmt;

/// Ctrl-R (reset) followed by ESC (enter terminal mode).
pub const RESET_SEQUENCE: [u8; 2] = [0x12, 0x1B];

/// Line printed by the controller once it accepts commands.
pub const TERMINAL_BANNER: &str = "TERMINAL-Mode";

/// Highest bus address.
pub const MAX_ADDRESS: u8 = 8;

pub const PEAK_TIME_RANGE: (u32, u32) = (10, 65_535);
pub const OPEN_TIME_RANGE: (u32, u32) = (10, 9_999_999);
pub const CYCLE_TIME_RANGE: (u32, u32) = (10, 9_999_999);
pub const PEAK_CURRENT_MAX: u8 = 15;
pub const SHOT_COUNT_MAX: u32 = 65_535;
pub const BANKS_PER_VALVE: u8 = 4;

/// Logical unit on the shared bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Valve,
    Master,
}

impl Unit {
    pub fn address(self) -> u8 {
        match self {
            Unit::Valve => 0,
            Unit::Master => MAX_ADDRESS,
        }
    }
}

/// How the valve reacts to the external hardware trigger input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    /// One shot on each positive edge.
    SingleShot,
    /// Valve open while the input is high.
    Continuous,
    /// A series of `G` shots on each positive edge.
    Series,
    /// Shots repeat while the input is high.
    Endless,
}

impl TriggerMode {
    fn letter(self) -> char {
        match self {
            TriggerMode::SingleShot => 'X',
            TriggerMode::Continuous => 'T',
            TriggerMode::Series => 'P',
            TriggerMode::Endless => 'L',
        }
    }
}

/// Power-up behaviour of the master unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlcMode {
    Standard,
    LastStateRestore,
}

/// Serial speeds the controller can be switched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaudRate {
    B9600,
    B19200,
    B38400,
    B57600,
    B115200,
    B230400,
}

impl BaudRate {
    pub const ALL: [BaudRate; 6] = [
        BaudRate::B9600,
        BaudRate::B19200,
        BaudRate::B38400,
        BaudRate::B57600,
        BaudRate::B115200,
        BaudRate::B230400,
    ];

    pub fn bits_per_second(self) -> u32 {
        match self {
            BaudRate::B9600 => 9600,
            BaudRate::B19200 => 19200,
            BaudRate::B38400 => 38400,
            BaudRate::B57600 => 57600,
            BaudRate::B115200 => 115200,
            BaudRate::B230400 => 230400,
        }
    }

    // Digit sent in front of '%'.
    fn code(self) -> u8 {
        match self {
            BaudRate::B9600 => 0,
            BaudRate::B19200 => 1,
            BaudRate::B38400 => 2,
            BaudRate::B57600 => 3,
            BaudRate::B115200 => 4,
            BaudRate::B230400 => 5,
        }
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = Error;

    fn try_from(rate: u32) -> Result<Self> {
        BaudRate::ALL
            .into_iter()
            .find(|b| b.bits_per_second() == rate)
            .ok_or(Error::UnsupportedBaudRate(rate))
    }
}

/// Every command the driver can emit, apart from the raw reset sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SelectAddress(u8),
    QueryAddress,
    PlcMode(PlcMode),
    BaudRate(BaudRate),
    TriggerMode(TriggerMode),
    /// Stops triggering and aborts a running shot series.
    Stop,
    LoadParameters { valve: u8, bank: u8 },
    StoreParameters { valve: u8, bank: u8 },
    /// Microseconds.
    PeakTime(u32),
    /// Microseconds.
    OpenTime(u32),
    /// Microseconds.
    CycleTime(u32),
    /// Index into the current table, see [`peak_current_milliamps`].
    PeakCurrent(u8),
    ShotCount(u32),
    SingleShot { v1: bool, v2: bool },
    SeriesShot { v1: bool, v2: bool },
}

impl Command {
    /// The unit that must be addressed before sending, if any.
    pub fn target(&self) -> Option<Unit> {
        match self {
            Command::SelectAddress(_) | Command::QueryAddress => None,
            Command::PlcMode(_) | Command::BaudRate(_) => Some(Unit::Master),
            _ => Some(Unit::Valve),
        }
    }

    /// Checks the arguments against the ranges documented for the controller.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Command::SelectAddress(address) => {
                check_range("address", address.into(), 0, MAX_ADDRESS.into())
            }
            Command::LoadParameters { valve, bank } | Command::StoreParameters { valve, bank } => {
                if valve > 1 {
                    return Err(Error::InvalidValve(valve));
                }
                check_range("parameter bank", bank.into(), 0, (BANKS_PER_VALVE - 1).into())
            }
            Command::PeakTime(t) => {
                check_range("peak time", t.into(), PEAK_TIME_RANGE.0.into(), PEAK_TIME_RANGE.1.into())
            }
            Command::OpenTime(t) => {
                check_range("open time", t.into(), OPEN_TIME_RANGE.0.into(), OPEN_TIME_RANGE.1.into())
            }
            Command::CycleTime(t) => check_range(
                "cycle time",
                t.into(),
                CYCLE_TIME_RANGE.0.into(),
                CYCLE_TIME_RANGE.1.into(),
            ),
            Command::PeakCurrent(idx) => {
                check_range("peak current index", idx.into(), 0, PEAK_CURRENT_MAX.into())
            }
            Command::ShotCount(n) => check_range("shot count", n.into(), 0, SHOT_COUNT_MAX.into()),
            _ => Ok(()),
        }
    }

    /// Validates and renders the wire form.
    pub fn encode(&self) -> Result<String> {
        self.validate()?;
        Ok(self.to_string())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Command::SelectAddress(address) => write!(f, "{address}*"),
            Command::QueryAddress => f.write_str("="),
            Command::PlcMode(PlcMode::Standard) => f.write_str("00F"),
            Command::PlcMode(PlcMode::LastStateRestore) => f.write_str("01F"),
            Command::BaudRate(rate) => write!(f, "{}%", rate.code()),
            Command::TriggerMode(mode) => write!(f, "{}", mode.letter()),
            Command::Stop => f.write_str("S"),
            Command::LoadParameters { valve, bank } => write!(f, "{}n", parameter_slot(valve, bank)),
            Command::StoreParameters { valve, bank } => write!(f, "{}N", parameter_slot(valve, bank)),
            Command::PeakTime(t) => write!(f, "{t}A"),
            Command::OpenTime(t) => write!(f, "{t}B"),
            Command::CycleTime(t) => write!(f, "{t}C"),
            Command::PeakCurrent(idx) => write!(f, "{idx}D"),
            Command::ShotCount(n) => write!(f, "{n}G"),
            Command::SingleShot { v1, v2 } => f.write_str(shot_letter(v1, v2, ["V", "Y", "Z"])),
            Command::SeriesShot { v1, v2 } => f.write_str(shot_letter(v1, v2, ["U", "Q", "R"])),
        }
    }
}

// Valve 1 banks follow the four valve 0 banks.
fn parameter_slot(valve: u8, bank: u8) -> u8 {
    if valve == 0 {
        bank
    } else {
        bank.saturating_add(BANKS_PER_VALVE)
    }
}

// Only v1 is looked at unless both are set, so (false, true) and
// (false, false) produce the same command.
fn shot_letter(v1: bool, v2: bool, [both, first, other]: [&'static str; 3]) -> &'static str {
    if v1 && v2 {
        both
    } else if v1 {
        first
    } else {
        other
    }
}

fn check_range(name: &'static str, value: u64, min: u64, max: u64) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(Error::out_of_range(name, value, min, max))
    }
}

/// Peak current the controller derives from a `D` index: 450 mA + 50 mA per step.
///
/// The driver sends the index as given; this is only a conversion aid.
pub const fn peak_current_milliamps(index: u8) -> u32 {
    450 + 50 * index as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn baud_rates_map_to_digit_commands() {
        let expected = ["0%", "1%", "2%", "3%", "4%", "5%"];
        for (rate, wire) in BaudRate::ALL.into_iter().zip(expected) {
            let baud = BaudRate::try_from(rate.bits_per_second()).unwrap();
            assert_eq!(Command::BaudRate(baud).encode().unwrap(), wire);
        }
    }

    #[test]
    fn unknown_baud_rate_is_rejected() {
        let err = BaudRate::try_from(14400).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn parameter_banks_are_offset_for_second_valve() {
        let load = |valve, bank| Command::LoadParameters { valve, bank }.encode().unwrap();
        assert_eq!(load(0, 2), "2n");
        assert_eq!(load(1, 2), "6n");
        assert_eq!(
            Command::StoreParameters { valve: 1, bank: 3 }.encode().unwrap(),
            "7N"
        );
    }

    #[test]
    fn parameter_bank_and_valve_are_validated() {
        let bad_bank = Command::LoadParameters { valve: 0, bank: 4 }.encode().unwrap_err();
        assert!(matches!(bad_bank, Error::OutOfRange { name: "parameter bank", .. }));
        let bad_valve = Command::StoreParameters { valve: 2, bank: 0 }.encode().unwrap_err();
        assert!(matches!(bad_valve, Error::InvalidValve(2)));
    }

    #[test]
    fn timing_limits() {
        assert!(Command::PeakTime(9).encode().is_err());
        assert_eq!(Command::PeakTime(400).encode().unwrap(), "400A");
        assert!(Command::PeakTime(65_536).encode().is_err());
        assert_eq!(Command::OpenTime(9_999_999).encode().unwrap(), "9999999B");
        assert!(Command::OpenTime(10_000_000).encode().is_err());
        assert!(Command::CycleTime(9).encode().is_err());
        assert_eq!(Command::CycleTime(60_000).encode().unwrap(), "60000C");
    }

    #[test]
    fn current_and_count_limits() {
        assert_eq!(Command::PeakCurrent(15).encode().unwrap(), "15D");
        assert!(Command::PeakCurrent(16).encode().is_err());
        assert_eq!(Command::ShotCount(0).encode().unwrap(), "0G");
        assert!(Command::ShotCount(65_536).encode().is_err());
    }

    #[test]
    fn shot_letters_collapse_when_first_valve_is_off() {
        let single = |v1, v2| Command::SingleShot { v1, v2 }.to_string();
        assert_eq!(single(true, true), "V");
        assert_eq!(single(true, false), "Y");
        assert_eq!(single(false, true), "Z");
        assert_eq!(single(false, false), "Z");

        let series = |v1, v2| Command::SeriesShot { v1, v2 }.to_string();
        assert_eq!(series(true, true), "U");
        assert_eq!(series(true, false), "Q");
        assert_eq!(series(false, true), "R");
        assert_eq!(series(false, false), "R");
    }

    #[test]
    fn targets() {
        assert_eq!(Command::SelectAddress(3).target(), None);
        assert_eq!(Command::PlcMode(PlcMode::Standard).target(), Some(Unit::Master));
        assert_eq!(Command::Stop.target(), Some(Unit::Valve));
        assert_eq!(Unit::Master.address(), 8);
    }

    #[test]
    fn peak_current_table() {
        assert_eq!(peak_current_milliamps(0), 450);
        assert_eq!(peak_current_milliamps(13), 1100);
    }
}
