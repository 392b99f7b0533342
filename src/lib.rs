//! # VC Mini Valve Controller Driver
//!
//! This library drives the VC Mini micro-valve controller over its serial
//! terminal interface. A [`Session`] owns the port, frames the line-based
//! replies and keeps track of which unit on the bus (valve or master) is
//! addressed, so each operation only has to say what it wants done.
//!
//! ```no_run
//! use vc_mini::{Session, SessionConfig};
//!
//! # fn main() -> vc_mini::Result<()> {
//! let mut valve = Session::open(&SessionConfig::from_env()?)?;
//! valve.init()?;
//! valve.set_peak_time(400)?;
//! valve.single_shot(true, false)?;
//! # Ok(())
//! # }
//! ```
//!
//! The [`sim`] module contains a software model of the controller that can be
//! used in place of a serial port.

pub mod command;
pub mod config;
pub mod error;
pub mod session;
pub mod sim;

pub use command::{BaudRate, Command, PlcMode, TriggerMode, Unit};
pub use config::SessionConfig;
pub use error::{Error, ErrorKind, Result};
pub use session::Session;
pub use sim::Simulator;
