//! # Serial command bridge for an MCP4728 DAC and an ADS1115 ADC
//!
//! A platform agnostic implementation of the measurement core of a small source-measurement unit,
//! using the [embedded-hal](https://github.com/rust-embedded/embedded-hal) traits. A host sends
//! ASCII command lines over a serial link; the [`Bridge`] turns them into DAC writes and ADC
//! conversions and answers with one line each. See [`protocol`] for the command set.
//!
//! The two drivers, [`Mcp4728`] and [`Ads1115`], are usable on their own.
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(target_os = "linux")] {
//! use linux_embedded_hal::I2cdev;
//! use smu_bridge::{Channel, Mcp4728};
//!
//! let i2c = I2cdev::new("/dev/i2c-1").unwrap();
//! let mut dac = Mcp4728::new(i2c, 0x60);
//! dac.set_all_channels([483, 279, 297, 590]).unwrap();
//! dac.write_channel(Channel::C, 4095).unwrap();
//! # }
//! ```
//!
//! # Features
//!
//! - `sync` (default): blocking drivers and the [`Bridge`], on `embedded-hal` 1.0.
//! - `async`: `_async` variants of the driver operations, on `embedded-hal-async` 1.0.
//! - `defmt`: `defmt::Format` on public types and logging of dropped lines and bus failures.
#![cfg_attr(not(test), no_std)]

mod internal_types;
mod types;

pub mod ads1115;
pub mod line;
pub mod mcp4728;
pub mod protocol;

#[cfg(feature = "sync")]
pub mod bridge;

#[cfg(feature = "async")]
mod async_impl;

pub use crate::ads1115::{single_ended_voltage, Ads1115, ConfigProbe};
pub use crate::line::{CommandLine, Feed};
pub use crate::mcp4728::{DacFrame, Mcp4728};
pub use crate::protocol::{Command, Response};
pub use crate::types::*;

#[cfg(feature = "sync")]
pub use crate::bridge::{Bridge, SerialPort, Stats};
