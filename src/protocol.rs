//! The line-oriented ASCII command set.
//!
//! | Command                | Response                                    |
//! |------------------------|---------------------------------------------|
//! | `COMM_OK`              | `COMM_OK`                                   |
//! | `test_adc`             | `OK:0x<4 hex digits>` or `ERROR:...`        |
//! | `read_adc_raw,<0-3>`   | signed decimal code, or `ERROR`             |
//! | `read_adc,<0-3>`       | volts with 4 decimals, or nothing           |
//! | `set_all,<0-4095>`     | `1` or `0`, or nothing                      |
//! | `<0-3>,<0-4095>`       | `1` or `0`, or nothing                      |
//!
//! Lines that match nothing, or carry out-of-range numbers, get no response at all, except for
//! `read_adc_raw` which answers `ERROR`.

use core::fmt::{self, Write};

use heapless::String;

use crate::mcp4728::MAX_VALUE;
use crate::types::{Channel, InputMux};

/// Every response ends with this.
pub const TERMINATOR: &str = "\r\n";

/// Capacity of a formatted response, terminator included.
pub const RESPONSE_CAPACITY: usize = 64;

pub type ResponseLine = String<RESPONSE_CAPACITY>;

const COMM_OK: &str = "COMM_OK";
const TEST_ADC: &str = "test_adc";
const READ_ADC_RAW: &str = "read_adc_raw,";
const READ_ADC: &str = "read_adc,";
const SET_ALL: &str = "set_all,";

/// A recognised command line.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Link check.
    CommOk,
    /// Read the ADC config register back as a bus check.
    TestAdc,
    /// One-shot raw code from a single-ended input. `None` when the input number was invalid,
    /// which is answered with `ERROR` rather than dropped.
    ReadAdcRaw(Option<InputMux>),
    /// One-shot reading from a single-ended input, converted to volts.
    ReadAdc(InputMux),
    /// Same code on all four DAC channels.
    SetAll(u16),
    /// Code for one DAC channel.
    WriteChannel { channel: Channel, value: u16 },
}

impl Command {
    /// Parses a complete line (terminator already stripped).
    ///
    /// Returns `None` for lines that must be silently dropped.
    pub fn parse(line: &[u8]) -> Option<Command> {
        let line = core::str::from_utf8(line).ok()?;

        if line == COMM_OK {
            return Some(Command::CommOk);
        }
        if line == TEST_ADC {
            return Some(Command::TestAdc);
        }
        if let Some(arg) = line.strip_prefix(READ_ADC_RAW) {
            return Some(Command::ReadAdcRaw(parse_input(arg)));
        }
        if let Some(arg) = line.strip_prefix(READ_ADC) {
            return parse_input(arg).map(Command::ReadAdc);
        }
        if let Some(arg) = line.strip_prefix(SET_ALL) {
            return parse_value(arg).map(Command::SetAll);
        }

        let (channel, value) = line.split_once(',')?;
        Some(Command::WriteChannel {
            channel: parse_channel(channel)?,
            value: parse_value(value)?,
        })
    }
}

/// Optional sign and decimal digits, surrounding ASCII whitespace allowed.
fn parse_int(field: &str) -> Option<i32> {
    field.trim().parse().ok()
}

fn parse_input(field: &str) -> Option<InputMux> {
    let input = u8::try_from(parse_int(field)?).ok()?;
    InputMux::single_ended(input)
}

fn parse_channel(field: &str) -> Option<Channel> {
    let channel = u8::try_from(parse_int(field)?).ok()?;
    Channel::try_from(channel).ok()
}

fn parse_value(field: &str) -> Option<u16> {
    let value = u16::try_from(parse_int(field)?).ok()?;
    (value <= MAX_VALUE).then_some(value)
}

/// A response, formatted without its terminator by `Display`.
#[derive(Debug, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Response {
    CommOk,
    /// Config register bytes read by `test_adc`.
    ConfigRegister([u8; 2]),
    /// Status codes of the pointer write and the register read of `test_adc` (0 means ok).
    I2cFail(u8, u8),
    AdcNotInit,
    Raw(i16),
    Voltage(f32),
    Error,
    /// Outcome of a DAC write.
    Status(bool),
}

impl Response {
    /// The full response line, terminator included.
    pub fn to_line(&self) -> Result<ResponseLine, fmt::Error> {
        let mut line = ResponseLine::new();
        write!(line, "{}{}", self, TERMINATOR)?;
        Ok(line)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::CommOk => f.write_str(COMM_OK),
            Response::ConfigRegister([msb, lsb]) => write!(f, "OK:0x{:02X}{:02X}", msb, lsb),
            Response::I2cFail(pointer, data) => write!(f, "ERROR:I2C_FAIL:{},{}", pointer, data),
            Response::AdcNotInit => f.write_str("ERROR:ADC_NOT_INIT"),
            Response::Raw(code) => write!(f, "{}", code),
            Response::Voltage(volts) => write!(f, "{:.4}", volts),
            Response::Error => f.write_str("ERROR"),
            Response::Status(ok) => f.write_str(if *ok { "1" } else { "0" }),
        }
    }
}
