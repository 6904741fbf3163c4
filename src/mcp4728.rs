//! MCP4728 4-channel 12-bit DAC.
//!
//! Every channel update is sent as one fast-write frame covering all four channels. The driver
//! keeps a shadow of the last successfully written codes so that updating one channel re-sends
//! the other three unchanged instead of zeroing them.

use crate::types::*;

#[cfg(feature = "sync")]
use embedded_hal::{delay::DelayNs, i2c};

/// Address with the A2-A0 EEPROM bits at their factory value (000).
pub const DEFAULT_ADDRESS: u8 = 0x60;
/// Settling time after the wake-up general call before the first channel write.
pub const WAKE_SETTLE_MS: u32 = 5;
/// Largest 12-bit code.
pub const MAX_VALUE: u16 = 0x0fff;

pub(crate) const ADDRESS_GENERAL_CALL: u8 = 0x00;
pub(crate) const COMMAND_GENERAL_CALL_RESET: u8 = 0b00000110;
pub(crate) const COMMAND_GENERAL_CALL_WAKE_UP: u8 = 0b00001001;
pub(crate) const COMMAND_GENERAL_CALL_SOFTWARE_UPDATE: u8 = 0b00001000;

/// The 8-byte fast-write frame for channels A, B, C, D in that order.
///
/// Each channel takes two bytes: `[0 0 PD1 PD0 D11 D10 D9 D8] [D7 .. D0]`. The power-down bits
/// are always written as zero, i.e. normal operation.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DacFrame([u8; 8]);

impl DacFrame {
    /// Packs four codes. Only the low 12 bits of each code are used; range checking happens before
    /// a frame is built.
    pub fn pack(values: [u16; 4]) -> DacFrame {
        let mut bytes = [0; 8];
        for (i, val) in values.iter().enumerate() {
            bytes[2 * i] = (val >> 8) as u8 & 0x0f;
            bytes[2 * i + 1] = (val & 0xff) as u8;
        }
        DacFrame(bytes)
    }

    /// Recovers the four codes from a frame.
    pub fn unpack(&self) -> [u16; 4] {
        let b = &self.0;
        [
            u16::from_be_bytes([b[0] & 0x0f, b[1]]),
            u16::from_be_bytes([b[2] & 0x0f, b[3]]),
            u16::from_be_bytes([b[4] & 0x0f, b[5]]),
            u16::from_be_bytes([b[6] & 0x0f, b[7]]),
        ]
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl From<[u8; 8]> for DacFrame {
    fn from(bytes: [u8; 8]) -> Self {
        DacFrame(bytes)
    }
}

pub(crate) fn check_value<E>(value: u16) -> Result<u16, Error<E>> {
    if value > MAX_VALUE {
        Err(Error::ValueOutOfBounds(value))
    } else {
        Ok(value)
    }
}

/// MCP4728 4-channel 12-bit I2C DAC.
#[derive(Debug)]
pub struct Mcp4728<I2C> {
    pub(crate) i2c: I2C,
    pub(crate) address: u8,
    pub(crate) values: [u16; 4],
}

impl<I2C> Mcp4728<I2C> {
    /// Creates a new [`Mcp4728`]. No bus traffic happens until [`Mcp4728::initialize`] or a write.
    ///
    /// The shadow starts at all zeros, matching the outputs after [`Mcp4728::initialize`] has been
    /// followed by the start-up zeroing write.
    pub const fn new(i2c: I2C, address: u8) -> Self {
        Mcp4728 {
            i2c,
            address,
            values: [0; 4],
        }
    }

    /// Last codes successfully written to channels A-D.
    pub fn values(&self) -> [u16; 4] {
        self.values
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Destroy this instance and return the inner I2C bus.
    pub fn release(self) -> I2C {
        self.i2c
    }

    /// The shadow with one channel replaced, or an error if the code does not fit in 12 bits.
    pub(crate) fn merged<E>(&self, channel: Channel, value: u16) -> Result<[u16; 4], Error<E>> {
        let mut values = self.values;
        values[usize::from(u8::from(channel))] = check_value::<E>(value)?;
        Ok(values)
    }
}

/// Implementation of all commands given a generic I2C bus.
///
/// # Errors
///
/// Any errors encountered within the I2C device will be wrapped in [`Error::I2CError`].
#[cfg(feature = "sync")]
impl<I2C, E> Mcp4728<I2C>
where
    I2C: i2c::I2c<Error = E>,
{
    fn write_bytes(&mut self, address: u8, bytes: &[u8]) -> Result<(), Error<E>> {
        self.i2c.write(address, bytes).map_err(Error::I2CError)
    }

    /// Wakes the device with a general call and waits [`WAKE_SETTLE_MS`] before returning.
    ///
    /// The bus transaction is not retried.
    pub fn initialize<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error<E>> {
        self.general_call_wake_up()?;
        delay.delay_ms(WAKE_SETTLE_MS);
        Ok(())
    }

    /// Writes a single command byte to the general call address (0x00).
    ///
    /// Every device on the bus that understands general calls will act on it.
    pub fn write_general_call(&mut self, command: u8) -> Result<(), Error<E>> {
        self.write_bytes(ADDRESS_GENERAL_CALL, &[command])
    }

    /// Issues a general call reset. All MCP4728 devices on the bus load their EEPROM values into
    /// the output registers.
    ///
    /// The local shadow is not touched, since the EEPROM contents are unknown to the driver.
    pub fn general_call_reset(&mut self) -> Result<(), Error<E>> {
        self.write_general_call(COMMAND_GENERAL_CALL_RESET)
    }

    /// Issues a general call wake-up. All MCP4728 devices on the bus clear their power-down bits.
    pub fn general_call_wake_up(&mut self) -> Result<(), Error<E>> {
        self.write_general_call(COMMAND_GENERAL_CALL_WAKE_UP)
    }

    /// Issues a general call software update. All MCP4728 devices on the bus immediately update
    /// their outputs from the input registers.
    pub fn general_call_software_update(&mut self) -> Result<(), Error<E>> {
        self.write_general_call(COMMAND_GENERAL_CALL_SOFTWARE_UPDATE)
    }

    /// Sets one channel and re-sends the other three from the local shadow, all in one frame.
    ///
    /// This differs from a plain fast write of `[value, 0, 0, 0]`: the untouched channels keep
    /// their last written code.
    ///
    /// # Errors
    ///
    /// In addition to the internal I2C errors, this can return [`Error::ValueOutOfBounds`] if the
    /// value is out of range (greater than 4095). The shadow only changes when the write succeeds.
    pub fn write_channel(&mut self, channel: Channel, value: u16) -> Result<(), Error<E>> {
        let values = self.merged::<E>(channel, value)?;
        self.write_frame(values)
    }

    /// Updates all four channels with a single bus write.
    ///
    /// # Errors
    ///
    /// In addition to the internal I2C errors, this can return [`Error::ValueOutOfBounds`] if any
    /// value is out of range. Nothing is written in that case.
    pub fn set_all_channels(&mut self, values: [u16; 4]) -> Result<(), Error<E>> {
        for val in values {
            check_value::<E>(val)?;
        }
        self.write_frame(values)
    }

    fn write_frame(&mut self, values: [u16; 4]) -> Result<(), Error<E>> {
        let frame = DacFrame::pack(values);
        self.write_bytes(self.address, frame.as_bytes())?;
        self.values = values;
        Ok(())
    }

    /// Reads the register dump of the device and returns the DAC input register code of each
    /// channel (the EEPROM copies are skipped).
    pub fn read_input_codes(&mut self) -> Result<[u16; 4], Error<E>> {
        // Per channel: input register (3 bytes) followed by EEPROM (3 bytes).
        let mut bytes = [0; 24];
        self.i2c.read(self.address, &mut bytes)?;
        let mut codes = [0; 4];
        for (i, code) in codes.iter_mut().enumerate() {
            let input = &bytes[6 * i..6 * i + 3];
            *code = u16::from_be_bytes([input[1] & 0x0f, input[2]]);
        }
        Ok(codes)
    }
}

#[cfg(all(test, feature = "sync"))]
mod tests {
    use super::*;
    use crate::tests::fake_delay::FakeDelay;
    use crate::tests::fake_i2c::FakeI2C;
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    #[test]
    fn frame_layout() {
        let frame = DacFrame::pack([0x0abc, 0x0001, 0x0fff, 0x0100]);
        assert_eq!(
            frame.as_bytes(),
            &[0x0a, 0xbc, 0x00, 0x01, 0x0f, 0xff, 0x01, 0x00]
        );
    }

    #[test]
    fn frame_unpacks_to_packed_values() {
        for values in [
            [0, 0, 0, 0],
            [4095, 4095, 4095, 4095],
            [1, 2048, 4094, 255],
            [256, 15, 3840, 1000],
        ] {
            assert_eq!(DacFrame::pack(values).unpack(), values);
        }
    }

    #[test]
    fn initialize_wakes_then_settles() {
        let expectations = [I2cTransaction::write(0x00, vec![0x09])];
        let mut delay = FakeDelay::new();
        let mut dac = Mcp4728::new(I2cMock::new(&expectations), DEFAULT_ADDRESS);
        assert_eq!(dac.initialize(&mut delay), Ok(()));
        assert_eq!(delay.total_ms(), WAKE_SETTLE_MS);
        dac.release().done();
    }

    #[test]
    fn initialize_failure_skips_settle() {
        let expectations = [I2cTransaction::write(0x00, vec![0x09]).with_error(ErrorKind::Other)];
        let mut delay = FakeDelay::new();
        let mut dac = Mcp4728::new(I2cMock::new(&expectations), DEFAULT_ADDRESS);
        assert_eq!(
            dac.initialize(&mut delay),
            Err(Error::I2CError(ErrorKind::Other))
        );
        assert_eq!(delay.total_ms(), 0);
        dac.release().done();
    }

    #[test]
    fn general_calls() {
        let expectations = [
            I2cTransaction::write(0x00, vec![0x06]),
            I2cTransaction::write(0x00, vec![0x09]),
            I2cTransaction::write(0x00, vec![0x08]),
            I2cTransaction::write(0x00, vec![0x0c]),
        ];
        let mut dac = Mcp4728::new(I2cMock::new(&expectations), DEFAULT_ADDRESS);
        assert_eq!(dac.general_call_reset(), Ok(()));
        assert_eq!(dac.general_call_wake_up(), Ok(()));
        assert_eq!(dac.general_call_software_update(), Ok(()));
        assert_eq!(dac.write_general_call(0x0c), Ok(()));
        dac.release().done();
    }

    #[test]
    fn set_all_channels_is_one_write() {
        let expectations = [I2cTransaction::write(
            0x60,
            vec![0x0f, 0xff, 0x08, 0x00, 0x00, 0x01, 0x0a, 0xaa],
        )];
        let mut dac = Mcp4728::new(I2cMock::new(&expectations), 0x60);
        assert_eq!(dac.set_all_channels([4095, 2048, 1, 0x0aaa]), Ok(()));
        assert_eq!(dac.values(), [4095, 2048, 1, 0x0aaa]);
        dac.release().done();
    }

    #[test]
    fn set_all_channels_out_of_bounds_error() {
        let mut dac = Mcp4728::new(I2cMock::new(&[]), 0x60);
        assert_eq!(
            dac.set_all_channels([0, 0x1000, 0, 0]),
            Err(Error::ValueOutOfBounds(0x1000))
        );
        assert_eq!(dac.values(), [0; 4]);
        dac.release().done();
    }

    #[test]
    fn write_channel_keeps_other_channels() {
        let expectations = [
            I2cTransaction::write(0x60, vec![0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x04, 0x00]),
            I2cTransaction::write(0x60, vec![0x01, 0x00, 0x0a, 0xbc, 0x03, 0x00, 0x04, 0x00]),
        ];
        let mut dac = Mcp4728::new(I2cMock::new(&expectations), 0x60);
        assert_eq!(dac.set_all_channels([0x100, 0x200, 0x300, 0x400]), Ok(()));
        assert_eq!(dac.write_channel(Channel::B, 0x0abc), Ok(()));
        assert_eq!(dac.values(), [0x100, 0x0abc, 0x300, 0x400]);
        dac.release().done();
    }

    #[test]
    fn write_channel_i2c_error_keeps_shadow() {
        let expectations = [I2cTransaction::write(
            0x60,
            vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0f, 0xff],
        )
        .with_error(ErrorKind::Other)];
        let mut dac = Mcp4728::new(I2cMock::new(&expectations), 0x60);
        assert_eq!(
            dac.write_channel(Channel::D, 0x0fff),
            Err(Error::I2CError(ErrorKind::Other))
        );
        assert_eq!(dac.values(), [0; 4]);
        dac.release().done();
    }

    #[test]
    fn write_channel_out_of_bounds_error() {
        let mut dac = Mcp4728::new(I2cMock::new(&[]), 0x60);
        assert_eq!(
            dac.write_channel(Channel::A, 4096),
            Err(Error::ValueOutOfBounds(4096))
        );
        dac.release().done();
    }

    #[test]
    fn write_channel_reads_back_from_device() {
        let i2c = FakeI2C::new();
        let registers = i2c.dac_registers.clone();
        let mut dac = Mcp4728::new(i2c, DEFAULT_ADDRESS);
        for channel in Channel::ALL {
            for value in [0, 1, 0x0800, 0x0fff] {
                assert_eq!(dac.write_channel(channel, value), Ok(()));
                let codes = dac.read_input_codes().unwrap();
                assert_eq!(codes[usize::from(u8::from(channel))], value);
                assert_eq!(codes, *registers.borrow());
                assert_eq!(codes, dac.values());
            }
        }
    }

    #[test]
    fn read_input_codes() {
        #[rustfmt::skip]
        let bytes = vec![
            0b11000000, 0b10001010, 0b10101010,
            0b11000000, 0b00000000, 0b00000000,
            0b01000000, 0b00000000, 0b00000001,
            0b01000000, 0b00001111, 0b11111111,
            0b01000000, 0b00001111, 0b11111111,
            0b01000000, 0b00000000, 0b00000000,
            0b01000000, 0b11110001, 0b00000000,
            0b01000000, 0b00000000, 0b00000000,
        ];
        let expectations = [I2cTransaction::read(0x60, bytes)];
        let mut dac = Mcp4728::new(I2cMock::new(&expectations), 0x60);
        assert_eq!(dac.read_input_codes(), Ok([0x0aaa, 0x0001, 0x0fff, 0x0100]));
        dac.release().done();
    }
}
