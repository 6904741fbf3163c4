//! ADS1115 16-bit ADC.
//!
//! Construction is lazy: the configuration is only pushed to the device when a measurement is
//! requested or the configuration is explicitly updated. Single-shot conversions wait a fixed
//! [`CONVERSION_DELAY_MS`] instead of polling the OS bit; at 128 SPS a conversion takes about 8ms.

use crate::internal_types::*;
use crate::types::*;

#[cfg(feature = "sync")]
use embedded_hal::{delay::DelayNs, i2c};

/// Wait between starting a single-shot conversion and reading the result.
pub const CONVERSION_DELAY_MS: u32 = 15;

/// Raw code of the positive full-scale voltage.
const FULL_SCALE_CODE: f32 = 32768.0;

/// Converts a raw single-ended reading to volts.
///
/// Single-ended inputs cannot go below ground, so negative codes are treated as noise around zero
/// and clamped to 0V. Readings are also clamped to `supply_voltage`.
pub fn single_ended_voltage(raw: i16, full_scale: FullScaleRange, supply_voltage: f32) -> f32 {
    let voltage = f32::from(raw) * full_scale.volts() / FULL_SCALE_CODE;
    voltage.min(supply_voltage).max(0.0)
}

// || reg || OS MUX PGA MODE || DR CMODE CPOL CLAT CQUE ||
pub(crate) fn config_frame(config: &AdcConfig, start_conversion: bool) -> [u8; 3] {
    let [msb, lsb] = config.to_bytes();
    let os = if start_conversion { OS_BIT } else { 0 };
    [Register::Config.pointer(), msb | os, lsb]
}

pub(crate) fn register_frame(register: Register, value: i16) -> [u8; 3] {
    let [msb, lsb] = value.to_be_bytes();
    [register.pointer(), msb, lsb]
}

/// Outcome of reading the config register with the two bus steps reported separately.
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConfigProbe<E> {
    /// Writing the register pointer.
    pub pointer: Result<(), Error<E>>,
    /// Reading the two register bytes back.
    pub data: Result<[u8; 2], Error<E>>,
}

impl<E> ConfigProbe<E> {
    /// The register bytes if both steps succeeded.
    pub fn bytes(&self) -> Option<[u8; 2]> {
        match (&self.pointer, &self.data) {
            (Ok(()), Ok(bytes)) => Some(*bytes),
            _ => None,
        }
    }
}

/// ADS1115 16-bit I2C ADC.
#[derive(Debug)]
pub struct Ads1115<I2C> {
    pub(crate) i2c: I2C,
    pub(crate) address: u8,
    pub(crate) config: AdcConfig,
}

impl<I2C> Ads1115<I2C> {
    /// Stores the bus, address and configuration. No bus traffic occurs.
    pub const fn new(i2c: I2C, address: AdcAddress, config: AdcConfig) -> Self {
        Ads1115 {
            i2c,
            address: address as u8,
            config,
        }
    }

    /// The stored configuration, which is not necessarily what the device currently holds.
    pub fn config(&self) -> AdcConfig {
        self.config
    }

    /// Selects the input used by the next measurement without touching the bus.
    pub fn select_input(&mut self, input: InputMux) {
        self.config.input = input;
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn set_address(&mut self, address: AdcAddress) {
        self.address = address as u8;
    }

    /// Destroy this instance and return the inner I2C bus.
    pub fn release(self) -> I2C {
        self.i2c
    }
}

/// Implementation of all commands given a generic I2C bus.
///
/// # Errors
///
/// Any errors encountered within the I2C device will be wrapped in [`Error::I2CError`].
#[cfg(feature = "sync")]
impl<I2C, E> Ads1115<I2C>
where
    I2C: i2c::I2c<Error = E>,
{
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error<E>> {
        self.i2c.write(self.address, bytes).map_err(Error::I2CError)
    }

    /// Stores `config` and writes it to the device.
    pub fn update_config(&mut self, config: AdcConfig) -> Result<(), Error<E>> {
        self.config = config;
        self.write_bytes(&config_frame(&self.config, false))
    }

    /// Starts a single conversion with the stored configuration, waits [`CONVERSION_DELAY_MS`]
    /// and reads the result.
    pub fn one_shot_measure<D: DelayNs>(&mut self, delay: &mut D) -> Result<i16, Error<E>> {
        self.write_bytes(&config_frame(&self.config, true))?;
        delay.delay_ms(CONVERSION_DELAY_MS);
        self.get_data()
    }

    /// Reads the conversion register as a signed 16-bit code.
    pub fn get_data(&mut self) -> Result<i16, Error<E>> {
        self.write_bytes(&[Register::Conversion.pointer()])?;
        let mut bytes = [0; 2];
        self.i2c.read(self.address, &mut bytes)?;
        Ok(i16::from_be_bytes(bytes))
    }

    /// Reads and discards the conversion register.
    pub fn flush_data(&mut self) -> Result<(), Error<E>> {
        self.get_data().map(|_| ())
    }

    /// Writes the comparator thresholds, high register first.
    ///
    /// Both writes are attempted; the first error is returned.
    pub fn set_thresholds(&mut self, low: i16, high: i16) -> Result<(), Error<E>> {
        let high_result = self.write_bytes(&register_frame(Register::HighThreshold, high));
        let low_result = self.write_bytes(&register_frame(Register::LowThreshold, low));
        high_result.and(low_result)
    }

    /// Turns ALERT/RDY into a conversion-ready output by setting the high threshold's MSB and
    /// clearing the low threshold's MSB.
    ///
    /// The comparator queue in the stored configuration must not be
    /// [`ComparatorQueue::Disabled`] for the pin to be driven.
    pub fn enable_conversion_ready_pin(&mut self) -> Result<(), Error<E>> {
        self.set_thresholds(0x0000, -1)
    }

    pub fn start_continuous_mode(&mut self) -> Result<(), Error<E>> {
        self.update_config(self.config.mode(OperatingMode::Continuous))
    }

    pub fn stop_continuous_mode(&mut self) -> Result<(), Error<E>> {
        self.update_config(self.config.mode(OperatingMode::SingleShot))
    }

    /// Points at the config register and reads it back, reporting both steps.
    ///
    /// The read is attempted even when the pointer write fails.
    pub fn probe_config(&mut self) -> ConfigProbe<E> {
        let pointer = self.write_bytes(&[Register::Config.pointer()]);
        let mut bytes = [0; 2];
        let data = self
            .i2c
            .read(self.address, &mut bytes)
            .map(|()| bytes)
            .map_err(Error::I2CError);
        ConfigProbe { pointer, data }
    }

    /// Reads the config register and decodes it. `Ok(None)` means the device reported a PGA code
    /// with no matching [`FullScaleRange`].
    pub fn read_config(&mut self) -> Result<Option<AdcConfig>, Error<E>> {
        let probe = self.probe_config();
        probe.pointer?;
        Ok(AdcConfig::from_bytes(probe.data?))
    }
}
