use crate::ads1115::{config_frame, register_frame, Ads1115, CONVERSION_DELAY_MS};
use crate::internal_types::*;
use crate::mcp4728::*;
use crate::types::*;

use embedded_hal_async::{delay::DelayNs, i2c};

/// Async versions of the DAC commands. Bus traffic is identical to the blocking versions.
///
/// # Errors
///
/// Any errors encountered within the I2C device will be wrapped in [`Error::I2CError`].
impl<I, E> Mcp4728<I>
where
    I: i2c::I2c<Error = E>,
{
    async fn write_bytes_async(&mut self, address: u8, bytes: &[u8]) -> Result<(), Error<E>> {
        self.i2c.write(address, bytes).await.map_err(Error::I2CError)
    }

    /// Wakes the device with a general call and waits [`WAKE_SETTLE_MS`] before returning.
    pub async fn initialize_async<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error<E>> {
        self.write_general_call_async(COMMAND_GENERAL_CALL_WAKE_UP)
            .await?;
        delay.delay_ms(WAKE_SETTLE_MS).await;
        Ok(())
    }

    /// Writes a single command byte to the general call address (0x00).
    pub async fn write_general_call_async(&mut self, command: u8) -> Result<(), Error<E>> {
        self.write_bytes_async(ADDRESS_GENERAL_CALL, &[command])
            .await
    }

    /// Sets one channel and re-sends the other three from the local shadow, all in one frame.
    ///
    /// # Errors
    ///
    /// In addition to the internal I2C errors, this can return [`Error::ValueOutOfBounds`] if the
    /// value is out of range (greater than 4095).
    pub async fn write_channel_async(
        &mut self,
        channel: Channel,
        value: u16,
    ) -> Result<(), Error<E>> {
        let values = self.merged::<E>(channel, value)?;
        self.write_frame_async(values).await
    }

    /// Updates all four channels with a single bus write.
    pub async fn set_all_channels_async(&mut self, values: [u16; 4]) -> Result<(), Error<E>> {
        for val in values {
            check_value::<E>(val)?;
        }
        self.write_frame_async(values).await
    }

    async fn write_frame_async(&mut self, values: [u16; 4]) -> Result<(), Error<E>> {
        let frame = DacFrame::pack(values);
        self.write_bytes_async(self.address, frame.as_bytes())
            .await?;
        self.values = values;
        Ok(())
    }
}

/// Async versions of the ADC commands.
impl<I, E> Ads1115<I>
where
    I: i2c::I2c<Error = E>,
{
    async fn write_bytes_async(&mut self, bytes: &[u8]) -> Result<(), Error<E>> {
        self.i2c
            .write(self.address, bytes)
            .await
            .map_err(Error::I2CError)
    }

    /// Stores `config` and writes it to the device.
    pub async fn update_config_async(&mut self, config: AdcConfig) -> Result<(), Error<E>> {
        self.config = config;
        let frame = config_frame(&self.config, false);
        self.write_bytes_async(&frame).await
    }

    /// Starts a single conversion, waits [`CONVERSION_DELAY_MS`] and reads the result.
    pub async fn one_shot_measure_async<D: DelayNs>(
        &mut self,
        delay: &mut D,
    ) -> Result<i16, Error<E>> {
        let frame = config_frame(&self.config, true);
        self.write_bytes_async(&frame).await?;
        delay.delay_ms(CONVERSION_DELAY_MS).await;
        self.get_data_async().await
    }

    /// Reads the conversion register as a signed 16-bit code.
    pub async fn get_data_async(&mut self) -> Result<i16, Error<E>> {
        self.write_bytes_async(&[Register::Conversion.pointer()])
            .await?;
        let mut bytes = [0; 2];
        self.i2c.read(self.address, &mut bytes).await?;
        Ok(i16::from_be_bytes(bytes))
    }

    /// Writes the comparator thresholds, high register first. Both writes are attempted.
    pub async fn set_thresholds_async(&mut self, low: i16, high: i16) -> Result<(), Error<E>> {
        let high_result = self
            .write_bytes_async(&register_frame(Register::HighThreshold, high))
            .await;
        let low_result = self
            .write_bytes_async(&register_frame(Register::LowThreshold, low))
            .await;
        high_result.and(low_result)
    }
}
