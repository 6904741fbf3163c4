use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::internal_types::*;

// Error type.

/// Error type for the crate, which can represent either an error from this driver or an inner error
/// that comes from the I2C type.
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<InnerError> {
    /// A value was larger than the DAC supports.
    ///
    /// The MCP4728 is a 12-bit DAC, so values that it writes must be smaller than 2^12.
    ValueOutOfBounds(u16),
    /// Error representing an error that came from the inner I2C driver.
    I2CError(InnerError),
}

impl<InnerError> From<InnerError> for Error<InnerError> {
    fn from(inner: InnerError) -> Self {
        Error::I2CError(inner)
    }
}

// DAC enums.

/// MCP4728 output channel selection.
#[derive(IntoPrimitive, TryFromPrimitive, Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Channel {
    A = 0,
    B = 1,
    C = 2,
    D = 3,
}

impl Channel {
    /// All channels in frame order.
    pub const ALL: [Channel; 4] = [Channel::A, Channel::B, Channel::C, Channel::D];
}

// ADC enums.

/// ADS1115 I2C address, selected by what the ADDR pin is strapped to.
#[derive(IntoPrimitive, TryFromPrimitive, Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AdcAddress {
    Gnd = 0x48,
    Vdd = 0x49,
    Sda = 0x4A,
    Scl = 0x4B,
}

/// Input multiplexer setting (MUX bits).
#[derive(IntoPrimitive, TryFromPrimitive, Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum InputMux {
    /// AIN0 vs AIN1 (power-on default of the device).
    Ain0Ain1 = 0,
    Ain0Ain3 = 1,
    Ain1Ain3 = 2,
    Ain2Ain3 = 3,
    Ain0Gnd = 4,
    Ain1Gnd = 5,
    Ain2Gnd = 6,
    Ain3Gnd = 7,
}

impl InputMux {
    /// Maps a single-ended input number (0-3) onto the matching AINx vs GND setting.
    pub fn single_ended(input: u8) -> Option<InputMux> {
        match input {
            0 => Some(InputMux::Ain0Gnd),
            1 => Some(InputMux::Ain1Gnd),
            2 => Some(InputMux::Ain2Gnd),
            3 => Some(InputMux::Ain3Gnd),
            _ => None,
        }
    }

    /// Whether this setting measures an input against ground.
    pub fn is_single_ended(self) -> bool {
        u8::from(self) >= InputMux::Ain0Gnd as u8
    }
}

/// Programmable gain amplifier setting, named by its full-scale range.
#[derive(IntoPrimitive, TryFromPrimitive, Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FullScaleRange {
    /// ±6.144V
    Fsr6V144 = 0,
    /// ±4.096V
    Fsr4V096 = 1,
    /// ±2.048V (power-on default of the device)
    Fsr2V048 = 2,
    /// ±1.024V
    Fsr1V024 = 3,
    /// ±0.512V
    Fsr0V512 = 4,
    /// ±0.256V
    Fsr0V256 = 5,
}

impl FullScaleRange {
    /// Positive full-scale voltage, i.e. the voltage of raw code 32768.
    pub fn volts(self) -> f32 {
        match self {
            FullScaleRange::Fsr6V144 => 6.144,
            FullScaleRange::Fsr4V096 => 4.096,
            FullScaleRange::Fsr2V048 => 2.048,
            FullScaleRange::Fsr1V024 => 1.024,
            FullScaleRange::Fsr0V512 => 0.512,
            FullScaleRange::Fsr0V256 => 0.256,
        }
    }
}

/// Conversion mode.
#[derive(IntoPrimitive, TryFromPrimitive, Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum OperatingMode {
    Continuous = 0,
    /// Power down between conversions; each conversion is started by the OS bit.
    SingleShot = 1,
}

/// Data rate in samples per second.
#[derive(IntoPrimitive, TryFromPrimitive, Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DataRate {
    Sps8 = 0,
    Sps16 = 1,
    Sps32 = 2,
    Sps64 = 3,
    Sps128 = 4,
    Sps250 = 5,
    Sps475 = 6,
    Sps860 = 7,
}

impl DataRate {
    pub fn samples_per_second(self) -> u16 {
        match self {
            DataRate::Sps8 => 8,
            DataRate::Sps16 => 16,
            DataRate::Sps32 => 32,
            DataRate::Sps64 => 64,
            DataRate::Sps128 => 128,
            DataRate::Sps250 => 250,
            DataRate::Sps475 => 475,
            DataRate::Sps860 => 860,
        }
    }
}

#[derive(IntoPrimitive, TryFromPrimitive, Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ComparatorMode {
    Traditional = 0,
    Window = 1,
}

/// Polarity of the ALERT/RDY pin.
#[derive(IntoPrimitive, TryFromPrimitive, Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ComparatorPolarity {
    ActiveLow = 0,
    ActiveHigh = 1,
}

#[derive(IntoPrimitive, TryFromPrimitive, Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ComparatorLatching {
    NonLatching = 0,
    Latching = 1,
}

/// Number of conversions beyond threshold before ALERT/RDY is asserted.
#[derive(IntoPrimitive, TryFromPrimitive, Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ComparatorQueue {
    One = 0,
    Two = 1,
    Four = 2,
    /// Comparator disabled, ALERT/RDY pin in high impedance.
    Disabled = 3,
}

// Configuration structs.

/// Settings packed into the ADS1115 config register.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdcConfig {
    pub input: InputMux,
    pub full_scale: FullScaleRange,
    pub mode: OperatingMode,
    pub data_rate: DataRate,
    pub comparator_mode: ComparatorMode,
    pub comparator_polarity: ComparatorPolarity,
    pub comparator_latching: ComparatorLatching,
    pub comparator_queue: ComparatorQueue,
}

impl AdcConfig {
    /// Creates the start-up configuration: AIN0 vs GND, ±6.144V (covers a 5V supply),
    /// single-shot, 128 SPS, comparator disabled.
    pub fn new() -> AdcConfig {
        AdcConfig {
            input: InputMux::Ain0Gnd,
            full_scale: FullScaleRange::Fsr6V144,
            mode: OperatingMode::SingleShot,
            data_rate: DataRate::Sps128,
            comparator_mode: ComparatorMode::Traditional,
            comparator_polarity: ComparatorPolarity::ActiveLow,
            comparator_latching: ComparatorLatching::NonLatching,
            comparator_queue: ComparatorQueue::Disabled,
        }
    }

    /// Convenience builder method to set the input multiplexer.
    pub fn input(mut self, new_val: InputMux) -> AdcConfig {
        self.input = new_val;
        self
    }

    /// Convenience builder method to set the full-scale range.
    pub fn full_scale(mut self, new_val: FullScaleRange) -> AdcConfig {
        self.full_scale = new_val;
        self
    }

    /// Convenience builder method to set the operating mode.
    pub fn mode(mut self, new_val: OperatingMode) -> AdcConfig {
        self.mode = new_val;
        self
    }

    /// Convenience builder method to set the data rate.
    pub fn data_rate(mut self, new_val: DataRate) -> AdcConfig {
        self.data_rate = new_val;
        self
    }

    /// Convenience builder method to set the comparator mode.
    pub fn comparator_mode(mut self, new_val: ComparatorMode) -> AdcConfig {
        self.comparator_mode = new_val;
        self
    }

    /// Convenience builder method to set the comparator polarity.
    pub fn comparator_polarity(mut self, new_val: ComparatorPolarity) -> AdcConfig {
        self.comparator_polarity = new_val;
        self
    }

    /// Convenience builder method to set the comparator latching.
    pub fn comparator_latching(mut self, new_val: ComparatorLatching) -> AdcConfig {
        self.comparator_latching = new_val;
        self
    }

    /// Convenience builder method to set the comparator queue.
    pub fn comparator_queue(mut self, new_val: ComparatorQueue) -> AdcConfig {
        self.comparator_queue = new_val;
        self
    }

    /// Packs the settings into the two config register bytes, MSB first. The OS bit is left clear.
    pub fn to_bytes(&self) -> [u8; 2] {
        // || OS MUX MUX MUX PGA PGA PGA MODE || DR DR DR CMODE CPOL CLAT CQUE CQUE ||
        [
            u8::from(self.input) << MUX_SHIFT
                | u8::from(self.full_scale) << PGA_SHIFT
                | u8::from(self.mode),
            u8::from(self.data_rate) << DR_SHIFT
                | u8::from(self.comparator_mode) << COMP_MODE_SHIFT
                | u8::from(self.comparator_polarity) << COMP_POL_SHIFT
                | u8::from(self.comparator_latching) << COMP_LAT_SHIFT
                | u8::from(self.comparator_queue),
        ]
    }

    /// Decodes the config register bytes as read back from the device. The OS bit is ignored.
    ///
    /// Returns `None` for PGA codes 6 and 7, which the device accepts as aliases of ±0.256V but
    /// which have no distinct setting here.
    pub fn from_bytes(bytes: [u8; 2]) -> Option<AdcConfig> {
        Some(AdcConfig {
            input: InputMux::try_from((bytes[0] & 0b0111_0000) >> MUX_SHIFT).ok()?,
            full_scale: FullScaleRange::try_from((bytes[0] & 0b0000_1110) >> PGA_SHIFT).ok()?,
            mode: OperatingMode::try_from(bytes[0] & 0b0000_0001).ok()?,
            data_rate: DataRate::try_from((bytes[1] & 0b1110_0000) >> DR_SHIFT).ok()?,
            comparator_mode: ComparatorMode::try_from((bytes[1] & 0b0001_0000) >> COMP_MODE_SHIFT)
                .ok()?,
            comparator_polarity: ComparatorPolarity::try_from(
                (bytes[1] & 0b0000_1000) >> COMP_POL_SHIFT,
            )
            .ok()?,
            comparator_latching: ComparatorLatching::try_from(
                (bytes[1] & 0b0000_0100) >> COMP_LAT_SHIFT,
            )
            .ok()?,
            comparator_queue: ComparatorQueue::try_from(bytes[1] & 0b0000_0011).ok()?,
        })
    }
}

impl Default for AdcConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Addresses, limits and start-up settings of the bridge.
#[derive(Debug, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BridgeConfig {
    /// 7-bit address of the MCP4728 (0x60 with the address bits at their factory value).
    pub dac_address: u8,
    /// 7-bit address of the ADS1115.
    pub adc_address: AdcAddress,
    /// Upper clamp for converted single-ended voltages.
    pub supply_voltage: f32,
    /// How long a single poll waits for a serial byte.
    pub rx_timeout_ms: u32,
    /// Configuration stored in the ADC driver at start-up.
    pub adc: AdcConfig,
}

impl BridgeConfig {
    pub fn new() -> BridgeConfig {
        BridgeConfig {
            dac_address: crate::mcp4728::DEFAULT_ADDRESS,
            adc_address: AdcAddress::Gnd,
            supply_voltage: 5.0,
            rx_timeout_ms: 10,
            adc: AdcConfig::new(),
        }
    }

    /// Convenience builder method to set the DAC address.
    pub fn dac_address(mut self, new_val: u8) -> BridgeConfig {
        self.dac_address = new_val;
        self
    }

    /// Convenience builder method to set the ADC address.
    pub fn adc_address(mut self, new_val: AdcAddress) -> BridgeConfig {
        self.adc_address = new_val;
        self
    }

    /// Convenience builder method to set the supply voltage.
    pub fn supply_voltage(mut self, new_val: f32) -> BridgeConfig {
        self.supply_voltage = new_val;
        self
    }

    /// Convenience builder method to set the serial receive timeout.
    pub fn rx_timeout_ms(mut self, new_val: u32) -> BridgeConfig {
        self.rx_timeout_ms = new_val;
        self
    }

    /// Convenience builder method to set the initial ADC configuration.
    pub fn adc(mut self, new_val: AdcConfig) -> BridgeConfig {
        self.adc = new_val;
        self
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new()
    }
}
