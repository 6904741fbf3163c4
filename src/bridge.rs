//! The polling loop that ties the serial command stream to the two drivers.
//!
//! One byte is read per poll. When it completes a line, the line is parsed, executed against the
//! DAC or ADC and the response is transmitted before the next byte is read, so there is never more
//! than one command in flight. Bus transactions block the loop for as long as they take.

use embedded_hal::{
    delay::DelayNs,
    i2c::{self, ErrorKind},
};

use crate::ads1115::{single_ended_voltage, Ads1115};
use crate::line::{CommandLine, Feed};
use crate::mcp4728::Mcp4728;
use crate::protocol::{Command, Response};
use crate::types::*;

/// Serial line settings the host side expects: 115200 baud, 8 data bits, no parity, 1 stop bit.
pub const BAUD_RATE: u32 = 115_200;
/// Clock rate both I2C buses are expected to run at.
pub const I2C_FREQUENCY_HZ: u32 = 100_000;
/// Delay per iteration of the idle loop entered when start-up fails.
pub const HALT_DELAY_MS: u32 = 1000;

/// Byte-level access to the host serial link.
pub trait SerialPort {
    type Error;

    /// Waits up to `timeout_ms` for one byte. `Ok(None)` means the timeout elapsed.
    fn read_byte(&mut self, timeout_ms: u32) -> Result<Option<u8>, Self::Error>;

    /// Transmits all of `bytes`, blocking until done.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;
}

/// Event counters. None of these are visible on the wire. All of them wrap on overflow.
#[derive(Debug, Default, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Stats {
    /// Lines that produced a response, whether or not it was sent successfully.
    pub responses: u32,
    /// Lines dropped without a response because they were malformed or out of range.
    pub dropped: u32,
    /// Lines lost to receive buffer overflow.
    pub overflows: u32,
    /// Failed DAC or ADC transactions.
    pub bus_errors: u32,
    /// Failed serial reads or writes.
    pub serial_errors: u32,
}

/// Owns the serial port, both drivers and the delay, and runs the command protocol.
pub struct Bridge<S, DI, AI, D> {
    serial: S,
    dac: Mcp4728<DI>,
    adc: Option<Ads1115<AI>>,
    delay: D,
    config: BridgeConfig,
    line: CommandLine,
    stats: Stats,
}

/// Status code reported by `test_adc` for one bus step.
fn bus_status<T, E: i2c::Error>(result: &Result<T, Error<E>>) -> u8 {
    match result {
        Ok(_) => 0,
        Err(Error::I2CError(e)) if e.kind() == ErrorKind::ArbitrationLoss => 2,
        Err(_) => 1,
    }
}

impl<S, DI, AI, D> Bridge<S, DI, AI, D>
where
    S: SerialPort,
    DI: i2c::I2c,
    AI: i2c::I2c,
    D: DelayNs,
{
    /// Creates the bridge. `adc_bus` is `None` when the board has no ADC fitted, in which case ADC
    /// commands report the ADC as unavailable.
    ///
    /// No bus traffic occurs until [`Bridge::initialize`].
    pub fn new(
        serial: S,
        dac_bus: DI,
        adc_bus: Option<AI>,
        delay: D,
        config: BridgeConfig,
    ) -> Self {
        Bridge {
            serial,
            dac: Mcp4728::new(dac_bus, config.dac_address),
            adc: adc_bus.map(|bus| Ads1115::new(bus, config.adc_address, config.adc)),
            delay,
            config,
            line: CommandLine::new(),
            stats: Stats::default(),
        }
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn dac(&self) -> &Mcp4728<DI> {
        &self.dac
    }

    pub fn adc(&self) -> Option<&Ads1115<AI>> {
        self.adc.as_ref()
    }

    /// Destroy this instance and return the serial port, both buses and the delay.
    pub fn release(self) -> (S, DI, Option<AI>, D) {
        (
            self.serial,
            self.dac.release(),
            self.adc.map(Ads1115::release),
            self.delay,
        )
    }

    /// Wakes the DAC, waits for it to settle and drives all four outputs to zero.
    ///
    /// The ADC is left untouched; its configuration is pushed with the first measurement.
    pub fn initialize(&mut self) -> Result<(), Error<DI::Error>> {
        self.dac.initialize(&mut self.delay)?;
        self.dac.set_all_channels([0; 4])?;
        #[cfg(feature = "defmt")]
        defmt::info!("DAC initialized, ADC present: {}", self.adc.is_some());
        Ok(())
    }

    /// Initializes and then serves commands forever.
    ///
    /// If the DAC does not answer, nothing is served and the loop idles instead. There is no retry.
    pub fn start(mut self) -> ! {
        if self.initialize().is_err() {
            #[cfg(feature = "defmt")]
            defmt::error!("DAC initialization failed, halting");
            self.halt()
        }
        self.run()
    }

    /// Serves commands forever.
    pub fn run(mut self) -> ! {
        loop {
            self.poll();
        }
    }

    fn halt(&mut self) -> ! {
        loop {
            self.delay.delay_ms(HALT_DELAY_MS);
        }
    }

    /// Waits for at most one byte and handles it.
    pub fn poll(&mut self) {
        match self.serial.read_byte(self.config.rx_timeout_ms) {
            Ok(Some(byte)) => self.handle_byte(byte),
            Ok(None) => {}
            Err(_) => {
                self.stats.serial_errors = self.stats.serial_errors.wrapping_add(1);
                #[cfg(feature = "defmt")]
                defmt::warn!("serial receive error");
            }
        }
    }

    /// Feeds one received byte through the line buffer, dispatching a completed line.
    pub fn handle_byte(&mut self, byte: u8) {
        match self.line.feed(byte) {
            Feed::Pending | Feed::Discarded => {}
            Feed::Overflow => {
                self.stats.overflows = self.stats.overflows.wrapping_add(1);
                #[cfg(feature = "defmt")]
                defmt::warn!("command line overflow, input discarded");
            }
            Feed::Complete => {
                let command = Command::parse(self.line.as_bytes());
                self.line.clear();
                match command {
                    Some(command) => {
                        let response = self.execute(command);
                        self.respond(response);
                    }
                    None => {
                        self.stats.dropped = self.stats.dropped.wrapping_add(1);
                        #[cfg(feature = "defmt")]
                        defmt::debug!("command dropped");
                    }
                }
            }
        }
    }

    /// Runs a command against the drivers.
    pub fn execute(&mut self, command: Command) -> Response {
        #[cfg(feature = "defmt")]
        defmt::debug!("executing {}", command);
        match command {
            Command::CommOk => Response::CommOk,
            Command::TestAdc => self.test_adc(),
            Command::ReadAdcRaw(None) => Response::Error,
            Command::ReadAdcRaw(Some(input)) => match self.measure(input) {
                Some((raw, _)) => Response::Raw(raw),
                None => Response::Error,
            },
            Command::ReadAdc(input) => match self.measure(input) {
                Some((raw, full_scale)) => Response::Voltage(single_ended_voltage(
                    raw,
                    full_scale,
                    self.config.supply_voltage,
                )),
                None => Response::Voltage(0.0),
            },
            Command::SetAll(value) => {
                let result = self.dac.set_all_channels([value; 4]);
                self.dac_status(result)
            }
            Command::WriteChannel { channel, value } => {
                let result = self.dac.write_channel(channel, value);
                self.dac_status(result)
            }
        }
    }

    fn test_adc(&mut self) -> Response {
        let Some(adc) = self.adc.as_mut() else {
            return Response::AdcNotInit;
        };
        let probe = adc.probe_config();
        match probe.bytes() {
            Some(bytes) => Response::ConfigRegister(bytes),
            None => {
                self.stats.bus_errors = self.stats.bus_errors.wrapping_add(1);
                Response::I2cFail(bus_status(&probe.pointer), bus_status(&probe.data))
            }
        }
    }

    /// One-shot raw reading of `input`, with the range it was taken at. A failed transaction
    /// reads as 0, which is indistinguishable from a genuine zero on the wire; it is only counted
    /// and logged.
    ///
    /// `None` when no ADC is fitted.
    fn measure(&mut self, input: InputMux) -> Option<(i16, FullScaleRange)> {
        let adc = self.adc.as_mut()?;
        adc.select_input(input);
        let full_scale = adc.config().full_scale;
        let raw = match adc.one_shot_measure(&mut self.delay) {
            Ok(raw) => raw,
            Err(_) => {
                self.stats.bus_errors = self.stats.bus_errors.wrapping_add(1);
                #[cfg(feature = "defmt")]
                defmt::warn!("ADC measurement failed on {}, reporting 0", input);
                0
            }
        };
        Some((raw, full_scale))
    }

    fn dac_status(&mut self, result: Result<(), Error<DI::Error>>) -> Response {
        if result.is_err() {
            self.stats.bus_errors = self.stats.bus_errors.wrapping_add(1);
            #[cfg(feature = "defmt")]
            defmt::warn!("DAC write failed");
        }
        Response::Status(result.is_ok())
    }

    fn respond(&mut self, response: Response) {
        self.stats.responses = self.stats.responses.wrapping_add(1);
        let sent = match response.to_line() {
            Ok(line) => self.serial.write_all(line.as_bytes()).is_ok(),
            Err(_) => false,
        };
        if !sent {
            self.stats.serial_errors = self.stats.serial_errors.wrapping_add(1);
            #[cfg(feature = "defmt")]
            defmt::warn!("failed to send response {}", response);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fake_delay::FakeDelay;
    use crate::tests::fake_i2c::{FakeI2C, FakeI2CError, FakeI2CMessage};
    use crate::line::MAX_LINE_LEN;
    use crate::tests::fake_serial::{FakeSerial, FakeSerialError};

    struct Rig {
        serial: FakeSerial,
        dac_bus: FakeI2C,
        adc_bus: FakeI2C,
        delay: FakeDelay,
        bridge: Bridge<FakeSerial, FakeI2C, FakeI2C, FakeDelay>,
    }

    impl Rig {
        fn new() -> Rig {
            Self::with_adc(true)
        }

        fn with_adc(fitted: bool) -> Rig {
            let serial = FakeSerial::new();
            let dac_bus = FakeI2C::new();
            let adc_bus = FakeI2C::new();
            let delay = FakeDelay::new();
            let bridge = Bridge::new(
                serial.clone(),
                dac_bus.clone(),
                fitted.then(|| adc_bus.clone()),
                delay.clone(),
                BridgeConfig::new(),
            );
            Rig {
                serial,
                dac_bus,
                adc_bus,
                delay,
                bridge,
            }
        }

        /// Sends `input` and polls until it is consumed, returning everything transmitted.
        fn exchange(&mut self, input: &[u8]) -> String {
            self.serial.send(input);
            while self.serial.pending() > 0 {
                self.bridge.poll();
            }
            self.serial.take_output()
        }
    }

    #[test]
    fn initialize_wakes_and_zeroes_dac() {
        let mut rig = Rig::new();
        assert_eq!(rig.bridge.initialize(), Ok(()));
        assert_eq!(
            *rig.dac_bus.messages.borrow(),
            vec![
                FakeI2CMessage {
                    address: 0x00,
                    bytes: vec![0x09]
                },
                FakeI2CMessage {
                    address: 0x60,
                    bytes: vec![0; 8]
                },
            ]
        );
        assert_eq!(rig.delay.total_ms(), 5);
        assert!(rig.adc_bus.messages.borrow().is_empty());
    }

    #[test]
    fn initialize_failure() {
        let mut rig = Rig::new();
        rig.dac_bus.fail_all(true);
        assert_eq!(
            rig.bridge.initialize(),
            Err(Error::I2CError(FakeI2CError::WriteError))
        );
        assert_eq!(rig.delay.total_ms(), 0);
    }

    #[test]
    fn comm_ok() {
        let mut rig = Rig::new();
        assert_eq!(rig.exchange(b"COMM_OK\n"), "COMM_OK\r\n");
        assert_eq!(rig.bridge.stats().responses, 1);
    }

    #[test]
    fn back_to_back_commands() {
        let mut rig = Rig::new();
        assert_eq!(rig.exchange(b"COMM_OK\r\n1,5\r\n"), "COMM_OK\r\n1\r\n");
    }

    #[test]
    fn partial_line_waits_for_terminator() {
        let mut rig = Rig::new();
        assert_eq!(rig.exchange(b"COMM"), "");
        assert_eq!(rig.exchange(b"_OK"), "");
        assert_eq!(rig.exchange(b"\r"), "COMM_OK\r\n");
    }

    #[test]
    fn poll_uses_configured_timeout() {
        let mut rig = Rig::new();
        rig.bridge.poll();
        assert_eq!(*rig.serial.last_timeout_ms.borrow(), Some(10));
        assert_eq!(rig.bridge.stats(), Stats::default());
    }

    #[test]
    fn test_adc_reads_config_register() {
        let mut rig = Rig::new();
        rig.adc_bus.queue_read(0x48, &[0x85, 0x83]);
        assert_eq!(rig.exchange(b"test_adc\n"), "OK:0x8583\r\n");
        assert_eq!(
            *rig.adc_bus.messages.borrow(),
            vec![FakeI2CMessage {
                address: 0x48,
                bytes: vec![0x01]
            }]
        );
    }

    #[test]
    fn test_adc_reports_each_step() {
        let mut rig = Rig::new();
        *rig.adc_bus.read_error.borrow_mut() = Some(FakeI2CError::ReadError);
        assert_eq!(rig.exchange(b"test_adc\n"), "ERROR:I2C_FAIL:0,1\r\n");

        *rig.adc_bus.write_error.borrow_mut() = Some(FakeI2CError::Busy);
        assert_eq!(rig.exchange(b"test_adc\n"), "ERROR:I2C_FAIL:2,1\r\n");
        assert_eq!(rig.bridge.stats().bus_errors, 2);
    }

    #[test]
    fn test_adc_without_adc() {
        let mut rig = Rig::with_adc(false);
        assert_eq!(rig.exchange(b"test_adc\n"), "ERROR:ADC_NOT_INIT\r\n");
    }

    #[test]
    fn read_adc_raw() {
        let mut rig = Rig::new();
        rig.adc_bus.queue_read(0x48, &[0xff, 0x9c]);
        assert_eq!(rig.exchange(b"read_adc_raw,1\n"), "-100\r\n");
        assert_eq!(
            *rig.adc_bus.messages.borrow(),
            vec![
                FakeI2CMessage {
                    address: 0x48,
                    bytes: vec![0x01, 0xd1, 0x83]
                },
                FakeI2CMessage {
                    address: 0x48,
                    bytes: vec![0x00]
                },
            ]
        );
        assert_eq!(rig.delay.total_ms(), 15);
        assert_eq!(rig.bridge.adc().unwrap().config().input, InputMux::Ain1Gnd);
    }

    #[test]
    fn read_adc_raw_invalid_channel() {
        let mut rig = Rig::new();
        assert_eq!(rig.exchange(b"read_adc_raw,5\n"), "ERROR\r\n");
        assert_eq!(rig.exchange(b"read_adc_raw,one\n"), "ERROR\r\n");
        assert!(rig.adc_bus.messages.borrow().is_empty());
    }

    #[test]
    fn read_adc_raw_without_adc() {
        let mut rig = Rig::with_adc(false);
        assert_eq!(rig.exchange(b"read_adc_raw,0\n"), "ERROR\r\n");
    }

    #[test]
    fn read_adc_raw_bus_failure_reads_zero() {
        let mut rig = Rig::new();
        rig.adc_bus.fail_all(true);
        assert_eq!(rig.exchange(b"read_adc_raw,0\n"), "0\r\n");
        assert_eq!(rig.bridge.stats().bus_errors, 1);
    }

    #[test]
    fn read_adc_converts_to_volts() {
        let mut rig = Rig::new();
        rig.adc_bus.queue_read(0x48, &[0x40, 0x00]);
        assert_eq!(rig.exchange(b"read_adc,0\n"), "3.0720\r\n");
        rig.adc_bus.queue_read(0x48, &[0xff, 0x9c]);
        assert_eq!(rig.exchange(b"read_adc,3\n"), "0.0000\r\n");
        rig.adc_bus.queue_read(0x48, &[0x7f, 0xff]);
        assert_eq!(rig.exchange(b"read_adc,2\n"), "5.0000\r\n");
    }

    #[test]
    fn read_adc_invalid_channel_is_dropped() {
        let mut rig = Rig::new();
        assert_eq!(rig.exchange(b"read_adc,5\n"), "");
        assert_eq!(rig.bridge.stats().dropped, 1);
        assert!(rig.adc_bus.messages.borrow().is_empty());
    }

    #[test]
    fn read_adc_without_adc() {
        let mut rig = Rig::with_adc(false);
        assert_eq!(rig.exchange(b"read_adc,1\n"), "0.0000\r\n");
    }

    #[test]
    fn set_all() {
        let mut rig = Rig::new();
        assert_eq!(rig.exchange(b"set_all,4095\n"), "1\r\n");
        assert_eq!(
            *rig.dac_bus.messages.borrow(),
            vec![FakeI2CMessage {
                address: 0x60,
                bytes: vec![0x0f, 0xff, 0x0f, 0xff, 0x0f, 0xff, 0x0f, 0xff]
            }]
        );
    }

    #[test]
    fn set_all_out_of_range_is_dropped() {
        let mut rig = Rig::new();
        assert_eq!(rig.exchange(b"set_all,4096\n"), "");
        assert!(rig.dac_bus.messages.borrow().is_empty());
    }

    #[test]
    fn set_all_bus_failure() {
        let mut rig = Rig::new();
        rig.dac_bus.fail_all(true);
        assert_eq!(rig.exchange(b"set_all,100\n"), "0\r\n");
        assert_eq!(rig.bridge.stats().bus_errors, 1);
    }

    #[test]
    fn write_channel_merges_with_previous_values() {
        let mut rig = Rig::new();
        assert_eq!(rig.exchange(b"2,1000\n"), "1\r\n");
        assert_eq!(*rig.dac_bus.dac_registers.borrow(), [0, 0, 1000, 0]);
        assert_eq!(rig.exchange(b"0,5\n"), "1\r\n");
        assert_eq!(*rig.dac_bus.dac_registers.borrow(), [5, 0, 1000, 0]);
        assert_eq!(rig.bridge.dac().values(), [5, 0, 1000, 0]);
    }

    #[test]
    fn write_channel_invalid_is_dropped() {
        let mut rig = Rig::new();
        assert_eq!(rig.exchange(b"4,1\n1,4096\n1100\nhello\n"), "");
        assert_eq!(rig.bridge.stats().dropped, 4);
        assert!(rig.dac_bus.messages.borrow().is_empty());
    }

    #[test]
    fn write_channel_bus_failure() {
        let mut rig = Rig::new();
        rig.dac_bus.fail_all(true);
        assert_eq!(rig.exchange(b"1,10\n"), "0\r\n");
        assert_eq!(rig.bridge.dac().values(), [0; 4]);
    }

    #[test]
    fn overflow_drops_line_then_recovers() {
        let mut rig = Rig::new();
        let mut long = b"0,".to_vec();
        long.extend_from_slice(&[b'1'; 62]);
        long.push(b'\n');
        assert_eq!(rig.exchange(&long), "");
        assert_eq!(rig.bridge.stats().overflows, 1);
        assert!(rig.dac_bus.messages.borrow().is_empty());
        assert_eq!(rig.exchange(b"COMM_OK\n"), "COMM_OK\r\n");
    }

    #[test]
    fn overflowing_line_is_not_dispatched() {
        let mut rig = Rig::new();
        let mut long = vec![b'x'; MAX_LINE_LEN];
        long.extend_from_slice(b"y3,4095\n");
        assert_eq!(rig.exchange(&long), "");
        assert_eq!(rig.bridge.stats().overflows, 1);
        assert_eq!(rig.bridge.stats().responses, 0);
        assert!(rig.dac_bus.messages.borrow().is_empty());
        assert_eq!(rig.exchange(b"3,4095\n"), "1\r\n");
        assert_eq!(rig.bridge.dac().values(), [0, 0, 0, 4095]);
    }

    #[test]
    fn counters_wrap() {
        let mut rig = Rig::new();
        rig.bridge.stats.dropped = u32::MAX;
        assert_eq!(rig.exchange(b"hello\n"), "");
        assert_eq!(rig.bridge.stats().dropped, 0);
    }

    #[test]
    fn serial_errors_are_counted() {
        let mut rig = Rig::new();
        rig.serial
            .rx
            .borrow_mut()
            .push_back(Err(FakeSerialError::Framing));
        rig.bridge.poll();
        *rig.serial.fail_writes.borrow_mut() = true;
        assert_eq!(rig.exchange(b"COMM_OK\n"), "");
        assert_eq!(rig.bridge.stats().serial_errors, 2);
        assert_eq!(rig.bridge.stats().responses, 1);
        *rig.serial.fail_writes.borrow_mut() = false;
        assert_eq!(rig.exchange(b"COMM_OK\n"), "COMM_OK\r\n");
    }

    #[test]
    fn release_returns_parts() {
        let rig = Rig::with_adc(false);
        let (_serial, _dac_bus, adc_bus, _delay) = rig.bridge.release();
        assert!(adc_bus.is_none());
    }
}
