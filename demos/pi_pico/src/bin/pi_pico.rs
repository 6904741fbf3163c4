#![no_std]
#![no_main]

use embedded_hal_nb::serial::Read;
use fugit::RateExtU32;
use hal::pac;
use hal::uart::{DataBits, StopBits, UartConfig, UartPeripheral};
use panic_halt as _;
use rp2040_hal as hal;
use rp2040_hal::Clock;
use rp_pico::entry;
use smu_bridge::bridge::{BAUD_RATE, I2C_FREQUENCY_HZ};
use smu_bridge::{Bridge, BridgeConfig, SerialPort};

const XTAL_FREQ_HZ: u32 = 12_000_000u32;

/// UART0 with a millisecond receive timeout measured on the system timer.
struct PicoSerial<D: hal::uart::UartDevice, P: hal::uart::ValidUartPinout<D>> {
    uart: UartPeripheral<hal::uart::Enabled, D, P>,
    timer: hal::Timer,
}

impl<D: hal::uart::UartDevice, P: hal::uart::ValidUartPinout<D>> SerialPort for PicoSerial<D, P> {
    type Error = hal::uart::ReadErrorType;

    fn read_byte(&mut self, timeout_ms: u32) -> Result<Option<u8>, Self::Error> {
        let start = self.timer.get_counter();
        loop {
            match self.uart.read() {
                Ok(byte) => return Ok(Some(byte)),
                Err(nb::Error::Other(e)) => return Err(e),
                Err(nb::Error::WouldBlock) => {
                    if (self.timer.get_counter() - start).to_millis() >= u64::from(timeout_ms) {
                        return Ok(None);
                    }
                }
            }
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        self.uart.write_full_blocking(bytes);
        Ok(())
    }
}

#[entry]
fn main() -> ! {
    // Device-specific setup for Raspberry Pi Pico.
    let mut pac = pac::Peripherals::take().unwrap();
    let mut watchdog = hal::Watchdog::new(pac.WATCHDOG);
    let clocks = hal::clocks::init_clocks_and_plls(
        XTAL_FREQ_HZ,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )
    .ok()
    .unwrap();

    let timer = hal::Timer::new(pac.TIMER, &mut pac.RESETS, &clocks);
    let sio = hal::Sio::new(pac.SIO);
    let pins = rp_pico::Pins::new(
        pac.IO_BANK0,
        pac.PADS_BANK0,
        sio.gpio_bank0,
        &mut pac.RESETS,
    );

    // Host link on GP0 (TX) and GP1 (RX).
    let uart_pins = (
        pins.gpio0.into_function::<hal::gpio::FunctionUart>(),
        pins.gpio1.into_function::<hal::gpio::FunctionUart>(),
    );
    let uart = UartPeripheral::new(pac.UART0, uart_pins, &mut pac.RESETS)
        .enable(
            UartConfig::new(BAUD_RATE.Hz(), DataBits::Eight, None, StopBits::One),
            clocks.peripheral_clock.freq(),
        )
        .unwrap();

    // DAC on I2C0 (GP4/GP5), ADC on I2C1 (GP6/GP7).
    let dac_i2c = hal::I2C::i2c0(
        pac.I2C0,
        pins.gpio4
            .into_function::<hal::gpio::FunctionI2C>()
            .into_pull_type::<hal::gpio::PullUp>(),
        pins.gpio5
            .into_function::<hal::gpio::FunctionI2C>()
            .into_pull_type::<hal::gpio::PullUp>(),
        I2C_FREQUENCY_HZ.Hz(),
        &mut pac.RESETS,
        &clocks.peripheral_clock,
    );
    let adc_i2c = hal::I2C::i2c1(
        pac.I2C1,
        pins.gpio6
            .into_function::<hal::gpio::FunctionI2C>()
            .into_pull_type::<hal::gpio::PullUp>(),
        pins.gpio7
            .into_function::<hal::gpio::FunctionI2C>()
            .into_pull_type::<hal::gpio::PullUp>(),
        I2C_FREQUENCY_HZ.Hz(),
        &mut pac.RESETS,
        &clocks.peripheral_clock,
    );

    let serial = PicoSerial { uart, timer };
    let bridge = Bridge::new(serial, dac_i2c, Some(adc_i2c), timer, BridgeConfig::new());
    bridge.start()
}
