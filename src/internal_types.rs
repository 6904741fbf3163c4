// ADS1115 register pointer, the first byte of every write.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[repr(u8)]
pub enum Register {
    Conversion = 0x00,
    Config = 0x01,
    LowThreshold = 0x02,
    HighThreshold = 0x03,
}

impl Register {
    pub fn pointer(self) -> u8 {
        self as u8
    }
}

// Bit positions inside the two config register bytes.
pub const OS_BIT: u8 = 1 << 7;
pub const MUX_SHIFT: u8 = 4;
pub const PGA_SHIFT: u8 = 1;
pub const DR_SHIFT: u8 = 5;
pub const COMP_MODE_SHIFT: u8 = 4;
pub const COMP_POL_SHIFT: u8 = 3;
pub const COMP_LAT_SHIFT: u8 = 2;
