//! Internal constants, HID command codes, and report offsets.

// Default Vendor/Product IDs
/// Microchip Technology vendor ID, the MCP2221 factory default.
pub const MICROCHIP_VID: u16 = 0x04D8;
/// Factory default product ID of the MCP2221/MCP2221A.
pub const MCP2221_PID: u16 = 0x00DD;

/// Number of general-purpose pins (GP0-GP3).
pub const GP_PIN_COUNT: usize = 4;
/// Lowest pin that can be routed to the ADC (GP1 = ADC1).
pub const FIRST_ANALOG_PIN: u8 = 1;

// Every command and response is a single 64-byte HID report.
pub const REPORT_SIZE: usize = 64;
pub const HID_READ_TIMEOUT_MS: i32 = 1000;

// --- HID command codes (datasheet section 3.1) ---
pub const CMD_STATUS_SET_PARAMETERS: u8 = 0x10;
pub const CMD_SET_GPIO_OUTPUT_VALUES: u8 = 0x50;
pub const CMD_GET_GPIO_VALUES: u8 = 0x51;
pub const CMD_SET_SRAM_SETTINGS: u8 = 0x60;
pub const CMD_GET_SRAM_SETTINGS: u8 = 0x61;

/// Response byte 1 of every command.
pub const RESPONSE_SUCCESS: u8 = 0x00;

pub mod status {
    /// ADC channel 1 (GP1) little-endian code; channels 2 and 3 follow.
    pub const ADC_CH1_LSB: usize = 50;
}

pub mod gpio_values {
    /// Get GPIO Values: GP0 level at byte 2, GP0 direction at byte 3, then pairs per pin.
    pub const FIRST_PIN_OFFSET: usize = 2;
    pub const DIRECTION_OUTPUT: u8 = 0x00;
    pub const DIRECTION_INPUT: u8 = 0x01;
    /// Direction byte reported for a pin not designated as GPIO.
    pub const NOT_GPIO: u8 = 0xEE;

    /// Set GPIO Output Values: four bytes per pin starting at byte 2
    /// (alter output, output value, alter direction, direction).
    pub const SET_FIRST_PIN_OFFSET: usize = 2;
    pub const ALTER: u8 = 0x01;
}

pub mod sram {
    /// Set SRAM Settings: ADC voltage reference byte.
    pub const SET_ADC_REFERENCE: usize = 5;
    /// Set SRAM Settings: "alter GP designation" byte, followed by GP0..GP3.
    pub const SET_ALTER_GP: usize = 7;
    pub const SET_GP0: usize = 8;
    /// Get SRAM Settings: GP0..GP3 designation bytes.
    pub const GET_GP0: usize = 22;

    pub const ALTER_BIT: u8 = 1 << 7;
    pub const VRM_LEVEL_SHIFT: u8 = 1;
    pub const REFERENCE_VRM: u8 = 1 << 0;

    pub const GP_DESIGNATION_MASK: u8 = 0b0000_0111;
    pub const GP_DESIGNATION_GPIO: u8 = 0b000;
    /// ADC1/ADC2/ADC3 share the same designation code on GP1-GP3.
    pub const GP_DESIGNATION_ADC: u8 = 0b010;
    pub const GP_DIRECTION_INPUT: u8 = 1 << 3;
    pub const GP_OUTPUT_HIGH: u8 = 1 << 4;
}
