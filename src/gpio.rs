use crate::consts;
use crate::error::{analog_pin_out_of_range, Error, Result};
use serde::Deserialize;
use std::fmt;

/// Represents a valid GP pin number (0-3).
/// Use `GpPin::new(num)` to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpPin(u8);

impl GpPin {
    /// Creates a new GpPin, returning an error if the number is out of range (0-3).
    pub fn new(pin_num: u8) -> Result<Self> {
        if (pin_num as usize) < consts::GP_PIN_COUNT {
            Ok(GpPin(pin_num))
        } else {
            Err(Error::PinArgumentOutOfRange {
                pin: pin_num,
                message: "Pin number must be 0-3".to_string(),
            })
        }
    }

    /// Creates a pin that can be routed to the ADC (GP1-GP3).
    pub fn new_analog(pin_num: u8) -> Result<Self> {
        let pin = Self::new(pin_num)?;
        if pin_num < consts::FIRST_ANALOG_PIN {
            return Err(analog_pin_out_of_range(pin_num));
        }
        Ok(pin)
    }

    /// Returns the underlying pin number (0-3).
    #[inline]
    pub fn number(&self) -> u8 {
        self.0
    }

    /// Returns the pin number as a table index.
    #[inline]
    pub(crate) fn index(&self) -> usize {
        self.0 as usize
    }

    /// Whether this pin has an ADC channel.
    #[inline]
    pub fn supports_analog(&self) -> bool {
        self.0 >= consts::FIRST_ANALOG_PIN
    }

    /// Iterates over all four GP pins.
    pub fn all() -> impl Iterator<Item = GpPin> {
        (0..consts::GP_PIN_COUNT as u8).map(GpPin)
    }
}

impl fmt::Display for GpPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GP{}", self.0)
    }
}

/// Mode of a pin as tracked by a [`DeviceSession`](crate::DeviceSession).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PinMode {
    #[default]
    Unconfigured,
    DigitalInput,
    DigitalOutput,
    AnalogInput,
}

impl PinMode {
    /// The designation the driver has to program for this mode.
    pub fn driver_mode(self) -> DriverMode {
        match self {
            PinMode::Unconfigured => DriverMode::Unconfigured,
            PinMode::DigitalInput => DriverMode::Input,
            PinMode::DigitalOutput => DriverMode::Output,
            PinMode::AnalogInput => DriverMode::Adc,
        }
    }
}

impl From<DriverMode> for PinMode {
    fn from(mode: DriverMode) -> Self {
        match mode {
            DriverMode::Unconfigured => PinMode::Unconfigured,
            DriverMode::Input => PinMode::DigitalInput,
            DriverMode::Output => PinMode::DigitalOutput,
            DriverMode::Adc => PinMode::AnalogInput,
        }
    }
}

/// Pin designation as reported or programmed by a [`Driver`](crate::Driver).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverMode {
    Input,
    Output,
    Adc,
    /// Dedicated function or anything this crate does not drive.
    Unconfigured,
}

/// One entry of the session's pin table.
///
/// `last_value` is an advisory cache of the last level or ADC code seen on
/// the pin; `None` until the first successful read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PinState {
    pub mode: PinMode,
    pub last_value: Option<u16>,
}

/// ADC voltage reference, shared by all channels of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawReference")]
pub enum AdcReference {
    /// Supply voltage.
    Vdd,
    /// Internal 1.024 V reference.
    V1_024,
    /// Internal 2.048 V reference.
    V2_048,
    /// Internal 4.096 V reference.
    V4_096,
}

impl AdcReference {
    /// Reference voltage in volts, `None` for VDD (depends on the supply).
    pub fn volts(self) -> Option<f64> {
        match self {
            AdcReference::Vdd => None,
            AdcReference::V1_024 => Some(1.024),
            AdcReference::V2_048 => Some(2.048),
            AdcReference::V4_096 => Some(4.096),
        }
    }

    /// Encoded byte for the Set SRAM Settings ADC reference field.
    pub(crate) fn sram_bits(self) -> u8 {
        use consts::sram::{ALTER_BIT, REFERENCE_VRM, VRM_LEVEL_SHIFT};
        let level: u8 = match self {
            AdcReference::Vdd => return ALTER_BIT,
            AdcReference::V1_024 => 0b01,
            AdcReference::V2_048 => 0b10,
            AdcReference::V4_096 => 0b11,
        };
        ALTER_BIT | (level << VRM_LEVEL_SHIFT) | REFERENCE_VRM
    }
}

impl fmt::Display for AdcReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.volts() {
            Some(v) => write!(f, "{:.3}V", v),
            None => f.write_str("VDD"),
        }
    }
}

// Accepts "VDD" or one of the three internal reference voltages.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawReference {
    Name(String),
    Volts(f64),
}

impl TryFrom<RawReference> for AdcReference {
    type Error = String;

    fn try_from(raw: RawReference) -> std::result::Result<Self, Self::Error> {
        let volts = match raw {
            RawReference::Name(name) if name.eq_ignore_ascii_case("vdd") => {
                return Ok(AdcReference::Vdd)
            }
            RawReference::Name(name) => name
                .trim_end_matches(['V', 'v'])
                .parse::<f64>()
                .map_err(|_| format!("invalid ADC reference '{}'", name))?,
            RawReference::Volts(v) => v,
        };
        [
            AdcReference::V1_024,
            AdcReference::V2_048,
            AdcReference::V4_096,
        ]
        .into_iter()
        .find(|r| r.volts().is_some_and(|rv| (rv - volts).abs() < 1e-6))
        .ok_or_else(|| format!("invalid ADC reference {} (expected VDD, 1.024, 2.048 or 4.096)", volts))
    }
}
