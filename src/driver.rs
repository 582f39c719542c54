//! The raw device contract consumed by [`DeviceSession`](crate::DeviceSession).

use crate::consts;
use crate::error::Result;
use crate::gpio::{AdcReference, DriverMode, GpPin};
use std::fmt;

/// Identity of one physical controller: vendor ID, product ID and its
/// position in the enumeration of devices matching that pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId {
    pub vid: u16,
    pub pid: u16,
    pub index: usize,
}

impl DeviceId {
    pub fn new(vid: u16, pid: u16, index: usize) -> Self {
        DeviceId { vid, pid, index }
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        DeviceId::new(consts::MICROCHIP_VID, consts::MCP2221_PID, 0)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}:{:04X}#{}", self.vid, self.pid, self.index)
    }
}

/// Raw command/response operations of one opened controller.
///
/// Implementations are not expected to be reentrant; the session calls them
/// with its lock held. Any method may fail with a transport error when the
/// device has gone away.
pub trait Driver: Send {
    /// Designates `pin` as GPIO input, GPIO output (driven to `initial`), or ADC.
    fn configure_pin(&mut self, pin: GpPin, mode: DriverMode, initial: bool) -> Result<()>;
    fn write_pin(&mut self, pin: GpPin, value: bool) -> Result<()>;
    fn read_pin(&mut self, pin: GpPin) -> Result<bool>;
    /// Returns the raw 10-bit ADC code of the channel on `pin`.
    fn read_analog(&mut self, pin: GpPin) -> Result<u16>;
    fn set_analog_reference(&mut self, reference: AdcReference) -> Result<()>;
    /// Queries the designation currently in effect on the device.
    fn pin_mode(&mut self, pin: GpPin) -> Result<DriverMode>;
}

impl<D: Driver + ?Sized> Driver for Box<D> {
    fn configure_pin(&mut self, pin: GpPin, mode: DriverMode, initial: bool) -> Result<()> {
        (**self).configure_pin(pin, mode, initial)
    }
    fn write_pin(&mut self, pin: GpPin, value: bool) -> Result<()> {
        (**self).write_pin(pin, value)
    }
    fn read_pin(&mut self, pin: GpPin) -> Result<bool> {
        (**self).read_pin(pin)
    }
    fn read_analog(&mut self, pin: GpPin) -> Result<u16> {
        (**self).read_analog(pin)
    }
    fn set_analog_reference(&mut self, reference: AdcReference) -> Result<()> {
        (**self).set_analog_reference(reference)
    }
    fn pin_mode(&mut self, pin: GpPin) -> Result<DriverMode> {
        (**self).pin_mode(pin)
    }
}

/// Opens drivers by identity. Used by [`DeviceRegistry`](crate::DeviceRegistry)
/// so that hardware and simulated devices load through the same path.
pub trait DriverFactory {
    /// Opens the device, failing with a device-open error if it is absent.
    fn open(&mut self, id: DeviceId) -> Result<Box<dyn Driver>>;
}
