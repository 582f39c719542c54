//! Configuration-time pin conflict detection.

use crate::error::{Error, Result};
use crate::gpio::GpPin;
use log::error;
use std::collections::HashSet;

/// Logical role of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointRole {
    Output,
    DigitalInput,
    AnalogInput,
}

/// Pin and role of one endpoint destined for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointDef {
    pub pin: u8,
    pub role: EndpointRole,
}

impl EndpointDef {
    pub fn new(pin: u8, role: EndpointRole) -> Self {
        EndpointDef { pin, role }
    }

    /// Checks the role-dependent pin range (digital GP0-GP3, analog GP1-GP3).
    pub fn gp_pin(&self) -> Result<GpPin> {
        match self.role {
            EndpointRole::AnalogInput => GpPin::new_analog(self.pin),
            EndpointRole::Output | EndpointRole::DigitalInput => GpPin::new(self.pin),
        }
    }
}

/// Rejects endpoint sets that assign one pin twice.
pub struct PinAllocator;

impl PinAllocator {
    /// Validates every endpoint of one device, gathered across all roles
    /// before any of them is attached.
    ///
    /// Fails on the first pin out of range for its role, or with
    /// [`Error::DuplicatePin`] on the first pin seen twice. Either failure
    /// must abort the whole device's load.
    pub fn validate(defs: &[EndpointDef]) -> Result<()> {
        let mut used_pins = HashSet::new();
        for def in defs {
            let pin = def.gp_pin()?;
            if !used_pins.insert(pin) {
                error!("Duplicate pin {}", pin);
                return Err(Error::DuplicatePin { pin: pin.number() });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use EndpointRole::*;

    #[test]
    fn test_output_sharing_input_pin_rejected() {
        let defs = [
            EndpointDef::new(0, DigitalInput),
            EndpointDef::new(1, DigitalInput),
            EndpointDef::new(2, DigitalInput),
            EndpointDef::new(2, Output),
        ];
        assert!(matches!(
            PinAllocator::validate(&defs),
            Err(Error::DuplicatePin { pin: 2 })
        ));
    }

    #[test]
    fn test_distinct_pins_accepted() {
        let defs = [
            EndpointDef::new(0, DigitalInput),
            EndpointDef::new(1, DigitalInput),
            EndpointDef::new(2, DigitalInput),
            EndpointDef::new(3, Output),
        ];
        assert!(PinAllocator::validate(&defs).is_ok());
        assert!(PinAllocator::validate(&[]).is_ok());
    }

    #[test]
    fn test_conflict_across_analog_and_output() {
        let defs = [EndpointDef::new(3, AnalogInput), EndpointDef::new(3, Output)];
        assert!(matches!(
            PinAllocator::validate(&defs),
            Err(Error::DuplicatePin { pin: 3 })
        ));
    }

    #[test]
    fn test_role_ranges() {
        assert!(PinAllocator::validate(&[EndpointDef::new(0, AnalogInput)]).is_err());
        assert!(PinAllocator::validate(&[EndpointDef::new(4, Output)]).is_err());
        assert!(PinAllocator::validate(&[EndpointDef::new(0, Output)]).is_ok());
    }

    #[test]
    fn test_every_pair_of_equal_pins_conflicts() {
        for a in 0..4u8 {
            for b in 0..4u8 {
                let defs = [EndpointDef::new(a, Output), EndpointDef::new(b, DigitalInput)];
                assert_eq!(PinAllocator::validate(&defs).is_err(), a == b);
            }
        }
    }
}
