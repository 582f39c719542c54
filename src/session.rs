//! Exclusive access to one physical device and its pin-mode table.

use crate::consts;
use crate::driver::{DeviceId, Driver};
use crate::error::{analog_pin_out_of_range, Error, Result};
use crate::gpio::{AdcReference, DriverMode, GpPin, PinMode, PinState};
use log::{debug, info, trace};
use std::sync::{Mutex, MutexGuard};

struct SessionInner {
    driver: Box<dyn Driver>,
    pins: [PinState; consts::GP_PIN_COUNT],
    claimed: [bool; consts::GP_PIN_COUNT],
    reference: Option<AdcReference>,
}

/// Serializes every command sent to one MCP2221 and owns the authoritative
/// pin-mode table for it.
///
/// All transport operations, reads included, run with the session lock held,
/// so no two commands ever overlap on the wire. The lock is a scoped guard
/// and is released on every exit path, transport errors included.
///
/// Endpoints hold the session through an `Arc` and never see the pin table
/// directly; every mode query or transition goes through this API.
pub struct DeviceSession {
    id: DeviceId,
    inner: Mutex<SessionInner>,
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession").field("id", &self.id).finish()
    }
}

impl DeviceSession {
    /// Wraps an opened driver. All pins start as [`PinMode::Unconfigured`]
    /// in the table regardless of their physical state.
    pub fn new(id: DeviceId, driver: Box<dyn Driver>) -> Self {
        debug!("Creating session for device {}", id);
        DeviceSession {
            id,
            inner: Mutex::new(SessionInner {
                driver,
                pins: [PinState::default(); consts::GP_PIN_COUNT],
                claimed: [false; consts::GP_PIN_COUNT],
                reference: None,
            }),
        }
    }

    /// Identity of the device behind this session.
    pub fn id(&self) -> DeviceId {
        self.id
    }

    fn lock(&self) -> Result<MutexGuard<'_, SessionInner>> {
        self.inner.lock().map_err(|_| Error::SessionPoisoned)
    }

    // Table queries never touch the transport; recover from poisoning since
    // the table itself is only ever written after a completed command.
    fn lock_table(&self) -> MutexGuard<'_, SessionInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // --- Pin claims ---

    /// Records that an endpoint owns `pin`. Fails if another endpoint already does.
    pub fn claim(&self, pin: GpPin) -> Result<()> {
        let mut inner = self.lock_table();
        if inner.claimed[pin.index()] {
            return Err(Error::PinInUse { pin: pin.number() });
        }
        inner.claimed[pin.index()] = true;
        trace!("{} claimed {}", self.id, pin);
        Ok(())
    }

    /// Releases an endpoint's claim. The physical pin mode is left as is.
    pub fn release(&self, pin: GpPin) {
        self.lock_table().claimed[pin.index()] = false;
        trace!("{} released {}", self.id, pin);
    }

    pub fn is_claimed(&self, pin: GpPin) -> bool {
        self.lock_table().claimed[pin.index()]
    }

    // --- Mode transitions ---

    /// Transitions `pin` to `mode`.
    ///
    /// When claiming a pin as [`PinMode::DigitalOutput`] that is already an
    /// output (left so by an earlier endpoint, a previous process or the
    /// firmware defaults), its current level is read back and retained
    /// instead of forcing `initial`, so a relay does not glitch on reload.
    /// Otherwise outputs start at `initial`.
    pub fn configure_pin(&self, pin: GpPin, mode: PinMode, initial: bool) -> Result<()> {
        if mode == PinMode::AnalogInput && !pin.supports_analog() {
            return Err(analog_pin_out_of_range(pin.number()));
        }
        let mut inner = self.lock()?;
        let inner = &mut *inner;

        let mut level = initial;
        if mode == PinMode::DigitalOutput {
            let current = match inner.pins[pin.index()].mode {
                PinMode::Unconfigured => PinMode::from(inner.driver.pin_mode(pin)?),
                known => known,
            };
            if current == PinMode::DigitalOutput {
                level = inner.driver.read_pin(pin)?;
                info!(
                    "{} on {} is already an output, retaining level {}",
                    pin, self.id, level
                );
            }
        }

        inner.driver.configure_pin(pin, mode.driver_mode(), level)?;
        let state = &mut inner.pins[pin.index()];
        state.mode = mode;
        state.last_value = match mode {
            PinMode::DigitalOutput => Some(level as u16),
            _ => None,
        };
        debug!("{} {} -> {:?}", self.id, pin, mode);
        Ok(())
    }

    /// Current mode of `pin` from the table. No device I/O.
    pub fn pin_mode(&self, pin: GpPin) -> PinMode {
        self.lock_table().pins[pin.index()].mode
    }

    /// Full table entry of `pin`. No device I/O.
    pub fn pin_state(&self, pin: GpPin) -> PinState {
        self.lock_table().pins[pin.index()]
    }

    // --- Transport operations ---

    /// Drives an output pin. Writes on one device are totally ordered by
    /// lock acquisition.
    pub fn write(&self, pin: GpPin, value: bool) -> Result<()> {
        let mut inner = self.lock()?;
        inner.driver.write_pin(pin, value)?;
        inner.pins[pin.index()].last_value = Some(value as u16);
        trace!("{} wrote {} = {}", self.id, pin, value);
        Ok(())
    }

    /// Reads the level of a GPIO pin.
    pub fn read(&self, pin: GpPin) -> Result<bool> {
        let mut inner = self.lock()?;
        let value = inner.driver.read_pin(pin)?;
        inner.pins[pin.index()].last_value = Some(value as u16);
        Ok(value)
    }

    /// Reads the raw ADC code of the channel on `pin` (GP1-GP3).
    pub fn read_analog(&self, pin: GpPin) -> Result<u16> {
        if !pin.supports_analog() {
            return Err(analog_pin_out_of_range(pin.number()));
        }
        let mut inner = self.lock()?;
        let code = inner.driver.read_analog(pin)?;
        inner.pins[pin.index()].last_value = Some(code);
        Ok(code)
    }

    /// Sets the device-wide ADC reference. Last writer wins; every analog
    /// endpoint of the device shares the value.
    pub fn set_analog_reference(&self, reference: AdcReference) -> Result<()> {
        let mut inner = self.lock()?;
        inner.driver.set_analog_reference(reference)?;
        if inner.reference.is_some_and(|r| r != reference) {
            info!("{} ADC reference changed to {}", self.id, reference);
        }
        inner.reference = Some(reference);
        Ok(())
    }

    /// The ADC reference last set through this session.
    pub fn analog_reference(&self) -> Option<AdcReference> {
        self.lock_table().reference
    }

    /// Asks the device which designation `pin` currently has, bypassing the table.
    pub fn query_device_mode(&self, pin: GpPin) -> Result<DriverMode> {
        self.lock()?.driver.pin_mode(pin)
    }
}
