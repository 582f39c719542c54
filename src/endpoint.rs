//! Switch, binary sensor and analog sensor endpoints bound to one pin of a
//! shared [`DeviceSession`].
//!
//! Every endpoint walks the same lifecycle:
//!
//! ```text
//! Uninitialized -> Configured -> Known(value) <-> Unknown
//! ```
//!
//! Construction claims the pin and drives it into the role's mode. A
//! transport failure at that point does not fail construction; the endpoint
//! stays `Uninitialized` and the next refresh or command retries the mode
//! transition. Runtime failures are logged and turn the state `Unknown`
//! until the next successful read or write. Errors never reach the caller
//! of `refresh()` or a command.

use crate::error::Result;
use crate::gpio::{AdcReference, GpPin, PinMode};
use crate::session::DeviceSession;
use log::{debug, error, info};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Value of an endpoint as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading<T> {
    Known(T),
    /// Never read, or the last read/write failed. Distinct from `false`/`0`.
    Unknown,
}

impl<T: Copy> Reading<T> {
    pub fn is_known(&self) -> bool {
        matches!(self, Reading::Known(_))
    }

    pub fn known(&self) -> Option<T> {
        match self {
            Reading::Known(v) => Some(*v),
            Reading::Unknown => None,
        }
    }
}

/// Lifecycle state of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EndpointState<T> {
    /// Pin claimed, mode transition not (yet) performed.
    Uninitialized,
    /// Mode set, no value observed yet.
    Configured,
    Known(T),
    Unknown,
}

impl<T> EndpointState<T> {
    fn is_configured(&self) -> bool {
        !matches!(self, EndpointState::Uninitialized)
    }
}

impl<T: Copy> EndpointState<T> {
    pub fn reading(&self) -> Reading<T> {
        match self {
            EndpointState::Known(v) => Reading::Known(*v),
            _ => Reading::Unknown,
        }
    }
}

/// Endpoints refreshed periodically by a scheduler.
pub trait Pollable: Send + Sync {
    /// Reads the device once and updates the cached state.
    fn refresh(&self);
    fn poll_interval(&self) -> Duration;
    fn name(&self) -> &str;
}

/// Endpoints driven by commands.
pub trait Commandable {
    type Command;
    /// Best effort: failures are logged and reflected in the state.
    fn apply(&self, command: Self::Command);
}

/// Endpoints exposing a cached value.
pub trait Readable {
    type Value: Copy;
    fn current_state(&self) -> Reading<Self::Value>;
}

/// Conversion applied to raw ADC codes, e.g. a unit conversion supplied by the host.
pub type ValueTransform = Arc<dyn Fn(u16) -> f64 + Send + Sync>;

/// Maps a raw 10-bit code to volts for an internal reference.
/// Returns `None` for [`AdcReference::Vdd`], which depends on the supply.
pub fn volts_transform(reference: AdcReference) -> Option<ValueTransform> {
    let full_scale = reference.volts()?;
    Some(Arc::new(move |code: u16| f64::from(code) * full_scale / 1023.0))
}

// Pin claim held by an endpoint; released when the endpoint goes away.
struct PinBinding {
    session: Arc<DeviceSession>,
    pin: GpPin,
    name: String,
}

impl PinBinding {
    fn claim(session: Arc<DeviceSession>, pin: GpPin, name: &str) -> Result<Self> {
        session.claim(pin)?;
        Ok(PinBinding {
            session,
            pin,
            name: name.to_string(),
        })
    }

    // Runs the mode transition if it has not succeeded yet.
    fn ensure_configured<T>(
        &self,
        state: &mut EndpointState<T>,
        configure: impl FnOnce(&DeviceSession, GpPin) -> Result<()>,
    ) -> bool {
        if state.is_configured() {
            return true;
        }
        match configure(&self.session, self.pin) {
            Ok(()) => {
                *state = EndpointState::Configured;
                true
            }
            Err(e) => {
                error!("'{}': cannot configure {}: {}", self.name, self.pin, e);
                false
            }
        }
    }

    // Applies the outcome of a read or write to the state.
    fn settle<T>(&self, state: &mut EndpointState<T>, outcome: Result<T>) {
        *state = match outcome {
            Ok(v) => EndpointState::Known(v),
            Err(e) => {
                error!("'{}' on {}: device not available: {}", self.name, self.pin, e);
                EndpointState::Unknown
            }
        };
    }
}

impl Drop for PinBinding {
    fn drop(&mut self) {
        self.session.release(self.pin);
        debug!("'{}' detached from {}", self.name, self.pin);
    }
}

impl fmt::Debug for PinBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinBinding")
            .field("device", &self.session.id())
            .field("pin", &self.pin)
            .field("name", &self.name)
            .finish()
    }
}

fn lock<T>(state: &Mutex<EndpointState<T>>) -> MutexGuard<'_, EndpointState<T>> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// --- Switch ---

/// Commands accepted by a [`DigitalOutputEndpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputCommand {
    On,
    Off,
}

/// An on/off actuator. State is push-only: it reflects the outcome of the
/// last command and is never polled.
#[derive(Debug)]
pub struct DigitalOutputEndpoint {
    binding: PinBinding,
    state: Mutex<EndpointState<bool>>,
}

impl DigitalOutputEndpoint {
    /// Claims `pin` and makes it an output. A pin that already is an output
    /// keeps its level and the endpoint starts in that state; otherwise it
    /// starts low.
    pub fn new(session: Arc<DeviceSession>, pin: GpPin, name: &str) -> Result<Self> {
        info!("Setting up switch: '{}' on pin {}", name, pin);
        let binding = PinBinding::claim(session, pin, name)?;
        let mut state = EndpointState::Uninitialized;
        if binding.ensure_configured(&mut state, Self::configure) {
            state = Self::retained_state(&binding);
        }
        Ok(Self {
            binding,
            state: Mutex::new(state),
        })
    }

    fn configure(session: &DeviceSession, pin: GpPin) -> Result<()> {
        session.configure_pin(pin, PinMode::DigitalOutput, false)
    }

    fn retained_state(binding: &PinBinding) -> EndpointState<bool> {
        match binding.session.pin_state(binding.pin).last_value {
            Some(level) => EndpointState::Known(level != 0),
            None => EndpointState::Configured,
        }
    }

    pub fn turn_on(&self) {
        self.set(true)
    }

    pub fn turn_off(&self) {
        self.set(false)
    }

    fn set(&self, value: bool) {
        info!("Turn {} {}", if value { "on" } else { "off" }, self.binding.pin);
        let mut state = lock(&self.state);
        if !self.binding.ensure_configured(&mut *state, Self::configure) {
            return;
        }
        let outcome = self.binding.session.write(self.binding.pin, value).map(|_| value);
        self.binding.settle(&mut *state, outcome);
    }

    /// `Known(true)` while on.
    pub fn is_on(&self) -> Reading<bool> {
        self.current_state()
    }

    pub fn state(&self) -> EndpointState<bool> {
        *lock(&self.state)
    }

    pub fn pin(&self) -> GpPin {
        self.binding.pin
    }

    pub fn name(&self) -> &str {
        &self.binding.name
    }

    /// Releases the pin claim. The pin keeps its physical mode and level.
    pub fn detach(self) {}
}

impl Commandable for DigitalOutputEndpoint {
    type Command = OutputCommand;

    fn apply(&self, command: OutputCommand) {
        self.set(command == OutputCommand::On)
    }
}

impl Readable for DigitalOutputEndpoint {
    type Value = bool;

    fn current_state(&self) -> Reading<bool> {
        lock(&self.state).reading()
    }
}

// --- Binary sensor ---

/// A polled binary input. With `inverted` set, the reported state is the
/// negation of the physical level.
#[derive(Debug)]
pub struct DigitalInputEndpoint {
    binding: PinBinding,
    inverted: bool,
    interval: Duration,
    state: Mutex<EndpointState<bool>>,
}

impl DigitalInputEndpoint {
    pub fn new(
        session: Arc<DeviceSession>,
        pin: GpPin,
        name: &str,
        inverted: bool,
        interval: Duration,
    ) -> Result<Self> {
        info!("Setting up binary_sensor: '{}' on pin {}", name, pin);
        let endpoint = Self {
            binding: PinBinding::claim(session, pin, name)?,
            inverted,
            interval,
            state: Mutex::new(EndpointState::Uninitialized),
        };
        endpoint.refresh();
        Ok(endpoint)
    }

    fn configure(session: &DeviceSession, pin: GpPin) -> Result<()> {
        session.configure_pin(pin, PinMode::DigitalInput, false)
    }

    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    pub fn state(&self) -> EndpointState<bool> {
        *lock(&self.state)
    }

    pub fn pin(&self) -> GpPin {
        self.binding.pin
    }

    /// Releases the pin claim. The pin stays an input.
    pub fn detach(self) {}
}

impl Pollable for DigitalInputEndpoint {
    fn refresh(&self) {
        let mut state = lock(&self.state);
        if !self.binding.ensure_configured(&mut *state, Self::configure) {
            return;
        }
        let outcome = self
            .binding
            .session
            .read(self.binding.pin)
            .map(|level| level ^ self.inverted);
        self.binding.settle(&mut *state, outcome);
    }

    fn poll_interval(&self) -> Duration {
        self.interval
    }

    fn name(&self) -> &str {
        &self.binding.name
    }
}

impl Readable for DigitalInputEndpoint {
    type Value = bool;

    fn current_state(&self) -> Reading<bool> {
        lock(&self.state).reading()
    }
}

// --- Analog sensor ---

/// A polled ADC channel (GP1-GP3).
pub struct AnalogInputEndpoint {
    binding: PinBinding,
    reference: AdcReference,
    transform: Option<ValueTransform>,
    interval: Duration,
    state: Mutex<EndpointState<f64>>,
}

impl fmt::Debug for AnalogInputEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalogInputEndpoint")
            .field("binding", &self.binding)
            .field("reference", &self.reference)
            .field("transform", &self.transform.is_some())
            .field("interval", &self.interval)
            .field("state", &self.state)
            .finish()
    }
}

impl AnalogInputEndpoint {
    /// Claims `pin`, sets the device-wide ADC `reference` and routes the pin
    /// to the ADC. `pin` must support analog input.
    pub fn new(
        session: Arc<DeviceSession>,
        pin: GpPin,
        name: &str,
        reference: AdcReference,
        transform: Option<ValueTransform>,
        interval: Duration,
    ) -> Result<Self> {
        info!("Setting up sensor: '{}' on pin {}", name, pin);
        let pin = GpPin::new_analog(pin.number())?;
        let endpoint = Self {
            binding: PinBinding::claim(session, pin, name)?,
            reference,
            transform,
            interval,
            state: Mutex::new(EndpointState::Uninitialized),
        };
        endpoint.refresh();
        Ok(endpoint)
    }

    fn configure(&self, session: &DeviceSession, pin: GpPin) -> Result<()> {
        session.set_analog_reference(self.reference)?;
        session.configure_pin(pin, PinMode::AnalogInput, false)
    }

    fn convert(&self, code: u16) -> f64 {
        match &self.transform {
            Some(transform) => transform(code),
            None => f64::from(code),
        }
    }

    /// Last converted value.
    pub fn current_value(&self) -> Reading<f64> {
        self.current_state()
    }

    pub fn reference(&self) -> AdcReference {
        self.reference
    }

    pub fn state(&self) -> EndpointState<f64> {
        *lock(&self.state)
    }

    pub fn pin(&self) -> GpPin {
        self.binding.pin
    }

    /// Releases the pin claim. The pin stays routed to the ADC.
    pub fn detach(self) {}
}

impl Pollable for AnalogInputEndpoint {
    fn refresh(&self) {
        let mut state = lock(&self.state);
        if !self
            .binding
            .ensure_configured(&mut *state, |session, pin| self.configure(session, pin))
        {
            return;
        }
        let outcome = self
            .binding
            .session
            .read_analog(self.binding.pin)
            .map(|code| self.convert(code));
        self.binding.settle(&mut *state, outcome);
    }

    fn poll_interval(&self) -> Duration {
        self.interval
    }

    fn name(&self) -> &str {
        &self.binding.name
    }
}

impl Readable for AnalogInputEndpoint {
    type Value = f64;

    fn current_state(&self) -> Reading<f64> {
        lock(&self.state).reading()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DeviceId;
    use crate::gpio::DriverMode;
    use crate::mock::{Command, SimulatedDevice};
    use approx::assert_relative_eq;

    const INTERVAL: Duration = Duration::from_secs(30);

    fn session() -> (Arc<DeviceSession>, SimulatedDevice) {
        let sim = SimulatedDevice::new();
        let session = DeviceSession::new(DeviceId::default(), Box::new(sim.clone()));
        (Arc::new(session), sim)
    }

    fn pin(n: u8) -> GpPin {
        GpPin::new(n).unwrap()
    }

    #[test]
    fn test_configured_states() {
        // Any payload type, not only Copy ones
        assert!(!EndpointState::<String>::Uninitialized.is_configured());
        assert!(EndpointState::<String>::Configured.is_configured());
        assert!(EndpointState::Known(String::from("on")).is_configured());
        assert!(EndpointState::<String>::Unknown.is_configured());
    }

    #[test]
    fn test_switch_starts_off_on_fresh_pin() {
        let (session, sim) = session();
        let switch = DigitalOutputEndpoint::new(session.clone(), pin(0), "relay").unwrap();
        assert_eq!(switch.is_on(), Reading::Known(false));
        assert_eq!(sim.mode(pin(0)), DriverMode::Output);
        assert_eq!(session.pin_mode(pin(0)), PinMode::DigitalOutput);
    }

    #[test]
    fn test_turn_on_twice_issues_two_writes() {
        let (session, sim) = session();
        let switch = DigitalOutputEndpoint::new(session, pin(1), "relay").unwrap();
        sim.clear_commands();
        switch.turn_on();
        switch.turn_on();
        assert_eq!(switch.is_on(), Reading::Known(true));
        assert_eq!(sim.count(|c| matches!(c, Command::Write(..))), 2);
    }

    #[test]
    fn test_switch_takeover_keeps_level() {
        let (session, sim) = session();
        sim.set_mode(pin(2), DriverMode::Output);
        sim.set_level(pin(2), true);
        let switch = DigitalOutputEndpoint::new(session, pin(2), "relay").unwrap();
        assert_eq!(switch.is_on(), Reading::Known(true));
        assert!(sim.level(pin(2)));
    }

    #[test]
    fn test_switch_failure_is_unknown_not_raised() {
        let (session, sim) = session();
        let switch = DigitalOutputEndpoint::new(session, pin(0), "relay").unwrap();
        sim.set_fail(true);
        switch.apply(OutputCommand::On);
        assert_eq!(switch.is_on(), Reading::Unknown);
        sim.set_fail(false);
        switch.apply(OutputCommand::Off);
        assert_eq!(switch.is_on(), Reading::Known(false));
    }

    #[test]
    fn test_switch_created_while_unplugged_configures_on_first_command() {
        let (session, sim) = session();
        sim.set_fail(true);
        let switch = DigitalOutputEndpoint::new(session.clone(), pin(3), "relay").unwrap();
        assert_eq!(switch.state(), EndpointState::Uninitialized);
        assert_eq!(session.pin_mode(pin(3)), PinMode::Unconfigured);

        sim.set_fail(false);
        switch.turn_on();
        assert_eq!(switch.is_on(), Reading::Known(true));
        assert_eq!(session.pin_mode(pin(3)), PinMode::DigitalOutput);
    }

    #[test]
    fn test_binary_sensor_inversion() {
        for inverted in [false, true] {
            for raw in [false, true] {
                let (session, sim) = session();
                sim.set_level(pin(1), raw);
                let sensor =
                    DigitalInputEndpoint::new(session, pin(1), "door", inverted, INTERVAL).unwrap();
                assert_eq!(sensor.current_state(), Reading::Known(raw != inverted));
            }
        }
    }

    #[test]
    fn test_binary_sensor_unknown_then_recovers() {
        let (session, sim) = session();
        sim.set_level(pin(0), true);
        let sensor = DigitalInputEndpoint::new(session, pin(0), "door", false, INTERVAL).unwrap();
        assert_eq!(sensor.current_state(), Reading::Known(true));

        sim.set_fail(true);
        sensor.refresh();
        assert_eq!(sensor.current_state(), Reading::Unknown);

        sim.set_fail(false);
        sim.set_level(pin(0), false);
        sensor.refresh();
        assert_eq!(sensor.current_state(), Reading::Known(false));
    }

    #[test]
    fn test_binary_sensor_initial_read_failure_does_not_fail_construction() {
        let (session, sim) = session();
        sim.set_fail(true);
        let sensor = DigitalInputEndpoint::new(session, pin(0), "door", false, INTERVAL).unwrap();
        assert_eq!(sensor.current_state(), Reading::Unknown);
        assert_eq!(sensor.state(), EndpointState::Uninitialized);
    }

    #[test]
    fn test_analog_sensor_sets_reference_and_transforms() {
        let (session, sim) = session();
        sim.set_adc_code(pin(2), 512);
        let transform = volts_transform(AdcReference::V2_048);
        let sensor = AnalogInputEndpoint::new(
            session.clone(),
            pin(2),
            "level",
            AdcReference::V2_048,
            transform,
            INTERVAL,
        )
        .unwrap();
        assert_eq!(sim.reference(), Some(AdcReference::V2_048));
        assert_eq!(session.pin_mode(pin(2)), PinMode::AnalogInput);
        let volts = sensor.current_value().known().unwrap();
        assert_relative_eq!(volts, 512.0 * 2.048 / 1023.0, epsilon = 1e-9);
    }

    #[test]
    fn test_analog_sensor_raw_code_and_failure() {
        let (session, sim) = session();
        sim.set_adc_code(pin(1), 700);
        let sensor =
            AnalogInputEndpoint::new(session, pin(1), "raw", AdcReference::Vdd, None, INTERVAL)
                .unwrap();
        assert_eq!(sensor.current_value(), Reading::Known(700.0));

        sim.set_fail(true);
        sensor.refresh();
        assert_eq!(sensor.current_value(), Reading::Unknown);
        sim.set_fail(false);
        sensor.refresh();
        assert_eq!(sensor.current_value(), Reading::Known(700.0));
    }

    #[test]
    fn test_analog_sensor_rejects_gp0() {
        let (session, _sim) = session();
        assert!(AnalogInputEndpoint::new(
            session.clone(),
            pin(0),
            "bad",
            AdcReference::Vdd,
            None,
            INTERVAL
        )
        .is_err());
        assert!(!session.is_claimed(pin(0)));
    }

    #[test]
    fn test_detach_releases_claim_keeps_mode() {
        let (session, sim) = session();
        let switch = DigitalOutputEndpoint::new(session.clone(), pin(1), "relay").unwrap();
        switch.turn_on();
        assert!(DigitalOutputEndpoint::new(session.clone(), pin(1), "again").is_err());

        switch.detach();
        assert!(!session.is_claimed(pin(1)));
        assert_eq!(sim.mode(pin(1)), DriverMode::Output);
        assert!(sim.level(pin(1)));

        let again = DigitalOutputEndpoint::new(session, pin(1), "again").unwrap();
        assert_eq!(again.is_on(), Reading::Known(true));
    }
}
