//! In-memory MCP2221 stand-in for tests and for host integrations that
//! want to exercise their wiring without hardware.
//!
//! A [`SimulatedDevice`] is a cheap handle onto shared state: clone it
//! before handing it to a session and keep the clone to preset pin levels,
//! inject faults and inspect the command log.

use crate::driver::{DeviceId, Driver, DriverFactory};
use crate::error::{analog_pin_out_of_range, Error, Result};
use crate::gpio::{AdcReference, DriverMode, GpPin};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// One command received by a [`SimulatedDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Configure(GpPin, DriverMode, bool),
    Write(GpPin, bool),
    Read(GpPin),
    ReadAnalog(GpPin),
    SetReference(AdcReference),
    PinMode(GpPin),
}

#[derive(Debug)]
struct SimState {
    levels: [bool; 4],
    modes: [DriverMode; 4],
    adc_codes: [u16; 4],
    reference: Option<AdcReference>,
    fail: bool,
    log: Vec<Command>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<SimState>,
    in_flight: AtomicBool,
    interleavings: AtomicUsize,
    latency: Mutex<Option<Duration>>,
}

/// Simulated controller implementing [`Driver`].
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    shared: Arc<Shared>,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDevice {
    /// A device with all pins unconfigured and low.
    pub fn new() -> Self {
        SimulatedDevice {
            shared: Arc::new(Shared {
                state: Mutex::new(SimState {
                    levels: [false; 4],
                    modes: [DriverMode::Unconfigured; 4],
                    adc_codes: [0; 4],
                    reference: None,
                    fail: false,
                    log: Vec::new(),
                }),
                in_flight: AtomicBool::new(false),
                interleavings: AtomicUsize::new(0),
                latency: Mutex::new(None),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        // A panicking test thread must not hide the state from the others
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Presets the mode a pin is left in, as if by firmware or a prior process.
    pub fn set_mode(&self, pin: GpPin, mode: DriverMode) {
        self.state().modes[pin.index()] = mode;
    }

    /// Drives the physical level seen on `pin`.
    pub fn set_level(&self, pin: GpPin, level: bool) {
        self.state().levels[pin.index()] = level;
    }

    /// Sets the ADC code returned for `pin`.
    pub fn set_adc_code(&self, pin: GpPin, code: u16) {
        self.state().adc_codes[pin.index()] = code;
    }

    /// While set, every command fails as if the device was unplugged.
    pub fn set_fail(&self, fail: bool) {
        self.state().fail = fail;
    }

    /// Holds each command "on the wire" for `latency` before answering.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self
            .shared
            .latency
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = latency;
    }

    pub fn level(&self, pin: GpPin) -> bool {
        self.state().levels[pin.index()]
    }

    pub fn mode(&self, pin: GpPin) -> DriverMode {
        self.state().modes[pin.index()]
    }

    pub fn reference(&self) -> Option<AdcReference> {
        self.state().reference
    }

    /// Commands received so far, in order.
    pub fn commands(&self) -> Vec<Command> {
        self.state().log.clone()
    }

    /// Number of received commands matching `pred`.
    pub fn count(&self, pred: impl Fn(&Command) -> bool) -> usize {
        self.state().log.iter().filter(|c| pred(c)).count()
    }

    pub fn clear_commands(&self) {
        self.state().log.clear();
    }

    /// How many times a command started before the previous one was answered.
    pub fn interleavings(&self) -> usize {
        self.shared.interleavings.load(Ordering::SeqCst)
    }

    // Models one request/response round trip on a non-reentrant transport.
    fn exchange<T>(&self, command: Command, op: impl FnOnce(&mut SimState) -> Result<T>) -> Result<T> {
        if self.shared.in_flight.swap(true, Ordering::SeqCst) {
            self.shared.interleavings.fetch_add(1, Ordering::SeqCst);
            return Err(Error::Transport(format!(
                "{:?} issued while another command was in flight",
                command
            )));
        }
        let latency = *self
            .shared
            .latency
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match latency {
            Some(d) => std::thread::sleep(d),
            None => std::thread::yield_now(),
        }
        let result = {
            let mut state = self.state();
            state.log.push(command);
            if state.fail {
                Err(Error::Transport("device not available".to_string()))
            } else {
                op(&mut state)
            }
        };
        self.shared.in_flight.store(false, Ordering::SeqCst);
        result
    }
}

impl Driver for SimulatedDevice {
    fn configure_pin(&mut self, pin: GpPin, mode: DriverMode, initial: bool) -> Result<()> {
        self.exchange(Command::Configure(pin, mode, initial), |s| {
            if mode == DriverMode::Adc && !pin.supports_analog() {
                return Err(analog_pin_out_of_range(pin.number()));
            }
            s.modes[pin.index()] = mode;
            if mode == DriverMode::Output {
                s.levels[pin.index()] = initial;
            }
            Ok(())
        })
    }

    fn write_pin(&mut self, pin: GpPin, value: bool) -> Result<()> {
        self.exchange(Command::Write(pin, value), |s| {
            s.levels[pin.index()] = value;
            Ok(())
        })
    }

    fn read_pin(&mut self, pin: GpPin) -> Result<bool> {
        self.exchange(Command::Read(pin), |s| Ok(s.levels[pin.index()]))
    }

    fn read_analog(&mut self, pin: GpPin) -> Result<u16> {
        self.exchange(Command::ReadAnalog(pin), |s| {
            if !pin.supports_analog() {
                return Err(analog_pin_out_of_range(pin.number()));
            }
            Ok(s.adc_codes[pin.index()])
        })
    }

    fn set_analog_reference(&mut self, reference: AdcReference) -> Result<()> {
        self.exchange(Command::SetReference(reference), |s| {
            s.reference = Some(reference);
            Ok(())
        })
    }

    fn pin_mode(&mut self, pin: GpPin) -> Result<DriverMode> {
        self.exchange(Command::PinMode(pin), |s| Ok(s.modes[pin.index()]))
    }
}

/// [`DriverFactory`] handing out registered [`SimulatedDevice`]s.
#[derive(Debug, Default)]
pub struct SimulatedFactory {
    devices: HashMap<DeviceId, SimulatedDevice>,
    opens: HashMap<DeviceId, usize>,
}

impl SimulatedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plugs in a device; returns a handle for inspection.
    pub fn insert(&mut self, id: DeviceId) -> SimulatedDevice {
        self.devices.entry(id).or_default().clone()
    }

    /// Unplugs a device so further opens fail.
    pub fn remove(&mut self, id: DeviceId) {
        self.devices.remove(&id);
    }

    /// How many times `id` has been opened.
    pub fn open_count(&self, id: DeviceId) -> usize {
        self.opens.get(&id).copied().unwrap_or(0)
    }
}

impl DriverFactory for SimulatedFactory {
    fn open(&mut self, id: DeviceId) -> Result<Box<dyn Driver>> {
        let device = self
            .devices
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::DeviceNotFoundByIndex {
                index: id.index,
                message: format!("no simulated device registered as {}", id),
            })?;
        *self.opens.entry(id).or_default() += 1;
        Ok(Box::new(device))
    }
}
