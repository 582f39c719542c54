//! # mcp2221-endpoints
//!
//! A Rust crate for sharing the four GP pins of a Microchip MCP2221/MCP2221A
//! USB bridge between independently configured, independently polled
//! endpoints: on/off switches, binary sensors and analog (ADC) sensors.
//!
//! The MCP2221 speaks a strict one-request/one-response HID protocol and
//! cannot have two commands in flight. This crate funnels every endpoint of a
//! device through one [`DeviceSession`], which serializes all commands and
//! keeps the authoritative pin-mode table.
//!
//! ## Features
//!
//! *   Device discovery (`find_all`) and opening by enumeration index (`Mcp2221::open_by_index`).
//! *   Per-device [`DeviceSession`]:
//!     *   Exclusive access for every command, reads included.
//!     *   Pin-mode table (`pin_mode`, `pin_state`) queried without device I/O.
//!     *   Glitch-free takeover of pins that already are outputs (relays keep their state on reload).
//!     *   Device-wide ADC voltage reference (VDD, 1.024 V, 2.048 V, 4.096 V).
//! *   Endpoints:
//!     *   [`DigitalOutputEndpoint`] (`turn_on`, `turn_off`).
//!     *   [`DigitalInputEndpoint`] with optional inversion (`refresh`, `current_state`).
//!     *   [`AnalogInputEndpoint`] with optional value transform (`refresh`, `current_value`).
//!     *   Transport failures turn an endpoint's state `Unknown` instead of raising.
//! *   Configuration-time pin conflict detection ([`PinAllocator`]).
//! *   YAML configuration ([`IntegrationConfig`]) and a [`DeviceRegistry`] for load/reload.
//! *   A thread-based [`PollScheduler`] for hosts without their own timer.
//! *   A [`SimulatedDevice`](mock::SimulatedDevice) for testing without hardware.
//!
//! ## Chip Support & Limitations
//!
//! *   **GPIO:** GP0-GP3, input or output.
//! *   **ADC:** GP1-GP3 only (ADC1-ADC3), 10-bit codes. Attempts to use GP0 as
//!     an analog input return `Error::PinArgumentOutOfRange`.
//! *   Pin designations are changed in SRAM only; flash settings are never written.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use mcp2221_endpoints::{
//!     registry::raw_codes, DeviceRegistry, HidFactory, IntegrationConfig, PollScheduler, Result,
//! };
//!
//! fn main() -> Result<()> {
//!     // Optional: Initialize logging
//!     // env_logger::init();
//!
//!     let config = IntegrationConfig::from_yaml_str(
//!         r#"
//! - switches:
//!     - name: Pump
//!       pin: 0
//!   binary_sensors:
//!     - name: Door
//!       pin: 1
//!       scan_interval: 5
//!   adc:
//!     adc_ref: 2.048
//!     sensors:
//!       - name: Tank level
//!         pin: 3
//! "#,
//!     )?;
//!
//!     let mut factory = HidFactory::new()?;
//!     let mut registry = DeviceRegistry::new();
//!     let report = registry.load(&config, &mut factory, &raw_codes);
//!     for (id, e) in &report.failed {
//!         eprintln!("Device {} not loaded: {}", id, e);
//!     }
//!
//!     let scheduler = PollScheduler::start(registry.pollables())?;
//!     if let Some(pump) = registry.devices().first().and_then(|d| d.switches.first()) {
//!         pump.turn_on();
//!     }
//!     scheduler.stop();
//!     Ok(())
//! }
//! ```
//!
//! ## Hardware Setup Notes
//!
//! *   **Linux udev Rules:** Grant user permission to the HID device. Create `/etc/udev/rules.d/99-mcp2221.rules`:
//!     ```udev
//!     # Rule for Microchip MCP2221/MCP2221A (Default VID/PID 04D8:00DD)
//!     SUBSYSTEM=="hidraw", ATTRS{idVendor}=="04d8", ATTRS{idProduct}=="00dd", MODE="0666", GROUP="plugdev"
//!     ```
//!     Reload: `sudo udevadm control --reload-rules && sudo udevadm trigger`
//! *   **GPIO Voltage Levels:** Follow VDD (3.3 V or 5 V).
//!
//! ## License
//!
//! This project is licensed under the WTFPL.

mod consts;
mod error;
pub mod allocator;
pub mod config;
pub mod device;
pub mod driver;
pub mod endpoint;
pub mod gpio;
pub mod mock;
pub mod registry;
pub mod scheduler;
pub mod session;

pub use allocator::{EndpointDef, EndpointRole, PinAllocator};
pub use config::{AdcConfig, BinarySensorConfig, DeviceConfig, IntegrationConfig, SensorConfig, SwitchConfig};
pub use device::{find_all, HidFactory, Mcp2221, Mcp2221DeviceInfo};
pub use driver::{DeviceId, Driver, DriverFactory};
pub use endpoint::{
    volts_transform, AnalogInputEndpoint, Commandable, DigitalInputEndpoint,
    DigitalOutputEndpoint, EndpointState, OutputCommand, Pollable, Readable, Reading,
    ValueTransform,
};
pub use error::{Error, ErrorCategory, Result};
pub use gpio::{AdcReference, DriverMode, GpPin, PinMode, PinState};
pub use registry::{DeviceRegistry, LoadReport, LoadedDevice};
pub use scheduler::PollScheduler;
pub use session::DeviceSession;
// Re-export only essential public constants
pub use consts::{MCP2221_PID, MICROCHIP_VID};
