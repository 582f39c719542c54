//! YAML configuration of devices and their endpoints.
//!
//! ```yaml
//! - vid: 0x04D8
//!   pid: 0x00DD
//!   dev: 0
//!   switches:
//!     - name: Pump
//!       pin: 0
//!   binary_sensors:
//!     - name: Door
//!       pin: 1
//!       inverted: true
//!       scan_interval: 5
//!   adc:
//!     adc_ref: 2.048
//!     sensors:
//!       - name: Tank level
//!         pin: 3
//! ```

use crate::allocator::{EndpointDef, EndpointRole, PinAllocator};
use crate::consts;
use crate::driver::DeviceId;
use crate::error::{Error, Result};
use crate::gpio::AdcReference;
use log::debug;
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(30);

/// All configured devices. Accepts a single device entry or a list.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "OneOrMany")]
pub struct IntegrationConfig {
    pub devices: Vec<DeviceConfig>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<DeviceConfig>),
    One(Box<DeviceConfig>),
}

impl From<OneOrMany> for IntegrationConfig {
    fn from(raw: OneOrMany) -> Self {
        let devices = match raw {
            OneOrMany::Many(devices) => devices,
            OneOrMany::One(device) => vec![*device],
        };
        IntegrationConfig { devices }
    }
}

impl IntegrationConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml)?;
        debug!("Parsed configuration for {} device(s)", config.devices.len());
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());
        Self::from_yaml_str(&std::fs::read_to_string(path)?)
    }

    /// Checks every device. Stops at the first invalid entry; use
    /// [`DeviceConfig::validate`] to keep going past a bad device.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for device in &self.devices {
            let id = device.device_id();
            if !seen.insert(id) {
                return Err(Error::DuplicateDevice { id: id.to_string() });
            }
            device.validate()?;
        }
        Ok(())
    }
}

/// One physical device and the endpoints on its pins.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    #[serde(default = "default_vid")]
    pub vid: u16,
    #[serde(default = "default_pid")]
    pub pid: u16,
    /// Index among the devices matching `vid`/`pid`.
    #[serde(default)]
    pub dev: usize,
    #[serde(default)]
    pub switches: Vec<SwitchConfig>,
    #[serde(default)]
    pub binary_sensors: Vec<BinarySensorConfig>,
    #[serde(default)]
    pub adc: Option<AdcConfig>,
}

fn default_vid() -> u16 {
    consts::MICROCHIP_VID
}

fn default_pid() -> u16 {
    consts::MCP2221_PID
}

impl DeviceConfig {
    pub fn device_id(&self) -> DeviceId {
        DeviceId::new(self.vid, self.pid, self.dev)
    }

    /// Pins of every endpoint on this device, across all roles.
    pub fn endpoint_defs(&self) -> Vec<EndpointDef> {
        let switches = self
            .switches
            .iter()
            .map(|s| EndpointDef::new(s.pin, EndpointRole::Output));
        let binary_sensors = self
            .binary_sensors
            .iter()
            .map(|b| EndpointDef::new(b.pin, EndpointRole::DigitalInput));
        let sensors = self
            .adc
            .iter()
            .flat_map(|adc| adc.sensors.iter())
            .map(|s| EndpointDef::new(s.pin, EndpointRole::AnalogInput));
        switches.chain(binary_sensors).chain(sensors).collect()
    }

    /// Pin ranges and conflicts. Nothing may be attached if this fails.
    pub fn validate(&self) -> Result<()> {
        PinAllocator::validate(&self.endpoint_defs())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SwitchConfig {
    pub name: String,
    pub pin: u8,
    pub unique_id: Option<String>,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BinarySensorConfig {
    pub name: String,
    pub pin: u8,
    pub unique_id: Option<String>,
    #[serde(default)]
    pub inverted: bool,
    #[serde(
        default = "default_scan_interval",
        deserialize_with = "deserialize_interval"
    )]
    pub scan_interval: Duration,
    pub icon: Option<String>,
    pub device_class: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdcConfig {
    /// Shared by every sensor of the device.
    pub adc_ref: AdcReference,
    pub sensors: Vec<SensorConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SensorConfig {
    pub name: String,
    pub pin: u8,
    pub unique_id: Option<String>,
    #[serde(
        default = "default_scan_interval",
        deserialize_with = "deserialize_interval"
    )]
    pub scan_interval: Duration,
    pub icon: Option<String>,
    pub device_class: Option<String>,
    #[serde(default = "default_unit")]
    pub unit_of_measurement: String,
    /// Rendered by the host; handed back as a transform at load time.
    pub value_template: Option<String>,
    #[serde(default = "default_state_class")]
    pub state_class: String,
}

fn default_scan_interval() -> Duration {
    DEFAULT_SCAN_INTERVAL
}

fn default_unit() -> String {
    "bit".to_string()
}

fn default_state_class() -> String {
    "measurement".to_string()
}

// Seconds as a number, or "HH:MM:SS" / "MM:SS". Must be positive.
fn deserialize_interval<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawInterval {
        Seconds(f64),
        Text(String),
    }

    let seconds = match RawInterval::deserialize(deserializer)? {
        RawInterval::Seconds(s) => s,
        RawInterval::Text(text) => parse_time_period(&text)
            .ok_or_else(|| D::Error::custom(format!("invalid time period '{}'", text)))?,
    };
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(D::Error::custom("scan_interval must be positive"));
    }
    Duration::try_from_secs_f64(seconds).map_err(D::Error::custom)
}

fn parse_time_period(text: &str) -> Option<f64> {
    let parts: Vec<&str> = text.trim().split(':').collect();
    if parts.len() > 3 {
        return None;
    }
    parts.iter().try_fold(0.0, |total, part| {
        part.trim().parse::<f64>().ok().map(|v| total * 60.0 + v)
    })
}
