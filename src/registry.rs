//! Owns the device sessions and builds endpoint groups from configuration.

use crate::config::{DeviceConfig, IntegrationConfig, SensorConfig};
use crate::driver::{DeviceId, DriverFactory};
use crate::endpoint::{
    AnalogInputEndpoint, DigitalInputEndpoint, DigitalOutputEndpoint, Pollable, ValueTransform,
};
use crate::error::{Error, Result};
use crate::gpio::{AdcReference, GpPin};
use crate::session::DeviceSession;
use log::{debug, error, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Supplies the value transform of an analog sensor, typically by compiling
/// its `value_template`. Return `None` to report raw ADC codes.
pub type TransformProvider<'a> = &'a dyn Fn(&SensorConfig, AdcReference) -> Option<ValueTransform>;

/// Transform provider reporting raw ADC codes for every sensor.
pub fn raw_codes(_: &SensorConfig, _: AdcReference) -> Option<ValueTransform> {
    None
}

/// Endpoints attached to one device by one load.
#[derive(Debug)]
pub struct LoadedDevice {
    pub session: Arc<DeviceSession>,
    pub switches: Vec<Arc<DigitalOutputEndpoint>>,
    pub binary_sensors: Vec<Arc<DigitalInputEndpoint>>,
    pub sensors: Vec<Arc<AnalogInputEndpoint>>,
}

impl LoadedDevice {
    pub fn id(&self) -> DeviceId {
        self.session.id()
    }

    /// Endpoints a [`PollScheduler`](crate::PollScheduler) should refresh.
    pub fn pollables(&self) -> Vec<Arc<dyn Pollable>> {
        let binary = self
            .binary_sensors
            .iter()
            .map(|e| e.clone() as Arc<dyn Pollable>);
        let analog = self.sensors.iter().map(|e| e.clone() as Arc<dyn Pollable>);
        binary.chain(analog).collect()
    }

    /// Drops this load's endpoints, releasing their pin claims once no
    /// other holder (e.g. a running scheduler) keeps them alive.
    pub fn detach(self) {
        debug!(
            "Detaching {} endpoint(s) from {}",
            self.switches.len() + self.binary_sensors.len() + self.sensors.len(),
            self.session.id()
        );
    }
}

/// Outcome of [`DeviceRegistry::load`]. Failed devices are skipped; the
/// others load regardless.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<DeviceId>,
    pub failed: Vec<(DeviceId, Error)>,
}

/// Sessions keyed by device identity, plus the endpoints of the current load.
///
/// A session survives reloads as long as its identity stays configured, so
/// the device is not re-enumerated and its pin table is kept.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    sessions: HashMap<DeviceId, Arc<DeviceSession>>,
    devices: Vec<LoadedDevice>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self, id: DeviceId) -> Option<Arc<DeviceSession>> {
        self.sessions.get(&id).cloned()
    }

    /// Device groups attached by the last load.
    pub fn devices(&self) -> &[LoadedDevice] {
        &self.devices
    }

    /// Every pollable endpoint of the last load.
    pub fn pollables(&self) -> Vec<Arc<dyn Pollable>> {
        self.devices.iter().flat_map(|d| d.pollables()).collect()
    }

    /// Validates, opens and attaches every configured device.
    ///
    /// Endpoints of a previous load are detached first; sessions whose
    /// identity is still configured are reused. A device whose
    /// configuration is invalid, whose identity is listed twice, or which
    /// cannot be opened is logged and skipped without attaching any of its
    /// endpoints. Sessions of devices no longer configured are dropped.
    pub fn load(
        &mut self,
        config: &IntegrationConfig,
        factory: &mut dyn DriverFactory,
        transforms: TransformProvider<'_>,
    ) -> LoadReport {
        self.detach_all();
        let mut report = LoadReport::default();
        let mut seen = HashSet::new();

        for device_config in &config.devices {
            let id = device_config.device_id();
            let result = if seen.insert(id) {
                self.load_device(id, device_config, factory, transforms)
            } else {
                Err(Error::DuplicateDevice { id: id.to_string() })
            };
            match result {
                Ok(device) => {
                    info!(
                        "Loaded device {}: {} switch(es), {} binary sensor(s), {} sensor(s)",
                        id,
                        device.switches.len(),
                        device.binary_sensors.len(),
                        device.sensors.len()
                    );
                    self.devices.push(device);
                    report.loaded.push(id);
                }
                Err(e) => {
                    error!("Device {} not loaded: {}", id, e);
                    report.failed.push((id, e));
                }
            }
        }

        let before = self.sessions.len();
        self.sessions.retain(|id, _| seen.contains(id));
        if self.sessions.len() < before {
            debug!("Dropped {} unconfigured session(s)", before - self.sessions.len());
        }
        report
    }

    /// Detaches every endpoint of the current load. Sessions are kept.
    pub fn detach_all(&mut self) {
        for device in self.devices.drain(..) {
            device.detach();
        }
    }

    /// Loads `config` in place of the current one, reusing sessions whose
    /// identity is unchanged. Stop any scheduler holding the old endpoints first.
    pub fn reload(
        &mut self,
        config: &IntegrationConfig,
        factory: &mut dyn DriverFactory,
        transforms: TransformProvider<'_>,
    ) -> LoadReport {
        info!("Reloading {} device(s)", config.devices.len());
        if config.devices.is_empty() {
            warn!("Nothing to reload");
        }
        self.load(config, factory, transforms)
    }

    fn open_session(
        &mut self,
        id: DeviceId,
        factory: &mut dyn DriverFactory,
    ) -> Result<Arc<DeviceSession>> {
        if let Some(session) = self.sessions.get(&id) {
            debug!("Reusing session for {}", id);
            return Ok(session.clone());
        }
        let driver = factory.open(id)?;
        let session = Arc::new(DeviceSession::new(id, driver));
        self.sessions.insert(id, session.clone());
        Ok(session)
    }

    // All-or-nothing: endpoints attached before a failure are dropped again.
    fn load_device(
        &mut self,
        id: DeviceId,
        config: &DeviceConfig,
        factory: &mut dyn DriverFactory,
        transforms: TransformProvider<'_>,
    ) -> Result<LoadedDevice> {
        debug!("Loading config for device {}", id);
        config.validate()?;
        let session = self.open_session(id, factory)?;

        let mut device = LoadedDevice {
            session: session.clone(),
            switches: Vec::new(),
            binary_sensors: Vec::new(),
            sensors: Vec::new(),
        };
        for switch in &config.switches {
            let endpoint = DigitalOutputEndpoint::new(
                session.clone(),
                GpPin::new(switch.pin)?,
                &switch.name,
            )?;
            device.switches.push(Arc::new(endpoint));
        }
        for sensor in &config.binary_sensors {
            let endpoint = DigitalInputEndpoint::new(
                session.clone(),
                GpPin::new(sensor.pin)?,
                &sensor.name,
                sensor.inverted,
                sensor.scan_interval,
            )?;
            device.binary_sensors.push(Arc::new(endpoint));
        }
        if let Some(adc) = &config.adc {
            for sensor in &adc.sensors {
                let endpoint = AnalogInputEndpoint::new(
                    session.clone(),
                    GpPin::new_analog(sensor.pin)?,
                    &sensor.name,
                    adc.adc_ref,
                    transforms(sensor, adc.adc_ref),
                    sensor.scan_interval,
                )?;
                device.sensors.push(Arc::new(endpoint));
            }
        }
        Ok(device)
    }
}
