//! Load/reload tests for DeviceRegistry using simulated devices.

use mcp2221_endpoints::mock::{Command, SimulatedFactory};
use mcp2221_endpoints::registry::raw_codes;
use mcp2221_endpoints::{
    volts_transform, AdcReference, DeviceId, DeviceRegistry, DriverMode, Error, ErrorCategory,
    GpPin, IntegrationConfig, Readable, Reading, SensorConfig, ValueTransform,
};
use approx::assert_relative_eq;

fn volts(_: &SensorConfig, reference: AdcReference) -> Option<ValueTransform> {
    volts_transform(reference)
}

fn pin(n: u8) -> GpPin {
    GpPin::new(n).unwrap()
}

const TWO_DEVICES: &str = r#"
- dev: 0
  switches:
    - name: Pump
      pin: 0
  binary_sensors:
    - name: Door
      pin: 1
  adc:
    adc_ref: 2.048
    sensors:
      - name: Tank
        pin: 3
- dev: 1
  switches:
    - name: Fan
      pin: 2
"#;

const DUPLICATE_ON_FIRST: &str = r#"
- dev: 0
  switches:
    - name: Relay
      pin: 2
  binary_sensors:
    - name: A
      pin: 0
    - name: B
      pin: 1
    - name: C
      pin: 2
- dev: 1
  switches:
    - name: Fan
      pin: 3
"#;

fn id(index: usize) -> DeviceId {
    DeviceId::new(0x04D8, 0x00DD, index)
}

#[test]
fn test_load_attaches_every_role() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut factory = SimulatedFactory::new();
    let dev0 = factory.insert(id(0));
    factory.insert(id(1));
    dev0.set_level(pin(1), true);
    dev0.set_adc_code(pin(3), 1023);

    let config = IntegrationConfig::from_yaml_str(TWO_DEVICES).unwrap();
    let mut registry = DeviceRegistry::new();
    let report = registry.load(&config, &mut factory, &volts);

    assert_eq!(report.loaded, vec![id(0), id(1)]);
    assert!(report.failed.is_empty());
    let device = &registry.devices()[0];
    assert_eq!(device.switches[0].current_state(), Reading::Known(false));
    assert_eq!(device.binary_sensors[0].current_state(), Reading::Known(true));
    assert_relative_eq!(
        device.sensors[0].current_value().known().unwrap(),
        2.048,
        epsilon = 1e-9
    );
    assert_eq!(dev0.mode(pin(3)), DriverMode::Adc);
    assert_eq!(registry.pollables().len(), 2);
}

#[test]
fn test_duplicate_pin_blocks_only_that_device() {
    let mut factory = SimulatedFactory::new();
    let dev0 = factory.insert(id(0));
    factory.insert(id(1));

    let config = IntegrationConfig::from_yaml_str(DUPLICATE_ON_FIRST).unwrap();
    let mut registry = DeviceRegistry::new();
    let report = registry.load(&config, &mut factory, &raw_codes);

    assert_eq!(report.loaded, vec![id(1)]);
    assert_eq!(report.failed.len(), 1);
    let (failed_id, error) = &report.failed[0];
    assert_eq!(*failed_id, id(0));
    assert!(matches!(error, Error::DuplicatePin { pin: 2 }));
    // Validation happens before the device is even opened
    assert_eq!(factory.open_count(id(0)), 0);
    assert!(dev0.commands().is_empty());
}

#[test]
fn test_missing_device_does_not_block_others() {
    let mut factory = SimulatedFactory::new();
    factory.insert(id(1));

    let config = IntegrationConfig::from_yaml_str(TWO_DEVICES).unwrap();
    let mut registry = DeviceRegistry::new();
    let report = registry.load(&config, &mut factory, &raw_codes);

    assert_eq!(report.loaded, vec![id(1)]);
    assert_eq!(report.failed[0].1.category(), ErrorCategory::DeviceOpen);
}

#[test]
fn test_same_identity_twice_is_rejected() {
    let mut factory = SimulatedFactory::new();
    factory.insert(id(0));
    let yaml = "- switches: [{name: A, pin: 0}]\n- switches: [{name: B, pin: 1}]\n";
    let config = IntegrationConfig::from_yaml_str(yaml).unwrap();
    let mut registry = DeviceRegistry::new();
    let report = registry.load(&config, &mut factory, &raw_codes);
    assert_eq!(report.loaded, vec![id(0)]);
    assert!(matches!(report.failed[0].1, Error::DuplicateDevice { .. }));
}

#[test]
fn test_reload_reuses_session_and_keeps_relay_state() {
    let mut factory = SimulatedFactory::new();
    let dev0 = factory.insert(id(0));
    factory.insert(id(1));
    let config = IntegrationConfig::from_yaml_str(TWO_DEVICES).unwrap();
    let mut registry = DeviceRegistry::new();
    registry.load(&config, &mut factory, &raw_codes);

    registry.devices()[0].switches[0].turn_on();
    let session = registry.session(id(0)).unwrap();
    dev0.clear_commands();

    let report = registry.reload(&config, &mut factory, &raw_codes);
    assert_eq!(report.loaded.len(), 2);
    assert_eq!(factory.open_count(id(0)), 1);
    assert!(std::sync::Arc::ptr_eq(&session, &registry.session(id(0)).unwrap()));
    assert_eq!(
        registry.devices()[0].switches[0].current_state(),
        Reading::Known(true)
    );
    assert!(!dev0
        .commands()
        .iter()
        .any(|c| *c == Command::Write(pin(0), false)));
}

#[test]
fn test_reload_drops_unconfigured_sessions() {
    let mut factory = SimulatedFactory::new();
    factory.insert(id(0));
    factory.insert(id(1));
    let mut registry = DeviceRegistry::new();
    registry.load(
        &IntegrationConfig::from_yaml_str(TWO_DEVICES).unwrap(),
        &mut factory,
        &raw_codes,
    );
    assert!(registry.session(id(1)).is_some());

    let only_first = "- dev: 0\n  switches: [{name: Pump, pin: 0}]\n";
    registry.reload(
        &IntegrationConfig::from_yaml_str(only_first).unwrap(),
        &mut factory,
        &raw_codes,
    );
    assert!(registry.session(id(1)).is_none());
    assert_eq!(registry.devices().len(), 1);
}

#[test]
fn test_second_load_replaces_the_first() {
    let mut factory = SimulatedFactory::new();
    factory.insert(id(0));
    let config =
        IntegrationConfig::from_yaml_str("- switches: [{name: A, pin: 0}, {name: B, pin: 1}]\n")
            .unwrap();
    let mut registry = DeviceRegistry::new();
    registry.load(&config, &mut factory, &raw_codes);

    let report = registry.load(&config, &mut factory, &raw_codes);
    assert_eq!(report.loaded, vec![id(0)]);
    assert!(report.failed.is_empty());
    assert_eq!(registry.devices().len(), 1);
    assert_eq!(factory.open_count(id(0)), 1);
    let session = registry.session(id(0)).unwrap();
    assert!(session.is_claimed(pin(0)));

    registry.detach_all();
    assert!(!session.is_claimed(pin(0)));
    assert!(!session.is_claimed(pin(1)));
}
