//! Device discovery and the hidapi-backed MCP2221 driver.

use crate::consts;
use crate::driver::{DeviceId, Driver, DriverFactory};
use crate::error::{analog_pin_out_of_range, device_open_failed, Error, Result};
use crate::gpio::{AdcReference, DriverMode, GpPin};
use hidapi::{HidApi, HidDevice};
use log::{debug, trace, warn};
use std::ffi::CString;

/// Information about a discovered MCP2221 HID interface.
#[derive(Debug, Clone)]
pub struct Mcp2221DeviceInfo {
    /// USB vendor ID.
    pub vid: u16,
    /// USB product ID.
    pub pid: u16,
    /// Platform-specific HID path, used to open the device.
    pub path: CString,
    /// Device serial number string, if the firmware reports one.
    pub serial_number: Option<String>,
    /// Human-readable product name/description.
    pub product_string: Option<String>,
}

/// Finds all devices matching `vid`/`pid`.
/// Returns them in deterministic order (by HID path) so that an enumeration
/// index keeps pointing at the same device between calls.
pub fn find_all(hid_api: &HidApi, vid: u16, pid: u16) -> Vec<Mcp2221DeviceInfo> {
    let mut devices: Vec<Mcp2221DeviceInfo> = hid_api
        .device_list()
        .filter(|info| info.vendor_id() == vid && info.product_id() == pid)
        .map(|info| {
            debug!(
                "Found MCP2221 device: VID={:04X}, PID={:04X}, Path={:?}, SN={:?}",
                info.vendor_id(),
                info.product_id(),
                info.path(),
                info.serial_number()
            );
            Mcp2221DeviceInfo {
                vid: info.vendor_id(),
                pid: info.product_id(),
                path: info.path().to_owned(),
                serial_number: info.serial_number().map(|s| s.to_string()),
                product_string: info.product_string().map(|s| s.to_string()),
            }
        })
        .collect();

    // Some platforms list one interface once per usage page
    devices.sort_by(|a, b| a.path.cmp(&b.path));
    devices.dedup_by(|a, b| a.path == b.path);
    devices
}

/// A handle to an opened MCP2221.
///
/// **Note:** Not reentrant. Share it through a
/// [`DeviceSession`](crate::DeviceSession), which serializes access.
#[derive(Debug)]
pub struct Mcp2221 {
    device: HidDevice,
    info: Mcp2221DeviceInfo,
    // Re-sent with every GP designation change; the firmware otherwise drops
    // the ADC Vrm level to "off" without reporting it.
    adc_reference: Option<AdcReference>,
}

impl Mcp2221 {
    /// Opens a device using its discovery info.
    pub fn open(hid_api: &HidApi, info: &Mcp2221DeviceInfo) -> Result<Self> {
        let device = hid_api
            .open_path(&info.path)
            .map_err(|e| device_open_failed(&info.path, e))?;
        debug!("Opened MCP2221 at {:?}", info.path);
        Ok(Self {
            device,
            info: info.clone(),
            adc_reference: None,
        })
    }

    /// Opens the device at `id.index` among those matching `id.vid`/`id.pid`.
    pub fn open_by_index(hid_api: &HidApi, id: DeviceId) -> Result<Self> {
        let devices = find_all(hid_api, id.vid, id.pid);
        if devices.is_empty() {
            return Err(Error::DeviceNotFound {
                vid: id.vid,
                pid: id.pid,
            });
        }
        let info = devices.get(id.index).ok_or_else(|| Error::DeviceNotFoundByIndex {
            index: id.index,
            message: format!("Index out of range (found {} devices)", devices.len()),
        })?;
        Self::open(hid_api, info)
    }

    /// Gets the discovery information of the opened device.
    pub fn info(&self) -> &Mcp2221DeviceInfo {
        &self.info
    }

    // --- Report exchange ---
    // One OUT report, one IN report; the IN report echoes the command code.
    fn transfer(&self, request: &[u8; consts::REPORT_SIZE]) -> Result<[u8; consts::REPORT_SIZE]> {
        let command = request[0];
        let mut out = [0u8; consts::REPORT_SIZE + 1]; // Leading report ID 0
        out[1..].copy_from_slice(request);
        trace!("HID OUT (cmd {:02X}): {:02X?}", command, &out[1..16]);
        self.device.write(&out)?;

        let mut response = [0u8; consts::REPORT_SIZE];
        let len = self
            .device
            .read_timeout(&mut response, consts::HID_READ_TIMEOUT_MS)?;
        if len == 0 {
            return Err(Error::Timeout { command });
        }
        trace!("HID IN (cmd {:02X}): {:02X?}", command, &response[..16]);
        if len < consts::REPORT_SIZE || response[0] != command {
            warn!(
                "Unexpected response to command {:02X}: len={}, echo={:02X}",
                command, len, response[0]
            );
            return Err(Error::InvalidReport { command, len });
        }
        if response[1] != consts::RESPONSE_SUCCESS {
            return Err(Error::CommandFailed {
                command,
                status: response[1],
            });
        }
        Ok(response)
    }

    fn command(code: u8) -> [u8; consts::REPORT_SIZE] {
        let mut buf = [0u8; consts::REPORT_SIZE];
        buf[0] = code;
        buf
    }

    fn read_gp_designations(&self) -> Result<[u8; consts::GP_PIN_COUNT]> {
        let response = self.transfer(&Self::command(consts::CMD_GET_SRAM_SETTINGS))?;
        let mut gp = [0u8; consts::GP_PIN_COUNT];
        gp.copy_from_slice(&response[consts::sram::GET_GP0..][..consts::GP_PIN_COUNT]);
        Ok(gp)
    }

    fn write_gp_designations(&self, gp: [u8; consts::GP_PIN_COUNT]) -> Result<()> {
        let mut request = Self::command(consts::CMD_SET_SRAM_SETTINGS);
        if let Some(reference) = self.adc_reference {
            request[consts::sram::SET_ADC_REFERENCE] = reference.sram_bits();
        }
        request[consts::sram::SET_ALTER_GP] = consts::sram::ALTER_BIT;
        request[consts::sram::SET_GP0..][..consts::GP_PIN_COUNT].copy_from_slice(&gp);
        self.transfer(&request).map(|_| ())
    }

    // (level, direction) byte pairs of all pins from Get GPIO Values.
    fn read_all_gpio_values(&self) -> Result<[(u8, u8); consts::GP_PIN_COUNT]> {
        let response = self.transfer(&Self::command(consts::CMD_GET_GPIO_VALUES))?;
        let mut values = [(0u8, 0u8); consts::GP_PIN_COUNT];
        for (i, value) in values.iter_mut().enumerate() {
            let offset = consts::gpio_values::FIRST_PIN_OFFSET + 2 * i;
            *value = (response[offset], response[offset + 1]);
        }
        Ok(values)
    }

    fn read_gpio_values(&self, pin: GpPin) -> Result<(u8, u8)> {
        Ok(self.read_all_gpio_values()?[pin.index()])
    }
}

/// Refreshes the SRAM GP settings of every GPIO pin except `target` from
/// the live direction and level.
///
/// Set GPIO Output Values leaves SRAM untouched, so writing the settings
/// back unchanged would drive the other outputs to their stale SRAM level.
/// Pins not designated as GPIO keep their settings.
fn merge_live_gpio(
    mut gp: [u8; consts::GP_PIN_COUNT],
    live: [(u8, u8); consts::GP_PIN_COUNT],
    target: GpPin,
) -> [u8; consts::GP_PIN_COUNT] {
    use consts::gpio_values::{DIRECTION_INPUT, NOT_GPIO};
    use consts::sram::{GP_DIRECTION_INPUT, GP_OUTPUT_HIGH};
    for (i, (settings, &(level, direction))) in gp.iter_mut().zip(live.iter()).enumerate() {
        if i == target.index() || direction == NOT_GPIO {
            continue;
        }
        *settings &= !(GP_DIRECTION_INPUT | GP_OUTPUT_HIGH);
        if direction == DIRECTION_INPUT {
            *settings |= GP_DIRECTION_INPUT;
        } else if level != 0 {
            *settings |= GP_OUTPUT_HIGH;
        }
    }
    gp
}

impl Driver for Mcp2221 {
    fn configure_pin(&mut self, pin: GpPin, mode: DriverMode, initial: bool) -> Result<()> {
        use consts::sram::*;
        let designation = match mode {
            DriverMode::Input | DriverMode::Unconfigured => GP_DESIGNATION_GPIO | GP_DIRECTION_INPUT,
            DriverMode::Output if initial => GP_DESIGNATION_GPIO | GP_OUTPUT_HIGH,
            DriverMode::Output => GP_DESIGNATION_GPIO,
            DriverMode::Adc if pin.supports_analog() => GP_DESIGNATION_ADC,
            DriverMode::Adc => return Err(analog_pin_out_of_range(pin.number())),
        };
        let live = self.read_all_gpio_values()?;
        let mut gp = merge_live_gpio(self.read_gp_designations()?, live, pin);
        gp[pin.index()] = designation;
        debug!("Designating {} as {:?} (settings {:02X?})", pin, mode, gp);
        self.write_gp_designations(gp)
    }

    fn write_pin(&mut self, pin: GpPin, value: bool) -> Result<()> {
        let mut request = Self::command(consts::CMD_SET_GPIO_OUTPUT_VALUES);
        let offset = consts::gpio_values::SET_FIRST_PIN_OFFSET + 4 * pin.index();
        request[offset] = consts::gpio_values::ALTER;
        request[offset + 1] = value as u8;
        self.transfer(&request).map(|_| ())
    }

    fn read_pin(&mut self, pin: GpPin) -> Result<bool> {
        let (level, direction) = self.read_gpio_values(pin)?;
        if direction == consts::gpio_values::NOT_GPIO {
            return Err(Error::Transport(format!("{} is not designated as GPIO", pin)));
        }
        Ok(level != 0)
    }

    fn read_analog(&mut self, pin: GpPin) -> Result<u16> {
        if !pin.supports_analog() {
            return Err(analog_pin_out_of_range(pin.number()));
        }
        let response = self.transfer(&Self::command(consts::CMD_STATUS_SET_PARAMETERS))?;
        let offset = consts::status::ADC_CH1_LSB + 2 * (pin.index() - 1);
        Ok(u16::from_le_bytes([response[offset], response[offset + 1]]))
    }

    fn set_analog_reference(&mut self, reference: AdcReference) -> Result<()> {
        let mut request = Self::command(consts::CMD_SET_SRAM_SETTINGS);
        request[consts::sram::SET_ADC_REFERENCE] = reference.sram_bits();
        self.transfer(&request)?;
        self.adc_reference = Some(reference);
        Ok(())
    }

    fn pin_mode(&mut self, pin: GpPin) -> Result<DriverMode> {
        use consts::gpio_values::{DIRECTION_INPUT, DIRECTION_OUTPUT};
        match self.read_gpio_values(pin)?.1 {
            DIRECTION_OUTPUT => Ok(DriverMode::Output),
            DIRECTION_INPUT => Ok(DriverMode::Input),
            _ => {
                let gp = self.read_gp_designations()?;
                let designation = gp[pin.index()] & consts::sram::GP_DESIGNATION_MASK;
                if pin.supports_analog() && designation == consts::sram::GP_DESIGNATION_ADC {
                    Ok(DriverMode::Adc)
                } else {
                    Ok(DriverMode::Unconfigured)
                }
            }
        }
    }
}

/// Opens hardware devices through one shared [`HidApi`] context.
pub struct HidFactory {
    hid_api: HidApi,
}

impl HidFactory {
    pub fn new() -> Result<Self> {
        Ok(Self {
            hid_api: HidApi::new().map_err(Error::HidInit)?,
        })
    }

    /// Re-scans the bus; call before a reload to pick up replugged devices.
    pub fn refresh(&mut self) -> Result<()> {
        self.hid_api.refresh_devices().map_err(Error::HidInit)?;
        Ok(())
    }
}

impl DriverFactory for HidFactory {
    fn open(&mut self, id: DeviceId) -> Result<Box<dyn Driver>> {
        Ok(Box::new(Mcp2221::open_by_index(&self.hid_api, id)?))
    }
}
