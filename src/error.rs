use std::ffi::CStr;
use thiserror::Error;

/// Errors that can occur when configuring or driving MCP2221 endpoints.
///
/// Every variant belongs to one of three categories (see [`ErrorCategory`]):
/// configuration problems detected before anything is attached, failures to
/// open a physical device, and transport failures during live operation.
#[derive(Error, Debug)]
pub enum Error {
    /// Error from the underlying HID API layer.
    #[error("HID API error: {0}")]
    Hid(#[from] hidapi::HidError),
    /// No MCP2221 device was found with the specified vendor/product ID.
    #[error("Device not found with VID {vid:04X} PID {pid:04X}")]
    DeviceNotFound {
        /// Vendor ID that was searched for.
        vid: u16,
        /// Product ID that was searched for.
        pid: u16,
    },
    /// No MCP2221 device was found at the specified enumeration index.
    #[error("Device not found at index {index}: {message}")]
    DeviceNotFoundByIndex {
        /// The index that was requested.
        index: usize,
        /// Additional error details.
        message: String,
    },
    /// The HID layer refused to open a discovered device (permissions,
    /// device busy, unplugged after enumeration).
    #[error("Cannot open device at {path}: {source}")]
    DeviceOpen {
        /// Platform HID path of the device.
        path: String,
        /// Underlying HID error.
        #[source]
        source: hidapi::HidError,
    },
    /// The HID library could not be initialized or could not enumerate devices.
    #[error("HID API initialization failed: {0}")]
    HidInit(#[source] hidapi::HidError),
    /// General I/O error, e.g. while reading a configuration file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration could not be parsed.
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] serde_yaml::Error),
    /// Two endpoints on the same device claim the same pin.
    #[error("Duplicate pin GP{pin}")]
    DuplicatePin {
        /// The pin claimed more than once.
        pin: u8,
    },
    /// GP pin number is outside the valid range for the requested role.
    #[error("GP pin {pin} argument out of range: {message}")]
    PinArgumentOutOfRange {
        /// The invalid pin number that was specified.
        pin: u8,
        /// Detailed error message explaining the constraint.
        message: String,
    },
    /// An endpoint tried to attach to a pin still held by another endpoint.
    #[error("GP pin {pin} is already claimed by another endpoint")]
    PinInUse {
        /// The contested pin.
        pin: u8,
    },
    /// The same device identity is configured more than once.
    #[error("Device {id} is configured more than once")]
    DuplicateDevice {
        /// Identity as `VID:PID#index`.
        id: String,
    },
    /// Device did not answer within the HID read timeout.
    #[error("Timeout waiting for response to command 0x{command:02X}")]
    Timeout {
        /// The command that went unanswered.
        command: u8,
    },
    /// Response report was too short or echoed the wrong command.
    #[error("Invalid response to command 0x{command:02X} ({len} bytes)")]
    InvalidReport {
        /// The command that was sent.
        command: u8,
        /// Number of bytes received.
        len: usize,
    },
    /// Device answered a command with a non-zero status.
    #[error("Command 0x{command:02X} failed with status 0x{status:02X}")]
    CommandFailed {
        /// The command that was sent.
        command: u8,
        /// Status byte returned by the firmware.
        status: u8,
    },
    /// Transport-level failure reported by a [`Driver`](crate::Driver).
    #[error("Transport error: {0}")]
    Transport(String),
    /// A thread panicked while holding the session lock.
    #[error("Device session lock poisoned")]
    SessionPoisoned,
}

/// Coarse classification of an [`Error`], deciding how far a failure reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad configuration; aborts loading of the whole device group.
    Config,
    /// Device could not be opened; aborts that device only.
    DeviceOpen,
    /// Live transport failure; the affected endpoint becomes unknown.
    Device,
}

impl Error {
    /// Returns the category this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::ConfigParse(_)
            | Error::Io(_)
            | Error::DuplicatePin { .. }
            | Error::PinArgumentOutOfRange { .. }
            | Error::PinInUse { .. }
            | Error::DuplicateDevice { .. } => ErrorCategory::Config,
            Error::DeviceNotFound { .. }
            | Error::DeviceNotFoundByIndex { .. }
            | Error::DeviceOpen { .. }
            | Error::HidInit(_) => ErrorCategory::DeviceOpen,
            Error::Hid(_)
            | Error::Timeout { .. }
            | Error::InvalidReport { .. }
            | Error::CommandFailed { .. }
            | Error::Transport(_)
            | Error::SessionPoisoned => ErrorCategory::Device,
        }
    }
}

/// Result type alias for MCP2221 endpoint operations.
pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn device_open_failed(path: &CStr, source: hidapi::HidError) -> Error {
    Error::DeviceOpen {
        path: path.to_string_lossy().into_owned(),
        source,
    }
}

pub(crate) fn analog_pin_out_of_range(pin: u8) -> Error {
    Error::PinArgumentOutOfRange {
        pin,
        message: "ADC input is only available on GP1-GP3".to_string(),
    }
}
