/*!
 * Upstream Samsung AC bridge.
 *
 * The upstream protocol component speaks NASA to the indoor and outdoor
 * units. It validates device addresses, pushes decoded NASA messages into
 * the controller and accepts protocol requests for the few messages that
 * have a dedicated request field.
 */
use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use acbridge_devices::{DeviceError, Result};

use crate::controller::ControllerHandle;

/// NASA message: power on/off
pub const NASA_POWER: u16 = 0x4000;
/// NASA message: operating mode
pub const NASA_MODE: u16 = 0x4001;
/// NASA message: fan mode
pub const NASA_FAN_MODE: u16 = 0x4006;
/// NASA message: target temperature
pub const NASA_TARGET_TEMP: u16 = 0x4201;

/// Operating mode of an indoor unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Automatic heat/cool
    Auto,
    /// Cooling
    Cool,
    /// Dehumidification
    Dry,
    /// Fan only
    Fan,
    /// Heating
    Heat,
}

impl Mode {
    /// Decode the NASA numeric code
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Mode::Auto),
            1 => Some(Mode::Cool),
            2 => Some(Mode::Dry),
            3 => Some(Mode::Fan),
            4 => Some(Mode::Heat),
            _ => None,
        }
    }

    /// NASA numeric code
    pub fn code(&self) -> i64 {
        *self as i64
    }
}

/// Fan speed of an indoor unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanMode {
    /// Low speed
    Low,
    /// Medium speed
    Mid,
    /// High speed
    High,
    /// Automatic speed
    Auto,
    /// Turbo
    Turbo,
    /// Fan off
    Off,
}

impl FanMode {
    /// Decode the NASA numeric code
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(FanMode::Low),
            1 => Some(FanMode::Mid),
            2 => Some(FanMode::High),
            3 => Some(FanMode::Auto),
            4 => Some(FanMode::Turbo),
            5 => Some(FanMode::Off),
            _ => None,
        }
    }

    /// NASA numeric code
    pub fn code(&self) -> i64 {
        *self as i64
    }
}

/// Request sent to a device through the upstream component
///
/// Only the fields that are set are changed on the device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolRequest {
    /// Power state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<bool>,
    /// Operating mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    /// Target temperature in degrees Celsius
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_temp: Option<f32>,
    /// Fan mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan_mode: Option<FanMode>,
}

impl ProtocolRequest {
    /// Whether the message number has a dedicated request field
    pub fn is_mapped(message_number: u16) -> bool {
        matches!(
            message_number,
            NASA_POWER | NASA_MODE | NASA_FAN_MODE | NASA_TARGET_TEMP
        )
    }

    /// Build the request for a raw value written to a NASA message
    ///
    /// Returns `Ok(None)` when the message has no request field.
    pub fn from_message(message_number: u16, raw: f64) -> Result<Option<Self>> {
        let mut request = ProtocolRequest::default();
        match message_number {
            NASA_POWER => request.power = Some(raw > 0.5),
            NASA_MODE => {
                let mode = Mode::from_code(raw as i64)
                    .ok_or_else(|| DeviceError::InvalidValue(format!("unknown mode code {}", raw)))?;
                request.mode = Some(mode);
            }
            NASA_TARGET_TEMP => request.target_temp = Some(raw as f32),
            NASA_FAN_MODE => {
                let fan_mode = FanMode::from_code(raw as i64)
                    .ok_or_else(|| DeviceError::InvalidValue(format!("unknown fan mode code {}", raw)))?;
                request.fan_mode = Some(fan_mode);
            }
            _ => return Ok(None),
        }
        Ok(Some(request))
    }
}

/// Upstream Samsung AC protocol component
#[async_trait]
pub trait SamsungAc: Send + Sync + Debug {
    /// Receive the handle used to push NASA messages into the controller
    async fn register_modbus_controller(&self, handle: ControllerHandle) -> Result<()>;

    /// Whether a device with this address is known
    async fn find_device(&self, address: &str) -> bool;

    /// Send a request to a device
    async fn publish_request(&self, address: &str, request: ProtocolRequest) -> Result<()>;
}
