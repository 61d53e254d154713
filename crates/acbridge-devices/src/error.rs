/*!
 * Error types for register decoding, bus transports and entity adapters.
 */
use thiserror::Error;

use acbridge_core::error::Error as CoreError;

/// Error type for device-side operations
#[derive(Error, Debug)]
pub enum DeviceError {
    /// The bus returned fewer words/bits than requested, or the wrong kind
    #[error("Malformed read: {0}")]
    MalformedRead(String),

    /// Communication error with the bus or device
    #[error("Communication error: {0}")]
    Communication(String),

    /// A bus transaction exceeded its time budget
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// The addressed device is not known to the bus or upstream component
    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    /// The register cannot be written
    #[error("Register is read-only: {0}")]
    ReadOnly(String),

    /// The value is out of range for the entity or register width
    #[error("Value out of range: {0}")]
    OutOfRange(String),

    /// The value has the wrong type or is not a finite number
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// The entity is not registered with a controller
    #[error("Entity not registered: {0}")]
    NotRegistered(String),

    /// The entity is already registered with a controller
    #[error("Entity already registered: {0}")]
    AlreadyRegistered(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Core error
    #[error("Core error: {0}")]
    Core(CoreError),
}

/// Result type for device-side operations
pub type Result<T> = std::result::Result<T, DeviceError>;

impl DeviceError {
    /// Create a new malformed read error
    pub fn malformed<S: AsRef<str>>(msg: S) -> Self {
        DeviceError::MalformedRead(msg.as_ref().to_string())
    }

    /// Create a new communication error
    pub fn communication<S: AsRef<str>>(msg: S) -> Self {
        DeviceError::Communication(msg.as_ref().to_string())
    }

    /// Create a new configuration error
    pub fn configuration<S: AsRef<str>>(msg: S) -> Self {
        DeviceError::Configuration(msg.as_ref().to_string())
    }

    /// Whether the failure concerns a single bus transaction
    ///
    /// Such failures skip the register for the current poll only.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DeviceError::MalformedRead(_) | DeviceError::Communication(_) | DeviceError::Timeout(_)
        )
    }
}

impl From<CoreError> for DeviceError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Timeout(msg) => DeviceError::Timeout(msg),
            CoreError::Config(msg) | CoreError::Validation(msg) => DeviceError::Configuration(msg),
            other => DeviceError::Core(other),
        }
    }
}

impl From<std::io::Error> for DeviceError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => DeviceError::Timeout(err.to_string()),
            std::io::ErrorKind::InvalidData | std::io::ErrorKind::UnexpectedEof => {
                DeviceError::MalformedRead(err.to_string())
            }
            _ => DeviceError::Communication(err.to_string()),
        }
    }
}
