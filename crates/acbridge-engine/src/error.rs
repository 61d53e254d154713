/*!
 * Error types for the acbridge engine crate.
 */
use thiserror::Error;

/// Error type for controller operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Controller lifecycle error
    #[error("Controller error: {0}")]
    Controller(String),

    /// Upstream Samsung AC component error
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Device error
    #[error("Device error: {0}")]
    Device(#[from] acbridge_devices::DeviceError),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] acbridge_core::error::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),
}

/// Result type for controller operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new configuration error
    pub fn config<S: AsRef<str>>(msg: S) -> Self {
        Error::Config(msg.as_ref().to_string())
    }

    /// Create a new controller error
    pub fn controller<S: AsRef<str>>(msg: S) -> Self {
        Error::Controller(msg.as_ref().to_string())
    }

    /// Create a new upstream error
    pub fn upstream<S: AsRef<str>>(msg: S) -> Self {
        Error::Upstream(msg.as_ref().to_string())
    }

    /// Create a new not found error
    pub fn not_found<S: AsRef<str>>(msg: S) -> Self {
        Error::NotFound(msg.as_ref().to_string())
    }

    /// Create a new timeout error
    pub fn timeout<S: AsRef<str>>(msg: S) -> Self {
        Error::Timeout(msg.as_ref().to_string())
    }

    /// Whether the error stems from configuration validation
    pub fn is_config(&self) -> bool {
        match self {
            Error::Config(_) => true,
            Error::Device(acbridge_devices::DeviceError::Configuration(_)) => true,
            Error::Core(e) => e.is_config(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
