/*!
 * acbridge Devices
 *
 * Register model, value decoding, bus transports and the entity adapters
 * (sensor, switch, number) that expose Samsung AC registers.
 */

#![warn(missing_docs)]

// Re-export core types
pub use acbridge_core::prelude;

pub mod decoder;
pub mod entities;
pub mod entity;
pub mod error;
pub mod register;
pub mod registry;
pub mod transport;
pub mod transports;

pub use decoder::{decode, encode, RegisterValue};
pub use entities::{Number, NumberBounds, Sensor, Switch};
pub use entity::{CommandValue, ControllerLink, Entity, EntityEvent, EntityInfo, EntityKind, EntityState, RegisterWriter};
pub use error::{DeviceError, Result};
pub use register::{RegisterConfig, RegisterKey, RegisterType, ValueType};
pub use registry::EntityRegistry;
pub use transport::{BusTransport, RegisterData, RegisterWrite, SharedTransport};

/// acbridge devices crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the device layer
pub fn init() -> std::result::Result<(), acbridge_core::error::Error> {
    tracing::info!("acbridge devices {} initialized", VERSION);
    Ok(())
}

/// Transports compiled into this build
pub fn available_transports() -> Vec<&'static str> {
    transports::available()
}
