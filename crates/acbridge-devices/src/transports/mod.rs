/*!
 * Bus transport implementations.
 */
use std::sync::Arc;

use acbridge_core::config::TransportConfig;

use crate::error::Result;
use crate::transport::SharedTransport;

pub mod memory;
#[cfg(feature = "modbus")]
pub mod modbus;

pub use memory::{Fault, MemoryBus, WriteRecord};
#[cfg(feature = "modbus")]
pub use modbus::TcpModbusBus;

/// Build the transport selected by the configuration
pub fn from_config(config: &TransportConfig) -> Result<SharedTransport> {
    match config {
        TransportConfig::Memory { .. } => Ok(Arc::new(MemoryBus::from_config(config)?)),
        #[cfg(feature = "modbus")]
        TransportConfig::Tcp { .. } => Ok(Arc::new(TcpModbusBus::from_config(config)?)),
        #[cfg(not(feature = "modbus"))]
        TransportConfig::Tcp { .. } => Err(crate::error::DeviceError::configuration(
            "tcp transport requires the `modbus` feature",
        )),
    }
}

/// Names of the transports compiled into this build
pub fn available() -> Vec<&'static str> {
    let mut names = vec!["memory"];
    if cfg!(feature = "modbus") {
        names.push("tcp");
    }
    names
}
