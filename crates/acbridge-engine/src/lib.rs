/*!
 * acbridge Engine
 *
 * The polling controller, its read planner, the bridge to the upstream
 * Samsung AC protocol component and the declarative bridge configuration.
 */

#![warn(missing_docs)]

// Re-export core types
pub use acbridge_core::prelude;

pub mod bridge;
pub mod component;
pub mod controller;
pub mod error;
pub mod planner;

pub use bridge::{FanMode, Mode, ProtocolRequest, SamsungAc};
pub use component::{BridgeConfig, EntityConfig, NumberConfig};
pub use controller::{ControllerHandle, ModbusController, PollReport};
pub use error::{Error, Result};
pub use planner::{PlannerConfig, ReadBatch, ReadPlanner};

/// acbridge engine crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the engine
pub fn init() -> Result<()> {
    tracing::info!("acbridge engine {} initialized", VERSION);
    Ok(())
}
