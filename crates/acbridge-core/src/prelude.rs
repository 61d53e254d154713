/*!
 * Prelude module for acbridge Core.
 *
 * Re-exports the types and helpers most crates of the workspace import.
 */

// Re-export error types
pub use crate::error::{Error, Result};

// Re-export core types
pub use crate::types::Id;

// Re-export config types
pub use crate::config::{Config, ConfigBuilder, ControllerConfig, LoggingConfig, SharedConfig, TransportConfig};

// Re-export utility functions
pub use crate::utils::{format_duration, parse_duration, parse_hex_u32, with_timeout};

// Re-export logging macros
pub use tracing::{debug, error, info, trace, warn};

// Re-export core initialization
pub use crate::init;
