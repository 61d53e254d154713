/*!
 * Concrete entity adapters.
 */

pub mod number;
pub mod sensor;
pub mod switch;

pub use number::{Number, NumberBounds};
pub use sensor::Sensor;
pub use switch::Switch;

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tokio::sync::broadcast;

    use crate::entity::{ControllerLink, EntityEvent, RegisterWriter};
    use crate::error::{DeviceError, Result};
    use crate::register::RegisterConfig;

    /// Writer that records writes and optionally fails
    #[derive(Debug, Default)]
    pub struct RecordingWriter {
        pub writes: Mutex<Vec<(u16, f64)>>,
        pub fail: bool,
    }

    #[async_trait]
    impl RegisterWriter for RecordingWriter {
        async fn write_register(&self, register: &RegisterConfig, value: f64) -> Result<()> {
            if self.fail {
                return Err(DeviceError::communication("bus down"));
            }
            self.writes.lock().unwrap().push((register.address, value));
            Ok(())
        }
    }

    pub fn link(writer: Arc<RecordingWriter>) -> (ControllerLink, broadcast::Receiver<EntityEvent>) {
        let (events, rx) = broadcast::channel(16);
        (ControllerLink { writer, events }, rx)
    }
}
