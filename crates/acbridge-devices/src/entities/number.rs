/*!
 * Number entity: a bounded writable numeric value.
 */
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use acbridge_core::types::Id;

use crate::decoder::RegisterValue;
use crate::entity::{BaseEntity, CommandValue, ControllerLink, Entity, EntityInfo, EntityKind, EntityState};
use crate::error::{DeviceError, Result};
use crate::register::RegisterConfig;

/// Range and granularity of a number entity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumberBounds {
    /// Smallest accepted value
    #[serde(default = "default_min")]
    pub min_value: f64,
    /// Largest accepted value
    #[serde(default = "default_max")]
    pub max_value: f64,
    /// Increment advertised to front ends
    #[serde(default = "default_step")]
    pub step: f64,
}

fn default_min() -> f64 {
    0.0
}

fn default_max() -> f64 {
    100.0
}

fn default_step() -> f64 {
    1.0
}

impl Default for NumberBounds {
    fn default() -> Self {
        Self {
            min_value: default_min(),
            max_value: default_max(),
            step: default_step(),
        }
    }
}

impl NumberBounds {
    /// Create bounds
    pub fn new(min_value: f64, max_value: f64, step: f64) -> Self {
        Self {
            min_value,
            max_value,
            step,
        }
    }

    /// Check that the bounds describe a non-empty range with a positive step
    pub fn validate(&self) -> Result<()> {
        if !self.min_value.is_finite() || !self.max_value.is_finite() || !self.step.is_finite() {
            return Err(DeviceError::configuration("number bounds must be finite"));
        }
        if self.min_value >= self.max_value {
            return Err(DeviceError::configuration(format!(
                "min_value {} must be below max_value {}",
                self.min_value, self.max_value
            )));
        }
        if self.step <= 0.0 {
            return Err(DeviceError::configuration(format!(
                "step must be positive, got {}",
                self.step
            )));
        }
        Ok(())
    }

    /// Whether the value lies inside the range
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min_value && value <= self.max_value
    }
}

/// Bounded writable numeric entity
#[derive(Debug)]
pub struct Number {
    base: BaseEntity,
    bounds: NumberBounds,
}

impl Number {
    /// Create a number for the given register
    pub fn new<S: Into<String>>(id: Id, name: S, register: RegisterConfig, bounds: NumberBounds) -> Self {
        let info = EntityInfo {
            id,
            name: name.into(),
            kind: EntityKind::Number,
        };
        Self {
            base: BaseEntity::new(info, register),
            bounds,
        }
    }

    /// Accepted range
    pub fn bounds(&self) -> &NumberBounds {
        &self.bounds
    }

    /// Write a new value and publish it once the write succeeded
    pub async fn control(&self, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(DeviceError::InvalidValue(format!(
                "number '{}' cannot be set to {}",
                self.name(),
                value
            )));
        }
        if !self.bounds.contains(value) {
            return Err(DeviceError::OutOfRange(format!(
                "{} outside [{}, {}] for number '{}'",
                value,
                self.bounds.min_value,
                self.bounds.max_value,
                self.name()
            )));
        }
        if !self.register().is_writable() {
            return Err(DeviceError::ReadOnly(format!(
                "number '{}' is backed by a {} register",
                self.name(),
                self.register().register_type
            )));
        }
        self.base.write(value).await?;
        self.base.publish(EntityState::Number(value)).await;
        Ok(())
    }
}

#[async_trait]
impl Entity for Number {
    fn info(&self) -> &EntityInfo {
        self.base.info()
    }

    fn register(&self) -> &RegisterConfig {
        self.base.register()
    }

    fn attach(&self, link: ControllerLink) -> Result<()> {
        self.base.attach(link)
    }

    fn is_attached(&self) -> bool {
        self.base.is_attached()
    }

    async fn state(&self) -> EntityState {
        self.base.state().await
    }

    async fn on_register_value(&self, value: RegisterValue) {
        let reading = value.as_f64();
        if reading.is_nan() {
            warn!("Number '{}' received NaN, ignoring", self.name());
            return;
        }
        self.base.publish(EntityState::Number(reading)).await;
    }

    async fn mark_unavailable(&self) {
        self.base.publish(EntityState::Unavailable).await;
    }

    async fn on_command(&self, value: CommandValue) -> Result<()> {
        match value {
            CommandValue::Number(n) => self.control(n).await,
            CommandValue::Bool(b) => Err(DeviceError::InvalidValue(format!(
                "number '{}' expects a numeric command, got {}",
                self.name(),
                b
            ))),
        }
    }

    fn dump_config(&self) {
        self.base.dump_config();
        info!(
            "  Range: [{}, {}] step {}",
            self.bounds.min_value, self.bounds.max_value, self.bounds.step
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::entities::testing::{link, RecordingWriter};

    fn target_temp(writer: Arc<RecordingWriter>) -> Number {
        let number = Number::new(
            Id::from("target_temp"),
            "Target temperature",
            RegisterConfig::new("20.00.00", 0x4201).with_multiplier(0.1),
            NumberBounds::new(16.0, 30.0, 0.5),
        );
        let (link, _events) = link(writer);
        number.attach(link).unwrap();
        number
    }

    #[test]
    fn test_bounds_validation() {
        assert!(NumberBounds::default().validate().is_ok());
        assert!(NumberBounds::new(10.0, 10.0, 1.0).validate().is_err());
        assert!(NumberBounds::new(0.0, 10.0, 0.0).validate().is_err());
        assert!(NumberBounds::new(0.0, f64::INFINITY, 1.0).validate().is_err());

        let bounds: NumberBounds = serde_json::from_str("{}").unwrap();
        assert_eq!(bounds, NumberBounds::new(0.0, 100.0, 1.0));
    }

    #[tokio::test]
    async fn test_control_in_range() {
        let writer = Arc::new(RecordingWriter::default());
        let number = target_temp(writer.clone());

        number.on_command(CommandValue::Number(22.5)).await.unwrap();
        assert_eq!(*writer.writes.lock().unwrap(), vec![(0x4201, 22.5)]);
        assert_eq!(number.state().await, EntityState::Number(22.5));

        // bounds are inclusive
        number.control(16.0).await.unwrap();
        number.control(30.0).await.unwrap();
    }

    #[tokio::test]
    async fn test_control_rejects_out_of_range() {
        let writer = Arc::new(RecordingWriter::default());
        let number = target_temp(writer.clone());

        assert!(matches!(number.control(15.9).await, Err(DeviceError::OutOfRange(_))));
        assert!(matches!(number.control(30.1).await, Err(DeviceError::OutOfRange(_))));
        assert!(matches!(number.control(f64::NAN).await, Err(DeviceError::InvalidValue(_))));
        assert!(number.on_command(CommandValue::Bool(true)).await.is_err());

        assert!(writer.writes.lock().unwrap().is_empty());
        assert_eq!(number.state().await, EntityState::Unknown);
    }

    #[tokio::test]
    async fn test_drops_nan_reading() {
        let number = target_temp(Arc::new(RecordingWriter::default()));
        number.on_register_value(RegisterValue::Number(21.0)).await;
        number.on_register_value(RegisterValue::Number(f64::NAN)).await;
        assert_eq!(number.state().await, EntityState::Number(21.0));
    }
}
