/*!
 * Sensor entity: a read-only numeric value.
 */
use async_trait::async_trait;
use tracing::warn;

use acbridge_core::types::Id;

use crate::decoder::RegisterValue;
use crate::entity::{BaseEntity, ControllerLink, Entity, EntityInfo, EntityKind, EntityState};
use crate::error::Result;
use crate::register::RegisterConfig;

/// Read-only numeric entity
#[derive(Debug)]
pub struct Sensor {
    base: BaseEntity,
}

impl Sensor {
    /// Create a sensor for the given register
    pub fn new<S: Into<String>>(id: Id, name: S, register: RegisterConfig) -> Self {
        let info = EntityInfo {
            id,
            name: name.into(),
            kind: EntityKind::Sensor,
        };
        Self {
            base: BaseEntity::new(info, register),
        }
    }
}

#[async_trait]
impl Entity for Sensor {
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
            warn!("Sensor '{}' received NaN, ignoring", self.name());
            return;
        }
        self.base.publish(EntityState::Number(reading)).await;
    }

    async fn mark_unavailable(&self) {
        self.base.publish(EntityState::Unavailable).await;
    }

    fn dump_config(&self) {
        self.base.dump_config();
    }
}
