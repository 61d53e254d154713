/*!
 * Switch entity: a boolean backed by a coil, discrete input or register.
 */
use async_trait::async_trait;

use acbridge_core::types::Id;

use crate::decoder::RegisterValue;
use crate::entity::{BaseEntity, CommandValue, ControllerLink, Entity, EntityInfo, EntityKind, EntityState};
use crate::error::{DeviceError, Result};
use crate::register::RegisterConfig;

/// Boolean entity
#[derive(Debug)]
pub struct Switch {
    base: BaseEntity,
}

impl Switch {
    /// Create a switch for the given register
    pub fn new<S: Into<String>>(id: Id, name: S, register: RegisterConfig) -> Self {
        let info = EntityInfo {
            id,
            name: name.into(),
            kind: EntityKind::Switch,
        };
        Self {
            base: BaseEntity::new(info, register),
        }
    }

    /// Whether commands are accepted
    pub fn is_writable(&self) -> bool {
        self.base.register().is_writable()
    }

    /// Turn the switch on or off
    pub async fn write_state(&self, state: bool) -> Result<()> {
        if !self.is_writable() {
            return Err(DeviceError::ReadOnly(format!(
                "switch '{}' is backed by a {} register",
                self.name(),
                self.register().register_type
            )));
        }
        self.base.write(if state { 1.0 } else { 0.0 }).await?;
        self.base.publish(EntityState::Bool(state)).await;
        Ok(())
    }
}

#[async_trait]
impl Entity for Switch {
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
        let state = match value {
            RegisterValue::Bool(b) => b,
            RegisterValue::Number(n) => n > 0.5,
        };
        self.base.publish(EntityState::Bool(state)).await;
    }

    async fn mark_unavailable(&self) {
        self.base.publish(EntityState::Unavailable).await;
    }

    async fn on_command(&self, value: CommandValue) -> Result<()> {
        let state = match value {
            CommandValue::Bool(b) => b,
            CommandValue::Number(n) if n.is_finite() => n > 0.5,
            CommandValue::Number(n) => {
                return Err(DeviceError::InvalidValue(format!("switch command {}", n)))
            }
        };
        self.write_state(state).await
    }

    fn dump_config(&self) {
        self.base.dump_config();
    }
}
