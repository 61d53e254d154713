/*!
 * Entity abstraction.
 *
 * An entity exposes one register as a typed, observable value. Sensors,
 * switches and numbers share the [`Entity`] trait so the controller can
 * dispatch decoded values and commands without knowing the concrete type.
 */
use std::fmt::{self, Debug};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

use acbridge_core::types::Id;

use crate::decoder::RegisterValue;
use crate::error::{DeviceError, Result};
use crate::register::RegisterConfig;

/// Kind of entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Read-only numeric value
    Sensor,
    /// Boolean value, writable on coils and holding registers
    Switch,
    /// Bounded writable numeric value
    Number,
}

impl EntityKind {
    /// Lowercase name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Sensor => "sensor",
            EntityKind::Switch => "switch",
            EntityKind::Number => "number",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityInfo {
    /// Unique entity id
    pub id: Id,
    /// Display name
    pub name: String,
    /// Entity kind
    pub kind: EntityKind,
}

/// Published state of an entity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum EntityState {
    /// No value read yet
    Unknown,
    /// The last read failed
    Unavailable,
    /// Boolean value
    Bool(bool),
    /// Numeric value
    Number(f64),
}

impl EntityState {
    /// Whether a value is currently published
    pub fn has_value(&self) -> bool {
        matches!(self, EntityState::Bool(_) | EntityState::Number(_))
    }

    /// Numeric value, if any
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            EntityState::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Boolean value, if any
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            EntityState::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl Default for EntityState {
    fn default() -> Self {
        EntityState::Unknown
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityState::Unknown => f.write_str("unknown"),
            EntityState::Unavailable => f.write_str("unavailable"),
            EntityState::Bool(true) => f.write_str("on"),
            EntityState::Bool(false) => f.write_str("off"),
            EntityState::Number(n) => write!(f, "{}", n),
        }
    }
}

/// State change broadcast by an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityEvent {
    /// Entity id
    pub entity_id: Id,
    /// Entity kind
    pub kind: EntityKind,
    /// State before the change
    pub old_state: EntityState,
    /// State after the change
    pub new_state: EntityState,
    /// Time of the change
    pub timestamp: DateTime<Utc>,
}

/// Command sent to a writable entity
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandValue {
    /// Switch state
    Bool(bool),
    /// Number value
    Number(f64),
}

impl From<bool> for CommandValue {
    fn from(value: bool) -> Self {
        CommandValue::Bool(value)
    }
}

impl From<f64> for CommandValue {
    fn from(value: f64) -> Self {
        CommandValue::Number(value)
    }
}

/// Write path provided by the owning controller
#[async_trait]
pub trait RegisterWriter: Send + Sync + Debug {
    /// Write a physical value (before scaling is undone) to the register
    async fn write_register(&self, register: &RegisterConfig, value: f64) -> Result<()>;
}

/// Connection between an entity and the controller it is registered with
#[derive(Debug, Clone)]
pub struct ControllerLink {
    /// Controller write path
    pub writer: Arc<dyn RegisterWriter>,
    /// Channel for state change events
    pub events: broadcast::Sender<EntityEvent>,
}

/// Common entity interface
#[async_trait]
pub trait Entity: Send + Sync + Debug {
    /// Static description
    fn info(&self) -> &EntityInfo;

    /// Entity id
    fn id(&self) -> &Id {
        &self.info().id
    }

    /// Display name
    fn name(&self) -> &str {
        &self.info().name
    }

    /// Entity kind
    fn kind(&self) -> EntityKind {
        self.info().kind
    }

    /// Register backing the entity
    fn register(&self) -> &RegisterConfig;

    /// Attach the entity to a controller; fails if already attached
    fn attach(&self, link: ControllerLink) -> Result<()>;

    /// Whether the entity is attached to a controller
    fn is_attached(&self) -> bool;

    /// Currently published state
    async fn state(&self) -> EntityState;

    /// Handle a decoded register value
    async fn on_register_value(&self, value: RegisterValue);

    /// Handle a failed read
    async fn mark_unavailable(&self);

    /// Handle a command
    async fn on_command(&self, value: CommandValue) -> Result<()> {
        let _ = value;
        Err(DeviceError::ReadOnly(format!("{} {}", self.kind(), self.id())))
    }

    /// Log the entity configuration
    fn dump_config(&self);
}

/// Shared state handling used by the concrete entities
#[derive(Debug)]
pub struct BaseEntity {
    info: EntityInfo,
    register: RegisterConfig,
    state: RwLock<EntityState>,
    last_updated: RwLock<Option<DateTime<Utc>>>,
    link: OnceLock<ControllerLink>,
}

impl BaseEntity {
    /// Create an unattached entity in the `Unknown` state
    pub fn new(info: EntityInfo, register: RegisterConfig) -> Self {
        Self {
            info,
            register,
            state: RwLock::new(EntityState::Unknown),
            last_updated: RwLock::new(None),
            link: OnceLock::new(),
        }
    }

    /// Static description
    pub fn info(&self) -> &EntityInfo {
        &self.info
    }

    /// Backing register
    pub fn register(&self) -> &RegisterConfig {
        &self.register
    }

    /// Attach to a controller
    pub fn attach(&self, link: ControllerLink) -> Result<()> {
        self.link
            .set(link)
            .map_err(|_| DeviceError::AlreadyRegistered(self.info.id.to_string()))
    }

    /// Whether a controller link is set
    pub fn is_attached(&self) -> bool {
        self.link.get().is_some()
    }

    /// Current state
    pub async fn state(&self) -> EntityState {
        *self.state.read().await
    }

    /// Time of the last publish
    pub async fn last_updated(&self) -> Option<DateTime<Utc>> {
        *self.last_updated.read().await
    }

    /// Publish a new state, broadcasting an event when it changed
    pub async fn publish(&self, new_state: EntityState) {
        let now = Utc::now();
        let old_state = {
            let mut state = self.state.write().await;
            std::mem::replace(&mut *state, new_state)
        };
        *self.last_updated.write().await = Some(now);

        if old_state == new_state {
            return;
        }
        debug!("{} '{}' -> {}", self.info.kind, self.info.name, new_state);

        if let Some(link) = self.link.get() {
            // no receivers is not an error
            let _ = link.events.send(EntityEvent {
                entity_id: self.info.id.clone(),
                kind: self.info.kind,
                old_state,
                new_state,
                timestamp: now,
            });
        }
    }

    /// Write a physical value through the controller
    pub async fn write(&self, value: f64) -> Result<()> {
        let link = self
            .link
            .get()
            .ok_or_else(|| DeviceError::NotRegistered(self.info.id.to_string()))?;
        link.writer.write_register(&self.register, value).await
    }

    /// Log the register configuration
    pub fn dump_config(&self) {
        let register = &self.register;
        info!("Modbus {} '{}' ({})", self.info.kind, self.info.name, self.info.id);
        info!("  Device: {}", register.device_address);
        info!("  Register: 0x{:04X} ({})", register.address, register.register_type);
        info!("  Value type: {}", register.value_type);
        if register.multiplier != 1.0 {
            info!("  Multiplier: {}", register.multiplier);
        }
        if register.offset != 0.0 {
            info!("  Offset: {}", register.offset);
        }
        if register.has_bitmask() {
            info!("  Bitmask: 0x{:08X}", register.bitmask);
        }
    }
}
