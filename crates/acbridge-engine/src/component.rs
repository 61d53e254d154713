/*!
 * Declarative bridge configuration.
 *
 * One document describes the controller, its transport and the entities it
 * exposes:
 *
 * ```yaml
 * controller:
 *   update_interval: 30s
 * transport:
 *   kind: memory
 * sensors:
 *   - name: Room temperature
 *     register_address: 0x4203
 *     device_address: "20.00.00"
 *     multiplier: 0.1
 * numbers:
 *   - name: Target temperature
 *     register_address: 0x4201
 *     device_address: "20.00.00"
 *     min_value: 16
 *     max_value: 30
 *     step: 0.5
 * ```
 *
 * The document is validated as a whole before any runtime component exists.
 */
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use acbridge_core::config::{Config, ConfigBuilder, ControllerConfig, LoggingConfig, TransportConfig, ENV_PREFIX};
use acbridge_core::types::Id;
use acbridge_devices::{transports, EntityKind, Number, NumberBounds, RegisterConfig, Sensor, SharedTransport, Switch};

use crate::controller::ModbusController;
use crate::error::{Error, Result};

/// Configuration record shared by every entity kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityConfig {
    /// Entity id, generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Display name, derived from the register when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Backing register
    #[serde(flatten)]
    pub register: RegisterConfig,
}

impl EntityConfig {
    /// Create a record for the given register
    pub fn new(register: RegisterConfig) -> Self {
        Self {
            id: None,
            name: None,
            register,
        }
    }

    /// Set the id
    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the display name
    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    fn entity_id(&self) -> Id {
        match &self.id {
            Some(id) => Id::from(id.as_str()),
            None => Id::new(),
        }
    }

    fn display_name(&self, kind: EntityKind) -> String {
        self.name.clone().unwrap_or_else(|| {
            format!(
                "{} {} 0x{:04X}",
                kind, self.register.device_address, self.register.address
            )
        })
    }

    fn label(&self, kind: EntityKind, index: usize) -> String {
        match (&self.id, &self.name) {
            (Some(id), _) => format!("{} '{}'", kind, id),
            (None, Some(name)) => format!("{} '{}'", kind, name),
            (None, None) => format!("{} #{}", kind, index),
        }
    }
}

/// Configuration record of a number entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberConfig {
    /// Common entity fields
    #[serde(flatten)]
    pub entity: EntityConfig,

    /// Accepted range
    #[serde(flatten)]
    pub bounds: NumberBounds,
}

/// Full bridge document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Controller settings
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Bus transport
    #[serde(default)]
    pub transport: TransportConfig,

    /// Sensor entities
    #[serde(default)]
    pub sensors: Vec<EntityConfig>,

    /// Switch entities
    #[serde(default)]
    pub switches: Vec<EntityConfig>,

    /// Number entities
    #[serde(default)]
    pub numbers: Vec<NumberConfig>,
}

impl BridgeConfig {
    /// Load a document from a file, layered with `ACBRIDGE__*` environment overrides, and validate it
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: BridgeConfig = ConfigBuilder::new()
            .with_config_file(path)
            .with_environment_prefix(ENV_PREFIX)
            .build_as()?;
        config.validate()?;
        Ok(config)
    }

    /// Shared sections as a core configuration
    pub fn core(&self) -> Config {
        Config {
            logging: self.logging.clone(),
            controller: self.controller.clone(),
            transport: self.transport.clone(),
        }
    }

    /// Total number of configured entities
    pub fn entity_count(&self) -> usize {
        self.sensors.len() + self.switches.len() + self.numbers.len()
    }

    /// Validate every section and entity record
    pub fn validate(&self) -> Result<()> {
        self.core().validate()?;

        let mut ids = HashSet::new();
        let records = self
            .sensors
            .iter()
            .map(|e| (EntityKind::Sensor, e))
            .chain(self.switches.iter().map(|e| (EntityKind::Switch, e)))
            .chain(self.numbers.iter().map(|n| (EntityKind::Number, &n.entity)));

        for (index, (kind, entity)) in records.enumerate() {
            let label = entity.label(kind, index);
            entity
                .register
                .validate()
                .map_err(|e| Error::config(format!("{}: {}", label, e)))?;
            if let Some(id) = &entity.id {
                if id.trim().is_empty() {
                    return Err(Error::config(format!("{}: id must not be empty", label)));
                }
                if !ids.insert(id.as_str()) {
                    return Err(Error::config(format!("Duplicate entity id '{}'", id)));
                }
            }
        }

        for number in &self.numbers {
            number
                .bounds
                .validate()
                .map_err(|e| Error::config(format!("{}: {}", number.entity.label(EntityKind::Number, 0), e)))?;
        }
        Ok(())
    }

    /// Build a controller on the given transport and register every entity
    pub async fn build(&self, transport: SharedTransport) -> Result<ModbusController> {
        self.validate()?;
        let controller = ModbusController::new(self.controller.clone(), transport);

        for record in &self.sensors {
            let sensor = Sensor::new(
                record.entity_id(),
                record.display_name(EntityKind::Sensor),
                record.register.clone(),
            );
            controller.register_sensor(Arc::new(sensor)).await?;
        }
        for record in &self.switches {
            let switch = Switch::new(
                record.entity_id(),
                record.display_name(EntityKind::Switch),
                record.register.clone(),
            );
            controller.register_switch(Arc::new(switch)).await?;
        }
        for record in &self.numbers {
            let number = Number::new(
                record.entity.entity_id(),
                record.entity.display_name(EntityKind::Number),
                record.entity.register.clone(),
                record.bounds,
            );
            controller.register_number(Arc::new(number)).await?;
        }

        info!(
            "Built controller '{}' with {} entities on {} transport",
            controller.id(),
            self.entity_count(),
            controller.transport().name()
        );
        Ok(controller)
    }

    /// Build a controller on the transport described by the document
    pub async fn build_with_configured_transport(&self) -> Result<ModbusController> {
        let transport = transports::from_config(&self.transport)?;
        debug!("Using {} transport", transport.name());
        self.build(transport).await
    }
}
