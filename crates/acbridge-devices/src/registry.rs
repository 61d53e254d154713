/*!
 * Entity registry.
 *
 * Keeps the sensors, switches and numbers of one controller in registration
 * order and indexes them by id. Each controller owns its own registry.
 */
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use acbridge_core::error::Error as CoreError;
use acbridge_core::types::Id;

use crate::entities::{Number, Sensor, Switch};
use crate::entity::{Entity, EntityKind};
use crate::error::{DeviceError, Result};

#[derive(Debug, Default)]
struct Inner {
    sensors: Vec<Arc<Sensor>>,
    switches: Vec<Arc<Switch>>,
    numbers: Vec<Arc<Number>>,
    /// Every entity in registration order
    ordered: Vec<Arc<dyn Entity>>,
    index: HashMap<Id, Arc<dyn Entity>>,
}

/// Registry of the entities owned by one controller
#[derive(Debug, Default)]
pub struct EntityRegistry {
    inner: RwLock<Inner>,
}

impl EntityRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| DeviceError::Core(CoreError::runtime("Failed to acquire read lock on entity registry")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| DeviceError::Core(CoreError::runtime("Failed to acquire write lock on entity registry")))
    }

    fn insert<F>(inner: &mut Inner, entity: Arc<dyn Entity>, attach: F) -> Result<()>
    where
        F: FnOnce(&dyn Entity) -> Result<()>,
    {
        let id = entity.id().clone();
        if inner.index.contains_key(&id) {
            return Err(DeviceError::AlreadyRegistered(format!(
                "Entity with ID {} already registered",
                id
            )));
        }
        attach(entity.as_ref())?;
        inner.index.insert(id.clone(), entity.clone());
        inner.ordered.push(entity);
        debug!("Registered entity with ID {}", id);
        Ok(())
    }

    /// Check that an id is still free
    pub fn ensure_vacant(&self, id: &Id) -> Result<()> {
        if self.read()?.index.contains_key(id) {
            return Err(DeviceError::AlreadyRegistered(format!(
                "Entity with ID {} already registered",
                id
            )));
        }
        Ok(())
    }

    /// Add a sensor
    pub fn add_sensor(&self, sensor: Arc<Sensor>) -> Result<()> {
        self.attach_sensor(sensor, |_| Ok(()))
    }

    /// Add a sensor, running `attach` under the registry lock once its id is known to be free
    pub fn attach_sensor<F>(&self, sensor: Arc<Sensor>, attach: F) -> Result<()>
    where
        F: FnOnce(&dyn Entity) -> Result<()>,
    {
        let mut inner = self.write()?;
        Self::insert(&mut inner, sensor.clone(), attach)?;
        inner.sensors.push(sensor);
        Ok(())
    }

    /// Add a switch
    pub fn add_switch(&self, switch: Arc<Switch>) -> Result<()> {
        self.attach_switch(switch, |_| Ok(()))
    }

    /// Add a switch, running `attach` under the registry lock once its id is known to be free
    pub fn attach_switch<F>(&self, switch: Arc<Switch>, attach: F) -> Result<()>
    where
        F: FnOnce(&dyn Entity) -> Result<()>,
    {
        let mut inner = self.write()?;
        Self::insert(&mut inner, switch.clone(), attach)?;
        inner.switches.push(switch);
        Ok(())
    }

    /// Add a number
    pub fn add_number(&self, number: Arc<Number>) -> Result<()> {
        self.attach_number(number, |_| Ok(()))
    }

    /// Add a number, running `attach` under the registry lock once its id is known to be free
    pub fn attach_number<F>(&self, number: Arc<Number>, attach: F) -> Result<()>
    where
        F: FnOnce(&dyn Entity) -> Result<()>,
    {
        let mut inner = self.write()?;
        Self::insert(&mut inner, number.clone(), attach)?;
        inner.numbers.push(number);
        Ok(())
    }

    /// Look up an entity by id
    pub fn get(&self, id: &Id) -> Result<Arc<dyn Entity>> {
        self.read()?
            .index
            .get(id)
            .cloned()
            .ok_or_else(|| DeviceError::NotRegistered(id.to_string()))
    }

    /// Every entity in registration order
    pub fn entities(&self) -> Result<Vec<Arc<dyn Entity>>> {
        Ok(self.read()?.ordered.clone())
    }

    /// Entities of one kind in registration order
    pub fn entities_of(&self, kind: EntityKind) -> Result<Vec<Arc<dyn Entity>>> {
        let inner = self.read()?;
        let entities = match kind {
            EntityKind::Sensor => inner.sensors.iter().map(|e| e.clone() as Arc<dyn Entity>).collect(),
            EntityKind::Switch => inner.switches.iter().map(|e| e.clone() as Arc<dyn Entity>).collect(),
            EntityKind::Number => inner.numbers.iter().map(|e| e.clone() as Arc<dyn Entity>).collect(),
        };
        Ok(entities)
    }

    /// Registered sensors
    pub fn sensors(&self) -> Result<Vec<Arc<Sensor>>> {
        Ok(self.read()?.sensors.clone())
    }

    /// Registered switches
    pub fn switches(&self) -> Result<Vec<Arc<Switch>>> {
        Ok(self.read()?.switches.clone())
    }

    /// Registered numbers
    pub fn numbers(&self) -> Result<Vec<Arc<Number>>> {
        Ok(self.read()?.numbers.clone())
    }

    /// Entities backed by the given device address and register address
    pub fn find_by_register(&self, device_address: &str, address: u16) -> Result<Vec<Arc<dyn Entity>>> {
        Ok(self
            .read()?
            .ordered
            .iter()
            .filter(|e| e.register().device_address == device_address && e.register().address == address)
            .cloned()
            .collect())
    }

    /// Number of registered entities
    pub fn len(&self) -> usize {
        self.read().map(|inner| inner.ordered.len()).unwrap_or(0)
    }

    /// Whether no entity is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::NumberBounds;
    use crate::register::RegisterConfig;

    #[test]
    fn test_registration_order_and_lookup() {
        let registry = EntityRegistry::new();
        registry
            .add_number(Arc::new(Number::new(
                Id::from("target"),
                "Target",
                RegisterConfig::new("20.00.00", 0x4201),
                NumberBounds::default(),
            )))
            .unwrap();
        registry
            .add_sensor(Arc::new(Sensor::new(Id::from("room"), "Room", RegisterConfig::new("20.00.00", 0x4203))))
            .unwrap();
        registry
            .add_switch(Arc::new(Switch::new(Id::from("power"), "Power", RegisterConfig::new("20.00.00", 0x4000))))
            .unwrap();

        let ids: Vec<String> = registry
            .entities()
            .unwrap()
            .iter()
            .map(|e| e.id().to_string())
            .collect();
        assert_eq!(ids, vec!["target", "room", "power"]);
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.sensors().unwrap().len(), 1);
        assert_eq!(registry.entities_of(EntityKind::Switch).unwrap().len(), 1);

        assert_eq!(registry.get(&Id::from("room")).unwrap().kind(), EntityKind::Sensor);
        assert!(registry.get(&Id::from("missing")).is_err());

        let found = registry.find_by_register("20.00.00", 0x4201).unwrap();
        assert_eq!(found.len(), 1);
        assert!(registry.find_by_register("20.00.01", 0x4201).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = EntityRegistry::new();
        let sensor = || Arc::new(Sensor::new(Id::from("room"), "Room", RegisterConfig::new("20.00.00", 0x4203)));
        registry.add_sensor(sensor()).unwrap();
        assert!(matches!(registry.add_sensor(sensor()), Err(DeviceError::AlreadyRegistered(_))));
        assert!(registry.ensure_vacant(&Id::from("room")).is_err());
        assert!(registry.ensure_vacant(&Id::from("other")).is_ok());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_attach_hook_runs_only_for_free_ids() {
        let registry = EntityRegistry::new();
        let sensor = || Arc::new(Sensor::new(Id::from("room"), "Room", RegisterConfig::new("20.00.00", 0x4203)));
        registry.add_sensor(sensor()).unwrap();

        let mut called = false;
        let result = registry.attach_sensor(sensor(), |_| {
            called = true;
            Ok(())
        });
        assert!(matches!(result, Err(DeviceError::AlreadyRegistered(_))));
        assert!(!called);
    }

    #[test]
    fn test_failed_attach_leaves_registry_untouched() {
        let registry = EntityRegistry::new();
        let switch = Arc::new(Switch::new(Id::from("power"), "Power", RegisterConfig::new("20.00.00", 0x4000)));

        let result = registry.attach_switch(switch, |e| {
            Err(DeviceError::AlreadyRegistered(format!("{} belongs to another controller", e.id())))
        });
        assert!(result.is_err());
        assert!(registry.is_empty());
        assert!(registry.switches().unwrap().is_empty());
        assert!(registry.ensure_vacant(&Id::from("power")).is_ok());
    }
}
