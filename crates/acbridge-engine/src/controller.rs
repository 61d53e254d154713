/*!
 * Samsung AC Modbus controller.
 *
 * The controller owns the registered entities, polls their registers on a
 * fixed interval and dispatches decoded values to them. It also bridges the
 * upstream Samsung AC component: NASA messages pushed through a
 * [`ControllerHandle`] are routed to the entities registered at the same
 * device and message number, and writes to mapped NASA messages are sent as
 * protocol requests instead of bus writes.
 */
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn, Instrument};

use acbridge_core::config::ControllerConfig;
use acbridge_core::logging::{component_span, operation_span};
use acbridge_core::utils::{format_duration, with_timeout};
use acbridge_devices::decoder::{self, RegisterValue};
use acbridge_devices::{
    ControllerLink, DeviceError, Entity, EntityEvent, EntityRegistry, Number, RegisterConfig, RegisterData,
    RegisterWriter, Sensor, SharedTransport, Switch,
};

use crate::bridge::{ProtocolRequest, SamsungAc};
use crate::error::{Error, Result};
use crate::planner::{PlannerConfig, ReadBatch, ReadPlanner};

const EVENT_CAPACITY: usize = 256;

type NasaMap = HashMap<(String, u16), Vec<Arc<dyn Entity>>>;

/// Outcome of one polling tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollReport {
    /// Bus read transactions issued
    pub reads: usize,
    /// Entities that received a fresh value
    pub updated: usize,
    /// Entities whose read failed
    pub failed: usize,
    /// Wall time of the tick
    pub elapsed: Duration,
}

#[derive(Debug)]
struct ControllerInner {
    config: ControllerConfig,
    registry: EntityRegistry,
    transport: SharedTransport,
    /// Serializes bus transactions
    bus: Mutex<()>,
    upstream: RwLock<Option<Arc<dyn SamsungAc>>>,
    nasa_map: RwLock<Option<Arc<NasaMap>>>,
    plan: RwLock<Option<Arc<Vec<ReadBatch>>>>,
    events: broadcast::Sender<EntityEvent>,
    setup_done: AtomicBool,
}

/// Polling controller for Samsung AC registers
#[derive(Debug, Clone)]
pub struct ModbusController {
    inner: Arc<ControllerInner>,
}

/// Handle given to the upstream component to push NASA messages
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    id: String,
    inner: Weak<ControllerInner>,
}

#[derive(Debug)]
struct ControllerWriter {
    inner: Weak<ControllerInner>,
}

impl ModbusController {
    /// Create a controller polling through the given transport
    pub fn new(config: ControllerConfig, transport: SharedTransport) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(ControllerInner {
                config,
                registry: EntityRegistry::new(),
                transport,
                bus: Mutex::new(()),
                upstream: RwLock::new(None),
                nasa_map: RwLock::new(None),
                plan: RwLock::new(None),
                events,
                setup_done: AtomicBool::new(false),
            }),
        }
    }

    /// Controller id
    pub fn id(&self) -> &str {
        &self.inner.config.id
    }

    /// Controller configuration
    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    /// Registered entities
    pub fn registry(&self) -> &EntityRegistry {
        &self.inner.registry
    }

    /// Bus transport
    pub fn transport(&self) -> &SharedTransport {
        &self.inner.transport
    }

    /// Subscribe to entity state changes
    pub fn subscribe(&self) -> broadcast::Receiver<EntityEvent> {
        self.inner.events.subscribe()
    }

    /// Handle for pushing NASA messages into this controller
    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle {
            id: self.inner.config.id.clone(),
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Attach the upstream Samsung AC component
    pub async fn set_samsung_ac(&self, upstream: Arc<dyn SamsungAc>) {
        *self.inner.upstream.write().await = Some(upstream);
    }

    /// Whether an upstream component is attached
    pub async fn has_samsung_ac(&self) -> bool {
        self.inner.upstream.read().await.is_some()
    }

    fn link(&self) -> ControllerLink {
        ControllerLink {
            writer: Arc::new(ControllerWriter {
                inner: Arc::downgrade(&self.inner),
            }),
            events: self.inner.events.clone(),
        }
    }

    async fn registered(&self, entity: &dyn Entity) {
        self.inner.invalidate().await;
        debug!(
            "Registered {} '{}' (device: {}, address: 0x{:04X})",
            entity.kind(),
            entity.name(),
            entity.register().device_address,
            entity.register().address
        );
    }

    /// Register a sensor
    pub async fn register_sensor(&self, sensor: Arc<Sensor>) -> Result<()> {
        self.inner
            .registry
            .attach_sensor(sensor.clone(), |entity| entity.attach(self.link()))?;
        self.registered(sensor.as_ref()).await;
        Ok(())
    }

    /// Register a switch
    pub async fn register_switch(&self, switch: Arc<Switch>) -> Result<()> {
        self.inner
            .registry
            .attach_switch(switch.clone(), |entity| entity.attach(self.link()))?;
        self.registered(switch.as_ref()).await;
        Ok(())
    }

    /// Register a number
    pub async fn register_number(&self, number: Arc<Number>) -> Result<()> {
        self.inner
            .registry
            .attach_number(number.clone(), |entity| entity.attach(self.link()))?;
        self.registered(number.as_ref()).await;
        Ok(())
    }

    /// Build the lookup tables and announce the controller to the upstream component
    pub async fn setup(&self) -> Result<()> {
        let inner = &self.inner;
        info!(
            "Setting up controller '{}': {} sensors, {} switches, {} numbers",
            inner.config.id,
            inner.registry.sensors()?.len(),
            inner.registry.switches()?.len(),
            inner.registry.numbers()?.len()
        );

        inner.invalidate().await;
        let nasa_map = inner.nasa_map().await?;
        let plan = inner.plan().await?;

        let upstream = inner.upstream.read().await.clone();
        match upstream {
            Some(upstream) => {
                let devices: BTreeSet<&str> = nasa_map.keys().map(|(device, _)| device.as_str()).collect();
                for device in devices {
                    if !upstream.find_device(device).await {
                        warn!("Device {} is not known to the Samsung AC component", device);
                    }
                }
                upstream
                    .register_modbus_controller(self.handle())
                    .await
                    .map_err(|e| Error::upstream(format!("Failed to register controller: {}", e)))?;
            }
            None => {
                warn!("No Samsung AC component attached; NASA push and mapped writes are disabled");
            }
        }

        inner.setup_done.store(true, Ordering::SeqCst);
        info!(
            "Controller '{}' setup complete: {} NASA keys, {} reads per tick",
            inner.config.id,
            nasa_map.len(),
            plan.len()
        );
        Ok(())
    }

    /// Whether the upstream component knows the device
    pub async fn validate_device_address(&self, address: &str) -> bool {
        let upstream = self.inner.upstream.read().await.clone();
        match upstream {
            Some(upstream) => upstream.find_device(address).await,
            None => false,
        }
    }

    /// Route a value pushed by the upstream component
    ///
    /// Returns the number of entities that received the value.
    pub async fn on_nasa_message(&self, device_address: &str, message_number: u16, value: f64) -> Result<usize> {
        self.inner.on_nasa_message(device_address, message_number, value).await
    }

    /// Write a physical value to a register
    pub async fn write_register(&self, register: &RegisterConfig, value: f64) -> Result<()> {
        Ok(self.inner.write_register(register, value).await?)
    }

    /// Read every planned register once and dispatch the results
    pub async fn poll_once(&self) -> Result<PollReport> {
        let span = operation_span("poll", &self.inner.config.id);
        self.inner.poll_once().instrument(span).await
    }

    /// Poll on the configured interval until `shutdown` resolves
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        if !self.inner.setup_done.load(Ordering::SeqCst) {
            self.setup().await?;
        }

        let config = &self.inner.config;
        let span = component_span("controller", Some(&config.id));
        info!(
            parent: &span,
            "Polling every {} (register timeout {})",
            format_duration(config.update_interval),
            format_duration(config.register_timeout)
        );

        let mut ticker = interval(config.update_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        futures::pin_mut!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(parent: &span, "Controller '{}' stopping", config.id);
                    break;
                }
                _ = ticker.tick() => {
                    match self.poll_once().instrument(span.clone()).await {
                        Ok(report) if report.elapsed > config.update_interval => {
                            warn!(
                                "Tick took {} which exceeds the update interval",
                                format_duration(report.elapsed)
                            );
                        }
                        Ok(_) => {}
                        Err(e) => error!("Polling failed: {}", e),
                    }
                }
            }
        }
        Ok(())
    }

    /// Log the controller and entity configuration
    pub async fn dump_config(&self) {
        let inner = &self.inner;
        info!("Samsung AC Modbus controller '{}':", inner.config.id);
        info!("  Transport: {}", inner.transport.name());
        info!("  Update interval: {}", format_duration(inner.config.update_interval));
        info!(
            "  Coalescing: {} (max_gap {}, max_batch {})",
            if inner.config.coalesce { "on" } else { "off" },
            inner.config.max_gap,
            inner.config.max_batch
        );
        info!("  Sensors: {}", inner.registry.sensors().map(|v| v.len()).unwrap_or(0));
        info!("  Switches: {}", inner.registry.switches().map(|v| v.len()).unwrap_or(0));
        info!("  Numbers: {}", inner.registry.numbers().map(|v| v.len()).unwrap_or(0));
        if inner.upstream.read().await.is_some() {
            info!("  Samsung AC: connected");
        } else {
            info!("  Samsung AC: not set");
        }
        for entity in inner.registry.entities().unwrap_or_default() {
            entity.dump_config();
        }
    }
}

impl ControllerInner {
    async fn invalidate(&self) {
        *self.plan.write().await = None;
        *self.nasa_map.write().await = None;
    }

    async fn plan(&self) -> Result<Arc<Vec<ReadBatch>>> {
        if let Some(plan) = self.plan.read().await.as_ref() {
            return Ok(plan.clone());
        }
        let entities = self.registry.entities()?;
        let plan = Arc::new(ReadPlanner::plan(PlannerConfig::from(&self.config), &entities));
        debug!(
            "Planned {} reads for {} entities (coalesce: {})",
            plan.len(),
            entities.len(),
            self.config.coalesce
        );
        *self.plan.write().await = Some(plan.clone());
        Ok(plan)
    }

    async fn nasa_map(&self) -> Result<Arc<NasaMap>> {
        if let Some(map) = self.nasa_map.read().await.as_ref() {
            return Ok(map.clone());
        }
        let mut map = NasaMap::new();
        for entity in self.registry.entities()? {
            let register = entity.register();
            let key = (register.device_address.clone(), register.address);
            trace!(
                "NASA key {}/0x{:04X} -> {} '{}'",
                key.0,
                key.1,
                entity.kind(),
                entity.name()
            );
            map.entry(key).or_default().push(entity);
        }
        let map = Arc::new(map);
        *self.nasa_map.write().await = Some(map.clone());
        Ok(map)
    }

    async fn on_nasa_message(&self, device_address: &str, message_number: u16, value: f64) -> Result<usize> {
        let map = self.nasa_map().await?;
        let Some(entities) = map.get(&(device_address.to_string(), message_number)) else {
            trace!(
                "No entities registered for device {}, NASA address 0x{:04X}",
                device_address,
                message_number
            );
            return Ok(0);
        };

        debug!(
            "NASA message: device={}, address=0x{:04X}, value={}",
            device_address, message_number, value
        );
        for entity in entities {
            let processed = decoder::apply(value, entity.register());
            entity.on_register_value(RegisterValue::Number(processed)).await;
        }
        Ok(entities.len())
    }

    async fn write_register(&self, register: &RegisterConfig, value: f64) -> acbridge_devices::Result<()> {
        let upstream = self.upstream.read().await.clone();
        if let Some(upstream) = upstream {
            let raw = decoder::unapply(value, register);
            if let Some(request) = ProtocolRequest::from_message(register.address, raw)? {
                if !upstream.find_device(&register.device_address).await {
                    return Err(DeviceError::UnknownDevice(register.device_address.clone()));
                }
                debug!(
                    "Publishing request for device={}, address=0x{:04X}: {:?}",
                    register.device_address, register.address, request
                );
                return with_timeout(
                    self.config.register_timeout,
                    upstream.publish_request(&register.device_address, request),
                )
                .await;
            }
        }

        let payload = decoder::encode(value, register)?;
        debug!(
            "Writing device={}, address=0x{:04X}: {:?}",
            register.device_address, register.address, payload
        );
        with_timeout(self.config.register_timeout, async {
            let _bus = self.bus.lock().await;
            self.transport
                .write_register(&register.device_address, register.address, payload)
                .await
        })
        .await
    }

    async fn read_batch(&self, batch: &ReadBatch) -> acbridge_devices::Result<RegisterData> {
        with_timeout(self.config.register_timeout, async {
            let _bus = self.bus.lock().await;
            self.transport
                .read_registers(
                    &batch.device_address,
                    batch.register_type,
                    batch.start_addr,
                    batch.quantity,
                )
                .await
        })
        .await
    }

    async fn fail(&self, batch: &ReadBatch, error: &DeviceError, report: &mut PollReport) {
        warn!(
            "Read of {} {} 0x{:04X} x{} failed: {}",
            batch.device_address, batch.register_type, batch.start_addr, batch.quantity, error
        );
        for entity in &batch.points {
            entity.mark_unavailable().await;
        }
        report.failed += batch.points.len();
    }

    async fn dispatch(&self, batch: &ReadBatch, data: &RegisterData, report: &mut PollReport) {
        for entity in &batch.points {
            let register = entity.register();
            let decoded = data
                .slice(batch.offset_of(entity.as_ref()), usize::from(register.register_count()))
                .ok_or_else(|| {
                    DeviceError::malformed(format!(
                        "Read of 0x{:04X} returned {} items, register 0x{:04X} is out of range",
                        batch.start_addr,
                        data.len(),
                        register.address
                    ))
                })
                .and_then(|slice| decoder::decode(&slice, register));

            match decoded {
                Ok(value) => {
                    trace!("{} '{}' <- {:?}", entity.kind(), entity.name(), value);
                    entity.on_register_value(value).await;
                    report.updated += 1;
                }
                Err(e) => {
                    warn!("Decoding {} '{}' failed: {}", entity.kind(), entity.name(), e);
                    entity.mark_unavailable().await;
                    report.failed += 1;
                }
            }
        }
    }

    async fn poll_once(&self) -> Result<PollReport> {
        let started = Instant::now();
        let plan = self.plan().await?;
        let mut report = PollReport::default();

        for batch in plan.iter() {
            report.reads += 1;
            match self.read_batch(batch).await {
                Ok(data) => self.dispatch(batch, &data, &mut report).await,
                Err(e) if batch.points.len() > 1 => {
                    warn!(
                        "Read of {} {} 0x{:04X} x{} failed: {}; reading its {} registers one by one",
                        batch.device_address,
                        batch.register_type,
                        batch.start_addr,
                        batch.quantity,
                        e,
                        batch.points.len()
                    );
                    for single in batch.split() {
                        report.reads += 1;
                        match self.read_batch(&single).await {
                            Ok(data) => self.dispatch(&single, &data, &mut report).await,
                            Err(e) => self.fail(&single, &e, &mut report).await,
                        }
                    }
                }
                Err(e) => self.fail(batch, &e, &mut report).await,
            }
        }

        report.elapsed = started.elapsed();
        debug!(
            "Poll finished in {}: {} reads, {} updated, {} failed",
            format_duration(report.elapsed),
            report.reads,
            report.updated,
            report.failed
        );
        Ok(report)
    }
}

impl ControllerHandle {
    /// Id of the controller behind the handle
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Push a NASA message into the controller
    pub async fn on_nasa_message(&self, device_address: &str, message_number: u16, value: f64) -> Result<usize> {
        let inner = self
            .inner
            .upgrade()
            .ok_or_else(|| Error::controller(format!("Controller '{}' has been dropped", self.id)))?;
        inner.on_nasa_message(device_address, message_number, value).await
    }
}

#[async_trait]
impl RegisterWriter for ControllerWriter {
    async fn write_register(&self, register: &RegisterConfig, value: f64) -> acbridge_devices::Result<()> {
        let inner = self
            .inner
            .upgrade()
            .ok_or_else(|| DeviceError::NotRegistered("controller has been dropped".to_string()))?;
        inner.write_register(register, value).await
    }
}
