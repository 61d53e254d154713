//! Shared fixtures for the engine integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use acbridge_core::config::ControllerConfig;
use acbridge_core::types::Id;
use acbridge_devices::transports::MemoryBus;
use acbridge_devices::{DeviceError, RegisterConfig, Result, Sensor};
use acbridge_engine::{ControllerHandle, ModbusController, ProtocolRequest, SamsungAc};

/// Upstream component that records requests and keeps the handle it was given
#[derive(Debug, Default)]
pub struct FakeSamsungAc {
    pub devices: HashSet<String>,
    pub handle: Mutex<Option<ControllerHandle>>,
    pub requests: Mutex<Vec<(String, ProtocolRequest)>>,
    /// Never answer `publish_request`
    pub stalled: bool,
}

impl FakeSamsungAc {
    pub fn with_devices(devices: &[&str]) -> Self {
        Self {
            devices: devices.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn stalled(devices: &[&str]) -> Self {
        Self {
            stalled: true,
            ..Self::with_devices(devices)
        }
    }

    pub async fn push(&self, device: &str, message: u16, value: f64) -> usize {
        let handle = self.handle.lock().await.clone().expect("controller registered");
        handle.on_nasa_message(device, message, value).await.unwrap()
    }
}

#[async_trait]
impl SamsungAc for FakeSamsungAc {
    async fn register_modbus_controller(&self, handle: ControllerHandle) -> Result<()> {
        *self.handle.lock().await = Some(handle);
        Ok(())
    }

    async fn find_device(&self, address: &str) -> bool {
        self.devices.contains(address)
    }

    async fn publish_request(&self, address: &str, request: ProtocolRequest) -> Result<()> {
        if self.stalled {
            std::future::pending::<()>().await;
        }
        if !self.devices.contains(address) {
            return Err(DeviceError::UnknownDevice(address.to_string()));
        }
        self.requests.lock().await.push((address.to_string(), request));
        Ok(())
    }
}

pub fn config(coalesce: bool) -> ControllerConfig {
    ControllerConfig {
        coalesce,
        ..ControllerConfig::default()
    }
}

pub fn controller(bus: &Arc<MemoryBus>, config: ControllerConfig) -> ModbusController {
    ModbusController::new(config, bus.clone())
}

pub fn sensor(id: &str, device: &str, address: u16) -> Arc<Sensor> {
    Arc::new(Sensor::new(Id::from(id), id, RegisterConfig::new(device, address)))
}
