/*!
 * Modbus TCP transport.
 *
 * Talks to a Modbus TCP gateway through `tokio-modbus`. Device addresses are
 * mapped to slave ids through the configured `slaves` table, falling back to
 * parsing the device address as a plain slave id.
 */
use std::collections::BTreeMap;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;
use tracing::{debug, info, warn};

use acbridge_core::config::TransportConfig;

use crate::error::{DeviceError, Result};
use crate::register::RegisterType;
use crate::transport::{BusTransport, RegisterData, RegisterWrite};

/// Lazily opened gateway connection
#[derive(Debug, Default)]
struct Connection {
    ctx: Option<Context>,
    /// Set while a transaction is on the wire. Still set on entry means the
    /// previous request future was dropped and its reply may be pending.
    in_flight: bool,
}

impl Connection {
    /// Drop a connection whose last transaction never completed
    fn discard_abandoned(&mut self) -> bool {
        if !self.in_flight {
            return false;
        }
        self.in_flight = false;
        self.ctx = None;
        true
    }

    fn finish(&mut self, ok: bool) {
        self.in_flight = false;
        if !ok {
            self.ctx = None;
        }
    }
}

/// Modbus TCP gateway connection
#[derive(Debug)]
pub struct TcpModbusBus {
    /// Gateway socket address
    address: SocketAddr,
    /// Device address to slave id
    slaves: BTreeMap<String, u8>,
    /// Dropped after any failed or abandoned transaction
    connection: Mutex<Connection>,
}

impl TcpModbusBus {
    /// Create a transport for the given gateway
    pub fn new(address: SocketAddr, slaves: BTreeMap<String, u8>) -> Self {
        Self {
            address,
            slaves,
            connection: Mutex::new(Connection::default()),
        }
    }

    /// Create a transport from a `tcp` transport configuration
    pub fn from_config(config: &TransportConfig) -> Result<Self> {
        let TransportConfig::Tcp { address, slaves } = config else {
            return Err(DeviceError::configuration("TcpModbusBus requires a tcp transport configuration"));
        };
        let address: SocketAddr = address.parse().map_err(|e| {
            DeviceError::configuration(format!("Invalid gateway address '{}': {}", address, e))
        })?;
        Ok(Self::new(address, slaves.clone()))
    }

    fn slave_for(&self, device_address: &str) -> Result<Slave> {
        if let Some(id) = self.slaves.get(device_address) {
            return Ok(Slave(*id));
        }
        device_address
            .parse::<u8>()
            .map(Slave)
            .map_err(|_| DeviceError::UnknownDevice(format!("No slave id mapped for device {}", device_address)))
    }

    /// Open the connection if needed and mark a transaction as started
    async fn begin<'a>(&self, conn: &'a mut Connection, slave: Slave) -> Result<&'a mut Context> {
        if conn.discard_abandoned() {
            warn!(
                "Previous transaction with {} did not complete, reconnecting",
                self.address
            );
        }
        if conn.ctx.is_none() {
            debug!("Connecting to Modbus TCP gateway at {}", self.address);
            let ctx = tcp::connect_slave(self.address, slave).await?;
            info!("Connected to Modbus TCP gateway at {}", self.address);
            conn.ctx = Some(ctx);
        }
        conn.in_flight = true;
        let ctx = conn
            .ctx
            .as_mut()
            .ok_or_else(|| DeviceError::communication("Modbus connection unavailable"))?;
        ctx.set_slave(slave);
        Ok(ctx)
    }
}

#[async_trait]
impl BusTransport for TcpModbusBus {
    fn name(&self) -> &str {
        "modbus-tcp"
    }

    async fn read_registers(
        &self,
        device_address: &str,
        register_type: RegisterType,
        address: u16,
        count: u16,
    ) -> Result<RegisterData> {
        let slave = self.slave_for(device_address)?;
        let mut conn = self.connection.lock().await;
        let ctx = self.begin(&mut conn, slave).await?;

        let result = match register_type {
            RegisterType::Coil => ctx.read_coils(address, count).await.map(RegisterData::Bits),
            RegisterType::DiscreteInput => ctx
                .read_discrete_inputs(address, count)
                .await
                .map(RegisterData::Bits),
            RegisterType::Holding => ctx
                .read_holding_registers(address, count)
                .await
                .map(RegisterData::Words),
            RegisterType::Read => ctx
                .read_input_registers(address, count)
                .await
                .map(RegisterData::Words),
        };
        conn.finish(result.is_ok());

        match result {
            Ok(mut data) => {
                // coil responses are padded to whole bytes
                if let RegisterData::Bits(bits) = &mut data {
                    bits.truncate(count as usize);
                }
                Ok(data)
            }
            Err(e) => {
                warn!(
                    "Modbus read {} 0x{:04X} x{} on {} failed: {}",
                    register_type, address, count, device_address, e
                );
                Err(e.into())
            }
        }
    }

    async fn write_register(&self, device_address: &str, address: u16, value: RegisterWrite) -> Result<()> {
        let slave = self.slave_for(device_address)?;
        let mut conn = self.connection.lock().await;
        let ctx = self.begin(&mut conn, slave).await?;

        let result = match &value {
            RegisterWrite::Coil(state) => ctx.write_single_coil(address, *state).await,
            RegisterWrite::Words(words) if words.len() == 1 => {
                ctx.write_single_register(address, words[0]).await
            }
            RegisterWrite::Words(words) => ctx.write_multiple_registers(address, words).await,
        };
        conn.finish(result.is_ok());

        if let Err(e) = result {
            warn!("Modbus write 0x{:04X} on {} failed: {}", address, device_address, e);
            return Err(e.into());
        }
        debug!("Modbus write {} 0x{:04X} {:?}", device_address, address, value);
        Ok(())
    }
}
