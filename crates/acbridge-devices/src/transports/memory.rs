/*!
 * In-memory bus.
 *
 * Serves register reads from maps keyed by device address and register
 * address. Used by the `--simulate` mode of the CLI and by tests, which can
 * inject per-register faults and count transactions.
 */
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use acbridge_core::config::TransportConfig;
use acbridge_core::utils::parse_hex_u32;

use crate::error::{DeviceError, Result};
use crate::register::RegisterType;
use crate::transport::{BusTransport, RegisterData, RegisterWrite};

type Cell = (String, u16);

/// Fault injected on reads that touch a given register
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// Fail the transaction with a communication error
    Error(String),
    /// Delay the response
    Delay(Duration),
    /// Answer with one item fewer than requested
    Short,
}

/// Recorded write transaction
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    /// Target device
    pub device_address: String,
    /// First register address
    pub address: u16,
    /// Written payload
    pub value: RegisterWrite,
}

/// Register bus held in memory
#[derive(Debug, Default)]
pub struct MemoryBus {
    /// Holding and input register words
    words: RwLock<HashMap<Cell, u16>>,
    /// Coil and discrete input bits
    bits: RwLock<HashMap<Cell, bool>>,
    /// Injected faults
    faults: RwLock<HashMap<Cell, Fault>>,
    /// Executed write transactions
    writes: RwLock<Vec<WriteRecord>>,
    /// Number of read transactions served
    reads: AtomicUsize,
}

impl MemoryBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bus seeded from a `memory` transport configuration
    pub fn from_config(config: &TransportConfig) -> Result<Self> {
        let TransportConfig::Memory { registers, coils } = config else {
            return Err(DeviceError::configuration("MemoryBus requires a memory transport configuration"));
        };

        let mut words = HashMap::new();
        for (key, value) in registers {
            words.insert(parse_cell(key)?, *value);
        }
        let mut bits = HashMap::new();
        for (key, value) in coils {
            bits.insert(parse_cell(key)?, *value);
        }

        debug!(
            "Seeded memory bus with {} registers and {} coils",
            words.len(),
            bits.len()
        );

        Ok(Self {
            words: RwLock::new(words),
            bits: RwLock::new(bits),
            ..Self::default()
        })
    }

    /// Set a register word
    pub async fn set_word(&self, device_address: &str, address: u16, value: u16) {
        self.words
            .write()
            .await
            .insert((device_address.to_string(), address), value);
    }

    /// Set consecutive register words starting at `address`
    pub async fn set_words(&self, device_address: &str, address: u16, values: &[u16]) {
        let mut words = self.words.write().await;
        for (i, value) in values.iter().enumerate() {
            words.insert((device_address.to_string(), address.wrapping_add(i as u16)), *value);
        }
    }

    /// Set a coil or discrete input bit
    pub async fn set_bit(&self, device_address: &str, address: u16, value: bool) {
        self.bits
            .write()
            .await
            .insert((device_address.to_string(), address), value);
    }

    /// Current register word
    pub async fn word(&self, device_address: &str, address: u16) -> Option<u16> {
        self.words
            .read()
            .await
            .get(&(device_address.to_string(), address))
            .copied()
    }

    /// Current coil bit
    pub async fn bit(&self, device_address: &str, address: u16) -> Option<bool> {
        self.bits
            .read()
            .await
            .get(&(device_address.to_string(), address))
            .copied()
    }

    /// Inject a fault for reads touching the register
    pub async fn inject_fault(&self, device_address: &str, address: u16, fault: Fault) {
        self.faults
            .write()
            .await
            .insert((device_address.to_string(), address), fault);
    }

    /// Remove every injected fault
    pub async fn clear_faults(&self) {
        self.faults.write().await.clear();
    }

    /// Number of read transactions served so far
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Write transactions executed so far
    pub async fn writes(&self) -> Vec<WriteRecord> {
        self.writes.read().await.clone()
    }

    async fn fault_for(&self, device_address: &str, address: u16, count: u16) -> Option<Fault> {
        let faults = self.faults.read().await;
        (0..count).find_map(|i| {
            faults
                .get(&(device_address.to_string(), address.wrapping_add(i)))
                .cloned()
        })
    }
}

fn parse_cell(key: &str) -> Result<Cell> {
    let (device, address) = key.rsplit_once('/').ok_or_else(|| {
        DeviceError::configuration(format!(
            "Memory bus key '{}' must look like '<device_address>/<register_address>'",
            key
        ))
    })?;
    let address = parse_hex_u32(address)?;
    let address = u16::try_from(address).map_err(|_| {
        DeviceError::configuration(format!("Register address in '{}' exceeds 0xFFFF", key))
    })?;
    Ok((device.to_string(), address))
}

#[async_trait]
impl BusTransport for MemoryBus {
    fn name(&self) -> &str {
        "memory"
    }

    async fn read_registers(
        &self,
        device_address: &str,
        register_type: RegisterType,
        address: u16,
        count: u16,
    ) -> Result<RegisterData> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        trace!(
            "memory read {} {} 0x{:04X} x{}",
            device_address,
            register_type,
            address,
            count
        );

        let mut short = false;
        match self.fault_for(device_address, address, count).await {
            Some(Fault::Error(msg)) => return Err(DeviceError::communication(msg)),
            Some(Fault::Delay(delay)) => tokio::time::sleep(delay).await,
            Some(Fault::Short) => short = true,
            None => {}
        }

        let served = if short { count.saturating_sub(1) } else { count };
        let missing = |offset: u16| {
            DeviceError::communication(format!(
                "Illegal data address 0x{:04X} on device {}",
                address.wrapping_add(offset),
                device_address
            ))
        };

        if register_type.is_bit() {
            let bits = self.bits.read().await;
            let mut out = Vec::with_capacity(served as usize);
            for i in 0..served {
                let cell = (device_address.to_string(), address.wrapping_add(i));
                out.push(*bits.get(&cell).ok_or_else(|| missing(i))?);
            }
            Ok(RegisterData::Bits(out))
        } else {
            let words = self.words.read().await;
            let mut out = Vec::with_capacity(served as usize);
            for i in 0..served {
                let cell = (device_address.to_string(), address.wrapping_add(i));
                out.push(*words.get(&cell).ok_or_else(|| missing(i))?);
            }
            Ok(RegisterData::Words(out))
        }
    }

    async fn write_register(&self, device_address: &str, address: u16, value: RegisterWrite) -> Result<()> {
        match &value {
            RegisterWrite::Coil(state) => self.set_bit(device_address, address, *state).await,
            RegisterWrite::Words(words) => self.set_words(device_address, address, words).await,
        }
        debug!("memory write {} 0x{:04X} {:?}", device_address, address, value);
        self.writes.write().await.push(WriteRecord {
            device_address: device_address.to_string(),
            address,
            value,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_read_words_and_bits() {
        let bus = MemoryBus::new();
        bus.set_words("20.00.00", 0x10, &[1, 2, 3]).await;
        bus.set_bit("20.00.00", 0x4000, true).await;

        let data = bus
            .read_registers("20.00.00", RegisterType::Holding, 0x10, 3)
            .await
            .unwrap();
        assert_eq!(data, RegisterData::Words(vec![1, 2, 3]));

        // input registers share the word table
        let data = bus.read_registers("20.00.00", RegisterType::Read, 0x11, 1).await.unwrap();
        assert_eq!(data, RegisterData::Words(vec![2]));

        let data = bus.read_registers("20.00.00", RegisterType::Coil, 0x4000, 1).await.unwrap();
        assert_eq!(data, RegisterData::Bits(vec![true]));

        assert_eq!(bus.read_count(), 3);
    }

    #[tokio::test]
    async fn test_missing_register() {
        let bus = MemoryBus::new();
        bus.set_word("20.00.00", 0x10, 1).await;

        let err = bus
            .read_registers("20.00.00", RegisterType::Holding, 0x10, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::Communication(_)));

        let err = bus
            .read_registers("20.00.01", RegisterType::Holding, 0x10, 1)
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_faults() {
        let bus = MemoryBus::new();
        bus.set_words("20.00.00", 0x10, &[1, 2]).await;

        bus.inject_fault("20.00.00", 0x11, Fault::Short).await;
        let data = bus.read_registers("20.00.00", RegisterType::Holding, 0x10, 2).await.unwrap();
        assert_eq!(data.len(), 1);

        bus.inject_fault("20.00.00", 0x11, Fault::Error("boom".into())).await;
        assert_err!(bus.read_registers("20.00.00", RegisterType::Holding, 0x10, 2).await);
        // a read not touching the faulty register is unaffected
        assert_ok!(bus.read_registers("20.00.00", RegisterType::Holding, 0x10, 1).await);

        bus.clear_faults().await;
        assert_ok!(bus.read_registers("20.00.00", RegisterType::Holding, 0x10, 2).await);
    }

    #[tokio::test]
    async fn test_writes_are_recorded() {
        let bus = MemoryBus::new();
        bus.write_register("20.00.00", 0x20, RegisterWrite::Words(vec![7, 8]))
            .await
            .unwrap();
        bus.write_register("20.00.00", 0x4000, RegisterWrite::Coil(true))
            .await
            .unwrap();

        assert_eq!(bus.word("20.00.00", 0x21).await, Some(8));
        assert_eq!(bus.bit("20.00.00", 0x4000).await, Some(true));
        assert_eq!(bus.writes().await.len(), 2);
    }

    #[test]
    fn test_from_config() {
        let mut registers = BTreeMap::new();
        registers.insert("20.00.00/0x4201".to_string(), 225);
        registers.insert("20.00.00/16898".to_string(), 1);
        let mut coils = BTreeMap::new();
        coils.insert("20.00.00/0x4000".to_string(), true);

        let bus = MemoryBus::from_config(&TransportConfig::Memory { registers, coils }).unwrap();
        let words = bus.words.try_read().unwrap();
        assert_eq!(words.get(&("20.00.00".to_string(), 0x4201)), Some(&225));
        assert_eq!(words.get(&("20.00.00".to_string(), 0x4202)), Some(&1));

        let mut registers = BTreeMap::new();
        registers.insert("no-slash".to_string(), 1);
        let result = MemoryBus::from_config(&TransportConfig::Memory {
            registers,
            coils: BTreeMap::new(),
        });
        assert!(result.is_err());
    }
}
