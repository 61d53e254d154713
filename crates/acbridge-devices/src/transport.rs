/*!
 * Bus transport abstraction.
 *
 * A transport executes raw register reads and writes against a device
 * address. The controller never talks to the wire directly; it goes through
 * [`BusTransport`] so the same polling code runs against a real Modbus
 * gateway or an in-memory bus.
 */
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Buf;

use crate::error::{DeviceError, Result};
use crate::register::RegisterType;

/// Raw payload of one read transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterData {
    /// 16-bit words from holding or input registers
    Words(Vec<u16>),
    /// Bits from coils or discrete inputs
    Bits(Vec<bool>),
}

impl RegisterData {
    /// Parse big-endian register words from a response body
    pub fn from_be_bytes<B: Buf>(mut buf: B) -> Result<Self> {
        if buf.remaining() % 2 != 0 {
            return Err(DeviceError::malformed(format!(
                "Odd payload length {} for 16-bit registers",
                buf.remaining()
            )));
        }
        let mut words = Vec::with_capacity(buf.remaining() / 2);
        while buf.has_remaining() {
            words.push(buf.get_u16());
        }
        Ok(RegisterData::Words(words))
    }

    /// Number of words or bits carried
    pub fn len(&self) -> usize {
        match self {
            RegisterData::Words(words) => words.len(),
            RegisterData::Bits(bits) => bits.len(),
        }
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sub-range of the payload, `None` when it runs past the end
    pub fn slice(&self, offset: usize, count: usize) -> Option<RegisterData> {
        let end = offset.checked_add(count)?;
        match self {
            RegisterData::Words(words) => words.get(offset..end).map(|w| RegisterData::Words(w.to_vec())),
            RegisterData::Bits(bits) => bits.get(offset..end).map(|b| RegisterData::Bits(b.to_vec())),
        }
    }
}

/// Payload of one write transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterWrite {
    /// Single coil state
    Coil(bool),
    /// One or more holding register words starting at the target address
    Words(Vec<u16>),
}

/// Executes register transactions on a bus
#[async_trait]
pub trait BusTransport: Send + Sync + Debug {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Read `count` consecutive registers of one table
    async fn read_registers(
        &self,
        device_address: &str,
        register_type: RegisterType,
        address: u16,
        count: u16,
    ) -> Result<RegisterData>;

    /// Write a value starting at `address`
    async fn write_register(&self, device_address: &str, address: u16, value: RegisterWrite) -> Result<()>;
}

/// Transport shared between the controller and its entities
pub type SharedTransport = Arc<dyn BusTransport>;

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_from_be_bytes() {
        let data = RegisterData::from_be_bytes(Bytes::from_static(&[0x00, 0x01, 0xAB, 0xCD])).unwrap();
        assert_eq!(data, RegisterData::Words(vec![0x0001, 0xABCD]));

        assert!(RegisterData::from_be_bytes(Bytes::from_static(&[0x00, 0x01, 0x02])).is_err());
    }

    #[test]
    fn test_slice() {
        let data = RegisterData::Words(vec![1, 2, 3, 4]);
        assert_eq!(data.slice(1, 2), Some(RegisterData::Words(vec![2, 3])));
        assert_eq!(data.slice(3, 2), None);

        let bits = RegisterData::Bits(vec![true, false]);
        assert_eq!(bits.slice(1, 1), Some(RegisterData::Bits(vec![false])));
        assert_eq!(bits.len(), 2);
    }
}
