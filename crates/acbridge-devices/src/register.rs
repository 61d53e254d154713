/*!
 * Register configuration.
 *
 * A [`RegisterConfig`] describes where one value lives on the bus and how its
 * raw words are turned into a physical value. Register addresses double as
 * NASA message numbers on Samsung controllers.
 */
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use acbridge_core::utils::hex_int;

use crate::error::{DeviceError, Result};

/// Bitmask value meaning "keep every bit"
pub const ALL_BITS: u32 = 0xFFFF_FFFF;

/// Modbus register table a value is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum RegisterType {
    /// Single-bit read/write coil
    Coil,
    /// Single-bit read-only input
    DiscreteInput,
    /// 16-bit read/write holding register
    Holding,
    /// 16-bit read-only input register
    Read,
}

impl RegisterType {
    /// Configuration key of the register type
    pub fn as_str(&self) -> &'static str {
        match self {
            RegisterType::Coil => "coil",
            RegisterType::DiscreteInput => "discrete_input",
            RegisterType::Holding => "holding",
            RegisterType::Read => "read",
        }
    }

    /// Whether reads of this table yield booleans
    pub fn is_bit(&self) -> bool {
        matches!(self, RegisterType::Coil | RegisterType::DiscreteInput)
    }

    /// Whether values of this table can be written
    pub fn is_writable(&self) -> bool {
        matches!(self, RegisterType::Coil | RegisterType::Holding)
    }

    /// Modbus function code used to read this table
    pub fn read_function_code(&self) -> u8 {
        match self {
            RegisterType::Coil => 0x01,
            RegisterType::DiscreteInput => 0x02,
            RegisterType::Holding => 0x03,
            RegisterType::Read => 0x04,
        }
    }
}

impl Default for RegisterType {
    fn default() -> Self {
        RegisterType::Holding
    }
}

impl fmt::Display for RegisterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegisterType {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coil" => Ok(RegisterType::Coil),
            "discrete_input" => Ok(RegisterType::DiscreteInput),
            "holding" => Ok(RegisterType::Holding),
            "read" => Ok(RegisterType::Read),
            other => Err(DeviceError::configuration(format!(
                "Unknown register_type '{}' (expected coil, discrete_input, holding or read)",
                other
            ))),
        }
    }
}

impl TryFrom<String> for RegisterType {
    type Error = DeviceError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RegisterType> for &'static str {
    fn from(value: RegisterType) -> Self {
        value.as_str()
    }
}

/// Layout of the raw value inside one or two 16-bit words
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum ValueType {
    /// Unsigned 16-bit integer
    UnsignedWord,
    /// Signed 16-bit integer
    SignedWord,
    /// Unsigned 32-bit integer, high word first
    UnsignedDWord,
    /// Signed 32-bit integer, high word first
    SignedDWord,
    /// Unsigned 32-bit integer, low word first
    UnsignedDWordSwapped,
    /// Signed 32-bit integer, low word first
    SignedDWordSwapped,
    /// IEEE-754 single precision float, high word first
    Float32,
    /// IEEE-754 single precision float, low word first
    Float32Swapped,
}

impl ValueType {
    /// Configuration key of the value type
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::UnsignedWord => "U_WORD",
            ValueType::SignedWord => "S_WORD",
            ValueType::UnsignedDWord => "U_DWORD",
            ValueType::SignedDWord => "S_DWORD",
            ValueType::UnsignedDWordSwapped => "U_DWORD_R",
            ValueType::SignedDWordSwapped => "S_DWORD_R",
            ValueType::Float32 => "FP32",
            ValueType::Float32Swapped => "FP32_R",
        }
    }

    /// Number of 16-bit words holding the value
    pub fn word_count(&self) -> u16 {
        match self {
            ValueType::UnsignedWord | ValueType::SignedWord => 1,
            _ => 2,
        }
    }

    /// Whether the low word comes first on the wire
    pub fn is_swapped(&self) -> bool {
        matches!(
            self,
            ValueType::UnsignedDWordSwapped | ValueType::SignedDWordSwapped | ValueType::Float32Swapped
        )
    }

    /// Whether the value is a float (bitmask is not applied to floats)
    pub fn is_float(&self) -> bool {
        matches!(self, ValueType::Float32 | ValueType::Float32Swapped)
    }

    /// Whether the integer is two's complement
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            ValueType::SignedWord | ValueType::SignedDWord | ValueType::SignedDWordSwapped
        )
    }
}

impl Default for ValueType {
    fn default() -> Self {
        ValueType::UnsignedWord
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "U_WORD" => Ok(ValueType::UnsignedWord),
            "S_WORD" => Ok(ValueType::SignedWord),
            "U_DWORD" => Ok(ValueType::UnsignedDWord),
            "S_DWORD" => Ok(ValueType::SignedDWord),
            "U_DWORD_R" => Ok(ValueType::UnsignedDWordSwapped),
            "S_DWORD_R" => Ok(ValueType::SignedDWordSwapped),
            "FP32" => Ok(ValueType::Float32),
            "FP32_R" => Ok(ValueType::Float32Swapped),
            other => Err(DeviceError::configuration(format!(
                "Unknown value_type '{}' (expected U_WORD, S_WORD, U_DWORD, S_DWORD, U_DWORD_R, S_DWORD_R, FP32 or FP32_R)",
                other
            ))),
        }
    }
}

impl TryFrom<String> for ValueType {
    type Error = DeviceError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ValueType> for &'static str {
    fn from(value: ValueType) -> Self {
        value.as_str()
    }
}

/// Where a value lives on the bus and how to decode it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterConfig {
    /// Register address (NASA message number)
    #[serde(
        rename = "register_address",
        serialize_with = "hex_int::serialize_u16",
        deserialize_with = "hex_int::deserialize_u16"
    )]
    pub address: u16,

    /// Register table
    #[serde(default)]
    pub register_type: RegisterType,

    /// Word layout
    #[serde(default)]
    pub value_type: ValueType,

    /// Target device, e.g. `"20.00.00"`
    pub device_address: String,

    /// Scale applied after decoding
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Offset added after scaling
    #[serde(default)]
    pub offset: f64,

    /// Mask applied to the raw integer before scaling
    #[serde(
        default = "default_bitmask",
        serialize_with = "hex_int::serialize_u32",
        deserialize_with = "hex_int::deserialize_u32"
    )]
    pub bitmask: u32,
}

fn default_multiplier() -> f64 {
    1.0
}

fn default_bitmask() -> u32 {
    ALL_BITS
}

/// Identity of a single register read on the bus
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegisterKey {
    /// Target device
    pub device_address: String,
    /// Register table
    pub register_type: RegisterType,
    /// First register address
    pub address: u16,
}

impl fmt::Display for RegisterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/0x{:04X}", self.device_address, self.register_type, self.address)
    }
}

impl RegisterConfig {
    /// Create a holding `U_WORD` register with default scaling
    pub fn new<S: Into<String>>(device_address: S, address: u16) -> Self {
        Self {
            address,
            register_type: RegisterType::default(),
            value_type: ValueType::default(),
            device_address: device_address.into(),
            multiplier: default_multiplier(),
            offset: 0.0,
            bitmask: ALL_BITS,
        }
    }

    /// Set the register table
    pub fn with_register_type(mut self, register_type: RegisterType) -> Self {
        self.register_type = register_type;
        self
    }

    /// Set the word layout
    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    /// Set the multiplier
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the offset
    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    /// Set the bitmask
    pub fn with_bitmask(mut self, bitmask: u32) -> Self {
        self.bitmask = bitmask;
        self
    }

    /// Number of registers (words or bits) one read of this value spans
    pub fn register_count(&self) -> u16 {
        if self.register_type.is_bit() {
            1
        } else {
            self.value_type.word_count()
        }
    }

    /// Whether a bitmask other than all ones is configured
    pub fn has_bitmask(&self) -> bool {
        self.bitmask != ALL_BITS
    }

    /// Whether commands can be written back to this register
    pub fn is_writable(&self) -> bool {
        self.register_type.is_writable()
    }

    /// Bus identity of this register
    pub fn key(&self) -> RegisterKey {
        RegisterKey {
            device_address: self.device_address.clone(),
            register_type: self.register_type,
            address: self.address,
        }
    }

    /// Check the configuration before any runtime component is built
    pub fn validate(&self) -> Result<()> {
        if self.device_address.trim().is_empty() {
            return Err(DeviceError::configuration("device_address must not be empty"));
        }
        if !self.multiplier.is_finite() || self.multiplier == 0.0 {
            return Err(DeviceError::configuration(format!(
                "multiplier must be a finite non-zero number, got {}",
                self.multiplier
            )));
        }
        if !self.offset.is_finite() {
            return Err(DeviceError::configuration(format!(
                "offset must be finite, got {}",
                self.offset
            )));
        }
        if u32::from(self.address) + u32::from(self.register_count()) > 0x1_0000 {
            return Err(DeviceError::configuration(format!(
                "register 0x{:04X} with {} words runs past the end of the address space",
                self.address,
                self.register_count()
            )));
        }
        Ok(())
    }
}
