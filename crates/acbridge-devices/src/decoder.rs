/*!
 * Register value decoding and encoding.
 *
 * Decoding turns the raw payload of a read into a typed value:
 *
 * 1. bit tables (coils, discrete inputs) yield a boolean untouched by scaling;
 * 2. word tables combine one or two words according to the value type, with
 *    `*_R` types carrying the low word first;
 * 3. integers are masked with the bitmask, floats are not;
 * 4. the result is scaled: `raw * multiplier + offset`.
 *
 * Encoding is the inverse used for writes. It does not reverse the bitmask.
 */
use crate::error::{DeviceError, Result};
use crate::register::{RegisterConfig, RegisterType, ValueType};
use crate::transport::{RegisterData, RegisterWrite};

/// Decoded register value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegisterValue {
    /// Coil or discrete input state
    Bool(bool),
    /// Scaled numeric value
    Number(f64),
}

impl RegisterValue {
    /// Numeric view, booleans map to 1.0 and 0.0
    pub fn as_f64(&self) -> f64 {
        match self {
            RegisterValue::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            RegisterValue::Number(n) => *n,
        }
    }
}

/// Decode the payload of a read for the given register
pub fn decode(data: &RegisterData, config: &RegisterConfig) -> Result<RegisterValue> {
    if config.register_type.is_bit() {
        return match data {
            RegisterData::Bits(bits) => bits
                .first()
                .copied()
                .map(RegisterValue::Bool)
                .ok_or_else(|| DeviceError::malformed(format!("Empty bit read for 0x{:04X}", config.address))),
            RegisterData::Words(_) => Err(DeviceError::malformed(format!(
                "Expected bits for {} register 0x{:04X}, got words",
                config.register_type, config.address
            ))),
        };
    }

    let words = match data {
        RegisterData::Words(words) => words,
        RegisterData::Bits(_) => {
            return Err(DeviceError::malformed(format!(
                "Expected words for {} register 0x{:04X}, got bits",
                config.register_type, config.address
            )))
        }
    };

    let needed = config.value_type.word_count() as usize;
    if words.len() < needed {
        return Err(DeviceError::malformed(format!(
            "{} at 0x{:04X} needs {} words, got {}",
            config.value_type,
            config.address,
            needed,
            words.len()
        )));
    }

    let raw = raw_number(&words[..needed], config.value_type, config.bitmask);
    Ok(RegisterValue::Number(raw * config.multiplier + config.offset))
}

fn combine(words: &[u16], swapped: bool) -> u32 {
    let (high, low) = if swapped {
        (words[1], words[0])
    } else {
        (words[0], words[1])
    };
    (u32::from(high) << 16) | u32::from(low)
}

fn raw_number(words: &[u16], value_type: ValueType, bitmask: u32) -> f64 {
    match value_type {
        ValueType::UnsignedWord => f64::from(u32::from(words[0]) & bitmask),
        ValueType::SignedWord => f64::from((u32::from(words[0]) & bitmask) as u16 as i16),
        ValueType::UnsignedDWord | ValueType::UnsignedDWordSwapped => {
            f64::from(combine(words, value_type.is_swapped()) & bitmask)
        }
        ValueType::SignedDWord | ValueType::SignedDWordSwapped => {
            f64::from((combine(words, value_type.is_swapped()) & bitmask) as i32)
        }
        ValueType::Float32 | ValueType::Float32Swapped => {
            f64::from(f32::from_bits(combine(words, value_type.is_swapped())))
        }
    }
}

/// Encode a physical value into the payload written to the register
pub fn encode(value: f64, config: &RegisterConfig) -> Result<RegisterWrite> {
    match config.register_type {
        RegisterType::Coil => return Ok(RegisterWrite::Coil(value > 0.5)),
        RegisterType::DiscreteInput | RegisterType::Read => {
            return Err(DeviceError::ReadOnly(format!(
                "{} register 0x{:04X} on {}",
                config.register_type, config.address, config.device_address
            )))
        }
        RegisterType::Holding => {}
    }

    if !value.is_finite() {
        return Err(DeviceError::InvalidValue(format!(
            "Cannot write non-finite value {} to 0x{:04X}",
            value, config.address
        )));
    }

    let raw = unapply(value, config);
    let value_type = config.value_type;

    if value_type.is_float() {
        return Ok(RegisterWrite::Words(split((raw as f32).to_bits(), value_type.is_swapped())));
    }

    let rounded = raw.round();
    let (min, max) = match value_type {
        ValueType::UnsignedWord => (0.0, f64::from(u16::MAX)),
        ValueType::SignedWord => (f64::from(i16::MIN), f64::from(i16::MAX)),
        ValueType::UnsignedDWord | ValueType::UnsignedDWordSwapped => (0.0, f64::from(u32::MAX)),
        _ => (f64::from(i32::MIN), f64::from(i32::MAX)),
    };
    if rounded < min || rounded > max {
        return Err(DeviceError::OutOfRange(format!(
            "{} encodes to {} which does not fit {}",
            value, rounded, value_type
        )));
    }

    let words = match value_type {
        ValueType::UnsignedWord => vec![rounded as u16],
        ValueType::SignedWord => vec![rounded as i16 as u16],
        ValueType::UnsignedDWord | ValueType::UnsignedDWordSwapped => {
            split(rounded as u32, value_type.is_swapped())
        }
        _ => split(rounded as i32 as u32, value_type.is_swapped()),
    };
    Ok(RegisterWrite::Words(words))
}

fn split(bits: u32, swapped: bool) -> Vec<u16> {
    let high = (bits >> 16) as u16;
    let low = bits as u16;
    if swapped {
        vec![low, high]
    } else {
        vec![high, low]
    }
}

/// Scale a raw value pushed by the upstream protocol component
///
/// The bitmask is applied to the value truncated to an unsigned 32-bit integer.
pub fn apply(raw: f64, config: &RegisterConfig) -> f64 {
    let raw = if config.has_bitmask() {
        f64::from((raw as u32) & config.bitmask)
    } else {
        raw
    };
    raw * config.multiplier + config.offset
}

/// Undo multiplier and offset
pub fn unapply(value: f64, config: &RegisterConfig) -> f64 {
    (value - config.offset) / config.multiplier
}
