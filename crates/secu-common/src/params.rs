//! Per-frame stream cipher parameters and the bearer/length conversions
//! applied at the caller-facing boundary.

use crate::error::{Result, SecuError};
use crate::ids::ContextId;
use serde::{Deserialize, Serialize};

/// Key length accepted by Init, in bytes.
pub const KEY_LEN: usize = 16;

/// MAC length returned by ComputeIntegrity, in bytes.
pub const MAC_LEN: usize = 4;

/// Largest bearer value carried on the wire (0-based).
pub const MAX_WIRE_BEARER: u8 = 31;

/// Largest bearer value accepted from call sites (1-based).
pub const MAX_CALLER_BEARER: u8 = 32;

pub type Key128 = [u8; KEY_LEN];
pub type Mac = [u8; MAC_LEN];

/// Copies a 16-byte key out of a wire buffer.
pub fn key_from_slice(bytes: &[u8]) -> Result<Key128> {
    bytes.try_into().map_err(|_| {
        SecuError::invalid("key", format!("expected {} bytes, got {}", KEY_LEN, bytes.len()))
    })
}

/// Number of bytes covered by `bit_length` bits.
pub fn required_bytes(bit_length: u32) -> usize {
    (bit_length as usize).div_ceil(8)
}

/// Maps a 1-based caller bearer to the 0-based wire bearer.
///
/// Bearer `0` clamps to wire `0`; anything above 32 is rejected.
pub fn wire_bearer(caller_bearer: u8) -> Result<u8> {
    if caller_bearer > MAX_CALLER_BEARER {
        return Err(SecuError::invalid(
            "bearer",
            format!("{} outside 1..={}", caller_bearer, MAX_CALLER_BEARER),
        ));
    }
    Ok(caller_bearer.saturating_sub(1))
}

/// Converts a caller byte length into the bit length carried on the wire.
pub fn bit_length_of(length_bytes: usize) -> Result<u32> {
    u32::try_from(length_bytes)
        .ok()
        .and_then(|len| len.checked_mul(8))
        .ok_or_else(|| SecuError::invalid("length", format!("{} bytes overflows a u32 bit length", length_bytes)))
}

/// Transmission direction of the protected frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Uplink = 0,
    Downlink = 1,
}

impl Direction {
    pub fn as_bit(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u32> for Direction {
    type Error = SecuError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Direction::Uplink),
            1 => Ok(Direction::Downlink),
            other => Err(SecuError::invalid(
                "direction",
                format!("{} is not 0 or 1", other),
            )),
        }
    }
}

/// Everything the engine needs for one frame, minus the context itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFrame<'a> {
    pub count: u32,
    /// 0-based bearer, `0..=31`.
    pub bearer: u8,
    pub direction: Direction,
    /// Exactly `ceil(bit_length / 8)` bytes.
    pub message: &'a [u8],
    pub bit_length: u32,
}

/// Parameters of one ComputeIntegrity / ComputeEncrypt call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamCipherParams {
    pub context: ContextId,
    pub count: u32,
    /// 0-based wire bearer.
    pub bearer: u8,
    pub direction: Direction,
    pub message: Vec<u8>,
    /// Independent of `message.len()`.
    pub bit_length: u32,
}

impl StreamCipherParams {
    pub fn required_bytes(&self) -> usize {
        required_bytes(self.bit_length)
    }

    /// Checks ranges and that `message` covers `bit_length`.
    pub fn validate(&self) -> Result<()> {
        if self.bearer > MAX_WIRE_BEARER {
            return Err(SecuError::invalid(
                "bearer",
                format!("wire bearer {} outside 0..={}", self.bearer, MAX_WIRE_BEARER),
            ));
        }
        let needed = self.required_bytes();
        if self.message.len() < needed {
            return Err(SecuError::invalid(
                "message",
                format!(
                    "{} bytes do not cover bit_length {} ({} bytes needed)",
                    self.message.len(),
                    self.bit_length,
                    needed
                ),
            ));
        }
        Ok(())
    }

    /// Validated borrowed view handed to the engine.
    pub fn frame(&self) -> Result<StreamFrame<'_>> {
        self.validate()?;
        Ok(StreamFrame {
            count: self.count,
            bearer: self.bearer,
            direction: self.direction,
            message: &self.message[..self.required_bytes()],
            bit_length: self.bit_length,
        })
    }
}
