//! Context identifiers, context kinds and algorithm identifiers.
//!
//! # Safety Improvements over the pointer round-trip
//!
//! - `ContextId` is non-zero by construction; the wire sentinel `0` maps to `None`
//! - The high 16 bits carry the broker epoch, so ids minted by a previous
//!   broker process never resolve against a restarted one
//! - The 48-bit sequence never wraps; exhaustion is reported by the allocator

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU64;

/// Number of id bits holding the per-process epoch.
pub const EPOCH_BITS: u32 = 16;

/// Number of id bits holding the monotonic sequence.
pub const SEQUENCE_BITS: u32 = 64 - EPOCH_BITS;

/// Largest sequence value an id can carry.
pub const MAX_SEQUENCE: u64 = (1 << SEQUENCE_BITS) - 1;

/// Opaque reference to a live server-side context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(NonZeroU64);

impl ContextId {
    /// Builds an id from an epoch and a sequence number.
    ///
    /// Returns `None` for sequence `0` or a sequence above [`MAX_SEQUENCE`].
    pub fn from_parts(epoch: u16, sequence: u64) -> Option<Self> {
        if sequence == 0 || sequence > MAX_SEQUENCE {
            return None;
        }
        let raw = (u64::from(epoch) << SEQUENCE_BITS) | sequence;
        NonZeroU64::new(raw).map(ContextId)
    }

    /// Interprets a wire value; `0` is the "no context" sentinel.
    pub fn from_wire(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(ContextId)
    }

    /// Wire representation.
    pub fn as_u64(self) -> u64 {
        self.0.get()
    }

    pub fn epoch(self) -> u16 {
        (self.0.get() >> SEQUENCE_BITS) as u16
    }

    pub fn sequence(self) -> u64 {
        self.0.get() & MAX_SEQUENCE
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0.get())
    }
}

/// Which table a context lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextKind {
    Integrity,
    Ciphering,
}

impl ContextKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContextKind::Integrity => "integrity",
            ContextKind::Ciphering => "ciphering",
        }
    }
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque algorithm identifier, forwarded untouched to the engine.
///
/// The constants follow the 3GPP numbering shared by EIA/NIA and EEA/NEA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlgorithmId(pub u32);

impl AlgorithmId {
    /// Null integrity (NIA0 / EIA0).
    pub const NIA0: AlgorithmId = AlgorithmId(0);
    /// SNOW 3G integrity (NIA1 / EIA1).
    pub const NIA1: AlgorithmId = AlgorithmId(1);
    /// AES-CMAC integrity (NIA2 / EIA2).
    pub const NIA2: AlgorithmId = AlgorithmId(2);
    /// ZUC integrity (NIA3 / EIA3).
    pub const NIA3: AlgorithmId = AlgorithmId(3);
    /// Null ciphering (NEA0 / EEA0).
    pub const NEA0: AlgorithmId = AlgorithmId(0);
    /// SNOW 3G ciphering (NEA1 / EEA1).
    pub const NEA1: AlgorithmId = AlgorithmId(1);
    /// AES-CTR ciphering (NEA2 / EEA2).
    pub const NEA2: AlgorithmId = AlgorithmId(2);
    /// ZUC ciphering (NEA3 / EEA3).
    pub const NEA3: AlgorithmId = AlgorithmId(3);
}

impl fmt::Display for AlgorithmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
