//! Monotonic context id allocation.
//!
//! One allocator is shared by the integrity and ciphering tables, so an id
//! handed out for one kind is never live in the other. Ids are never reused
//! after free; a freed-then-reallocated id cannot satisfy a stale compute.

use secu_common::{ContextId, Result, SecuError, MAX_SEQUENCE};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub struct IdAllocator {
    epoch: u16,
    next: AtomicU64,
}

impl IdAllocator {
    /// Allocator whose first id is `from_parts(epoch, 1)`.
    pub fn new(epoch: u16) -> Self {
        Self::starting_at(epoch, 1)
    }

    /// Allocator with a random epoch, distinct across broker restarts with
    /// high probability.
    pub fn with_random_epoch() -> Self {
        Self::new(rand::random::<u16>())
    }

    pub(crate) fn starting_at(epoch: u16, next: u64) -> Self {
        Self {
            epoch,
            next: AtomicU64::new(next),
        }
    }

    pub fn epoch(&self) -> u16 {
        self.epoch
    }

    /// Hands out the next id. Once the sequence space is used up every call
    /// fails; the counter never wraps.
    pub fn allocate(&self) -> Result<ContextId> {
        let exhausted = SecuError::IdSpaceExhausted { epoch: self.epoch };
        let sequence = self
            .next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                (n <= MAX_SEQUENCE).then_some(n + 1)
            })
            .map_err(|_| exhausted.clone())?;
        ContextId::from_parts(self.epoch, sequence).ok_or(exhausted)
    }
}
