//! Context table shared by both context kinds.
//!
//! One parametric table type is instantiated once for integrity and once for
//! ciphering. Each instance has its own lock, and that lock only ever covers
//! a map lookup, insert or erase. Engine calls happen on an `Arc` copied out
//! of the table after the lock is released.

use parking_lot::Mutex;
use secu_common::{AlgorithmId, ContextId, ContextKind, Result, SecuError};
use std::collections::HashMap;
use std::sync::Arc;

/// `{algorithm, engine handle}` stored once per live context.
#[derive(Debug)]
pub struct ContextEntry<C> {
    pub algorithm: AlgorithmId,
    pub context: Arc<C>,
}

impl<C> ContextEntry<C> {
    pub fn new(algorithm: AlgorithmId, context: C) -> Self {
        Self {
            algorithm,
            context: Arc::new(context),
        }
    }
}

// Manual impl: cloning an entry clones the Arc, never the engine context.
impl<C> Clone for ContextEntry<C> {
    fn clone(&self) -> Self {
        Self {
            algorithm: self.algorithm,
            context: Arc::clone(&self.context),
        }
    }
}

#[derive(Debug)]
pub struct ContextTable<C> {
    kind: ContextKind,
    capacity: usize,
    entries: Mutex<HashMap<ContextId, ContextEntry<C>>>,
}

impl<C> ContextTable<C> {
    pub fn new(kind: ContextKind, capacity: usize) -> Self {
        Self {
            kind,
            capacity,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Stores an entry under a freshly allocated id.
    ///
    /// When the table is full the entry is handed back so the caller can
    /// release its engine context outside the lock.
    pub fn insert(
        &self,
        id: ContextId,
        entry: ContextEntry<C>,
    ) -> std::result::Result<(), ContextEntry<C>> {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            return Err(entry);
        }
        let previous = entries.insert(id, entry);
        debug_assert!(previous.is_none(), "id {} allocated twice", id);
        Ok(())
    }

    /// Copies out the entry for `id`.
    pub fn lookup(&self, id: ContextId) -> Result<ContextEntry<C>> {
        self.entries
            .lock()
            .get(&id)
            .cloned()
            .ok_or(SecuError::UnknownContext {
                kind: self.kind,
                id: id.as_u64(),
            })
    }

    /// Erases the entry for `id` if present.
    pub fn remove(&self, id: ContextId) -> Option<ContextEntry<C>> {
        self.entries.lock().remove(&id)
    }

    /// Empties the table, returning every entry for release.
    pub fn drain(&self) -> Vec<(ContextId, ContextEntry<C>)> {
        self.entries.lock().drain().collect()
    }
}
