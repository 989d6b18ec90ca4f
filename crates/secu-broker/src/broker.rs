//! Crypto context broker.
//!
//! Owns the integrity and ciphering tables, allocates ids, and dispatches
//! per-frame computes to the engine.
//!
//! # Concurrency
//!
//! Table locks cover only lookup/insert/erase. Parameter validation, engine
//! init, engine compute and engine release all run with no broker lock held,
//! so independent contexts compute fully in parallel.
//!
//! # State machine per id
//!
//! ```text
//! absent --Init--> active --Free--> absent
//! ```
//!
//! Compute is valid only while active; otherwise it is `UnknownContext`.

use crate::allocator::IdAllocator;
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::config::ContextsConfig;
use crate::engine::CryptoEngine;
use crate::table::{ContextEntry, ContextTable};
use secu_common::{
    AlgorithmId, ContextId, ContextKind, Key128, Mac, Result, SecuError, StreamCipherParams,
    MAC_LEN,
};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

const AUDIT_SOURCE: &str = "ContextBroker";

#[derive(Debug, Default)]
struct BrokerCounters {
    inits: AtomicU64,
    init_failures: AtomicU64,
    frees: AtomicU64,
    computes: AtomicU64,
    unknown_context: AtomicU64,
    engine_failures: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Point-in-time view of broker activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BrokerStats {
    pub epoch: u16,
    pub integrity_live: usize,
    pub ciphering_live: usize,
    pub inits: u64,
    pub init_failures: u64,
    pub frees: u64,
    pub computes: u64,
    pub unknown_context: u64,
    pub engine_failures: u64,
}

pub struct ContextBroker<E: CryptoEngine> {
    engine: E,
    allocator: IdAllocator,
    integrity: ContextTable<E::Context>,
    ciphering: ContextTable<E::Context>,
    counters: BrokerCounters,
}

impl<E: CryptoEngine> ContextBroker<E> {
    pub fn new(engine: E, config: &ContextsConfig) -> Self {
        let allocator = match config.epoch {
            Some(epoch) => IdAllocator::new(epoch),
            None => IdAllocator::with_random_epoch(),
        };
        Self::with_allocator(engine, allocator, config.max_contexts_per_kind)
    }

    pub(crate) fn with_allocator(engine: E, allocator: IdAllocator, capacity: usize) -> Self {
        info!(
            epoch = allocator.epoch(),
            capacity, "Context broker created"
        );
        Self {
            engine,
            allocator,
            integrity: ContextTable::new(ContextKind::Integrity, capacity),
            ciphering: ContextTable::new(ContextKind::Ciphering, capacity),
            counters: BrokerCounters::default(),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn epoch(&self) -> u16 {
        self.allocator.epoch()
    }

    fn table(&self, kind: ContextKind) -> &ContextTable<E::Context> {
        match kind {
            ContextKind::Integrity => &self.integrity,
            ContextKind::Ciphering => &self.ciphering,
        }
    }

    pub fn integrity_init(&self, algorithm: AlgorithmId, key: &Key128) -> Result<ContextId> {
        self.init(ContextKind::Integrity, algorithm, key)
    }

    pub fn ciphering_init(&self, algorithm: AlgorithmId, key: &Key128) -> Result<ContextId> {
        self.init(ContextKind::Ciphering, algorithm, key)
    }

    pub fn integrity_free(&self, id: ContextId) {
        self.free(ContextKind::Integrity, id)
    }

    pub fn ciphering_free(&self, id: ContextId) {
        self.free(ContextKind::Ciphering, id)
    }

    fn init(&self, kind: ContextKind, algorithm: AlgorithmId, key: &Key128) -> Result<ContextId> {
        let action = format!("{}_init", kind);
        let constructed = match kind {
            ContextKind::Integrity => self.engine.integrity_init(algorithm, key),
            ContextKind::Ciphering => self.engine.ciphering_init(algorithm, key),
        };

        let result = constructed
            .map_err(|e| SecuError::InitFailure {
                kind,
                algorithm,
                reason: e.to_string(),
            })
            .and_then(|context| self.store(kind, ContextEntry::new(algorithm, context)));

        match &result {
            Ok(id) => {
                bump(&self.counters.inits);
                audit_log!(AuditRecord::new(AuditCategory::ContextCreate, AUDIT_SOURCE, &action)
                    .with_outcome(AuditOutcome::Success)
                    .with_object_id(id.to_string())
                    .with_object_type(format!("{}_context", kind))
                    .with_details(serde_json::json!({
                        "algorithm": algorithm.0,
                        "live": self.table(kind).len(),
                    })));
            }
            Err(e) => {
                bump(&self.counters.init_failures);
                audit_log!(AuditRecord::new(AuditCategory::ContextCreate, AUDIT_SOURCE, &action)
                    .with_object_type(format!("{}_context", kind))
                    .with_details(serde_json::json!({ "algorithm": algorithm.0 }))
                    .with_error(e.to_string()));
            }
        }
        result
    }

    /// Allocates an id and stores the entry, releasing the engine context
    /// if either step fails.
    fn store(&self, kind: ContextKind, entry: ContextEntry<E::Context>) -> Result<ContextId> {
        let table = self.table(kind);
        let algorithm = entry.algorithm;

        let id = match self.allocator.allocate() {
            Ok(id) => id,
            Err(e) => {
                self.engine.release(kind, algorithm, entry.context);
                return Err(e);
            }
        };

        match table.insert(id, entry) {
            Ok(()) => Ok(id),
            Err(rejected) => {
                self.engine.release(kind, algorithm, rejected.context);
                Err(SecuError::InitFailure {
                    kind,
                    algorithm,
                    reason: format!("{} table full ({} contexts)", kind, table.capacity()),
                })
            }
        }
    }

    /// Idempotent: unknown ids are a no-op.
    fn free(&self, kind: ContextKind, id: ContextId) {
        let Some(entry) = self.table(kind).remove(id) else {
            debug!(%kind, %id, "Free of unknown context ignored");
            return;
        };

        bump(&self.counters.frees);
        let algorithm = entry.algorithm;
        self.engine.release(kind, algorithm, entry.context);

        audit_log!(AuditRecord::new(
            AuditCategory::ContextDelete,
            AUDIT_SOURCE,
            format!("{}_free", kind)
        )
        .with_outcome(AuditOutcome::Success)
        .with_object_id(id.to_string())
        .with_object_type(format!("{}_context", kind))
        .with_details(serde_json::json!({
            "algorithm": algorithm.0,
            "live": self.table(kind).len(),
        })));
    }

    /// Looks up the context for a compute, auditing a miss.
    fn resolve(
        &self,
        kind: ContextKind,
        algorithm: AlgorithmId,
        id: ContextId,
    ) -> Result<ContextEntry<E::Context>> {
        let entry = self.table(kind).lookup(id).inspect_err(|e| {
            bump(&self.counters.unknown_context);
            audit_log!(AuditRecord::new(
                AuditCategory::ContextAccess,
                AUDIT_SOURCE,
                format!("compute_{}", kind)
            )
            .with_outcome(AuditOutcome::Denied)
            .with_object_id(id.to_string())
            .with_object_type(format!("{}_context", kind))
            .with_details(serde_json::json!({ "epoch": id.epoch(), "broker_epoch": self.epoch() }))
            .with_error(e.to_string()));
        })?;

        if entry.algorithm != algorithm {
            return Err(SecuError::invalid(
                "algorithm",
                format!(
                    "algorithm {} does not match context keyed for {}",
                    algorithm, entry.algorithm
                ),
            ));
        }
        Ok(entry)
    }

    /// Counts and audits a compute the engine could not complete.
    fn engine_failure(&self, kind: ContextKind, id: ContextId, reason: String) -> SecuError {
        bump(&self.counters.engine_failures);
        audit_log!(AuditRecord::new(
            AuditCategory::ErrorCondition,
            AUDIT_SOURCE,
            format!("compute_{}", kind)
        )
        .with_object_id(id.to_string())
        .with_object_type(format!("{}_context", kind))
        .with_error(reason.clone()));
        SecuError::EngineFailure(reason)
    }

    /// Computes the 4-byte MAC for one frame.
    pub fn compute_integrity(
        &self,
        algorithm: AlgorithmId,
        params: &StreamCipherParams,
    ) -> Result<Mac> {
        let frame = params.frame()?;
        let entry = self.resolve(ContextKind::Integrity, algorithm, params.context)?;

        let digest = self
            .engine
            .compute_integrity(algorithm, &entry.context, &frame)
            .map_err(|e| {
                self.engine_failure(ContextKind::Integrity, params.context, e.to_string())
            })?;

        let mac: Mac = digest
            .get(..MAC_LEN)
            .and_then(|head| head.try_into().ok())
            .ok_or_else(|| {
                self.engine_failure(
                    ContextKind::Integrity,
                    params.context,
                    format!(
                        "integrity output of {} bytes shorter than {}",
                        digest.len(),
                        MAC_LEN
                    ),
                )
            })?;
        bump(&self.counters.computes);

        debug!(
            id = %params.context,
            count = params.count,
            bearer = params.bearer,
            bit_length = params.bit_length,
            "Computed integrity"
        );
        Ok(mac)
    }

    /// Ciphers one frame; the output is exactly `ceil(bit_length / 8)` bytes.
    pub fn compute_encrypt(
        &self,
        algorithm: AlgorithmId,
        params: &StreamCipherParams,
    ) -> Result<Vec<u8>> {
        let frame = params.frame()?;
        let entry = self.resolve(ContextKind::Ciphering, algorithm, params.context)?;

        let mut out = vec![0u8; frame.message.len()];
        self.engine
            .compute_encrypt(algorithm, &entry.context, &frame, &mut out)
            .map_err(|e| {
                self.engine_failure(ContextKind::Ciphering, params.context, e.to_string())
            })?;
        bump(&self.counters.computes);

        debug!(
            id = %params.context,
            count = params.count,
            bearer = params.bearer,
            bit_length = params.bit_length,
            "Computed ciphering"
        );
        Ok(out)
    }

    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            epoch: self.epoch(),
            integrity_live: self.integrity.len(),
            ciphering_live: self.ciphering.len(),
            inits: self.counters.inits.load(Ordering::Relaxed),
            init_failures: self.counters.init_failures.load(Ordering::Relaxed),
            frees: self.counters.frees.load(Ordering::Relaxed),
            computes: self.counters.computes.load(Ordering::Relaxed),
            unknown_context: self.counters.unknown_context.load(Ordering::Relaxed),
            engine_failures: self.counters.engine_failures.load(Ordering::Relaxed),
        }
    }

    /// Releases every live context. Used at shutdown; returns the number of
    /// contexts released.
    pub fn release_all(&self) -> usize {
        let mut released = 0;
        for table in [&self.integrity, &self.ciphering] {
            for (_, entry) in table.drain() {
                self.engine.release(table.kind(), entry.algorithm, entry.context);
                released += 1;
            }
        }
        released
    }
}
