//! Stub engines
//!
//! `StubEngine` is deterministic and cheap: integrity always yields
//! [`STUB_DIGEST`], ciphering XORs the message with the key (so applying it
//! twice restores the plaintext), and every release is counted.

use secu_broker::{CryptoEngine, EngineError, EngineResult};
use secu_common::{AlgorithmId, ContextKind, Key128, StreamFrame};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Full 16-byte integrity output; the broker keeps the first four bytes.
pub const STUB_DIGEST: [u8; 16] = [
    0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff, 0x00,
];

/// Algorithm id the stub refuses at init.
pub const UNSUPPORTED_ALGORITHM: AlgorithmId = AlgorithmId(7);

#[derive(Debug, Default)]
pub struct StubEngine {
    releases: AtomicUsize,
    computes: AtomicUsize,
}

impl StubEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn computes(&self) -> usize {
        self.computes.load(Ordering::SeqCst)
    }

    fn init(&self, algorithm: AlgorithmId, key: &Key128) -> EngineResult<Key128> {
        if algorithm == UNSUPPORTED_ALGORITHM {
            return Err(EngineError::UnsupportedAlgorithm(algorithm));
        }
        Ok(*key)
    }
}

impl CryptoEngine for StubEngine {
    type Context = Key128;

    fn integrity_init(&self, algorithm: AlgorithmId, key: &Key128) -> EngineResult<Key128> {
        self.init(algorithm, key)
    }

    fn ciphering_init(&self, algorithm: AlgorithmId, key: &Key128) -> EngineResult<Key128> {
        self.init(algorithm, key)
    }

    fn compute_integrity(
        &self,
        _algorithm: AlgorithmId,
        _context: &Key128,
        _frame: &StreamFrame<'_>,
    ) -> EngineResult<Vec<u8>> {
        self.computes.fetch_add(1, Ordering::SeqCst);
        Ok(STUB_DIGEST.to_vec())
    }

    fn compute_encrypt(
        &self,
        _algorithm: AlgorithmId,
        context: &Key128,
        frame: &StreamFrame<'_>,
        out: &mut [u8],
    ) -> EngineResult<()> {
        self.computes.fetch_add(1, Ordering::SeqCst);
        for (i, (o, m)) in out.iter_mut().zip(frame.message).enumerate() {
            *o = m ^ context[i % context.len()];
        }
        Ok(())
    }

    fn release(&self, _kind: ContextKind, _algorithm: AlgorithmId, _context: Arc<Key128>) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}
