//! Reference engine: null and AES-based NR security algorithms.
//!
//! - NIA0: all-zero MAC
//! - NIA2: AES-128-CMAC over `COUNT | BEARER | DIRECTION | 0^26 | MESSAGE`
//! - NEA0: ciphertext = plaintext
//! - NEA2: AES-128-CTR, initial block `COUNT | BEARER | DIRECTION | 0^26 | 0^64`
//!
//! Any other algorithm id fails at init. Key bytes live in zeroizing storage
//! and are wiped when the last reference to the context is dropped.

use super::{CryptoEngine, EngineError, EngineResult};
use aes::Aes128;
use cmac::{Cmac, Mac};
use ctr::cipher::{KeyIvInit, StreamCipher};
use secu_common::{AlgorithmId, Key128, StreamFrame, MAC_LEN};
use std::fmt;
use zeroize::Zeroizing;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// Engine state for one context.
pub enum NrContext {
    Null,
    Aes(Zeroizing<Key128>),
}

impl fmt::Debug for NrContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NrContext::Null => f.write_str("NrContext::Null"),
            NrContext::Aes(_) => f.write_str("NrContext::Aes(<redacted>)"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NrSecurityEngine;

impl NrSecurityEngine {
    pub fn new() -> Self {
        Self
    }
}

/// Bearer and direction packed as in the first bits of byte 4 of both the
/// CMAC prefix and the CTR counter block.
fn bearer_direction_byte(frame: &StreamFrame<'_>) -> u8 {
    ((frame.bearer & 0x1f) << 3) | ((frame.direction.as_bit() & 0x01) << 2)
}

fn counter_block(frame: &StreamFrame<'_>) -> [u8; 16] {
    let mut block = [0u8; 16];
    block[..4].copy_from_slice(&frame.count.to_be_bytes());
    block[4] = bearer_direction_byte(frame);
    block
}

/// Zeroes the bits of the last byte beyond `bit_length`.
fn mask_trailing_bits(out: &mut [u8], bit_length: u32) {
    let rem = bit_length % 8;
    if rem != 0 {
        if let Some(last) = out.last_mut() {
            *last &= 0xffu8 << (8 - rem);
        }
    }
}

fn nia2(key: &Key128, frame: &StreamFrame<'_>) -> EngineResult<Vec<u8>> {
    let mut mac = <Cmac<Aes128> as Mac>::new_from_slice(key)
        .map_err(|e| EngineError::Failed(format!("cmac key: {}", e)))?;
    mac.update(&frame.count.to_be_bytes());
    mac.update(&[bearer_direction_byte(frame), 0, 0, 0]);
    if let Some((&last, head)) = frame.message.split_last() {
        let mut tail = [last];
        mask_trailing_bits(&mut tail, frame.bit_length);
        mac.update(head);
        mac.update(&tail);
    }
    Ok(mac.finalize().into_bytes().to_vec())
}

fn nea2(key: &Key128, frame: &StreamFrame<'_>, out: &mut [u8]) -> EngineResult<()> {
    let iv = counter_block(frame);
    let mut cipher = Aes128Ctr::new_from_slices(key, &iv)
        .map_err(|e| EngineError::Failed(format!("ctr init: {}", e)))?;
    out.copy_from_slice(frame.message);
    cipher.apply_keystream(out);
    Ok(())
}

impl CryptoEngine for NrSecurityEngine {
    type Context = NrContext;

    fn integrity_init(&self, algorithm: AlgorithmId, key: &Key128) -> EngineResult<NrContext> {
        match algorithm {
            AlgorithmId::NIA0 => Ok(NrContext::Null),
            AlgorithmId::NIA2 => Ok(NrContext::Aes(Zeroizing::new(*key))),
            other => Err(EngineError::UnsupportedAlgorithm(other)),
        }
    }

    fn ciphering_init(&self, algorithm: AlgorithmId, key: &Key128) -> EngineResult<NrContext> {
        match algorithm {
            AlgorithmId::NEA0 => Ok(NrContext::Null),
            AlgorithmId::NEA2 => Ok(NrContext::Aes(Zeroizing::new(*key))),
            other => Err(EngineError::UnsupportedAlgorithm(other)),
        }
    }

    fn compute_integrity(
        &self,
        algorithm: AlgorithmId,
        context: &NrContext,
        frame: &StreamFrame<'_>,
    ) -> EngineResult<Vec<u8>> {
        match (algorithm, context) {
            (AlgorithmId::NIA0, NrContext::Null) => Ok(vec![0u8; MAC_LEN]),
            (AlgorithmId::NIA2, NrContext::Aes(key)) => nia2(key, frame),
            (other, _) => Err(EngineError::Failed(format!(
                "integrity algorithm {} cannot use this context",
                other
            ))),
        }
    }

    fn compute_encrypt(
        &self,
        algorithm: AlgorithmId,
        context: &NrContext,
        frame: &StreamFrame<'_>,
        out: &mut [u8],
    ) -> EngineResult<()> {
        match (algorithm, context) {
            (AlgorithmId::NEA0, NrContext::Null) => out.copy_from_slice(frame.message),
            (AlgorithmId::NEA2, NrContext::Aes(key)) => nea2(key, frame, out)?,
            (other, _) => {
                return Err(EngineError::Failed(format!(
                    "ciphering algorithm {} cannot use this context",
                    other
                )))
            }
        }
        mask_trailing_bits(out, frame.bit_length);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secu_common::Direction;

    const KEY: Key128 = [
        0xd3, 0xc5, 0xd5, 0x92, 0x32, 0x7f, 0xb1, 0x1c, 0x40, 0x35, 0xc6, 0x68, 0x0a, 0xf8, 0xc6,
        0xd1,
    ];

    fn frame(message: &[u8], count: u32, bearer: u8, direction: Direction) -> StreamFrame<'_> {
        StreamFrame {
            count,
            bearer,
            direction,
            message,
            bit_length: (message.len() * 8) as u32,
        }
    }

    fn encrypt(ctx: &NrContext, f: &StreamFrame<'_>) -> Vec<u8> {
        let mut out = vec![0u8; f.message.len()];
        NrSecurityEngine
            .compute_encrypt(AlgorithmId::NEA2, ctx, f, &mut out)
            .unwrap();
        out
    }

    #[test]
    fn test_unsupported_algorithms_fail_init() {
        let engine = NrSecurityEngine::new();
        assert_eq!(
            engine.integrity_init(AlgorithmId::NIA1, &KEY).unwrap_err(),
            EngineError::UnsupportedAlgorithm(AlgorithmId::NIA1)
        );
        assert!(engine.ciphering_init(AlgorithmId::NEA3, &KEY).is_err());
        assert!(engine.ciphering_init(AlgorithmId(42), &KEY).is_err());
    }

    #[test]
    fn test_nia0_is_all_zero() {
        let engine = NrSecurityEngine::new();
        let ctx = engine.integrity_init(AlgorithmId::NIA0, &KEY).unwrap();
        let mac = engine
            .compute_integrity(AlgorithmId::NIA0, &ctx, &frame(b"hello", 5, 3, Direction::Uplink))
            .unwrap();
        assert_eq!(mac, vec![0u8; 4]);
    }

    #[test]
    fn test_nia2_is_deterministic_and_input_sensitive() {
        let engine = NrSecurityEngine::new();
        let ctx = engine.integrity_init(AlgorithmId::NIA2, &KEY).unwrap();
        let mac = |f: StreamFrame<'_>| engine.compute_integrity(AlgorithmId::NIA2, &ctx, &f).unwrap();

        let base = mac(frame(b"hello", 5, 3, Direction::Uplink));
        assert_eq!(base.len(), 16);
        assert_eq!(base, mac(frame(b"hello", 5, 3, Direction::Uplink)));
        assert_ne!(base, mac(frame(b"hello", 6, 3, Direction::Uplink)));
        assert_ne!(base, mac(frame(b"hello", 5, 4, Direction::Uplink)));
        assert_ne!(base, mac(frame(b"hello", 5, 3, Direction::Downlink)));
        assert_ne!(base, mac(frame(b"hellp", 5, 3, Direction::Uplink)));
    }

    #[test]
    fn test_nia2_depends_on_key() {
        let engine = NrSecurityEngine::new();
        let a = engine.integrity_init(AlgorithmId::NIA2, &KEY).unwrap();
        let b = engine.integrity_init(AlgorithmId::NIA2, &[0u8; 16]).unwrap();
        let f = frame(b"payload", 1, 0, Direction::Downlink);
        assert_ne!(
            engine.compute_integrity(AlgorithmId::NIA2, &a, &f).unwrap(),
            engine.compute_integrity(AlgorithmId::NIA2, &b, &f).unwrap()
        );
    }

    #[test]
    fn test_nea2_is_self_inverse() {
        let ctx = NrSecurityEngine.ciphering_init(AlgorithmId::NEA2, &KEY).unwrap();
        let plaintext = b"the quick brown fox jumps over the lazy dog".to_vec();

        let ciphertext = encrypt(&ctx, &frame(&plaintext, 0x398a59b4, 0x15, Direction::Downlink));
        assert_ne!(ciphertext, plaintext);

        let restored = encrypt(&ctx, &frame(&ciphertext, 0x398a59b4, 0x15, Direction::Downlink));
        assert_eq!(restored, plaintext);
    }

    #[test]
    fn test_nea2_keystream_depends_on_count_bearer_direction() {
        let ctx = NrSecurityEngine.ciphering_init(AlgorithmId::NEA2, &KEY).unwrap();
        let zeros = [0u8; 32];
        let base = encrypt(&ctx, &frame(&zeros, 1, 1, Direction::Uplink));
        assert_ne!(base, encrypt(&ctx, &frame(&zeros, 2, 1, Direction::Uplink)));
        assert_ne!(base, encrypt(&ctx, &frame(&zeros, 1, 2, Direction::Uplink)));
        assert_ne!(base, encrypt(&ctx, &frame(&zeros, 1, 1, Direction::Downlink)));
    }

    #[test]
    fn test_trailing_bits_are_masked() {
        let engine = NrSecurityEngine::new();
        let ctx = engine.ciphering_init(AlgorithmId::NEA0, &KEY).unwrap();
        let message = [0xffu8; 2];
        let f = StreamFrame {
            count: 0,
            bearer: 0,
            direction: Direction::Uplink,
            message: &message,
            bit_length: 12,
        };
        let mut out = [0u8; 2];
        engine
            .compute_encrypt(AlgorithmId::NEA0, &ctx, &f, &mut out)
            .unwrap();
        assert_eq!(out, [0xff, 0xf0]);
    }

    #[test]
    fn test_nia2_ignores_bits_past_bit_length() {
        let engine = NrSecurityEngine::new();
        let ctx = engine.integrity_init(AlgorithmId::NIA2, &KEY).unwrap();
        let mac = |message: &[u8], bit_length: u32| {
            let f = StreamFrame {
                count: 7,
                bearer: 2,
                direction: Direction::Uplink,
                message,
                bit_length,
            };
            engine.compute_integrity(AlgorithmId::NIA2, &ctx, &f).unwrap()
        };

        assert_eq!(mac(&[0xab, 0xf0], 12), mac(&[0xab, 0xff], 12));
        assert_ne!(mac(&[0xab, 0xf0], 12), mac(&[0xab, 0xe0], 12));
        assert_ne!(mac(&[0xab, 0xff], 16), mac(&[0xab, 0xf0], 16));
    }

    #[test]
    fn test_algorithm_context_mismatch_is_engine_error() {
        let engine = NrSecurityEngine::new();
        let null_ctx = engine.ciphering_init(AlgorithmId::NEA0, &KEY).unwrap();
        let mut out = [0u8; 5];
        assert!(engine
            .compute_encrypt(
                AlgorithmId::NEA2,
                &null_ctx,
                &frame(b"hello", 0, 0, Direction::Uplink),
                &mut out
            )
            .is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let ctx = NrSecurityEngine.integrity_init(AlgorithmId::NIA2, &KEY).unwrap();
        assert_eq!(format!("{:?}", ctx), "NrContext::Aes(<redacted>)");
    }
}
