//! Primary key generation.

use std::cell::Cell;

use uuid::Uuid;

/// Source of new UUIDs for reverse-UUID keys.
pub trait UuidGenerator {
    /// 16 bytes in RFC 4122 order.
    fn generate(&self) -> [u8; 16];
}

/// Random version 4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomUuid;

impl UuidGenerator for RandomUuid {
    fn generate(&self) -> [u8; 16] {
        *Uuid::new_v4().as_bytes()
    }
}

/// UUIDs 1, 2, 3, ... with every byte set to the counter.
///
/// Deterministic keys for tests and fixtures.
#[derive(Debug, Default)]
pub struct SequenceUuid {
    next: Cell<u8>,
}

impl SequenceUuid {
    pub fn new() -> Self {
        Self::default()
    }

    /// The UUID generated on the `n`-th call.
    pub fn bytes(n: u8) -> [u8; 16] {
        [n; 16]
    }
}

impl UuidGenerator for SequenceUuid {
    fn generate(&self) -> [u8; 16] {
        let n = self.next.get().wrapping_add(1);
        self.next.set(n);
        Self::bytes(n)
    }
}

/// Reorder a UUID time-high first, as MySQL's `UUID_TO_BIN(uuid, 1)` does.
pub fn reverse_uuid_bytes(uuid: [u8; 16]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[0..2].copy_from_slice(&uuid[6..8]);
    out[2..4].copy_from_slice(&uuid[4..6]);
    out[4..8].copy_from_slice(&uuid[0..4]);
    out[8..16].copy_from_slice(&uuid[8..16]);
    out
}
