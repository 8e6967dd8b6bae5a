//! Key routing.
//!
//! Every key maps to exactly one shard through a 32-bit FNV-1a hash of its
//! bytes, taken modulo the shard count. The function is pure and allocation
//! free; the mapping never changes at runtime.

use crate::types::SHARD_COUNT;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in bytes {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Shard index for `key`, always in `[0, SHARD_COUNT)`.
pub fn shard_index(key: &str) -> usize {
    (fnv1a_32(key.as_bytes()) % SHARD_COUNT as u32) as usize
}
