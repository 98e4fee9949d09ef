//! Thin wrappers around the `xxhash-rust` crate providing the two checksum
//! widths used by the file format.
//!
//! - XXH32 guards the small fixed structures (file header, packet header).
//! - XXH64 guards packet payloads, links the packet chain, and protects the
//!   footer directory.
//!
//! Both are seeded with 0. Streaming updates over successive chunks must
//! equal a one-shot hash over the concatenation; the streaming state types
//! are re-exported so writer and reader share one implementation.

pub use xxhash_rust::xxh32::Xxh32 as Checksum32State;
pub use xxhash_rust::xxh64::Xxh64 as Checksum64State;

/// One-shot XXH32 over `data`, seed 0.
///
/// # Parity vectors
/// * `checksum32(b"")` == `0x02CC5D05`
#[inline]
pub fn checksum32(data: &[u8]) -> u32 {
    xxhash_rust::xxh32::xxh32(data, 0)
}

/// One-shot XXH64 over `data`, seed 0.
///
/// # Parity vectors
/// * `checksum64(b"")` == `0xEF46_DB37_51D8_E999`
#[inline]
pub fn checksum64(data: &[u8]) -> u64 {
    xxhash_rust::xxh64::xxh64(data, 0)
}
