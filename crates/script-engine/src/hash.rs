//! Stable content hashing used throughout the host: symbol names, instance
//! names, and dynamic-call names are all addressed by `CRC32`, not by the
//! strings themselves.

use crc32fast::Hasher;

/// Hashes a complete name in one shot.
pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Streams a guest-memory-backed name through CRC32 without materializing
/// it as an owned `String` first (the in-memory-name dyncall variant).
pub fn crc32_streamed<'a>(chunks: impl Iterator<Item = &'a [u8]>) -> u32 {
    let mut hasher = Hasher::new();
    for chunk in chunks {
        hasher.update(chunk);
    }
    hasher.finalize()
}
