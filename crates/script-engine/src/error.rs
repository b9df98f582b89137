//! Error kinds the host surfaces to its embedder.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum Error {
    /// A template binary could not be parsed or its file could not be read.
    #[error("failed to load template binary {name:?}: {reason}")]
    LoadError { name: String, reason: String },

    /// A lookup by name or hash failed (registry, instance map, or far-call
    /// target/function).
    #[error("not found: {0}")]
    NotFound(String),

    /// `MAX_INSTRUCTIONS` was exceeded during a top-level `call`.
    #[error("call timed out after {executed} instructions")]
    Timeout { executed: u64 },

    /// The emulator raised a non-recoverable exception during a call.
    #[error("guest exception: {0}")]
    GuestFault(#[from] guest_vm::GuestException),

    /// A dynamic-call or directory registration hashed to an already-used
    /// key.
    #[error("hash collision registering {0:?}")]
    HashCollision(String),

    /// Nested `preempt` exceeded the configured reentrancy bound.
    #[error("reentrancy limit exceeded (depth {depth})")]
    ReentrancyLimit { depth: u32 },
}

pub type Result<T> = std::result::Result<T, Error>;
