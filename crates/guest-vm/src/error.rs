//! Error types surfaced by the emulator to its host.

use thiserror::Error;

/// A fault raised while decoding or executing guest instructions.
///
/// This is deliberately small: the emulator is an external collaborator from
/// the script host's point of view, so it only needs to tell the host *what*
/// went wrong, not carry rich recovery state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuestException {
    /// The per-call instruction budget was exhausted.
    #[error("instruction budget exhausted after {executed} instructions")]
    Timeout { executed: u64 },

    /// The fetched word did not decode to any opcode this emulator knows.
    #[error("illegal instruction {word:#010x} at pc {pc:#010x}")]
    IllegalInstruction { pc: u32, word: u32 },

    /// A custom (funct3) instruction variant we do not implement.
    #[error("unimplemented instruction: funct3 {funct3:#05b} at pc {pc:#010x}")]
    UnimplementedInstruction { pc: u32, funct3: u8 },

    /// Guest code referenced a memory address outside any mapped region,
    /// or with the wrong permissions.
    #[error("memory fault at {addr:#010x} ({len} bytes, {reason})")]
    MemoryFault {
        addr: u32,
        len: u32,
        reason: &'static str,
    },

    /// Integer division by zero.
    #[error("division by zero at pc {pc:#010x}")]
    DivideByZero { pc: u32 },

    /// The guest pushed an out-of-band assertion failure (`ASSERT_FAIL`).
    #[error("guest assertion failed: {expr} ({file}:{line} in {func})")]
    AssertFailed {
        expr: String,
        file: String,
        line: i64,
        func: String,
    },
}

impl GuestException {
    /// Timeouts are the one exception the host can recover from without
    /// tearing down the call in progress; everything else is fatal to the
    /// call that raised it.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, GuestException::Timeout { .. })
    }
}
