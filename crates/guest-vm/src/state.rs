//! Execution state flags, mirrored on the shape of `guest_vm::VmState`
//! that a real embedded emulator would report through its own status word.

use bitflags::bitflags;

bitflags! {
    /// Indicates the status of a [`crate::machine::Machine`] after a run.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct VmState: u8 {
        /// Execution has not started, or is in progress.
        const NONE = 0;
        /// The guest halted voluntarily (ran off a `HALT` instruction).
        const HALTED = 1 << 0;
        /// Execution stopped because of an unrecoverable guest exception.
        const FAULTED = 1 << 1;
        /// The instruction budget ran out (recoverable, see `GuestException::Timeout`).
        const TIMED_OUT = 1 << 2;
    }
}

impl VmState {
    pub fn is_halted(self) -> bool {
        self.contains(VmState::HALTED)
    }

    pub fn is_faulted(self) -> bool {
        self.contains(VmState::FAULTED)
    }

    pub fn is_timed_out(self) -> bool {
        self.contains(VmState::TIMED_OUT)
    }
}
