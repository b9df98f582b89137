//! Component F — Cross-VM call ("far-call").
//!
//! Forwards a call from one instance into a function of another, with
//! register marshalling and a preemption variant (`interrupt`) that carries
//! a heap-allocated payload.

use guest_vm::{cpu, Cpu, Memory};

use crate::host::ScriptHost;
use crate::instance::InstanceState;

/// Copies the caller's argument registers into the shape the destination
/// observes: integer arguments start two slots in on the caller's side
/// (the first two integer argument registers carry the target and function
/// hashes) but land at index 0 on the destination; float arguments are
/// forwarded 1:1 from index 0.
fn marshal_args(cpu: &Cpu) -> ([i64; cpu::NUM_INT_ARGS], [f64; cpu::NUM_FLOAT_ARGS]) {
    let mut ints = [0i64; cpu::NUM_INT_ARGS];
    for (i, slot) in ints.iter_mut().enumerate() {
        *slot = cpu.int_arg(i + 2);
    }
    let mut floats = [0f64; cpu::NUM_FLOAT_ARGS];
    for (i, slot) in floats.iter_mut().enumerate() {
        *slot = cpu.float_arg(i);
    }
    (ints, floats)
}

/// Snapshot taken when mirroring a caller's stack region into a
/// destination VM's memory for the life of a nested cross-VM call;
/// [`Self::restore`] puts the destination's original bytes back regardless
/// of how the call ended. This is the "always share" resolution of the
/// stack-page-sharing design question: installed unconditionally for every
/// far-call, cleared unconditionally on return. Doesn't hold the
/// destination borrow itself (that would have to outlive the nested call
/// into the destination instance), so install and restore each take their
/// own short-lived `&mut Memory`.
struct StackMirror {
    addr: u32,
    saved: Vec<u8>,
}

impl StackMirror {
    fn install(caller: &Memory, dest: &mut Memory) -> Option<Self> {
        let floor = caller.stack_floor();
        let len = caller.stack_base().saturating_sub(floor);
        if len == 0 {
            return None;
        }
        let bytes = caller.span(floor, len)?.to_vec();
        let saved = dest.overlay(floor, &bytes)?;
        Some(StackMirror { addr: floor, saved })
    }

    fn restore(self, dest: &mut Memory) {
        dest.copy_from(self.addr, &self.saved);
    }
}

/// `farcall(target-hash, function-hash, …)`: resolves the function through
/// the destination instance's public-API directory.
pub fn dispatch_farcall(state: &InstanceState, host: &ScriptHost, cpu: &mut Cpu, memory: &Memory) {
    let target_hash = cpu.int_arg(0) as u32;
    let function_hash = cpu.int_arg(1) as u32;
    let (ints, floats) = marshal_args(cpu);
    host.metrics.record_farcall();

    if state.multiprocessing {
        cpu.set_return(-1);
        return;
    }

    let outcome = host.with_instance_mut(target_hash, |dest| {
        let addr = dest.state.directory.lookup(function_hash);
        if addr == 0 {
            log::warn!("farcall to unknown function hash {function_hash:#010x}");
            return -1;
        }
        let mirror = StackMirror::install(memory, &mut dest.vm.memory);
        let result = dest.call(addr, &ints, &floats, host).unwrap_or(-1);
        if let Some(mirror) = mirror {
            mirror.restore(&mut dest.vm.memory);
        }
        result
    });

    cpu.set_return(outcome.unwrap_or(-1));
}

/// `farcall_direct(target-hash, function-address, …)`: bypasses the
/// directory and jumps straight to a guest address the caller already knows.
pub fn dispatch_farcall_direct(
    state: &InstanceState,
    host: &ScriptHost,
    cpu: &mut Cpu,
    memory: &Memory,
) {
    let target_hash = cpu.int_arg(0) as u32;
    let addr = cpu.int_arg(1) as u32;
    let (ints, floats) = marshal_args(cpu);
    host.metrics.record_farcall();

    if state.multiprocessing {
        cpu.set_return(-1);
        return;
    }

    let outcome = host.with_instance_mut(target_hash, |dest| {
        let mirror = StackMirror::install(memory, &mut dest.vm.memory);
        let result = dest.call(addr, &ints, &floats, host).unwrap_or(-1);
        if let Some(mirror) = mirror {
            mirror.restore(&mut dest.vm.memory);
        }
        result
    });

    cpu.set_return(outcome.unwrap_or(-1));
}

/// `interrupt(target-hash, function-hash, data-ptr, data-len)`: a preempting
/// far-call that copies a payload into a scratch allocation on the
/// destination's heap, releasing it when the call returns regardless of
/// outcome.
pub fn dispatch_interrupt(
    state: &InstanceState,
    host: &ScriptHost,
    cpu: &mut Cpu,
    memory: &mut Memory,
) {
    let target_hash = cpu.int_arg(0) as u32;
    let function_hash = cpu.int_arg(1) as u32;
    let data_ptr = cpu.int_arg(2) as u32;
    let data_len = cpu.int_arg(3) as u32;

    if state.multiprocessing {
        cpu.set_return(-1);
        return;
    }

    let Some(payload) = memory.span(data_ptr, data_len).map(|b| b.to_vec()) else {
        log::warn!("interrupt payload pointer out of bounds");
        cpu.set_return(-1);
        return;
    };

    host.metrics.record_farcall();
    let outcome = host.with_instance_mut(target_hash, |dest| {
        let addr = dest.state.directory.lookup(function_hash);
        if addr == 0 {
            log::warn!("interrupt to unknown function hash {function_hash:#010x}");
            return -1;
        }
        let Some(scratch) = dest.guest_alloc(data_len) else {
            log::warn!("interrupt payload allocation failed on destination");
            return -1;
        };
        let mirror = StackMirror::install(memory, &mut dest.vm.memory);
        dest.vm.memory.copy_from(scratch, &payload);
        let result = dest
            .preempt(addr, &[scratch as i64, data_len as i64], &[], host)
            .unwrap_or(-1);
        if let Some(mirror) = mirror {
            mirror.restore(&mut dest.vm.memory);
        }
        dest.guest_free(scratch);
        result
    });

    cpu.set_return(outcome.unwrap_or(-1));
}
