//! Component B — Script Instance.
//!
//! Owns one guest VM forked from a template; handles setup, reset,
//! exceptions, budgets and benchmarks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use guest_vm::{GuestException, GuestProgram, Machine};

use crate::directory::Directory;
use crate::dispatch::DispatchHooks;
use crate::dyncall::{DynamicCallTable, Dynargs};
use crate::error::{Error, Result};
use crate::hash::crc32;
use crate::host::ScriptHost;
use crate::registry::TemplateBinary;

/// Upper bound on `MAX_INSTRUCTIONS` for a single top-level call: the
/// per-VM instruction budget every top-level call and preempt is bounded by.
pub const MAX_INSTRUCTIONS: u64 = 2_000_000;

/// Translation-block cap the real emulator would apply when not debugging.
/// This interpreter stand-in has no JIT and never
/// consults the field, but it is carried on `Instance` for interface parity
/// with the out-of-scope emulator's `create` options.
pub const TRANSLATION_BLOCKS_MAX: u32 = 4000;

/// Bound on nested `preempt` depth.
pub const MAX_REENTRANCY: u32 = 8;

/// The non-VM part of a Script Instance's data model. Split out from
/// [`Instance`] so dispatch hooks can borrow it disjointly from
/// `vm` while a call is in flight.
pub struct InstanceState {
    pub name: String,
    pub name_hash: u32,
    pub directory: Directory,
    pub dynamic_table: DynamicCallTable,
    pub dynargs: Dynargs,
    pub tick_event: u32,
    pub tick_block_reason: u32,
    pub budget_overruns: u64,
    pub is_debug: bool,
    pub stdout_enabled: bool,
    pub multiprocessing: bool,
    pub preempt_depth: u32,
    /// Bytes written via the `WRITE` syscall, standing in for the
    /// instance's print sink.
    pub stdout: Vec<u8>,
    /// State for the `RANDF` syscall's xorshift generator, seeded per
    /// instance so one tenant's draws can't be predicted from another's.
    pub rng_state: u64,
    instance_counter: u32,
    template: Arc<GuestProgram>,
}

/// One live, forked guest VM.
pub struct Instance {
    pub vm: Machine,
    pub state: InstanceState,
}

impl Instance {
    /// `create`: forks `template` into a fresh VM, installs the shared
    /// memory layout, and prepares (but does not yet run) the instance.
    /// `instance_counter` is the process-wide fork counter used to offset
    /// this instance's stack base.
    pub fn create(
        template: &TemplateBinary,
        name: &str,
        debug: bool,
        instance_counter: u32,
    ) -> Self {
        let vm = Machine::fork(template.program.clone(), instance_counter, MAX_INSTRUCTIONS);
        let name_hash = crc32(name.as_bytes());
        Instance {
            vm,
            state: InstanceState {
                name: name.to_string(),
                name_hash,
                directory: Directory::new(),
                dynamic_table: DynamicCallTable::new(),
                dynargs: Dynargs::new(),
                tick_event: 0,
                tick_block_reason: 0,
                budget_overruns: 0,
                is_debug: debug,
                stdout_enabled: true,
                multiprocessing: false,
                preempt_depth: 0,
                stdout: Vec::new(),
                rng_state: (u64::from(name_hash) << 32 | u64::from(instance_counter))
                    ^ 0x9E37_79B9_7F4A_7C15,
                instance_counter,
                template: template.program.clone(),
            },
        }
    }

    pub fn name_hash(&self) -> u32 {
        self.state.name_hash
    }

    /// Runs the guest from its entry point until it halts or exhausts
    /// `MAX_INSTRUCTIONS`; builds the public-API directory from the
    /// template's symbol text. Exhaustion and emulator exceptions are
    /// logged and reported as failure, not propagated as panics.
    pub fn initialize(&mut self, template: &TemplateBinary, host: &ScriptHost) -> Result<()> {
        self.state
            .directory
            .build_from_text(&template.symbols_text, &self.vm)?;

        let entry = self.vm.program.entry;
        match self.run_guarded(entry, &[], &[], host) {
            Ok(_) => Ok(()),
            Err(Error::Timeout { executed }) => {
                log::error!(
                    "instance {:?} failed to initialize: exhausted {executed} instructions",
                    self.state.name
                );
                Err(Error::Timeout { executed })
            }
            Err(e) => {
                log::error!("instance {:?} failed to initialize: {e}", self.state.name);
                Err(e)
            }
        }
    }

    /// Destroys the forked VM and re-forks it from the template. The
    /// public-API directory is preserved.
    pub fn reset(&mut self) {
        self.vm = Machine::fork(
            self.state.template.clone(),
            self.state.instance_counter,
            MAX_INSTRUCTIONS,
        );
        self.state.dynamic_table = DynamicCallTable::new();
        self.state.dynargs.clear();
        self.state.preempt_depth = 0;
    }

    /// A clean top-level call: fresh stack frame, fresh instruction budget.
    pub fn call(
        &mut self,
        addr: u32,
        int_args: &[i64],
        float_args: &[f64],
        host: &ScriptHost,
    ) -> Result<i64> {
        self.run_guarded(addr, int_args, float_args, host)
    }

    /// A nested call while another call is already in progress on this VM,
    /// without disturbing the suspended frame's registers, program counter,
    /// stack pointer, or instruction counter.
    pub fn preempt(
        &mut self,
        addr: u32,
        int_args: &[i64],
        float_args: &[f64],
        host: &ScriptHost,
    ) -> Result<i64> {
        if self.state.preempt_depth >= MAX_REENTRANCY {
            return Err(Error::ReentrancyLimit {
                depth: self.state.preempt_depth,
            });
        }
        let snapshot = self.vm.cpu.snapshot();
        self.state.preempt_depth += 1;
        let result = self.run_guarded(addr, int_args, float_args, host);
        self.state.preempt_depth -= 1;
        self.vm.cpu.restore(snapshot);
        result
    }

    /// Runs `addr` and routes any emulator exception through the exception
    /// handler.
    fn run_guarded(
        &mut self,
        addr: u32,
        int_args: &[i64],
        float_args: &[f64],
        host: &ScriptHost,
    ) -> Result<i64> {
        let Instance { vm, state } = self;
        let mut hooks = DispatchHooks { state, host };
        match vm.call(addr, int_args, float_args, &mut hooks) {
            Ok(value) => Ok(value),
            Err(exc) => self.handle_exception(exc, addr),
        }
    }

    fn handle_exception(&mut self, exc: GuestException, addr: u32) -> Result<i64> {
        match exc {
            GuestException::Timeout { executed } => {
                self.state.budget_overruns += 1;
                let tid = self.vm.threads.current();
                if !self.vm.threads.is_main() {
                    if let Some(reason) = self.current_block_reason(tid) {
                        self.vm.threads.block(tid, reason);
                    } else {
                        self.vm.threads.suspend(tid);
                    }
                    if let Some(next) = self.vm.threads.next_runnable_excluding(tid) {
                        self.vm.threads.set_current(next);
                    }
                }
                Err(Error::Timeout { executed })
            }
            other => {
                log::error!(
                    "instance {:?} raised {other} calling {:#010x} (pc={:#010x}, fn={:?})",
                    self.state.name,
                    addr,
                    self.vm.cpu.pc,
                    self.vm.symbol_name(addr),
                );
                log::debug!("register dump: {:?}", self.vm.cpu);
                Err(Error::GuestFault(other))
            }
        }
    }

    fn current_block_reason(&self, _tid: u32) -> Option<u32> {
        // Our interpreter stand-in does not track per-thread block reasons
        // independent of the tick subsystem's single reason; a full
        // micro-thread subsystem (out of scope for this workspace's
        // interpreter stand-in) would look this up per-thread.
        None
    }

    pub fn address_of(&self, name: &str) -> Option<u32> {
        self.vm.address_of(name)
    }

    pub fn symbol_name(&self, addr: u32) -> Option<&str> {
        self.vm.symbol_name(addr)
    }

    pub fn guest_alloc(&mut self, bytes: u32) -> Option<u32> {
        self.vm.memory.alloc(bytes)
    }

    pub fn guest_free(&mut self, addr: u32) {
        self.vm.memory.free(addr)
    }

    /// Runs `addr` `rounds * 2000` times and returns the median per-call
    /// duration in nanoseconds. Saves and restores everything a preempt
    /// would.
    pub fn vmbench(
        &mut self,
        addr: u32,
        rounds: u32,
        int_args: &[i64],
        float_args: &[f64],
        host: &ScriptHost,
    ) -> Result<u64> {
        let snapshot = self.vm.cpu.snapshot();

        let iterations = (rounds as usize).saturating_mul(2000).max(1);
        let mut samples = Vec::with_capacity(iterations);
        for _ in 0..iterations {
            let start = Instant::now();
            let _ = self.run_guarded(addr, int_args, float_args, host)?;
            samples.push(start.elapsed());
        }

        self.vm.cpu.restore(snapshot);

        samples.sort();
        let median: Duration = samples[samples.len() / 2];
        Ok(median.as_nanos() as u64)
    }

    /// Records the guest entry invoked once per embedder frame, and the
    /// micro-thread block reason used to park frame-waiting threads
    /// `addr = 0` disables the tick event.
    pub fn set_tick_event(&mut self, addr: u32, reason: u32) {
        self.state.tick_event = addr;
        self.state.tick_block_reason = reason;
    }

    /// Called by the embedder once per frame, on the main thread
    /// Counts threads blocked on the tick reason, then
    /// preempts the tick handler with `(count, reason)`.
    pub fn each_tick_event(&mut self, host: &ScriptHost) -> Result<()> {
        debug_assert!(
            self.vm.threads.is_main(),
            "each_tick_event must be driven from the main thread"
        );
        if self.state.tick_event == 0 {
            return Ok(());
        }
        let count = self.vm.threads.count_blocked(self.state.tick_block_reason);
        let reason = self.state.tick_block_reason;
        self.preempt(
            self.state.tick_event,
            &[count as i64, reason as i64],
            &[],
            host,
        )?;
        debug_assert!(
            self.vm.threads.is_main(),
            "tick handler must not leave the main thread as a non-zero tid"
        );
        Ok(())
    }
}
