//! Component D — Host-Call Dispatch.
//!
//! Reads the syscall number out of the dedicated syscall-number register
//! and routes to a fixed handler table. Also implements [`guest_vm::ExecHooks`]
//! so a [`guest_vm::Machine`] can be driven without knowing anything about
//! syscall numbers, dynargs, or far-calls.

use guest_vm::{cpu, Cpu, DynargPush, ExecHooks, GuestException, Memory};

use crate::dyncall::DynValue;
use crate::farcall;
use crate::hash::crc32_streamed;
use crate::host::ScriptHost;
use crate::instance::InstanceState;

pub const GAME_API_BASE: i64 = 500;
pub const SELF_TEST: i64 = GAME_API_BASE;
pub const ASSERT_FAIL: i64 = GAME_API_BASE + 1;
pub const WRITE: i64 = GAME_API_BASE + 2;
pub const MEASURE: i64 = GAME_API_BASE + 3;
pub const DYNCALL: i64 = GAME_API_BASE + 4;
pub const FARCALL: i64 = GAME_API_BASE + 5;
pub const FARCALL_DIRECT: i64 = GAME_API_BASE + 6;
pub const INTERRUPT: i64 = GAME_API_BASE + 7;
pub const MACHINE_HASH: i64 = GAME_API_BASE + 8;
pub const EACH_FRAME: i64 = GAME_API_BASE + 9;
pub const MULTIPROCESS_FORK: i64 = GAME_API_BASE + 10;
pub const MULTIPROCESS_WAIT: i64 = GAME_API_BASE + 11;
pub const GAME_EXIT: i64 = GAME_API_BASE + 12;
pub const SINF: i64 = GAME_API_BASE + 14;
pub const RANDF: i64 = GAME_API_BASE + 15;
pub const SMOOTHSTEP: i64 = GAME_API_BASE + 16;
pub const VEC_LENGTH: i64 = GAME_API_BASE + 17;
pub const VEC_ROTATE: i64 = GAME_API_BASE + 18;
pub const VEC_NORMALIZE: i64 = GAME_API_BASE + 19;

const WRITE_MAX: u32 = 1024;
const ASSERT_STRING_MAX: u32 = 512;

/// A type-directed reader over a syscall's argument registers: integer
/// types come off the GPRs in order, float types off the FPRs in order,
/// text types are read out of guest memory at an address taken from the
/// next integer slot. Evaluation order is left to right, matching how the
/// guest-side calling convention packs arguments.
struct SysArgs<'a> {
    cpu: &'a Cpu,
    memory: &'a Memory,
    int_idx: usize,
    float_idx: usize,
}

impl<'a> SysArgs<'a> {
    fn new(cpu: &'a Cpu, memory: &'a Memory) -> Self {
        SysArgs {
            cpu,
            memory,
            int_idx: 0,
            float_idx: 0,
        }
    }

    fn int(&mut self) -> i64 {
        let v = self.cpu.int_arg(self.int_idx);
        self.int_idx += 1;
        v
    }

    fn float(&mut self) -> f64 {
        let v = self.cpu.float_arg(self.float_idx);
        self.float_idx += 1;
        v
    }

    /// Reads a NUL-terminated string from the address in the next integer
    /// slot, bounded by `max_len`. `None` means the pointer was inaccessible
    /// ("data == nullptr" in the emulator's span contract).
    fn text(&mut self, max_len: u32) -> Option<Vec<u8>> {
        let addr = self.int() as u32;
        self.memory.read_cstr(addr, max_len)
    }
}

/// Implements [`ExecHooks`] by borrowing one instance's non-VM state
/// disjointly from its `Machine`, and a shared reference to the process-wide
/// host for far-calls.
pub struct DispatchHooks<'a> {
    pub state: &'a mut InstanceState,
    pub host: &'a ScriptHost,
}

impl<'a> ExecHooks for DispatchHooks<'a> {
    fn syscall(&mut self, cpu: &mut Cpu, memory: &mut Memory) -> Result<(), GuestException> {
        let number = cpu.reg(cpu::SYSCALL_NUM_REG);
        match number {
            n if n == SELF_TEST => {
                cpu.set_return(1);
            }
            n if n == ASSERT_FAIL => {
                let mut args = SysArgs::new(cpu, memory);
                let expr = args.text(ASSERT_STRING_MAX).unwrap_or_default();
                let file = args.text(ASSERT_STRING_MAX).unwrap_or_default();
                let line = args.int();
                let func = args.text(ASSERT_STRING_MAX).unwrap_or_default();
                return Err(GuestException::AssertFailed {
                    expr: String::from_utf8_lossy(&expr).into_owned(),
                    file: String::from_utf8_lossy(&file).into_owned(),
                    line,
                    func: String::from_utf8_lossy(&func).into_owned(),
                });
            }
            n if n == WRITE => self.do_write(cpu, memory),
            n if n == MEASURE => self.do_measure(cpu, memory),
            n if n == DYNCALL => self.do_dyncall(cpu, memory),
            n if n == FARCALL => farcall::dispatch_farcall(self.state, self.host, cpu, memory),
            n if n == FARCALL_DIRECT => {
                farcall::dispatch_farcall_direct(self.state, self.host, cpu, memory)
            }
            n if n == INTERRUPT => farcall::dispatch_interrupt(self.state, self.host, cpu, memory),
            n if n == MACHINE_HASH => {
                cpu.set_return(self.state.name_hash as i64);
            }
            n if n == EACH_FRAME => {
                let mut args = SysArgs::new(cpu, memory);
                let addr = args.int() as u32;
                let reason = args.int() as u32;
                self.state.tick_event = addr;
                self.state.tick_block_reason = reason;
                cpu.set_return(0);
            }
            n if n == MULTIPROCESS_FORK => {
                self.state.multiprocessing = true;
                cpu.set_return(0);
            }
            n if n == MULTIPROCESS_WAIT => {
                self.state.multiprocessing = false;
                cpu.set_return(0);
            }
            n if n == GAME_EXIT => {
                log::info!("instance {:?} requested process exit", self.state.name);
                std::process::exit(cpu.int_arg(0) as i32);
            }
            n if n == SINF => {
                let mut args = SysArgs::new(cpu, memory);
                let x = args.float();
                cpu.set_float_return(x.sin(), None);
            }
            n if n == RANDF => {
                let mut args = SysArgs::new(cpu, memory);
                let edge0 = args.float();
                let edge1 = args.float();
                let mut seed = self.state.rng_state;
                seed ^= seed << 13;
                seed ^= seed >> 7;
                seed ^= seed << 17;
                self.state.rng_state = seed;
                let unit = (seed >> 11) as f64 / (1u64 << 53) as f64;
                cpu.set_float_return(edge0 + unit * (edge1 - edge0), None);
            }
            n if n == SMOOTHSTEP => {
                let mut args = SysArgs::new(cpu, memory);
                let edge0 = args.float();
                let edge1 = args.float();
                let x = args.float();
                let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
                cpu.set_float_return(t * t * (3.0 - 2.0 * t), None);
            }
            n if n == VEC_LENGTH => {
                let mut args = SysArgs::new(cpu, memory);
                let (x, y, z) = (args.float(), args.float(), args.float());
                cpu.set_float_return((x * x + y * y + z * z).sqrt(), None);
            }
            n if n == VEC_ROTATE => {
                let mut args = SysArgs::new(cpu, memory);
                let (x, y) = (args.float(), args.float());
                let theta = args.float();
                cpu.set_float_return(
                    x * theta.cos() - y * theta.sin(),
                    Some(x * theta.sin() + y * theta.cos()),
                );
            }
            n if n == VEC_NORMALIZE => {
                let mut args = SysArgs::new(cpu, memory);
                let (x, y, z) = (args.float(), args.float(), args.float());
                let len = (x * x + y * y + z * z).sqrt();
                if len > 0.0 {
                    cpu.set_float_return(x / len, Some(y / len));
                    cpu.f[cpu::FA0 + 2] = z / len;
                } else {
                    cpu.set_float_return(0.0, Some(0.0));
                }
            }
            other => {
                log::warn!("unhandled syscall number {other}");
                cpu.set_return(-1);
            }
        }
        Ok(())
    }

    fn push_dynarg(
        &mut self,
        cpu: &mut Cpu,
        memory: &mut Memory,
        push: DynargPush,
        rs1: u8,
    ) -> Result<(), GuestException> {
        let value = match push {
            DynargPush::I64 => DynValue::I64(cpu.reg(rs1 as usize)),
            DynargPush::F32 => DynValue::F32(cpu.f[rs1 as usize] as f32),
            DynargPush::Text => {
                let addr = cpu.reg(rs1 as usize) as u32;
                let bytes = memory.read_cstr(addr, 4096).ok_or(GuestException::MemoryFault {
                    addr,
                    len: 0,
                    reason: "dynarg text pointer out of bounds",
                })?;
                DynValue::Text(bytes)
            }
        };
        self.state.dynargs.push(value);
        Ok(())
    }
}

impl<'a> DispatchHooks<'a> {
    fn do_write(&mut self, cpu: &mut Cpu, memory: &mut Memory) {
        let mut args = SysArgs::new(cpu, memory);
        let addr = args.int() as u32;
        let len = args.int() as u32;

        if self.state.multiprocessing {
            cpu.set_return(-1);
            return;
        }
        if !self.state.stdout_enabled {
            cpu.set_return(len as i64);
            return;
        }
        let bounded = len.min(WRITE_MAX);
        match memory.span(addr, bounded) {
            Some(bytes) => {
                self.state.stdout.extend_from_slice(bytes);
                cpu.set_return(bounded as i64);
            }
            None => {
                log::warn!("WRITE syscall from {:?} with inaccessible span", self.state.name);
                cpu.set_return(-1);
            }
        }
    }

    /// `measure(target-hash, address, rounds)`: resolves the target
    /// instance through the host's live-instance map, the same lookup
    /// `farcall_direct` uses, and benchmarks `address` on it via
    /// [`crate::instance::Instance::vmbench`]. Returns the median duration
    /// in nanoseconds, or `-1` if the target doesn't exist or the
    /// benchmarked call itself fails.
    fn do_measure(&mut self, cpu: &mut Cpu, memory: &mut Memory) {
        let mut args = SysArgs::new(cpu, memory);
        let target_hash = args.int() as u32;
        let addr = args.int() as u32;
        let rounds = (args.int() as u32).max(1);

        let outcome = self
            .host
            .with_instance_mut(target_hash, |dest| dest.vmbench(addr, rounds, &[], &[], self.host));

        match outcome {
            Some(Ok(nanos)) => cpu.set_return(nanos as i64),
            Some(Err(e)) => {
                log::warn!("measure() on {target_hash:#010x} failed: {e}");
                cpu.set_return(-1);
            }
            None => {
                log::warn!("measure() target {target_hash:#010x} not found");
                cpu.set_return(-1);
            }
        }
    }

    /// `DYNCALL`'s two variants, disambiguated by whether the dedicated
    /// hash register is nonzero: nonzero means the register-argument form
    /// (the hash is in the register, up to six ints / eight floats are
    /// already in the normal argument registers for the handler to read);
    /// zero means the in-memory-name form (`(ptr, len)` in the first two
    /// integer argument registers, streamed through CRC32, with arguments
    /// already staged in `dynargs` by prior custom instructions).
    fn do_dyncall(&mut self, cpu: &mut Cpu, memory: &mut Memory) {
        let hash_reg = cpu.reg(cpu::DYNCALL_HASH_REG) as u32;
        let hash = if hash_reg != 0 {
            hash_reg
        } else {
            let mut args = SysArgs::new(cpu, memory);
            let ptr = args.int() as u32;
            let len = args.int() as u32;
            match memory.span(ptr, len) {
                Some(bytes) => crc32_streamed(std::iter::once(bytes)),
                None => {
                    log::warn!("DYNCALL name pointer out of bounds");
                    cpu.set_return(-1);
                    return;
                }
            }
        };

        match self.state.dynamic_table.get(hash) {
            Some(closure) => {
                self.host.metrics.record_dyncall();
                closure(cpu, memory, self.state);
                self.state.dynargs.clear();
            }
            None => {
                log::warn!("DYNCALL to unregistered hash {hash:#010x}");
                cpu.set_return(-1);
            }
        }
    }
}
