//! Ties registers, memory and the instruction loop together into one guest
//! VM, and provides the fork-from-template operation the script host's
//! `create`/`reset` rely on.

use std::sync::Arc;

use crate::cpu::Cpu;
use crate::error::GuestException;
use crate::isa::{decode, DynargPush, Instruction};
use crate::memory::{stack_base_for_instance, Memory, DEFAULT_MAX_HEAP, DEFAULT_MAX_MEMORY, DEFAULT_STACK_SIZE};
use crate::program::GuestProgram;
use crate::state::VmState;
use crate::thread::ThreadScheduler;

/// Callbacks the host supplies so the emulator's `ecall` and custom
/// instructions can reach host dispatch without the emulator knowing
/// anything about syscall numbers or dynargs.
pub trait ExecHooks {
    fn syscall(&mut self, cpu: &mut Cpu, memory: &mut Memory) -> Result<(), GuestException>;

    fn push_dynarg(
        &mut self,
        cpu: &mut Cpu,
        memory: &mut Memory,
        push: DynargPush,
        rs1: u8,
    ) -> Result<(), GuestException>;
}

/// A no-op hook set, useful for running guest code that never traps out to
/// the host (e.g. `busy_loop` in the timeout test).
pub struct NoHooks;

impl ExecHooks for NoHooks {
    fn syscall(&mut self, _cpu: &mut Cpu, _memory: &mut Memory) -> Result<(), GuestException> {
        Ok(())
    }

    fn push_dynarg(
        &mut self,
        _cpu: &mut Cpu,
        _memory: &mut Memory,
        _push: DynargPush,
        _rs1: u8,
    ) -> Result<(), GuestException> {
        Ok(())
    }
}

/// One instance's forked VM: its own registers, memory and thread
/// scheduler, sharing the template's (immutable) code and symbol table.
pub struct Machine {
    pub cpu: Cpu,
    pub memory: Memory,
    pub threads: ThreadScheduler,
    pub program: Arc<GuestProgram>,
    pub state: VmState,
}

impl Machine {
    /// Forks a fresh machine from a template program. `instance_counter`
    /// is used to offset the stack base so concurrently live instances get
    /// disjoint stack ranges.
    pub fn fork(program: Arc<GuestProgram>, instance_counter: u32, max_instructions: u64) -> Self {
        let stack_base = stack_base_for_instance(instance_counter);
        let memory = Memory::new(
            DEFAULT_MAX_MEMORY,
            DEFAULT_MAX_HEAP,
            stack_base,
            DEFAULT_STACK_SIZE,
        );
        let mut cpu = Cpu::default();
        cpu.stack_base = stack_base;
        cpu.max_instructions = max_instructions;
        cpu.x[crate::cpu::SP] = stack_base as i64;

        Machine {
            cpu,
            memory,
            threads: ThreadScheduler::new(),
            program,
            state: VmState::NONE,
        }
    }

    pub fn address_of(&self, name: &str) -> Option<u32> {
        self.program.address_of(name)
    }

    pub fn symbol_name(&self, addr: u32) -> Option<&str> {
        self.program.symbol_name(addr)
    }

    /// Runs from `entry` with the given integer/float arguments until the
    /// guest halts, faults, or exhausts `max_instructions`. Does not touch
    /// `stack_base`/`max_instructions` itself — callers (Script Instance)
    /// decide budgets.
    pub fn call(
        &mut self,
        entry: u32,
        int_args: &[i64],
        float_args: &[f64],
        hooks: &mut dyn ExecHooks,
    ) -> Result<i64, GuestException> {
        self.cpu.pc = entry;
        self.cpu.instruction_counter = 0;
        self.cpu.x[crate::cpu::RA] = u32::MAX as i64;
        for (i, &v) in int_args.iter().take(crate::cpu::NUM_INT_ARGS).enumerate() {
            self.cpu.set_int_arg(i, v);
        }
        for (i, &v) in float_args.iter().take(crate::cpu::NUM_FLOAT_ARGS).enumerate() {
            self.cpu.set_float_arg(i, v);
        }
        self.run(hooks)
    }

    fn run(&mut self, hooks: &mut dyn ExecHooks) -> Result<i64, GuestException> {
        loop {
            if self.cpu.max_instructions > 0
                && self.cpu.instruction_counter >= self.cpu.max_instructions
            {
                self.state = VmState::TIMED_OUT;
                return Err(GuestException::Timeout {
                    executed: self.cpu.instruction_counter,
                });
            }

            let pc = self.cpu.pc;
            let word = self.program.fetch(pc).ok_or(GuestException::MemoryFault {
                addr: pc,
                len: 4,
                reason: "pc outside loaded code segment",
            })?;
            let instr = decode(pc, word)?;
            self.cpu.instruction_counter += 1;

            match instr {
                Instruction::Halt => {
                    self.state = VmState::HALTED;
                    return Ok(self.cpu.return_value());
                }
                Instruction::Ecall => {
                    hooks.syscall(&mut self.cpu, &mut self.memory)?;
                    self.cpu.pc = pc.wrapping_add(4);
                }
                Instruction::Dynarg { funct3, rs1 } => {
                    let push = DynargPush::from_funct3(funct3)
                        .ok_or(GuestException::UnimplementedInstruction { pc, funct3 })?;
                    hooks.push_dynarg(&mut self.cpu, &mut self.memory, push, rs1)?;
                    self.cpu.pc = pc.wrapping_add(4);
                }
                Instruction::Addi { rd, rs1, imm } => {
                    let v = self.cpu.reg(rs1 as usize) + imm as i64;
                    self.cpu.set_reg(rd as usize, v);
                    self.cpu.pc = pc.wrapping_add(4);
                }
                Instruction::Add { rd, rs1, rs2 } => {
                    let v = self.cpu.reg(rs1 as usize) + self.cpu.reg(rs2 as usize);
                    self.cpu.set_reg(rd as usize, v);
                    self.cpu.pc = pc.wrapping_add(4);
                }
                Instruction::Sub { rd, rs1, rs2 } => {
                    let v = self.cpu.reg(rs1 as usize) - self.cpu.reg(rs2 as usize);
                    self.cpu.set_reg(rd as usize, v);
                    self.cpu.pc = pc.wrapping_add(4);
                }
                Instruction::Lui { rd, imm } => {
                    self.cpu.set_reg(rd as usize, imm as i64);
                    self.cpu.pc = pc.wrapping_add(4);
                }
                Instruction::Beq { rs1, rs2, imm } => {
                    self.cpu.pc = if self.cpu.reg(rs1 as usize) == self.cpu.reg(rs2 as usize) {
                        (pc as i64 + imm as i64) as u32
                    } else {
                        pc.wrapping_add(4)
                    };
                }
                Instruction::Bne { rs1, rs2, imm } => {
                    self.cpu.pc = if self.cpu.reg(rs1 as usize) != self.cpu.reg(rs2 as usize) {
                        (pc as i64 + imm as i64) as u32
                    } else {
                        pc.wrapping_add(4)
                    };
                }
                Instruction::Jal { rd, imm } => {
                    self.cpu.set_reg(rd as usize, pc.wrapping_add(4) as i64);
                    self.cpu.pc = (pc as i64 + imm as i64) as u32;
                }
                Instruction::Lw { rd, rs1, imm } => {
                    let addr = (self.cpu.reg(rs1 as usize) + imm as i64) as u32;
                    let v = self.memory.read_i32(addr).ok_or(GuestException::MemoryFault {
                        addr,
                        len: 4,
                        reason: "load out of bounds",
                    })?;
                    self.cpu.set_reg(rd as usize, v as i64);
                    self.cpu.pc = pc.wrapping_add(4);
                }
                Instruction::Sw { rs1, rs2, imm } => {
                    let addr = (self.cpu.reg(rs1 as usize) + imm as i64) as u32;
                    let v = self.cpu.reg(rs2 as usize) as i32;
                    if !self.memory.write_i32(addr, v) {
                        return Err(GuestException::MemoryFault {
                            addr,
                            len: 4,
                            reason: "store out of bounds",
                        });
                    }
                    self.cpu.pc = pc.wrapping_add(4);
                }
            }
        }
    }
}
