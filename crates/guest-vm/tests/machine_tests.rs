use std::sync::Arc;

use guest_vm::isa::Instruction;
use guest_vm::{ExecHooks, GuestException, Machine, NoHooks};

fn li(rd: u8, imm: i32) -> Instruction {
    Instruction::Addi { rd, rs1: 0, imm }
}

#[test]
fn add_two_numbers_and_halts() {
    let mut b = guest_vm::builder::ProgramBuilder::new("add_test");
    b.label("start")
        .emit(li(10, 40))
        .emit(li(11, 2))
        .emit(Instruction::Add {
            rd: 10,
            rs1: 10,
            rs2: 11,
        })
        .emit(Instruction::Halt);
    let program = Arc::new(b.build("start"));

    let mut m = Machine::fork(program.clone(), 0, 10_000);
    let entry = m.address_of("start").unwrap();
    let result = m.call(entry, &[], &[], &mut NoHooks).unwrap();
    assert_eq!(result, 42);
}

#[test]
fn busy_loop_times_out() {
    let mut b = guest_vm::builder::ProgramBuilder::new("busy_loop");
    b.label("busy_loop").emit(Instruction::Beq {
        rs1: 0,
        rs2: 0,
        imm: 0,
    });
    let program = Arc::new(b.build("busy_loop"));

    let mut m = Machine::fork(program, 0, 1_000);
    let entry = m.address_of("busy_loop").unwrap();
    let err = m.call(entry, &[], &[], &mut NoHooks).unwrap_err();
    assert!(matches!(err, GuestException::Timeout { executed: 1_000 }));
}

struct RecordingHooks {
    pub syscalls: u32,
}

impl ExecHooks for RecordingHooks {
    fn syscall(
        &mut self,
        cpu: &mut guest_vm::Cpu,
        _memory: &mut guest_vm::Memory,
    ) -> Result<(), GuestException> {
        self.syscalls += 1;
        cpu.set_return(7);
        Ok(())
    }

    fn push_dynarg(
        &mut self,
        _cpu: &mut guest_vm::Cpu,
        _memory: &mut guest_vm::Memory,
        _push: guest_vm::DynargPush,
        _rs1: u8,
    ) -> Result<(), GuestException> {
        Ok(())
    }
}

#[test]
fn ecall_invokes_host_hook() {
    let mut b = guest_vm::builder::ProgramBuilder::new("syscaller");
    b.label("start").emit(Instruction::Ecall).emit(Instruction::Halt);
    let program = Arc::new(b.build("start"));

    let mut m = Machine::fork(program, 0, 10_000);
    let entry = m.address_of("start").unwrap();
    let mut hooks = RecordingHooks { syscalls: 0 };
    let result = m.call(entry, &[], &[], &mut hooks).unwrap();
    assert_eq!(hooks.syscalls, 1);
    assert_eq!(result, 7);
}

#[test]
fn fork_offsets_stack_base_by_instance_counter() {
    let mut b = guest_vm::builder::ProgramBuilder::new("noop");
    b.label("start").emit(Instruction::Halt);
    let program = Arc::new(b.build("start"));

    let m0 = Machine::fork(program.clone(), 0, 100);
    let m1 = Machine::fork(program, 1, 100);
    assert_ne!(m0.memory.stack_base(), m1.memory.stack_base());
    assert_eq!(
        m0.memory.stack_base() - m1.memory.stack_base(),
        16 * guest_vm::memory::PAGE_SIZE
    );
}
