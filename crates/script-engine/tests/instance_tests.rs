//! Fork/call/preempt/timeout behavior of a single Script Instance, exercised
//! through [`ScriptHost`] the way an embedder would.

mod common;

use guest_vm::builder::ProgramBuilder;
use guest_vm::{cpu, GuestProgram, Instruction};
use script_engine::{dispatch, Error, ScriptHost, MAX_INSTRUCTIONS};

fn build_template() -> GuestProgram {
    let mut b = ProgramBuilder::new("instance-test-template");
    b.label("init").emit(Instruction::Halt);

    b.label("say_hello");
    common::li(&mut b, cpu::A0 as u8, 0);
    common::li(&mut b, (cpu::A0 + 1) as u8, 14);
    common::syscall(&mut b, dispatch::WRITE);
    b.emit(Instruction::Halt);

    b.label("busy").emit(Instruction::Beq {
        rs1: 0,
        rs2: 0,
        imm: 0,
    });

    b.label("noop").emit(Instruction::Halt);

    b.build("init")
}

fn host_with_instance() -> (ScriptHost, u32) {
    let mut host = ScriptHost::new();
    host.load_template_program(
        "instance-test-template",
        build_template(),
        "init say_hello busy noop",
    );
    let hash = host
        .create_instance("instance-test-template", "probe", false)
        .unwrap();
    (host, hash)
}

#[test]
fn write_syscall_appends_to_instance_stdout() {
    let (host, hash) = host_with_instance();
    host.with_instance_mut(hash, |inst| {
        inst.vm.memory.copy_from(0, b"hello, world!\n");
    });

    let addr = host
        .with_instance_mut(hash, |inst| inst.address_of("say_hello"))
        .flatten()
        .unwrap();
    let result = host.call(hash, addr, &[], &[]).unwrap();
    assert_eq!(result, 14);

    let stdout = host
        .with_instance_mut(hash, |inst| inst.state.stdout.clone())
        .unwrap();
    assert_eq!(stdout, b"hello, world!\n");
}

#[test]
fn preempt_restores_caller_cpu_state_exactly() {
    let (host, hash) = host_with_instance();
    let noop_addr = host
        .with_instance_mut(hash, |inst| inst.address_of("noop"))
        .flatten()
        .unwrap();

    host.with_instance_mut(hash, |inst| inst.vm.cpu.set_reg(20, 12345));
    let before = host
        .with_instance_mut(hash, |inst| inst.vm.cpu.snapshot())
        .unwrap();

    host.with_instance_mut(hash, |inst| {
        inst.preempt(noop_addr, &[1, 2], &[], &host).unwrap()
    });

    let after = host
        .with_instance_mut(hash, |inst| inst.vm.cpu.snapshot())
        .unwrap();
    assert_eq!(before, after);
}

#[test]
fn busy_loop_times_out_and_records_overrun_then_recovers() {
    let (host, hash) = host_with_instance();
    let busy_addr = host
        .with_instance_mut(hash, |inst| inst.address_of("busy"))
        .flatten()
        .unwrap();
    let noop_addr = host
        .with_instance_mut(hash, |inst| inst.address_of("noop"))
        .flatten()
        .unwrap();

    let err = host.call(hash, busy_addr, &[], &[]).unwrap_err();
    assert!(matches!(err, Error::Timeout { executed } if executed == MAX_INSTRUCTIONS));

    let overruns = host
        .with_instance_mut(hash, |inst| inst.state.budget_overruns)
        .unwrap();
    assert_eq!(overruns, 1);

    let result = host.call(hash, noop_addr, &[], &[]).unwrap();
    assert_eq!(result, 0);
}
