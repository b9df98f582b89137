//! Component E — dynamic calls: both `DYNCALL` variants, plus the dynargs
//! push/clear roundtrip.

mod common;

use std::sync::Arc;

use guest_vm::builder::ProgramBuilder;
use guest_vm::{cpu, GuestProgram, Instruction};
use script_engine::{crc32, dispatch, ScriptHost};

fn build_template() -> GuestProgram {
    let mut b = ProgramBuilder::new("dyncall-test-template");
    b.label("init").emit(Instruction::Halt);

    // Register-hash form: the callee reads its argument straight off a0.
    b.label("invoke_add_one");
    common::li(&mut b, cpu::A0 as u8, 41);
    common::li(&mut b, cpu::DYNCALL_HASH_REG as u8, crc32(b"add_one") as i32);
    common::syscall(&mut b, dispatch::DYNCALL);
    b.emit(Instruction::Halt);

    // In-memory-name form: hash register stays zero, (ptr, len) sit in a0/a1.
    b.label("invoke_ping");
    common::li(&mut b, cpu::A0 as u8, 0);
    common::li(&mut b, (cpu::A0 + 1) as u8, 4);
    common::li(&mut b, cpu::DYNCALL_HASH_REG as u8, 0);
    common::syscall(&mut b, dispatch::DYNCALL);
    b.emit(Instruction::Halt);

    // Pushes one dynarg before the call, so the handler can read it back.
    b.label("invoke_collect");
    common::li(&mut b, (cpu::A0 + 1) as u8, 777);
    b.emit(Instruction::Dynarg {
        funct3: 0b001,
        rs1: (cpu::A0 + 1) as u8,
    });
    common::li(&mut b, cpu::DYNCALL_HASH_REG as u8, crc32(b"collect") as i32);
    common::syscall(&mut b, dispatch::DYNCALL);
    b.emit(Instruction::Halt);

    b.build("init")
}

fn host_with_instance() -> (ScriptHost, u32) {
    let mut host = ScriptHost::new();
    host.load_template_program(
        "dyncall-test-template",
        build_template(),
        "init invoke_add_one invoke_ping invoke_collect",
    );
    let hash = host
        .create_instance("dyncall-test-template", "probe", false)
        .unwrap();
    (host, hash)
}

#[test]
fn register_hash_form_invokes_registered_handler() {
    let (host, hash) = host_with_instance();
    host.with_instance_mut(hash, |inst| {
        inst.state
            .dynamic_table
            .register(
                "add_one",
                crc32(b"add_one"),
                Arc::new(|cpu, _memory, _state| {
                    let v = cpu.int_arg(0);
                    cpu.set_return(v + 1);
                }),
            )
            .unwrap();
    });

    let addr = host
        .with_instance_mut(hash, |inst| inst.address_of("invoke_add_one"))
        .flatten()
        .unwrap();
    let result = host.call(hash, addr, &[], &[]).unwrap();
    assert_eq!(result, 42);
}

#[test]
fn in_memory_name_form_streams_through_crc32() {
    let (host, hash) = host_with_instance();
    host.with_instance_mut(hash, |inst| {
        inst.vm.memory.copy_from(0, b"ping");
        inst.state
            .dynamic_table
            .register(
                "ping",
                crc32(b"ping"),
                Arc::new(|cpu, _memory, _state| cpu.set_return(99)),
            )
            .unwrap();
    });

    let addr = host
        .with_instance_mut(hash, |inst| inst.address_of("invoke_ping"))
        .flatten()
        .unwrap();
    let result = host.call(hash, addr, &[], &[]).unwrap();
    assert_eq!(result, 99);
}

#[test]
fn dynargs_are_visible_during_the_call_and_empty_before_and_after() {
    let (host, hash) = host_with_instance();
    let empty_before = host
        .with_instance_mut(hash, |inst| inst.state.dynargs.is_empty())
        .unwrap();
    assert!(empty_before);

    host.with_instance_mut(hash, |inst| {
        inst.state
            .dynamic_table
            .register(
                "collect",
                crc32(b"collect"),
                Arc::new(|cpu, _memory, state| {
                    cpu.set_return(state.dynargs.as_slice().len() as i64);
                }),
            )
            .unwrap();
    });

    let addr = host
        .with_instance_mut(hash, |inst| inst.address_of("invoke_collect"))
        .flatten()
        .unwrap();
    let result = host.call(hash, addr, &[], &[]).unwrap();
    assert_eq!(result, 1);

    let empty_after = host
        .with_instance_mut(hash, |inst| inst.state.dynargs.is_empty())
        .unwrap();
    assert!(empty_after);
}
