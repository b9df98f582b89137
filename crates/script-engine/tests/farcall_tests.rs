//! Component F — cross-VM calls: directory-resolved `farcall` and payload-
//! carrying `interrupt`, both driven between two live instances of the same
//! template.

mod common;

use guest_vm::builder::ProgramBuilder;
use guest_vm::{cpu, GuestProgram, Instruction};
use script_engine::{crc32, dispatch, ScriptHost};

fn build_template() -> GuestProgram {
    let mut b = ProgramBuilder::new("farcall-test-template");
    b.label("init").emit(Instruction::Halt);

    b.label("remote_add").emit(Instruction::Add {
        rd: cpu::A0 as u8,
        rs1: cpu::A0 as u8,
        rs2: (cpu::A0 + 1) as u8,
    });
    b.emit(Instruction::Halt);

    b.label("start");
    common::li(&mut b, cpu::A0 as u8, crc32(b"level2") as i32);
    common::li(&mut b, (cpu::A0 + 1) as u8, crc32(b"remote_add") as i32);
    common::li(&mut b, (cpu::A0 + 2) as u8, 40);
    common::li(&mut b, (cpu::A0 + 3) as u8, 2);
    common::syscall(&mut b, dispatch::FARCALL);
    b.emit(Instruction::Halt);

    // Reads (ptr, len) straight off a0/a1, the shape `interrupt` hands its
    // callee: a scratch heap pointer into the destination's own memory.
    b.label("ingest");
    common::syscall(&mut b, dispatch::WRITE);
    b.emit(Instruction::Halt);

    b.label("interrupt_start");
    common::li(&mut b, cpu::A0 as u8, crc32(b"level2") as i32);
    common::li(&mut b, (cpu::A0 + 1) as u8, crc32(b"ingest") as i32);
    common::li(&mut b, (cpu::A0 + 2) as u8, 0);
    common::li(&mut b, (cpu::A0 + 3) as u8, 16);
    common::syscall(&mut b, dispatch::INTERRUPT);
    b.emit(Instruction::Halt);

    b.build("init")
}

fn two_instance_host() -> (ScriptHost, u32, u32) {
    let mut host = ScriptHost::new();
    host.load_template_program(
        "farcall-test-template",
        build_template(),
        "init remote_add start ingest interrupt_start",
    );
    let level1 = host
        .create_instance("farcall-test-template", "level1", false)
        .unwrap();
    let level2 = host
        .create_instance("farcall-test-template", "level2", false)
        .unwrap();
    (host, level1, level2)
}

#[test]
fn farcall_resolves_through_destination_directory_and_marshals_args() {
    let (host, level1, _level2) = two_instance_host();
    let start_addr = host
        .with_instance_mut(level1, |inst| inst.address_of("start"))
        .flatten()
        .unwrap();

    let result = host.call(level1, start_addr, &[], &[]).unwrap();
    assert_eq!(result, 42);
    assert_eq!(host.metrics.farcalls_issued(), 1);
}

#[test]
fn interrupt_copies_payload_into_destination_scratch_allocation() {
    let (host, level1, level2) = two_instance_host();
    let payload: Vec<u8> = (0..16).collect();
    host.with_instance_mut(level1, |inst| {
        inst.vm.memory.copy_from(0, &payload);
    });

    let addr = host
        .with_instance_mut(level1, |inst| inst.address_of("interrupt_start"))
        .flatten()
        .unwrap();
    let result = host.call(level1, addr, &[], &[]).unwrap();
    assert_eq!(result, 16);

    let stdout = host
        .with_instance_mut(level2, |inst| inst.state.stdout.clone())
        .unwrap();
    assert_eq!(stdout, payload);
}

#[test]
fn farcall_to_self_fails_because_the_running_instance_is_absent_from_the_map() {
    let mut host = ScriptHost::new();
    host.load_template_program(
        "farcall-test-template",
        build_template(),
        "init remote_add start",
    );
    let only = host
        .create_instance("farcall-test-template", "level2", false)
        .unwrap();
    let start_addr = host
        .with_instance_mut(only, |inst| inst.address_of("start"))
        .flatten()
        .unwrap();

    // "level2" farcalling itself: the target hash is its own, but the
    // instance map can't find it while it's the one currently running.
    let result = host.call(only, start_addr, &[], &[]).unwrap();
    assert_eq!(result, -1);
}
