//! Component G — tick/preemption: each embedder frame reports the number of
//! threads blocked on the tick reason to the guest's tick handler, and the
//! main thread is left exactly where it started.

mod common;

use std::sync::Arc;

use guest_vm::builder::ProgramBuilder;
use guest_vm::{cpu, GuestProgram, Instruction, MAIN_THREAD};
use script_engine::{crc32, dispatch, ScriptHost};

const TICK_REASON: u32 = 10;

fn build_template() -> GuestProgram {
    let mut b = ProgramBuilder::new("tick-test-template");
    b.label("init").emit(Instruction::Halt);

    // a0/a1 arrive as (count, reason) via preempt's int_args; forwards them
    // to a host closure that can outlive the restored cpu snapshot.
    b.label("tick_handler");
    common::li(&mut b, cpu::DYNCALL_HASH_REG as u8, crc32(b"record_tick") as i32);
    common::syscall(&mut b, dispatch::DYNCALL);
    b.emit(Instruction::Halt);

    b.build("init")
}

#[test]
fn each_tick_event_reports_exact_blocked_count_and_preserves_main_thread() {
    let mut host = ScriptHost::new();
    host.load_template_program("tick-test-template", build_template(), "init tick_handler");
    let hash = host
        .create_instance("tick-test-template", "probe", false)
        .unwrap();

    let tick_addr = host
        .with_instance_mut(hash, |inst| inst.address_of("tick_handler"))
        .flatten()
        .unwrap();

    host.with_instance_mut(hash, |inst| {
        inst.state
            .dynamic_table
            .register(
                "record_tick",
                crc32(b"record_tick"),
                Arc::new(|cpu, _memory, state| {
                    let count = cpu.int_arg(0);
                    let reason = cpu.int_arg(1);
                    state.stdout = format!("{count},{reason}").into_bytes();
                }),
            )
            .unwrap();
        inst.set_tick_event(tick_addr, TICK_REASON);
        for _ in 0..3 {
            let tid = inst.vm.threads.spawn();
            inst.vm.threads.block(tid, TICK_REASON);
        }
    });

    host.each_tick_event(hash).unwrap();

    let (reported, blocked_still, main_tid) = host
        .with_instance_mut(hash, |inst| {
            (
                inst.state.stdout.clone(),
                inst.vm.threads.count_blocked(TICK_REASON),
                inst.vm.threads.current(),
            )
        })
        .unwrap();

    assert_eq!(reported, b"3,10");
    assert_eq!(blocked_still, 3);
    assert_eq!(main_tid, MAIN_THREAD);
}

#[test]
fn tick_event_is_a_noop_when_unset() {
    let mut host = ScriptHost::new();
    host.load_template_program("tick-test-template", build_template(), "init tick_handler");
    let hash = host
        .create_instance("tick-test-template", "probe", false)
        .unwrap();

    host.each_tick_event(hash).unwrap();

    let stdout = host
        .with_instance_mut(hash, |inst| inst.state.stdout.clone())
        .unwrap();
    assert!(stdout.is_empty());
}
