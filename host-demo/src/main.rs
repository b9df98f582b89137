//! A minimal embedder: builds a demo template in-process, forks an
//! instance, drives a few tick-style frames, and exercises the `SELF_TEST`
//! syscall as a worked example of the host-call binding pattern.

use clap::Parser;
use guest_vm::builder::ProgramBuilder;
use guest_vm::{GuestProgram, Instruction};
use script_engine::{Error, ScriptHost};

#[derive(Parser)]
#[command(name = "host-demo", about = "Minimal embedder for the scripting host")]
struct Args {
    /// Name to register the demo instance under.
    #[arg(long, default_value = "demo")]
    instance_name: String,

    /// Number of embedder frames to simulate.
    #[arg(long, default_value_t = 3)]
    frames: u32,
}

const FRAME_BLOCK_REASON: u32 = 10;

/// Assembles a tiny guest program in-process, standing in for a compiled
/// binary the registry would otherwise load from disk: `start` issues a
/// `SELF_TEST` syscall then halts; `tick_handler` is the entry registered
/// as this instance's tick event.
fn build_demo_template() -> GuestProgram {
    let mut builder = ProgramBuilder::new("demo-template");
    builder
        .label("start")
        .emit(Instruction::Addi {
            rd: guest_vm::cpu::SYSCALL_NUM_REG as u8,
            rs1: 0,
            imm: script_engine::dispatch::SELF_TEST as i32,
        })
        .emit(Instruction::Ecall)
        .emit(Instruction::Halt);
    builder.label("tick_handler").emit(Instruction::Halt);
    builder.build("start")
}

fn main() -> Result<(), Error> {
    env_logger::init();
    let args = Args::parse();

    let mut host = ScriptHost::new();
    host.load_template_program("demo-template", build_demo_template(), "start tick_handler");

    let hash = host.create_instance("demo-template", &args.instance_name, false)?;
    log::info!(
        "created instance {:?} (hash {hash:#010x}); {} template(s) loaded",
        args.instance_name,
        host.registry.len()
    );

    let tick_addr = host
        .with_instance_mut(hash, |inst| inst.address_of("tick_handler"))
        .flatten()
        .unwrap_or(0);
    host.with_instance_mut(hash, |inst| inst.set_tick_event(tick_addr, FRAME_BLOCK_REASON));

    for frame in 0..args.frames {
        host.each_tick_event(hash)?;
        log::info!("frame {frame} ticked");
    }

    let start_addr = host
        .with_instance_mut(hash, |inst| inst.address_of("start"))
        .flatten()
        .unwrap_or(0);
    let result = host.call(hash, start_addr, &[], &[])?;
    log::info!("start() returned {result} (SELF_TEST syscall result)");

    log::info!(
        "metrics: instances_created={} farcalls_issued={} timeouts={} dyncalls_invoked={}",
        host.metrics.instances_created(),
        host.metrics.farcalls_issued(),
        host.metrics.timeouts(),
        host.metrics.dyncalls_invoked(),
    );

    Ok(())
}
