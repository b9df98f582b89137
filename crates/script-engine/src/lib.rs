//! A multi-tenant scripting host built on top of the `guest-vm` emulator:
//! template binaries forked into isolated instances, a host-call dispatch
//! table, dynamic calls, cross-VM far-calls, and a tick/preemption
//! subsystem for frame-driven guest work.

pub mod directory;
pub mod dispatch;
pub mod dyncall;
pub mod error;
pub mod farcall;
pub mod hash;
pub mod host;
pub mod instance;
pub mod registry;

pub use directory::Directory;
pub use dispatch::{DispatchHooks, GAME_API_BASE};
pub use dyncall::{DynClosure, DynValue, DynamicCallTable, Dynargs};
pub use error::{Error, Result};
pub use hash::{crc32, crc32_streamed};
pub use host::{Metrics, ScriptHost};
pub use instance::{Instance, InstanceState, MAX_INSTRUCTIONS, MAX_REENTRANCY};
pub use registry::{Registry, TemplateBinary};
