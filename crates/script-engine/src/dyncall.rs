//! Component E — Dynamic-Call Table and Dynargs.
//!
//! Maps `CRC32(name) -> host closure`, invoked from the guest without
//! linker coordination. Lives on each instance's state: every instance has
//! its own table.

use std::collections::HashMap;
use std::sync::Arc;

use guest_vm::{Cpu, Memory};

use crate::error::{Error, Result};
use crate::instance::InstanceState;

/// A host-registered callable, addressed by name-hash and invoked from the
/// guest without linker coordination. `Arc` rather than `Box` so invocation
/// can clone the handle out of the table before calling it, without holding
/// a borrow of the table across the call.
///
/// Takes `&mut Cpu`/`&mut Memory` rather than a full instance handle: a
/// dyncall fires from inside the syscall hook, which only ever holds those
/// two pieces of VM state mutably at once (the rest of the instance, in
/// `InstanceState`, is passed alongside for handlers that need directory or
/// dynargs access).
pub type DynClosure = Arc<dyn Fn(&mut Cpu, &mut Memory, &mut InstanceState) + Send + Sync>;

#[derive(Default, Clone)]
pub struct DynamicCallTable {
    entries: HashMap<u32, DynClosure>,
}

impl DynamicCallTable {
    pub fn new() -> Self {
        DynamicCallTable {
            entries: HashMap::new(),
        }
    }

    /// Inserts a new entry, failing with `HashCollision` if the key is
    /// already registered.
    pub fn register(&mut self, name: &str, hash: u32, closure: DynClosure) -> Result<()> {
        if self.entries.contains_key(&hash) {
            return Err(Error::HashCollision(name.to_string()));
        }
        self.entries.insert(hash, closure);
        Ok(())
    }

    /// Explicit replacement: removes any existing entry for `hash` first,
    /// then inserts.
    pub fn reset(&mut self, hash: u32, closure: DynClosure) {
        self.entries.insert(hash, closure);
    }

    pub fn get(&self, hash: u32) -> Option<DynClosure> {
        self.entries.get(&hash).cloned()
    }

    pub fn contains(&self, hash: u32) -> bool {
        self.entries.contains_key(&hash)
    }
}

/// One tagged dynarg value, pushed by the guest via the custom instruction
/// before a dynamic-call-with-arguments syscall.
#[derive(Debug, Clone, PartialEq)]
pub enum DynValue {
    I64(i64),
    F32(f32),
    Text(Vec<u8>),
}

/// The ephemeral argument list a dynamic-call handler consumes. Lifetime is
/// one call: cleared by [`crate::dispatch`] right after the handler returns.
#[derive(Default, Debug, Clone)]
pub struct Dynargs(pub Vec<DynValue>);

impl Dynargs {
    pub fn new() -> Self {
        Dynargs(Vec::new())
    }

    pub fn push(&mut self, value: DynValue) {
        self.0.push(value);
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[DynValue] {
        &self.0
    }
}
