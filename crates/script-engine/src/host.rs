//! Process-wide state: the Binary Registry plus the live-instance map every
//! far-call and tick driver goes through.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use dashmap::DashMap;

use crate::error::{Error, Result};
use crate::instance::Instance;
use crate::registry::Registry;

/// In-process counters, following the shape of a typical metrics-collector
/// struct: plain atomics, no external exporter wired up.
#[derive(Default)]
pub struct Metrics {
    instances_created: AtomicU64,
    farcalls_issued: AtomicU64,
    timeouts: AtomicU64,
    dyncalls_invoked: AtomicU64,
}

impl Metrics {
    pub fn record_instance_created(&self) {
        self.instances_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_farcall(&self) {
        self.farcalls_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dyncall(&self) {
        self.dyncalls_invoked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn instances_created(&self) -> u64 {
        self.instances_created.load(Ordering::Relaxed)
    }

    pub fn farcalls_issued(&self) -> u64 {
        self.farcalls_issued.load(Ordering::Relaxed)
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    pub fn dyncalls_invoked(&self) -> u64 {
        self.dyncalls_invoked.load(Ordering::Relaxed)
    }
}

/// The process-wide Binary Registry and live Script Instance map. Instances
/// are owned here and looked up only by name-hash; nothing outside this
/// struct holds a durable reference to one.
pub struct ScriptHost {
    pub registry: Registry,
    instances: DashMap<u32, Instance>,
    next_instance_counter: AtomicU32,
    pub metrics: Metrics,
}

impl Default for ScriptHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptHost {
    pub fn new() -> Self {
        ScriptHost {
            registry: Registry::new(),
            instances: DashMap::new(),
            next_instance_counter: AtomicU32::new(0),
            metrics: Metrics::default(),
        }
    }

    /// Registers an in-process-assembled template directly, bypassing disk
    /// loading. Initialization-phase only, like [`Registry::insert`] and
    /// [`Registry::insert_program`] it wraps — callers must not mix this
    /// with concurrent [`Self::create_instance`] calls.
    pub fn load_template_program(
        &mut self,
        name: &str,
        program: guest_vm::GuestProgram,
        symbols_text: &str,
    ) {
        self.registry.insert_program(name, program, symbols_text);
    }

    /// Forks `template_name` into a new, initialized instance called
    /// `instance_name`, and files it under `CRC32(instance_name)`.
    pub fn create_instance(
        &self,
        template_name: &str,
        instance_name: &str,
        debug: bool,
    ) -> Result<u32> {
        let template = self.registry.get(template_name)?;
        let counter = self.next_instance_counter.fetch_add(1, Ordering::Relaxed);
        let mut instance = Instance::create(&template, instance_name, debug, counter);
        instance.initialize(&template, self)?;

        let hash = instance.name_hash();
        if self.instances.contains_key(&hash) {
            return Err(Error::HashCollision(instance_name.to_string()));
        }
        self.instances.insert(hash, instance);
        self.metrics.record_instance_created();
        Ok(hash)
    }

    /// Removes the instance for `hash`, runs `f` on it, then reinserts it.
    /// Removing for the duration of `f` is what makes a self-targeting
    /// far-call observably fail: the instance that is currently executing
    /// is not present in the map for another lookup to find.
    pub fn with_instance_mut<F, R>(&self, hash: u32, f: F) -> Option<R>
    where
        F: FnOnce(&mut Instance) -> R,
    {
        let (_, mut instance) = self.instances.remove(&hash)?;
        let result = f(&mut instance);
        self.instances.insert(hash, instance);
        Some(result)
    }

    /// Convenience wrapper over [`Self::with_instance_mut`] for a clean
    /// top-level call into a named instance.
    pub fn call(&self, hash: u32, addr: u32, int_args: &[i64], float_args: &[f64]) -> Result<i64> {
        let result = self
            .with_instance_mut(hash, |inst| inst.call(addr, int_args, float_args, self))
            .ok_or_else(|| Error::NotFound(format!("instance {hash:#010x}")))?;
        if let Err(Error::Timeout { .. }) = &result {
            self.metrics.record_timeout();
        }
        result
    }

    pub fn each_tick_event(&self, hash: u32) -> Result<()> {
        self.with_instance_mut(hash, |inst| inst.each_tick_event(self))
            .ok_or_else(|| Error::NotFound(format!("instance {hash:#010x}")))?
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
}
