//! Programmatic guest-program assembly, the emulator-side analogue of the
//! teacher's `ScriptBuilder` (`crates/vm/src/script_builder.rs`): test guest
//! programs are built op-by-op instead of hand-written as bytes.

use crate::isa::{encode, Instruction};
use crate::program::GuestProgram;
use std::collections::HashMap;

pub const CODE_BASE: u32 = 0x1000;

pub struct ProgramBuilder {
    name: String,
    code: Vec<Instruction>,
    labels: HashMap<String, u32>,
    symbols: HashMap<String, String>,
}

impl ProgramBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        ProgramBuilder {
            name: name.into(),
            code: Vec::new(),
            labels: HashMap::new(),
            symbols: HashMap::new(),
        }
    }

    fn here(&self) -> u32 {
        CODE_BASE + (self.code.len() as u32) * 4
    }

    /// Marks the current position as a named guest symbol, made resolvable
    /// through [`GuestProgram::address_of`].
    pub fn label(&mut self, name: &str) -> &mut Self {
        let addr = self.here();
        self.labels.insert(name.to_string(), addr);
        self.symbols.insert(name.to_string(), name.to_string());
        self
    }

    pub fn emit(&mut self, instr: Instruction) -> &mut Self {
        self.code.push(instr);
        self
    }

    pub fn build(&self, entry_label: &str) -> GuestProgram {
        let code = self.code.iter().map(|&i| encode(i)).collect();
        let entry = *self
            .labels
            .get(entry_label)
            .unwrap_or_else(|| panic!("unknown entry label {entry_label}"));
        let mut program = GuestProgram::new(self.name.clone(), code, CODE_BASE, entry);
        for (name, _) in &self.symbols {
            let addr = self.labels[name];
            program.define_symbol(name.clone(), addr);
        }
        program
    }
}
