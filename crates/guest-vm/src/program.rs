//! The immutable, loaded guest image a [`crate::machine::Machine`] is forked
//! from, minus ELF parsing, which this stand-in skips: guest programs are
//! assembled directly with
//! [`crate::builder::ProgramBuilder`]).

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct GuestProgram {
    pub name: String,
    pub code: Vec<u32>,
    pub code_base: u32,
    pub entry: u32,
    symbols: HashMap<String, u32>,
}

impl GuestProgram {
    pub fn new(name: impl Into<String>, code: Vec<u32>, code_base: u32, entry: u32) -> Self {
        GuestProgram {
            name: name.into(),
            code,
            code_base,
            entry,
            symbols: HashMap::new(),
        }
    }

    pub fn define_symbol(&mut self, name: impl Into<String>, addr: u32) {
        self.symbols.insert(name.into(), addr);
    }

    pub fn address_of(&self, name: &str) -> Option<u32> {
        self.symbols.get(name).copied()
    }

    pub fn symbol_name(&self, addr: u32) -> Option<&str> {
        self.symbols
            .iter()
            .find(|(_, &a)| a == addr)
            .map(|(n, _)| n.as_str())
    }

    pub fn symbol_names(&self) -> impl Iterator<Item = &str> {
        self.symbols.keys().map(|s| s.as_str())
    }

    /// Fetches the instruction word at guest address `pc`, if it falls
    /// inside the loaded code segment and is word-aligned.
    pub fn fetch(&self, pc: u32) -> Option<u32> {
        if pc < self.code_base || pc % 4 != 0 {
            return None;
        }
        let index = ((pc - self.code_base) / 4) as usize;
        self.code.get(index).copied()
    }
}
