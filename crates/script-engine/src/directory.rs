//! Component C — Public-API Directory.
//!
//! Insertion-only map from `CRC32(symbol-name) -> guest-address`, built once
//! after instance creation by scanning a whitespace-separated symbol list
//! against a live VM.

use std::collections::HashMap;

use guest_vm::Machine;

use crate::error::{Error, Result};
use crate::hash::crc32;

#[derive(Debug, Default)]
pub struct Directory {
    entries: HashMap<u32, u32>,
}

impl Directory {
    pub fn new() -> Self {
        Directory {
            entries: HashMap::new(),
        }
    }

    /// Splits `text` on whitespace and resolves each token against `vm`.
    /// Unresolved tokens are excluded, not stored as zero.
    /// A hash collision between two *resolvable* tokens is a build error.
    pub fn build_from_text(&mut self, text: &str, vm: &Machine) -> Result<()> {
        for token in text.split_whitespace() {
            let Some(addr) = vm.address_of(token) else {
                continue;
            };
            let key = crc32(token.as_bytes());
            if let Some(&existing) = self.entries.get(&key) {
                if existing != addr {
                    return Err(Error::HashCollision(token.to_string()));
                }
                continue;
            }
            self.entries.insert(key, addr);
        }
        Ok(())
    }

    /// Reads `path` and delegates to [`Self::build_from_text`]. An empty
    /// path is a silent no-op; a missing file logs a warning and is a
    /// no-op.
    pub fn build_from_file(&mut self, path: &str, vm: &Machine) -> Result<()> {
        if path.is_empty() {
            return Ok(());
        }
        match std::fs::read_to_string(path) {
            Ok(text) => self.build_from_text(&text, vm),
            Err(e) => {
                log::warn!("symbol file {path:?} not found ({e}); directory left unchanged");
                Ok(())
            }
        }
    }

    /// `api_function_from_hash`: returns the guest address for `hash`, or
    /// `0` to signal "absent" to guest-facing callers.
    pub fn lookup(&self, hash: u32) -> u32 {
        self.entries.get(&hash).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
