//! Component A — Binary Registry ("blackbox").
//!
//! Maps a binary name to a loaded template VM plus its public-symbol
//! listing. Insertions happen during the initialization
//! phase only and are not concurrent with lookups.

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use guest_vm::GuestProgram;

use crate::error::{Error, Result};

/// An immutable, loaded guest image.
#[derive(Debug)]
pub struct TemplateBinary {
    pub name: String,
    /// The raw bytes the image was loaded from, kept for parity with
    /// the data model even though this crate never re-parses it.
    pub image: Vec<u8>,
    pub program: Arc<GuestProgram>,
    /// Raw whitespace-separated symbol list, not yet resolved to addresses
    /// (resolution happens per-instance against a live VM — see
    /// [`crate::directory::Directory::build_from_text`]).
    pub symbols_text: String,
}

#[derive(Default)]
pub struct Registry {
    templates: HashMap<String, Arc<TemplateBinary>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            templates: HashMap::new(),
        }
    }

    /// Loads `binary_path` and `symbols_path` and stores the template under
    /// `name`. ELF parsing is treated as an external collaborator; this
    /// workspace's stand-in loader (`guest_vm::loader`) fills that role.
    pub fn insert(&mut self, name: &str, binary_path: &str, symbols_path: &str) -> Result<()> {
        let image = fs::read(binary_path).map_err(|e| Error::LoadError {
            name: name.to_string(),
            reason: format!("reading {binary_path}: {e}"),
        })?;
        let program = guest_vm::loader::load_image(name, &image).map_err(|e| Error::LoadError {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        let symbols_text = if symbols_path.is_empty() {
            String::new()
        } else {
            fs::read_to_string(symbols_path).unwrap_or_else(|e| {
                log::warn!("symbol file {symbols_path:?} unreadable ({e}); treating as empty");
                String::new()
            })
        };
        self.insert_template(TemplateBinary {
            name: name.to_string(),
            image,
            program: Arc::new(program),
            symbols_text,
        });
        Ok(())
    }

    /// Registers an already-assembled template directly, bypassing file
    /// loading. Used by this workspace's tests and by embedders that build
    /// guest programs in-process.
    pub fn insert_program(&mut self, name: &str, program: GuestProgram, symbols_text: &str) {
        self.insert_template(TemplateBinary {
            name: name.to_string(),
            image: Vec::new(),
            program: Arc::new(program),
            symbols_text: symbols_text.to_string(),
        });
    }

    fn insert_template(&mut self, template: TemplateBinary) {
        self.templates
            .insert(template.name.clone(), Arc::new(template));
    }

    pub fn get(&self, name: &str) -> Result<Arc<TemplateBinary>> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("template binary {name:?}")))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
