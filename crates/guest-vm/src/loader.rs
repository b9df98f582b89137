//! Parses a loaded binary image into a [`GuestProgram`].
//!
//! Real guest binaries would need a full ELF parse; this is the stand-in
//! that plays that role for the workspace's own tiny image format, so the
//! registry has something concrete to call when loading from disk.

use crate::program::GuestProgram;

const MAGIC: &[u8; 4] = b"SVMI";

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("image too short")]
    Truncated,
    #[error("bad magic: expected SVMI")]
    BadMagic,
    #[error("symbol name is not valid utf-8")]
    BadSymbolName,
}

/// Serializes a [`GuestProgram`] into this workspace's on-disk image format.
/// `host-demo` uses this to produce binaries the registry can then load
/// through [`load_image`], exercising the same path `Registry::insert` does.
pub fn save_image(program: &GuestProgram) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&program.entry.to_le_bytes());
    out.extend_from_slice(&(program.code.len() as u32).to_le_bytes());
    for word in &program.code {
        out.extend_from_slice(&word.to_le_bytes());
    }
    let names: Vec<&str> = program.symbol_names().collect();
    out.extend_from_slice(&(names.len() as u32).to_le_bytes());
    for name in names {
        let addr = program.address_of(name).unwrap();
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&addr.to_le_bytes());
    }
    out
}

/// Parses an image produced by [`save_image`] back into a [`GuestProgram`].
pub fn load_image(name: &str, image: &[u8]) -> Result<GuestProgram, ImageError> {
    let mut cursor = 0usize;
    let take = |cursor: &mut usize, n: usize| -> Result<&[u8], ImageError> {
        let end = cursor.checked_add(n).ok_or(ImageError::Truncated)?;
        let slice = image.get(*cursor..end).ok_or(ImageError::Truncated)?;
        *cursor = end;
        Ok(slice)
    };

    if take(&mut cursor, 4)? != MAGIC {
        return Err(ImageError::BadMagic);
    }
    let entry = u32::from_le_bytes(take(&mut cursor, 4)?.try_into().unwrap());
    let code_len = u32::from_le_bytes(take(&mut cursor, 4)?.try_into().unwrap()) as usize;
    let mut code = Vec::with_capacity(code_len);
    for _ in 0..code_len {
        code.push(u32::from_le_bytes(take(&mut cursor, 4)?.try_into().unwrap()));
    }
    let sym_count = u32::from_le_bytes(take(&mut cursor, 4)?.try_into().unwrap());

    let mut program = GuestProgram::new(name, code, crate::builder::CODE_BASE, entry);
    for _ in 0..sym_count {
        let name_len = u16::from_le_bytes(take(&mut cursor, 2)?.try_into().unwrap()) as usize;
        let name_bytes = take(&mut cursor, name_len)?.to_vec();
        let sym_name = String::from_utf8(name_bytes).map_err(|_| ImageError::BadSymbolName)?;
        let addr = u32::from_le_bytes(take(&mut cursor, 4)?.try_into().unwrap());
        program.define_symbol(sym_name, addr);
    }
    Ok(program)
}
