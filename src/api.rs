//! Entry points bound to the native PKCS#11 adapter
//!
//! Each call loads the module at the given path, does its work and
//! finalizes the module again before returning.

use std::path::{Path, PathBuf};

use crate::adapters::{Pkcs11Loader, Pkcs11Module};
use crate::error::SealResult;
use crate::ports::{CryptographicModule, ModuleLoader};
use crate::use_cases::{
    list_key_labels_for_slot, seal_file as seal_file_use_case,
    unseal_file as unseal_file_use_case,
};

pub use crate::model::*;

/// `--module` / `PKCS11_LIB_PATH` / auto-detection, in that order
pub fn resolve_module_path(explicit: Option<PathBuf>) -> SealResult<ModulePath> {
    Ok(ModulePath::resolve(explicit)?)
}

pub fn initialize(path: &ModulePath) -> SealResult<Pkcs11Module> {
    Pkcs11Loader.initialize(path)
}

pub fn list_tokens(path: &ModulePath) -> SealResult<Vec<TokenDescriptor>> {
    initialize(path)?.list_tokens()
}

pub fn list_key_labels(path: &ModulePath, slot: SlotId, pin: &Pin) -> SealResult<Vec<String>> {
    let module = initialize(path)?;
    list_key_labels_for_slot(&module, slot, pin)
}

pub fn seal_file(
    path: &ModulePath,
    slot: SlotId,
    pin: &Pin,
    label: &KeyLabel,
    input: &Path,
    output: &Path,
) -> SealResult<()> {
    let module = initialize(path)?;
    seal_file_use_case(&module, slot, pin, label, input, output)
}

pub fn unseal_file(
    path: &ModulePath,
    slot: SlotId,
    pin: &Pin,
    label: &KeyLabel,
    input: &Path,
) -> SealResult<Vec<u8>> {
    let module = initialize(path)?;
    unseal_file_use_case(&module, slot, pin, label, input)
}
