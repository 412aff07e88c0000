//! Domain types for token operations
//!
//! Newtypes wrap primitives so that invariants are enforced at construction
//! and raw integers or strings are not passed around between layers.

mod key;
mod module_path;
mod pin;
mod session_state;
mod slot;
mod token;

pub use key::{KeyClass, KeyHandle, KeyLabel, KeyLabelError, KeyPair, SessionId};
pub use module_path::{ModulePath, ModulePathError, MODULE_PATH_ENV};
pub use pin::{Pin, PinError};
pub use session_state::SessionState;
pub use slot::SlotId;
pub use token::TokenDescriptor;
