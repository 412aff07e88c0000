//! Ports (traits) for token operations
//!
//! These traits define the capabilities the core needs from a PKCS#11
//! token. They are ports in the hexagonal sense: the engine and the
//! workflows depend on these abstractions, not on `cryptoki` directly.

mod key_finder;
mod key_wrapper;
mod module;
mod session;

pub use key_finder::{KeyFinder, MAX_LISTED_KEYS};
pub use key_wrapper::KeyWrapper;
pub use module::{CryptographicModule, ModuleLoader};
pub use session::{Authenticator, TokenSession};
