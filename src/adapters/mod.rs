//! Adapters - concrete implementations of ports (traits)

mod lease;
mod pkcs11;

#[cfg(test)]
pub mod soft_token;

// Re-export for convenience
pub use pkcs11::{Pkcs11Loader, Pkcs11Module, Pkcs11Session};
