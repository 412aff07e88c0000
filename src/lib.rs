//! Hybrid file encryption anchored in a PKCS#11 token
//!
//! A token-resident RSA key pair wraps a fresh AES-256 key per container;
//! the payload itself is sealed locally with AES-256-GCM. Private key
//! material never leaves the token.
//!
//! The crate is laid out as ports and adapters:
//!
//! - [`model`]: validated domain types
//! - [`ports`]: the traits the core needs from a token
//! - [`use_cases`]: the hybrid engine and complete session workflows
//! - [`manager`]: ownership of the loaded module
//! - [`api`]: shortcuts bound to the native PKCS#11 adapter

mod adapters;
pub mod api;
pub mod error;
mod logic;
pub mod manager;
pub mod model;
pub mod ports;
pub mod use_cases;

// Re-export commonly used types
pub use adapters::{Pkcs11Loader, Pkcs11Module, Pkcs11Session};
pub use error::{ErrorKind, SealError, SealResult};
pub use logic::{EncryptedContainer, EphemeralKey, NONCE_LEN, TAG_LEN};
pub use manager::TokenManager;
pub use use_cases::{decrypt, encrypt};
