//! Use cases (orchestration)
//!
//! The hybrid engine works against any [`KeyWrapper`](crate::ports::KeyWrapper);
//! the workflows drive a whole session lifecycle on a
//! [`CryptographicModule`](crate::ports::CryptographicModule).

mod files;
mod hybrid;
mod workflow;

pub use files::{decrypt_file, encrypt_file};
pub use hybrid::{decrypt, decrypt_container, encrypt};
pub use workflow::{list_key_labels_for_slot, seal_file, unseal_file, AuthenticatedSession};
