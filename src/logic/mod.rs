//! Pure cryptographic and encoding logic
//!
//! Nothing in here talks to a token. The engine in `use_cases` combines
//! these pieces with a [`KeyWrapper`](crate::ports::KeyWrapper).

mod aead;
mod container;
mod ephemeral_key;

pub use aead::{NONCE_LEN, TAG_LEN};
pub(crate) use aead::{open, seal};
pub use container::EncryptedContainer;
#[cfg(test)]
pub(crate) use container::LENGTH_PREFIX_LEN;
pub use ephemeral_key::EphemeralKey;
