//! Sealed container byte layout
//!
//! ```text
//! offset 0    : u32 LE   wrapped key length (N)
//! offset 4    : N bytes  wrapped symmetric key
//! offset 4+N  : 12 bytes nonce
//! offset 16+N : rest     AES-256-GCM ciphertext || 16-byte tag
//! ```

use super::{NONCE_LEN, TAG_LEN};
use crate::error::{CryptoError, SealError, SealResult};

/// Size of the little-endian wrapped key length
pub const LENGTH_PREFIX_LEN: usize = 4;

/// A parsed (or freshly assembled) sealed container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedContainer {
    wrapped_key: Vec<u8>,
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

impl EncryptedContainer {
    /// Assemble a container
    ///
    /// # Errors
    ///
    /// `CryptoError::Format` if the wrapped key does not fit the u32 length
    /// prefix or `ciphertext` is shorter than a GCM tag.
    pub fn new(
        wrapped_key: Vec<u8>,
        nonce: [u8; NONCE_LEN],
        ciphertext: Vec<u8>,
    ) -> SealResult<Self> {
        if u32::try_from(wrapped_key.len()).is_err() {
            return Err(CryptoError::format("wrapped key does not fit a u32 length").into());
        }
        if ciphertext.len() < TAG_LEN {
            return Err(CryptoError::format("ciphertext is shorter than the tag").into());
        }
        Ok(Self {
            wrapped_key,
            nonce,
            ciphertext,
        })
    }

    /// Smallest valid container for a wrapped key of `wrapped_key_len` bytes
    pub fn min_len(wrapped_key_len: usize) -> usize {
        LENGTH_PREFIX_LEN + wrapped_key_len + NONCE_LEN + TAG_LEN
    }

    pub fn wrapped_key(&self) -> &[u8] {
        &self.wrapped_key
    }

    /// N as written in the header
    pub fn wrapped_key_len(&self) -> u32 {
        // bounded by `new` and `from_bytes`
        self.wrapped_key.len() as u32
    }

    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    /// AES-GCM ciphertext with the trailing tag
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            LENGTH_PREFIX_LEN + self.wrapped_key.len() + NONCE_LEN + self.ciphertext.len(),
        );
        out.extend_from_slice(&self.wrapped_key_len().to_le_bytes());
        out.extend_from_slice(&self.wrapped_key);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse a container
    ///
    /// Every truncation and an empty wrapped key are
    /// [`CryptoError::Format`]. No token is involved.
    pub fn from_bytes(bytes: &[u8]) -> SealResult<Self> {
        let Some((prefix, rest)) = bytes.split_first_chunk::<LENGTH_PREFIX_LEN>() else {
            return Err(CryptoError::format(format!(
                "container is {} bytes, too short for the length prefix",
                bytes.len()
            ))
            .into());
        };

        let wrapped_len = u32::from_le_bytes(*prefix) as usize;
        if wrapped_len == 0 {
            return Err(CryptoError::format("wrapped key length is zero").into());
        }

        let needed = wrapped_len
            .checked_add(NONCE_LEN + TAG_LEN)
            .ok_or_else(|| CryptoError::format("wrapped key length overflows"))?;
        if rest.len() < needed {
            return Err(CryptoError::format(format!(
                "container is {} bytes, at least {} required",
                bytes.len(),
                LENGTH_PREFIX_LEN + needed
            ))
            .into());
        }

        let (wrapped_key, rest) = rest.split_at(wrapped_len);
        let Some((nonce, ciphertext)) = rest.split_first_chunk::<NONCE_LEN>() else {
            return Err(CryptoError::format("missing nonce").into());
        };

        Ok(Self {
            wrapped_key: wrapped_key.to_vec(),
            nonce: *nonce,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

impl TryFrom<&[u8]> for EncryptedContainer {
    type Error = SealError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bytes(bytes)
    }
}
