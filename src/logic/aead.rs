//! AES-256-GCM payload sealing

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

use super::EphemeralKey;
use crate::error::{CryptoError, SealResult};

/// 96-bit GCM nonce
pub const NONCE_LEN: usize = 12;
/// 128-bit GCM authentication tag
pub const TAG_LEN: usize = 16;

fn cipher(key: &EphemeralKey) -> SealResult<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|e| {
        CryptoError::Encryption {
            reason: e.to_string(),
        }
        .into()
    })
}

/// Encrypt `plaintext` under a fresh random nonce
///
/// Returns the nonce and `ciphertext || tag`.
pub(crate) fn seal(
    key: &EphemeralKey,
    plaintext: &[u8],
) -> SealResult<([u8; NONCE_LEN], Vec<u8>)> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|e| CryptoError::Randomness {
            reason: e.to_string(),
        })?;

    let ciphertext = cipher(key)?
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::Encryption {
            reason: e.to_string(),
        })?;

    Ok((nonce, ciphertext))
}

/// Verify and decrypt `ciphertext || tag`
///
/// Any verification failure is [`CryptoError::AuthenticationTag`]; GCM
/// cannot tell a damaged ciphertext from a wrong key.
pub(crate) fn open(
    key: &EphemeralKey,
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
) -> SealResult<Vec<u8>> {
    cipher(key)?
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::AuthenticationTag.into())
}
