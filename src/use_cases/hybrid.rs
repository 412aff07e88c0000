//! Hybrid encryption engine
//!
//! A fresh AES-256 key encrypts the payload locally; the token only ever
//! sees that 32-byte key, wrapped or unwrapped with RSA PKCS#1 v1.5.
//!
//! The engine does not authenticate. Callers hand it a session that is
//! already logged in and handles resolved in that session.

use tracing::debug;

use crate::error::{CryptoError, SealResult};
use crate::logic::{open, seal, EncryptedContainer, EphemeralKey};
use crate::model::KeyHandle;
use crate::ports::KeyWrapper;

/// Seal `plaintext` for the holder of the private half of `public_key`
///
/// # Errors
///
/// - `CryptoError::Randomness` if the OS random source fails
/// - `CryptoError::Wrap` if the token refuses to wrap the ephemeral key
pub fn encrypt<S>(
    session: &mut S,
    public_key: &KeyHandle,
    plaintext: &[u8],
) -> SealResult<EncryptedContainer>
where
    S: KeyWrapper + ?Sized,
{
    let key = EphemeralKey::generate()?;

    let wrapped = session.wrap_key(public_key, key.as_bytes())?;
    if wrapped.is_empty() {
        return Err(CryptoError::Wrap {
            reason: "token returned an empty ciphertext".to_string(),
        }
        .into());
    }

    let (nonce, ciphertext) = seal(&key, plaintext)?;
    debug!(
        "Sealed {} bytes under a {}-byte wrapped key",
        plaintext.len(),
        wrapped.len()
    );
    EncryptedContainer::new(wrapped, nonce, ciphertext)
}

/// Parse and open a serialized container
///
/// The container is fully parsed before the token is asked for anything,
/// so malformed input is always `CryptoError::Format`.
///
/// # Errors
///
/// - `CryptoError::Format` for truncated or malformed input
/// - `CryptoError::Unwrap` if the token rejects the wrapped key
/// - `CryptoError::AuthenticationTag` if the payload does not verify
pub fn decrypt<S>(session: &mut S, private_key: &KeyHandle, container: &[u8]) -> SealResult<Vec<u8>>
where
    S: KeyWrapper + ?Sized,
{
    let container = EncryptedContainer::from_bytes(container)?;
    decrypt_container(session, private_key, &container)
}

/// Open an already parsed container
pub fn decrypt_container<S>(
    session: &mut S,
    private_key: &KeyHandle,
    container: &EncryptedContainer,
) -> SealResult<Vec<u8>>
where
    S: KeyWrapper + ?Sized,
{
    let unwrapped = session.unwrap_key(private_key, container.wrapped_key())?;
    let key = EphemeralKey::from_unwrapped(&unwrapped)?;
    drop(unwrapped);

    open(&key, container.nonce(), container.ciphertext())
}
