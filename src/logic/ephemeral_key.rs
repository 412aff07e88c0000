use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{CryptoError, SealResult};

/// AES-256 key length in bytes
pub const EPHEMERAL_KEY_LEN: usize = 32;

/// Per-container symmetric key
///
/// Lives in a zeroizing buffer and is wiped when dropped, on every path.
pub struct EphemeralKey(Zeroizing<[u8; EPHEMERAL_KEY_LEN]>);

impl EphemeralKey {
    /// Draw a fresh key from the operating system CSPRNG
    pub fn generate() -> SealResult<Self> {
        let mut key = Zeroizing::new([0u8; EPHEMERAL_KEY_LEN]);
        OsRng
            .try_fill_bytes(key.as_mut())
            .map_err(|e| CryptoError::Randomness {
                reason: e.to_string(),
            })?;
        Ok(Self(key))
    }

    /// Rebuild a key from what the token unwrapped
    ///
    /// Anything but exactly 32 bytes means the wrapped blob was not one of
    /// ours, which is reported as an unwrap failure.
    pub fn from_unwrapped(bytes: &[u8]) -> SealResult<Self> {
        if bytes.len() != EPHEMERAL_KEY_LEN {
            return Err(CryptoError::Unwrap {
                reason: format!(
                    "unwrapped key is {} bytes, expected {}",
                    bytes.len(),
                    EPHEMERAL_KEY_LEN
                ),
            }
            .into());
        }
        let mut key = Zeroizing::new([0u8; EPHEMERAL_KEY_LEN]);
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl fmt::Debug for EphemeralKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EphemeralKey(***)")
    }
}
