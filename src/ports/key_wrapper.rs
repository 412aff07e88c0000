use zeroize::Zeroizing;

use crate::error::SealResult;
use crate::model::KeyHandle;

/// Asymmetric wrap/unwrap performed inside the token (CKM_RSA_PKCS)
///
/// This is the only path by which the hybrid engine reaches the token.
pub trait KeyWrapper {
    /// Encrypt `key` with the public key behind `public_key`
    ///
    /// # Errors
    ///
    /// `CryptoError::Wrap` if the token rejects the operation.
    fn wrap_key(&mut self, public_key: &KeyHandle, key: &[u8]) -> SealResult<Vec<u8>>;

    /// Decrypt `wrapped` with the private key behind `private_key`
    ///
    /// # Errors
    ///
    /// `CryptoError::Unwrap` if the token rejects the ciphertext.
    fn unwrap_key(
        &mut self,
        private_key: &KeyHandle,
        wrapped: &[u8],
    ) -> SealResult<Zeroizing<Vec<u8>>>;
}
