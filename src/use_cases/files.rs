//! Thin file wrappers around the hybrid engine

use std::fs;
use std::path::Path;

use tracing::info;
use zeroize::Zeroizing;

use super::{decrypt, encrypt};
use crate::error::{SealError, SealResult};
use crate::model::KeyHandle;
use crate::ports::KeyWrapper;

/// Encrypt the file at `input` and write the container to `output`
pub fn encrypt_file<S>(
    session: &mut S,
    public_key: &KeyHandle,
    input: &Path,
    output: &Path,
) -> SealResult<()>
where
    S: KeyWrapper + ?Sized,
{
    let plaintext = Zeroizing::new(fs::read(input).map_err(|e| SealError::io(input, e))?);
    let container = encrypt(session, public_key, &plaintext)?;
    fs::write(output, container.to_bytes()).map_err(|e| SealError::io(output, e))?;

    info!("Encrypted {} -> {}", input.display(), output.display());
    Ok(())
}

/// Decrypt the container stored at `input`
pub fn decrypt_file<S>(
    session: &mut S,
    private_key: &KeyHandle,
    input: &Path,
) -> SealResult<Vec<u8>>
where
    S: KeyWrapper + ?Sized,
{
    let container = fs::read(input).map_err(|e| SealError::io(input, e))?;
    let plaintext = decrypt(session, private_key, &container)?;

    info!("Decrypted {}", input.display());
    Ok(plaintext)
}
