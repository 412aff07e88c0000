//! Complete token workflows
//!
//! Each workflow opens a session, logs in, resolves what it needs, runs one
//! operation and then always logs out and closes, whatever happened.

use std::ops::{Deref, DerefMut};
use std::path::Path;

use tracing::{debug, warn};

use super::{decrypt_file, encrypt_file};
use crate::error::SealResult;
use crate::model::{KeyLabel, Pin, SlotId};
use crate::ports::{CryptographicModule, KeyFinder, TokenSession};

/// A logged-in session that logs out and closes when dropped
pub struct AuthenticatedSession<S: TokenSession> {
    session: S,
}

impl<S: TokenSession> AuthenticatedSession<S> {
    /// Open a session on `slot` and log in
    ///
    /// On login failure the fresh session is closed before returning.
    pub fn open<M>(module: &M, slot: SlotId, pin: &Pin) -> SealResult<Self>
    where
        M: CryptographicModule<Session = S>,
    {
        let mut session = module.open_session(slot)?;
        session.login(pin)?;
        Ok(Self { session })
    }
}

impl<S: TokenSession> Deref for AuthenticatedSession<S> {
    type Target = S;

    fn deref(&self) -> &Self::Target {
        &self.session
    }
}

impl<S: TokenSession> DerefMut for AuthenticatedSession<S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.session
    }
}

impl<S: TokenSession> Drop for AuthenticatedSession<S> {
    fn drop(&mut self) {
        if let Err(e) = self.session.logout() {
            warn!("Logout on slot {} failed: {}", self.session.slot(), e);
        }
        self.session.close();
        debug!("Released session on slot {}", self.session.slot());
    }
}

/// Labels of the private keys on the token in `slot`
pub fn list_key_labels_for_slot<M>(module: &M, slot: SlotId, pin: &Pin) -> SealResult<Vec<String>>
where
    M: CryptographicModule,
{
    let mut session = AuthenticatedSession::open(module, slot, pin)?;
    session.list_private_key_labels()
}

/// Encrypt `input` to `output` with the key pair labeled `label`
pub fn seal_file<M>(
    module: &M,
    slot: SlotId,
    pin: &Pin,
    label: &KeyLabel,
    input: &Path,
    output: &Path,
) -> SealResult<()>
where
    M: CryptographicModule,
{
    let mut session = AuthenticatedSession::open(module, slot, pin)?;
    let pair = session.find_key_pair(label)?;
    encrypt_file(&mut *session, &pair.public, input, output)
}

/// Decrypt the container at `input` with the key pair labeled `label`
pub fn unseal_file<M>(
    module: &M,
    slot: SlotId,
    pin: &Pin,
    label: &KeyLabel,
    input: &Path,
) -> SealResult<Vec<u8>>
where
    M: CryptographicModule,
{
    let mut session = AuthenticatedSession::open(module, slot, pin)?;
    let pair = session.find_key_pair(label)?;
    decrypt_file(&mut *session, &pair.private, input)
}
