//! PKCS#11 implementation of the token ports
//!
//! Wraps a native module through `cryptoki`. Object handles returned by the
//! module stay inside the session's object table; callers only ever see
//! [`KeyHandle`]s indexing into it.

use std::sync::Arc;

use cryptoki::context::{CInitializeArgs, Pkcs11};
use cryptoki::error::{Error as CryptokiError, RvError};
use cryptoki::mechanism::Mechanism;
use cryptoki::object::{Attribute, AttributeType, ObjectClass, ObjectHandle};
use cryptoki::session::{Session, UserType};
use cryptoki::slot::Slot;
use cryptoki::types::AuthPin;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::lease::ModuleLease;
use crate::error::{AuthFailureCause, CryptoError, SealResult, TokenError};
use crate::model::{
    KeyClass, KeyHandle, KeyLabel, ModulePath, Pin, SessionId, SessionState, SlotId,
    TokenDescriptor,
};
use crate::ports::{
    Authenticator, CryptographicModule, KeyFinder, KeyWrapper, ModuleLoader, TokenSession,
};

/// Loads native PKCS#11 libraries
#[derive(Debug, Clone, Copy, Default)]
pub struct Pkcs11Loader;

impl ModuleLoader for Pkcs11Loader {
    type Module = Pkcs11Module;

    fn initialize(&self, path: &ModulePath) -> SealResult<Self::Module> {
        let shown = path.to_string();

        let context = Pkcs11::new(path.as_path()).map_err(|e| TokenError::ModuleLoad {
            path: shown.clone(),
            reason: e.to_string(),
        })?;

        context
            .initialize(CInitializeArgs::OsThreads)
            .map_err(|e| TokenError::ModuleInit {
                path: shown.clone(),
                reason: e.to_string(),
            })?;

        info!("Initialized PKCS#11 module {}", shown);
        Ok(Pkcs11Module {
            path: path.clone(),
            context: Some(context),
            lease: ModuleLease::new(),
        })
    }
}

/// An initialized native module
///
/// `C_Finalize` runs once the module and every session opened from it are
/// gone; sessions of a finalized module refuse all further work.
pub struct Pkcs11Module {
    path: ModulePath,
    context: Option<Pkcs11>,
    lease: Arc<ModuleLease>,
}

impl Pkcs11Module {
    fn context(&self) -> SealResult<&Pkcs11> {
        self.context
            .as_ref()
            .ok_or_else(|| TokenError::ModuleFinalized.into())
    }

    fn find_slot(&self, slot: SlotId) -> SealResult<Option<Slot>> {
        let slots = self
            .context()?
            .get_slots_with_token()
            .map_err(|e| operation_error("C_GetSlotList", e))?;
        Ok(slots.into_iter().find(|s| s.id() == slot.id()))
    }
}

impl CryptographicModule for Pkcs11Module {
    type Session = Pkcs11Session;

    fn path(&self) -> &ModulePath {
        &self.path
    }

    fn is_finalized(&self) -> bool {
        self.context.is_none()
    }

    fn list_tokens(&self) -> SealResult<Vec<TokenDescriptor>> {
        let context = self.context()?;
        let slots = context
            .get_slots_with_token()
            .map_err(|e| operation_error("C_GetSlotList", e))?;

        let mut tokens = Vec::with_capacity(slots.len());
        for slot in slots {
            match context.get_token_info(slot) {
                Ok(info) => tokens.push(TokenDescriptor {
                    slot: SlotId::new(slot.id()),
                    label: info.label().trim_end().to_string(),
                    serial_number: info.serial_number().trim_end().to_string(),
                }),
                Err(e) => debug!("Skipping slot {}: token info unreadable: {}", slot.id(), e),
            }
        }
        Ok(tokens)
    }

    fn open_session(&self, slot: SlotId) -> SealResult<Self::Session> {
        let Some(native) = self.find_slot(slot)? else {
            return Err(TokenError::SessionOpen {
                slot,
                reason: "no token present".to_string(),
            }
            .into());
        };

        let session = self
            .context()?
            .open_rw_session(native)
            .map_err(|e| TokenError::SessionOpen {
                slot,
                reason: e.to_string(),
            })?;

        let id = SessionId::next();
        debug!("Opened session {:?} on slot {}", id, slot);
        Ok(Pkcs11Session {
            id,
            slot,
            inner: Some(session),
            state: SessionState::Opened,
            objects: Vec::new(),
            lease: Arc::clone(&self.lease),
        })
    }

    fn finalize(&mut self) {
        if self.lease.revoke() {
            info!("Finalizing PKCS#11 module {}", self.path);
        }
        // dropping the last clone of the context runs C_Finalize
        self.context = None;
    }
}

impl Drop for Pkcs11Module {
    fn drop(&mut self) {
        self.finalize();
    }
}

/// A read/write serial session on one slot
pub struct Pkcs11Session {
    id: SessionId,
    slot: SlotId,
    inner: Option<Session>,
    state: SessionState,
    objects: Vec<ObjectHandle>,
    lease: Arc<ModuleLease>,
}

impl Pkcs11Session {
    fn session(&mut self) -> SealResult<&Session> {
        if let Err(err) = self.lease.ensure_live() {
            // release the native session so the module can finalize
            self.close();
            return Err(err);
        }
        self.inner
            .as_ref()
            .ok_or_else(|| TokenError::SessionClosed.into())
    }

    fn object(&self, handle: &KeyHandle) -> SealResult<ObjectHandle> {
        if handle.session() != self.id {
            return Err(TokenError::ForeignHandle.into());
        }
        self.objects
            .get(handle.object())
            .copied()
            .ok_or_else(|| TokenError::ForeignHandle.into())
    }

    /// Table index of `object`, added on first sight
    fn intern(&mut self, object: ObjectHandle) -> usize {
        match self.objects.iter().position(|known| *known == object) {
            Some(index) => index,
            None => {
                self.objects.push(object);
                self.objects.len() - 1
            }
        }
    }
}

impl Authenticator for Pkcs11Session {
    fn login(&mut self, pin: &Pin) -> SealResult<()> {
        let session = self.session()?;
        match session.login(UserType::User, Some(&AuthPin::new(pin.as_str().into()))) {
            Ok(()) | Err(CryptokiError::Pkcs11(RvError::UserAlreadyLoggedIn, _)) => {
                self.state = SessionState::Authenticated;
                debug!("Session {:?} authenticated", self.id);
                Ok(())
            }
            Err(e) => {
                let cause = match &e {
                    CryptokiError::Pkcs11(rv, _) => auth_failure_cause(rv),
                    _ => AuthFailureCause::Other,
                };
                warn!("Login on slot {} failed: {}", self.slot, cause);
                Err(TokenError::Authentication {
                    cause,
                    reason: e.to_string(),
                }
                .into())
            }
        }
    }

    fn logout(&mut self) -> SealResult<()> {
        self.session()?;
        if !self.state.is_authenticated() {
            return Ok(());
        }
        let result = self.session()?.logout();
        // whatever the token answers, this session no longer counts as logged in
        self.state = SessionState::Opened;
        match result {
            Ok(()) | Err(CryptokiError::Pkcs11(RvError::UserNotLoggedIn, _)) => Ok(()),
            Err(e) => Err(operation_error("C_Logout", e)),
        }
    }
}

impl KeyFinder for Pkcs11Session {
    fn find_objects(
        &mut self,
        class: KeyClass,
        label: Option<&KeyLabel>,
        limit: usize,
    ) -> SealResult<Vec<KeyHandle>> {
        let mut template = vec![Attribute::Class(object_class(class))];
        if let Some(label) = label {
            template.push(Attribute::Label(label.as_bytes().to_vec()));
        }

        // find_objects pairs C_FindObjectsInit with C_FindObjectsFinal
        let found = self
            .session()?
            .find_objects(&template)
            .map_err(|e| operation_error("C_FindObjects", e))?;

        let mut handles = Vec::with_capacity(found.len().min(limit));
        for object in found.into_iter().take(limit) {
            let index = self.intern(object);
            handles.push(KeyHandle::new(self.id, class, index));
        }
        Ok(handles)
    }

    fn read_label(&mut self, handle: &KeyHandle) -> SealResult<String> {
        self.session()?;
        let object = self.object(handle)?;
        let attributes = self
            .session()?
            .get_attributes(object, &[AttributeType::Label])
            .map_err(|e| operation_error("C_GetAttributeValue", e))?;

        attributes
            .into_iter()
            .find_map(|attribute| match attribute {
                Attribute::Label(bytes) => Some(bytes),
                _ => None,
            })
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .ok_or_else(|| {
                TokenError::Operation {
                    operation: "C_GetAttributeValue",
                    reason: "label attribute not returned".to_string(),
                }
                .into()
            })
    }
}

impl KeyWrapper for Pkcs11Session {
    fn wrap_key(&mut self, public_key: &KeyHandle, key: &[u8]) -> SealResult<Vec<u8>> {
        self.session()?;
        let object = self.object(public_key)?;
        if public_key.class() != KeyClass::Public {
            return Err(CryptoError::Wrap {
                reason: "wrapping requires the public half".to_string(),
            }
            .into());
        }

        self.session()?
            .encrypt(&Mechanism::RsaPkcs, object, key)
            .map_err(|e| {
                CryptoError::Wrap {
                    reason: e.to_string(),
                }
                .into()
            })
    }

    fn unwrap_key(
        &mut self,
        private_key: &KeyHandle,
        wrapped: &[u8],
    ) -> SealResult<Zeroizing<Vec<u8>>> {
        self.session()?;
        let object = self.object(private_key)?;
        if private_key.class() != KeyClass::Private {
            return Err(CryptoError::Unwrap {
                reason: "unwrapping requires the private half".to_string(),
            }
            .into());
        }

        self.session()?
            .decrypt(&Mechanism::RsaPkcs, object, wrapped)
            .map(Zeroizing::new)
            .map_err(|e| {
                CryptoError::Unwrap {
                    reason: e.to_string(),
                }
                .into()
            })
    }
}

impl TokenSession for Pkcs11Session {
    fn id(&self) -> SessionId {
        self.id
    }

    fn slot(&self) -> SlotId {
        self.slot
    }

    fn state(&self) -> SessionState {
        if self.lease.is_live() {
            self.state
        } else {
            SessionState::Closed
        }
    }

    fn close(&mut self) {
        if self.inner.take().is_some() {
            debug!("Closed session {:?} on slot {}", self.id, self.slot);
        }
        self.objects.clear();
        self.state = SessionState::Closed;
    }
}

impl Drop for Pkcs11Session {
    fn drop(&mut self) {
        self.close();
    }
}

fn object_class(class: KeyClass) -> ObjectClass {
    match class {
        KeyClass::Private => ObjectClass::PRIVATE_KEY,
        KeyClass::Public => ObjectClass::PUBLIC_KEY,
    }
}

fn operation_error(operation: &'static str, err: CryptokiError) -> crate::error::SealError {
    TokenError::Operation {
        operation,
        reason: err.to_string(),
    }
    .into()
}

/// Classify a `C_Login` return value
pub(crate) fn auth_failure_cause(rv: &RvError) -> AuthFailureCause {
    match rv {
        RvError::PinIncorrect | RvError::PinInvalid | RvError::PinLenRange => {
            AuthFailureCause::WrongPin
        }
        RvError::PinLocked | RvError::PinExpired => AuthFailureCause::PinLocked,
        RvError::TokenNotPresent | RvError::DeviceRemoved => AuthFailureCause::TokenAbsent,
        _ => AuthFailureCause::Other,
    }
}
