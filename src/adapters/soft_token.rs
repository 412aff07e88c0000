//! In-memory software token for tests
//!
//! Behaves like a small PKCS#11 token: private objects are only visible
//! after login, wrong PINs count towards a lockout, searches are scoped,
//! and wrap/unwrap use RSA PKCS#1 v1.5 through the `rsa` crate.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use tracing::debug;
use zeroize::Zeroizing;

use super::lease::ModuleLease;
use crate::error::{AuthFailureCause, CryptoError, SealResult, TokenError};
use crate::model::{
    KeyClass, KeyHandle, KeyLabel, ModulePath, Pin, SessionId, SessionState, SlotId,
    TokenDescriptor,
};
use crate::ports::contract_tests::{token_contract, ContractFixture};
use crate::ports::{
    Authenticator, CryptographicModule, KeyFinder, KeyWrapper, ModuleLoader, TokenSession,
};

pub const SOFT_MODULE_PATH: &str = "/soft/libvaultseal-softtoken.so";
pub const SOFT_PIN: &str = "123456";
pub const MAX_PIN_ATTEMPTS: u32 = 3;

/// Two distinct 2048-bit key pairs, generated once per test binary
pub static TEST_KEYS: LazyLock<[RsaPrivateKey; 2]> = LazyLock::new(|| {
    let mut rng = OsRng;
    [
        RsaPrivateKey::new(&mut rng, 2048).expect("RSA key generation failed"),
        RsaPrivateKey::new(&mut rng, 2048).expect("RSA key generation failed"),
    ]
});

#[derive(Debug, Clone)]
pub enum SoftKey {
    Private(RsaPrivateKey),
    Public(RsaPublicKey),
}

#[derive(Debug, Clone)]
pub struct SoftObject {
    pub label: String,
    pub label_readable: bool,
    pub key: SoftKey,
}

impl SoftObject {
    pub fn private(label: &str, key: &RsaPrivateKey) -> Self {
        Self {
            label: label.to_string(),
            label_readable: true,
            key: SoftKey::Private(key.clone()),
        }
    }

    pub fn public(label: &str, key: &RsaPrivateKey) -> Self {
        Self {
            label: label.to_string(),
            label_readable: true,
            key: SoftKey::Public(RsaPublicKey::from(key)),
        }
    }

    fn class(&self) -> KeyClass {
        match self.key {
            SoftKey::Private(_) => KeyClass::Private,
            SoftKey::Public(_) => KeyClass::Public,
        }
    }
}

#[derive(Debug)]
pub struct SoftTokenState {
    pub label: String,
    pub serial_number: String,
    pub user_pin: String,
    pub failed_logins: u32,
    pub logged_in: bool,
    pub open_sessions: usize,
    pub search_active: bool,
    pub objects: Vec<SoftObject>,
}

impl SoftTokenState {
    pub fn new(label: &str, serial_number: &str) -> Self {
        Self {
            label: label.to_string(),
            serial_number: serial_number.to_string(),
            user_pin: SOFT_PIN.to_string(),
            failed_logins: 0,
            logged_in: false,
            open_sessions: 0,
            search_active: false,
            objects: Vec::new(),
        }
    }

    pub fn with_object(mut self, object: SoftObject) -> Self {
        self.objects.push(object);
        self
    }

    fn locked(&self) -> bool {
        self.failed_logins >= MAX_PIN_ATTEMPTS
    }
}

#[derive(Debug)]
pub struct SoftSlot {
    pub id: SlotId,
    pub info_readable: bool,
    pub token: Option<SoftTokenState>,
}

#[derive(Debug, Default)]
pub struct SoftDevice {
    pub initialized: bool,
    pub slots: Vec<SoftSlot>,
}

impl SoftDevice {
    fn token_mut(&mut self, slot: SlotId) -> Option<&mut SoftTokenState> {
        self.slots
            .iter_mut()
            .find(|s| s.id == slot)
            .and_then(|s| s.token.as_mut())
    }
}

type SharedDevice = Arc<Mutex<SoftDevice>>;

fn lock(device: &SharedDevice) -> MutexGuard<'_, SoftDevice> {
    device.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resolves module paths to in-memory devices
#[derive(Debug, Default, Clone)]
pub struct SoftTokenLoader {
    devices: HashMap<PathBuf, SharedDevice>,
}

impl SoftTokenLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, path: &str, device: SoftDevice) -> Self {
        self.devices
            .insert(PathBuf::from(path), Arc::new(Mutex::new(device)));
        self
    }

    pub fn device(&self, path: &str) -> Option<SharedDevice> {
        self.devices.get(&PathBuf::from(path)).cloned()
    }
}

impl ModuleLoader for SoftTokenLoader {
    type Module = SoftModule;

    fn initialize(&self, path: &ModulePath) -> SealResult<Self::Module> {
        let device = self
            .devices
            .get(path.as_path())
            .cloned()
            .ok_or_else(|| TokenError::ModuleLoad {
                path: path.to_string(),
                reason: "no such module".to_string(),
            })?;

        {
            let mut state = lock(&device);
            // a stale session of an earlier module still holds the device
            if state.initialized {
                return Err(TokenError::ModuleInit {
                    path: path.to_string(),
                    reason: "CKR_CRYPTOKI_ALREADY_INITIALIZED".to_string(),
                }
                .into());
            }
            state.initialized = true;
        }

        let context = Arc::new(SoftContext {
            device: Arc::clone(&device),
        });
        Ok(SoftModule {
            path: path.clone(),
            device,
            context: Some(context),
            lease: ModuleLease::new(),
        })
    }
}

/// Keeps the device initialized while the module or any of its sessions
/// holds a clone, like a native context shared with its sessions
struct SoftContext {
    device: SharedDevice,
}

impl Drop for SoftContext {
    fn drop(&mut self) {
        lock(&self.device).initialized = false;
    }
}

pub struct SoftModule {
    path: ModulePath,
    device: SharedDevice,
    context: Option<Arc<SoftContext>>,
    lease: Arc<ModuleLease>,
}

impl SoftModule {
    pub fn device(&self) -> SharedDevice {
        Arc::clone(&self.device)
    }
}

impl CryptographicModule for SoftModule {
    type Session = SoftSession;

    fn path(&self) -> &ModulePath {
        &self.path
    }

    fn is_finalized(&self) -> bool {
        !self.lease.is_live()
    }

    fn list_tokens(&self) -> SealResult<Vec<TokenDescriptor>> {
        self.lease.ensure_live()?;
        let device = lock(&self.device);
        Ok(device
            .slots
            .iter()
            .filter(|slot| slot.info_readable)
            .filter_map(|slot| {
                slot.token.as_ref().map(|token| TokenDescriptor {
                    slot: slot.id,
                    label: token.label.clone(),
                    serial_number: token.serial_number.clone(),
                })
            })
            .collect())
    }

    fn open_session(&self, slot: SlotId) -> SealResult<Self::Session> {
        self.lease.ensure_live()?;
        let mut device = lock(&self.device);
        let token = device.token_mut(slot).ok_or(TokenError::SessionOpen {
            slot,
            reason: "CKR_TOKEN_NOT_PRESENT".to_string(),
        })?;
        token.open_sessions += 1;

        Ok(SoftSession {
            id: SessionId::next(),
            slot,
            device: Arc::clone(&self.device),
            state: SessionState::Opened,
            objects: Vec::new(),
            context: self.context.clone(),
            lease: Arc::clone(&self.lease),
        })
    }

    fn finalize(&mut self) {
        if self.lease.revoke() {
            let mut device = lock(&self.device);
            for slot in device.slots.iter_mut() {
                if let Some(token) = slot.token.as_mut() {
                    token.logged_in = false;
                    token.open_sessions = 0;
                }
            }
            debug!("Soft module {} finalized", self.path);
        }
        self.context = None;
    }
}

impl Drop for SoftModule {
    fn drop(&mut self) {
        self.finalize();
    }
}

/// Releases the token search context when dropped
struct SearchScope<'a> {
    active: &'a mut bool,
}

impl<'a> SearchScope<'a> {
    fn begin(active: &'a mut bool) -> SealResult<Self> {
        if *active {
            return Err(TokenError::Operation {
                operation: "C_FindObjectsInit",
                reason: "CKR_OPERATION_ACTIVE".to_string(),
            }
            .into());
        }
        *active = true;
        Ok(Self { active })
    }
}

impl Drop for SearchScope<'_> {
    fn drop(&mut self) {
        *self.active = false;
    }
}

pub struct SoftSession {
    id: SessionId,
    slot: SlotId,
    device: SharedDevice,
    state: SessionState,
    objects: Vec<usize>,
    context: Option<Arc<SoftContext>>,
    lease: Arc<ModuleLease>,
}

impl SoftSession {
    fn ensure_usable(&mut self) -> SealResult<()> {
        if let Err(err) = self.lease.ensure_live() {
            self.close();
            return Err(err);
        }
        if !self.state.is_open() {
            return Err(TokenError::SessionClosed.into());
        }
        Ok(())
    }

    fn with_token<T>(
        &mut self,
        f: impl FnOnce(&mut SoftTokenState) -> SealResult<T>,
    ) -> SealResult<T> {
        self.ensure_usable()?;
        let mut device = lock(&self.device);
        let token = device.token_mut(self.slot).ok_or(TokenError::Operation {
            operation: "token access",
            reason: "CKR_DEVICE_REMOVED".to_string(),
        })?;
        f(token)
    }

    fn object(&self, handle: &KeyHandle) -> SealResult<usize> {
        if handle.session() != self.id {
            return Err(TokenError::ForeignHandle.into());
        }
        self.objects
            .get(handle.object())
            .copied()
            .ok_or_else(|| TokenError::ForeignHandle.into())
    }

    fn intern(&mut self, index: usize) -> usize {
        match self.objects.iter().position(|known| *known == index) {
            Some(position) => position,
            None => {
                self.objects.push(index);
                self.objects.len() - 1
            }
        }
    }
}

impl Authenticator for SoftSession {
    fn login(&mut self, pin: &Pin) -> SealResult<()> {
        let result = self.with_token(|token| {
            if token.locked() {
                return Err(TokenError::Authentication {
                    cause: AuthFailureCause::PinLocked,
                    reason: "CKR_PIN_LOCKED".to_string(),
                }
                .into());
            }
            if pin.as_str() != token.user_pin {
                token.failed_logins += 1;
                let cause = if token.locked() {
                    AuthFailureCause::PinLocked
                } else {
                    AuthFailureCause::WrongPin
                };
                return Err(TokenError::Authentication {
                    cause,
                    reason: "CKR_PIN_INCORRECT".to_string(),
                }
                .into());
            }
            token.failed_logins = 0;
            token.logged_in = true;
            Ok(())
        });
        if result.is_ok() {
            self.state = SessionState::Authenticated;
        }
        result
    }

    fn logout(&mut self) -> SealResult<()> {
        self.ensure_usable()?;
        if !self.state.is_authenticated() {
            return Ok(());
        }
        self.with_token(|token| {
            token.logged_in = false;
            Ok(())
        })?;
        self.state = SessionState::Opened;
        Ok(())
    }
}

impl KeyFinder for SoftSession {
    fn find_objects(
        &mut self,
        class: KeyClass,
        label: Option<&KeyLabel>,
        limit: usize,
    ) -> SealResult<Vec<KeyHandle>> {
        let found = self.with_token(|token| {
            let SoftTokenState {
                objects,
                search_active,
                logged_in,
                ..
            } = token;
            let _scope = SearchScope::begin(search_active)?;

            Ok(objects
                .iter()
                .enumerate()
                .filter(|(_, object)| object.class() == class)
                .filter(|(_, object)| *logged_in || object.class() == KeyClass::Public)
                .filter(|(_, object)| label.map_or(true, |l| l.as_str() == object.label))
                .map(|(index, _)| index)
                .take(limit)
                .collect::<Vec<_>>())
        })?;

        Ok(found
            .into_iter()
            .map(|index| KeyHandle::new(self.id, class, self.intern(index)))
            .collect())
    }

    fn read_label(&mut self, handle: &KeyHandle) -> SealResult<String> {
        self.ensure_usable()?;
        let index = self.object(handle)?;
        self.with_token(|token| match token.objects.get(index) {
            Some(object) if object.label_readable => Ok(object.label.clone()),
            _ => Err(TokenError::Operation {
                operation: "C_GetAttributeValue",
                reason: "CKR_ATTRIBUTE_SENSITIVE".to_string(),
            }
            .into()),
        })
    }
}

impl KeyWrapper for SoftSession {
    fn wrap_key(&mut self, public_key: &KeyHandle, key: &[u8]) -> SealResult<Vec<u8>> {
        self.ensure_usable()?;
        let index = self.object(public_key)?;
        self.with_token(|token| match token.objects.get(index).map(|o| &o.key) {
            Some(SoftKey::Public(public)) => public
                .encrypt(&mut OsRng, Pkcs1v15Encrypt, key)
                .map_err(|e| {
                    CryptoError::Wrap {
                        reason: e.to_string(),
                    }
                    .into()
                }),
            _ => Err(CryptoError::Wrap {
                reason: "CKR_KEY_FUNCTION_NOT_PERMITTED".to_string(),
            }
            .into()),
        })
    }

    fn unwrap_key(
        &mut self,
        private_key: &KeyHandle,
        wrapped: &[u8],
    ) -> SealResult<Zeroizing<Vec<u8>>> {
        self.ensure_usable()?;
        let index = self.object(private_key)?;
        self.with_token(|token| {
            if !token.logged_in {
                return Err(CryptoError::Unwrap {
                    reason: "CKR_USER_NOT_LOGGED_IN".to_string(),
                }
                .into());
            }
            match token.objects.get(index).map(|o| &o.key) {
                Some(SoftKey::Private(private)) => private
                    .decrypt(Pkcs1v15Encrypt, wrapped)
                    .map(Zeroizing::new)
                    .map_err(|e| {
                        CryptoError::Unwrap {
                            reason: e.to_string(),
                        }
                        .into()
                    }),
                _ => Err(CryptoError::Unwrap {
                    reason: "CKR_KEY_FUNCTION_NOT_PERMITTED".to_string(),
                }
                .into()),
            }
        })
    }
}

impl TokenSession for SoftSession {
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
        if !self.state.is_open() {
            return;
        }
        self.state = SessionState::Closed;
        self.objects.clear();
        if self.lease.is_live() {
            let mut device = lock(&self.device);
            if let Some(token) = device.token_mut(self.slot) {
                token.open_sessions = token.open_sessions.saturating_sub(1);
                // closing the last session logs the user out
                if token.open_sessions == 0 {
                    token.logged_in = false;
                }
            }
        }
        self.context = None;
    }
}

impl Drop for SoftSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Default device: a provisioned token in slot 0, an empty slot 1 and an
/// unreadable token in slot 2
pub fn provisioned_device() -> SoftDevice {
    let [first, second] = &*TEST_KEYS;

    let mut unreadable_label = SoftObject::private("sealed-attributes", second);
    unreadable_label.label_readable = false;

    let token = SoftTokenState::new("vaultseal-test", "0001")
        .with_object(SoftObject::private("ceremony-key-1", first))
        .with_object(SoftObject::public("ceremony-key-1", first))
        .with_object(SoftObject::private("other-key", second))
        .with_object(SoftObject::public("other-key", second))
        .with_object(SoftObject::private("orphan-private", first))
        .with_object(SoftObject::public("orphan-public", second))
        .with_object(unreadable_label);

    SoftDevice {
        initialized: false,
        slots: vec![
            SoftSlot {
                id: SlotId::new(0),
                info_readable: true,
                token: Some(token),
            },
            SoftSlot {
                id: SlotId::new(1),
                info_readable: true,
                token: None,
            },
            SoftSlot {
                id: SlotId::new(2),
                info_readable: false,
                token: Some(SoftTokenState::new("broken", "0002")),
            },
        ],
    }
}

pub fn soft_loader() -> SoftTokenLoader {
    SoftTokenLoader::new().with_device(SOFT_MODULE_PATH, provisioned_device())
}

pub fn soft_module_path() -> ModulePath {
    ModulePath::new(SOFT_MODULE_PATH).expect("static path is valid")
}

pub fn contract_fixture() -> ContractFixture {
    ContractFixture {
        slot: SlotId::new(0),
        empty_slot: SlotId::new(1),
        unreadable_slot: SlotId::new(2),
        pin: Pin::from_str(SOFT_PIN).expect("valid pin"),
        wrong_pin: Pin::from_str("000000").expect("valid pin"),
        pair_label: KeyLabel::new("ceremony-key-1").expect("valid label"),
        other_pair_label: KeyLabel::new("other-key").expect("valid label"),
        private_only_label: KeyLabel::new("orphan-private").expect("valid label"),
        public_only_label: KeyLabel::new("orphan-public").expect("valid label"),
        readable_private_labels: 3,
        modulus_len: TEST_KEYS[0].size(),
    }
}

pub fn make_soft_module() -> (SoftModule, ContractFixture) {
    let module = soft_loader()
        .initialize(&soft_module_path())
        .expect("soft module initializes");
    (module, contract_fixture())
}

crate::contract_tests_for!(
    soft_token_contract,
    make = make_soft_module,
    tests = {
        list_tokens_skips_unreadable_slots => token_contract::test_list_tokens_skips_unreadable_slots,
        open_session_empty_slot => token_contract::test_open_session_empty_slot,
        login_success => token_contract::test_login_success,
        login_wrong_pin => token_contract::test_login_wrong_pin,
        find_key_pair => token_contract::test_find_key_pair,
        find_key_pair_missing_public => token_contract::test_find_key_pair_missing_public,
        find_key_pair_missing_private => token_contract::test_find_key_pair_missing_private,
        list_private_key_labels => token_contract::test_list_private_key_labels,
        logout_returns_to_opened => token_contract::test_logout_returns_to_opened,
        closed_session_rejects_operations => token_contract::test_closed_session_rejects_operations,
        finalize_invalidates_sessions => token_contract::test_finalize_invalidates_sessions,
        handles_are_session_bound => token_contract::test_handles_are_session_bound,
        hybrid_roundtrip => token_contract::test_hybrid_roundtrip,
        decrypt_with_other_key_fails => token_contract::test_decrypt_with_other_key_fails,
        wrap_rejects_private_handle => token_contract::test_wrap_rejects_private_handle,
    }
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, SealError};
    use crate::ports::MAX_LISTED_KEYS;

    fn token_state<R>(module: &SoftModule, f: impl FnOnce(&SoftTokenState) -> R) -> R {
        let device = module.device();
        let device = lock(&device);
        let token = device.slots[0].token.as_ref().unwrap();
        f(token)
    }

    #[test]
    fn test_unknown_path_fails_to_load() {
        let path = ModulePath::new("/soft/unknown.so").unwrap();
        let err = soft_loader().initialize(&path).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ModuleLoad);
    }

    #[test]
    fn test_double_initialize_fails() {
        let loader = soft_loader();
        let _first = loader.initialize(&soft_module_path()).unwrap();

        let err = loader.initialize(&soft_module_path()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ModuleInit);
    }

    #[test]
    fn test_reinitialize_after_finalize() {
        let loader = soft_loader();
        let mut first = loader.initialize(&soft_module_path()).unwrap();
        first.finalize();

        assert!(loader.initialize(&soft_module_path()).is_ok());
    }

    #[test]
    fn test_lockout_after_max_attempts() {
        let (module, fx) = make_soft_module();
        let mut session = module.open_session(fx.slot).unwrap();

        for attempt in 1..=MAX_PIN_ATTEMPTS {
            let err = session.login(&fx.wrong_pin).unwrap_err();
            let SealError::Token(TokenError::Authentication { cause, .. }) = err else {
                panic!("expected authentication error");
            };
            if attempt < MAX_PIN_ATTEMPTS {
                assert_eq!(cause, AuthFailureCause::WrongPin);
            } else {
                assert_eq!(cause, AuthFailureCause::PinLocked);
            }
        }

        // the right PIN no longer helps
        let err = session.login(&fx.pin).unwrap_err();
        assert!(matches!(
            err,
            SealError::Token(TokenError::Authentication {
                cause: AuthFailureCause::PinLocked,
                ..
            })
        ));
    }

    #[test]
    fn test_search_scope_released_on_miss() {
        let (module, fx) = make_soft_module();
        let mut session = module.open_session(fx.slot).unwrap();
        session.login(&fx.pin).unwrap();

        let missing = KeyLabel::new("no-such-key").unwrap();
        assert!(session.find_key_pair(&missing).is_err());
        assert!(!token_state(&module, |token| token.search_active));

        assert!(session.find_key_pair(&fx.pair_label).is_ok());
    }

    #[test]
    fn test_unwrap_requires_login() {
        let (module, fx) = make_soft_module();
        let mut session = module.open_session(fx.slot).unwrap();
        session.login(&fx.pin).unwrap();
        let pair = session.find_key_pair(&fx.pair_label).unwrap();
        let wrapped = session.wrap_key(&pair.public, &[3u8; 32]).unwrap();

        session.logout().unwrap();

        let err = session.unwrap_key(&pair.private, &wrapped).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unwrap);
    }

    #[test]
    fn test_finalize_waits_for_open_sessions() {
        let loader = soft_loader();
        let mut module = loader.initialize(&soft_module_path()).unwrap();
        let mut session = module.open_session(SlotId::new(0)).unwrap();

        module.finalize();

        let err = loader.initialize(&soft_module_path()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ModuleInit);

        // first use after finalize releases the session
        assert!(session.list_private_key_labels().is_err());
        assert!(loader.initialize(&soft_module_path()).is_ok());
    }

    #[test]
    fn test_repeated_lookups_reuse_handles() {
        let (module, fx) = make_soft_module();
        let mut session = module.open_session(fx.slot).unwrap();
        session.login(&fx.pin).unwrap();

        let first = session.find_key_pair(&fx.pair_label).unwrap();
        session.list_private_key_labels().unwrap();
        let known = session.objects.len();

        for _ in 0..200 {
            session.find_key_pair(&fx.pair_label).unwrap();
            session.list_private_key_labels().unwrap();
        }

        assert_eq!(session.objects.len(), known);
        assert!(session.wrap_key(&first.public, &[1u8; 32]).is_ok());
    }

    #[test]
    fn test_label_listing_is_capped() {
        let [key, _] = &*TEST_KEYS;
        let token = (0..MAX_LISTED_KEYS + 20).fold(
            SoftTokenState::new("bulk", "0003"),
            |token, n| token.with_object(SoftObject::private(&format!("bulk-{n:03}"), key)),
        );
        let device = SoftDevice {
            initialized: false,
            slots: vec![SoftSlot {
                id: SlotId::new(0),
                info_readable: true,
                token: Some(token),
            }],
        };
        let module = SoftTokenLoader::new()
            .with_device(SOFT_MODULE_PATH, device)
            .initialize(&soft_module_path())
            .unwrap();
        let mut session = module.open_session(SlotId::new(0)).unwrap();
        session.login(&contract_fixture().pin).unwrap();

        let labels = session.list_private_key_labels().unwrap();

        assert_eq!(labels.len(), MAX_LISTED_KEYS);
        assert_eq!(labels.first().map(String::as_str), Some("bulk-000"));
        assert!(!token_state(&module, |token| token.search_active));
        assert_eq!(session.objects.len(), MAX_LISTED_KEYS);
    }

    #[test]
    fn test_closing_last_session_logs_out() {
        let (module, fx) = make_soft_module();
        let mut session = module.open_session(fx.slot).unwrap();
        session.login(&fx.pin).unwrap();
        assert!(token_state(&module, |token| token.logged_in));

        drop(session);

        assert!(!token_state(&module, |token| token.logged_in));
        assert_eq!(token_state(&module, |token| token.open_sessions), 0);
    }
}
