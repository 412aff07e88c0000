use super::TokenSession;
use crate::error::SealResult;
use crate::model::{ModulePath, SlotId, TokenDescriptor};

/// Capability to load and initialize a PKCS#11 module
pub trait ModuleLoader {
    /// The module type produced on success
    type Module: CryptographicModule;

    /// Load the library at `path` and run `C_Initialize`
    ///
    /// # Errors
    ///
    /// - `TokenError::ModuleLoad` if the path is not a loadable module
    /// - `TokenError::ModuleInit` if the module refuses initialization
    fn initialize(&self, path: &ModulePath) -> SealResult<Self::Module>;
}

/// One loaded and initialized PKCS#11 module
///
/// Sessions opened from a module stay bound to it: once the module is
/// finalized every call on those sessions fails with
/// `TokenError::ModuleFinalized`.
pub trait CryptographicModule {
    /// Session type opened against this module
    type Session: TokenSession;

    fn path(&self) -> &ModulePath;

    fn is_finalized(&self) -> bool;

    /// Enumerate slots that hold a token
    ///
    /// Slots whose token info cannot be read are skipped, so the result may
    /// be partial.
    fn list_tokens(&self) -> SealResult<Vec<TokenDescriptor>>;

    /// Open a read/write serial session on `slot`
    ///
    /// # Errors
    ///
    /// `TokenError::SessionOpen` if the slot has no token or is busy.
    fn open_session(&self, slot: SlotId) -> SealResult<Self::Session>;

    /// Release the module. Calling it again is a no-op.
    ///
    /// Sessions fail with `TokenError::ModuleFinalized` right away, but the
    /// library itself is only finalized once the last of them is dropped.
    /// Until then initializing the same library again fails with
    /// `TokenError::ModuleInit`.
    fn finalize(&mut self);
}
