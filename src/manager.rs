//! Ownership of the loaded PKCS#11 module
//!
//! The manager holds at most one live module. Switching to a different
//! path finalizes the current module first; dropping the manager finalizes
//! whatever is still loaded.

use tracing::info;

use crate::error::{SealResult, TokenError};
use crate::model::{ModulePath, SlotId, TokenDescriptor};
use crate::ports::{CryptographicModule, ModuleLoader};

pub struct TokenManager<L: ModuleLoader> {
    loader: L,
    module: Option<L::Module>,
}

impl<L: ModuleLoader> TokenManager<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            module: None,
        }
    }

    /// Make the module at `path` the current one
    ///
    /// Asking again for the path already loaded returns the live module.
    /// Any other path finalizes the current module before loading; if that
    /// load fails the manager is left without a module.
    pub fn initialize(&mut self, path: &ModulePath) -> SealResult<&L::Module> {
        let reuse = matches!(
            &self.module,
            Some(current) if current.path() == path && !current.is_finalized()
        );

        if !reuse {
            if let Some(mut current) = self.module.take() {
                info!("Switching PKCS#11 module {} -> {}", current.path(), path);
                current.finalize();
            }
            self.module = Some(self.loader.initialize(path)?);
        }
        self.module()
    }

    pub fn module(&self) -> SealResult<&L::Module> {
        self.module
            .as_ref()
            .ok_or_else(|| TokenError::ModuleNotInitialized.into())
    }

    pub fn is_initialized(&self) -> bool {
        self.module.is_some()
    }

    /// Finalize the current module, if any
    pub fn finalize(&mut self) {
        if let Some(mut module) = self.module.take() {
            module.finalize();
        }
    }

    pub fn list_tokens(&self) -> SealResult<Vec<TokenDescriptor>> {
        self.module()?.list_tokens()
    }

    pub fn open_session(
        &self,
        slot: SlotId,
    ) -> SealResult<<L::Module as CryptographicModule>::Session> {
        self.module()?.open_session(slot)
    }
}

impl<L: ModuleLoader> Drop for TokenManager<L> {
    fn drop(&mut self) {
        self.finalize();
    }
}
