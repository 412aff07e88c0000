//! Module liveness shared between a module and its sessions

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{SealResult, TokenError};

/// Revoked once when the owning module is finalized
#[derive(Debug, Default)]
pub(crate) struct ModuleLease {
    revoked: AtomicBool,
}

impl ModuleLease {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns `true` the first time only
    pub(crate) fn revoke(&self) -> bool {
        !self.revoked.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_live(&self) -> bool {
        !self.revoked.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_live(&self) -> SealResult<()> {
        if self.is_live() {
            Ok(())
        } else {
            Err(TokenError::ModuleFinalized.into())
        }
    }
}
