use super::{KeyFinder, KeyWrapper};
use crate::error::SealResult;
use crate::model::{Pin, SessionId, SessionState, SlotId};

/// Capability to authenticate as the normal user
pub trait Authenticator {
    /// `C_Login` as CKU_USER
    ///
    /// Never retried: a second attempt against a token can push it into
    /// lockout. On failure the session stays unauthenticated.
    fn login(&mut self, pin: &Pin) -> SealResult<()>;

    /// `C_Logout`; a no-op when the session is not authenticated
    fn logout(&mut self) -> SealResult<()>;
}

/// A live channel to one token
///
/// Closing is idempotent and also happens on drop. Every other operation on
/// a closed session fails with `TokenError::SessionClosed`.
pub trait TokenSession: Authenticator + KeyFinder + KeyWrapper {
    fn id(&self) -> SessionId;

    fn slot(&self) -> SlotId;

    fn state(&self) -> SessionState;

    fn close(&mut self);
}
