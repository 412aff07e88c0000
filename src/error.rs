//! Error types for vaultseal
//!
//! This module defines the error hierarchy for all vaultseal operations.
//! Errors are organized hierarchically and use thiserror for implementation.
//!
//! A wrong private key and a corrupted container cannot be told apart
//! reliably: depending on where the damage lands, the token rejects the
//! wrapped key ([`CryptoError::Unwrap`]) or the AEAD tag fails to verify
//! ([`CryptoError::AuthenticationTag`]). Callers should treat both as
//! "this container cannot be opened with this key".

use std::path::PathBuf;

use thiserror::Error;

use crate::model::{KeyClass, SlotId};

/// Result type alias for vaultseal operations
///
/// This is a convenience alias for `Result<T, SealError>`.
pub type SealResult<T> = Result<T, SealError>;

/// Top-level error type for all vaultseal operations
#[derive(Error, Debug)]
pub enum SealError {
    /// PKCS#11 module, session and object errors
    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    /// Hybrid encryption errors
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptoError),

    /// Domain validation errors
    #[error("Domain validation error: {0}")]
    Domain(#[from] DomainError),

    /// File access from the thin I/O wrappers
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Error taxonomy members exposed to callers
///
/// Additional failure modes that are not part of the core taxonomy
/// (closed sessions, finalized modules, I/O...) map to [`ErrorKind::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ModuleLoad,
    ModuleInit,
    SessionOpen,
    Authentication,
    KeyNotFound,
    Wrap,
    Unwrap,
    Format,
    AuthenticationTag,
    Other,
}

impl SealError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SealError::Token(err) => match err {
                TokenError::ModuleLoad { .. } => ErrorKind::ModuleLoad,
                TokenError::ModuleInit { .. } => ErrorKind::ModuleInit,
                TokenError::SessionOpen { .. } => ErrorKind::SessionOpen,
                TokenError::Authentication { .. } => ErrorKind::Authentication,
                TokenError::KeyNotFound { .. } => ErrorKind::KeyNotFound,
                _ => ErrorKind::Other,
            },
            SealError::Crypto(err) => match err {
                CryptoError::Wrap { .. } => ErrorKind::Wrap,
                CryptoError::Unwrap { .. } => ErrorKind::Unwrap,
                CryptoError::Format { .. } => ErrorKind::Format,
                CryptoError::AuthenticationTag => ErrorKind::AuthenticationTag,
                _ => ErrorKind::Other,
            },
            SealError::Domain(_) | SealError::Io { .. } => ErrorKind::Other,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SealError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Why the token refused a login
///
/// Tokens report these through different return values, but all of them
/// surface as a single [`TokenError::Authentication`]. Nothing retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailureCause {
    WrongPin,
    PinLocked,
    TokenAbsent,
    Other,
}

impl std::fmt::Display for AuthFailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            AuthFailureCause::WrongPin => "incorrect PIN",
            AuthFailureCause::PinLocked => "PIN locked",
            AuthFailureCause::TokenAbsent => "token not present",
            AuthFailureCause::Other => "login rejected",
        };
        f.write_str(text)
    }
}

/// PKCS#11 module, session and key-object errors
#[derive(Error, Debug)]
pub enum TokenError {
    /// The module path does not resolve to a loadable library
    #[error("Failed to load PKCS#11 module {path}: {reason}")]
    ModuleLoad { path: String, reason: String },

    /// The library loaded but refused C_Initialize
    #[error("Failed to initialize PKCS#11 module {path}: {reason}")]
    ModuleInit { path: String, reason: String },

    /// No module has been initialized yet
    #[error("No PKCS#11 module is initialized")]
    ModuleNotInitialized,

    /// The module owning this session was finalized
    #[error("PKCS#11 module has been finalized")]
    ModuleFinalized,

    /// C_OpenSession failed
    #[error("Failed to open session on slot {slot}: {reason}")]
    SessionOpen { slot: SlotId, reason: String },

    /// The session was closed
    #[error("Session is closed")]
    SessionClosed,

    /// Login failed: wrong PIN, lockout or token removal
    #[error("Authentication failed ({cause}): {reason}")]
    Authentication {
        cause: AuthFailureCause,
        reason: String,
    },

    /// One half of a key pair is missing
    #[error("{half} key with label '{label}' not found")]
    KeyNotFound { half: KeyClass, label: String },

    /// A key handle resolved by another session was presented
    #[error("Key handle belongs to a different session")]
    ForeignHandle,

    /// Any other token call failure
    #[error("Token operation {operation} failed: {reason}")]
    Operation {
        operation: &'static str,
        reason: String,
    },
}

/// Hybrid encryption errors
#[derive(Error, Debug)]
pub enum CryptoError {
    /// The token refused to wrap the ephemeral key
    #[error("Failed to wrap symmetric key: {reason}")]
    Wrap { reason: String },

    /// The token refused to unwrap the stored key (wrong key, wrong token or damaged data)
    #[error("Failed to unwrap symmetric key (wrong key or token?): {reason}")]
    Unwrap { reason: String },

    /// The container is malformed or truncated
    #[error("Malformed container: {reason}")]
    Format { reason: String },

    /// AES-GCM tag verification failed (damaged ciphertext or wrong key)
    #[error("Authentication tag mismatch: ciphertext corrupted or wrong key")]
    AuthenticationTag,

    /// The OS random source failed
    #[error("Random number generation failed: {reason}")]
    Randomness { reason: String },

    /// Local AES-GCM encryption failed
    #[error("Payload encryption failed: {reason}")]
    Encryption { reason: String },
}

impl CryptoError {
    pub(crate) fn format(reason: impl Into<String>) -> Self {
        CryptoError::Format {
            reason: reason.into(),
        }
    }
}

/// Domain validation errors
#[derive(Error, Debug)]
pub enum DomainError {
    /// PIN validation error
    #[error("PIN validation error: {0}")]
    Pin(#[from] crate::model::PinError),

    /// Key label error
    #[error("Key label error: {0}")]
    KeyLabel(#[from] crate::model::KeyLabelError),

    /// Module path error
    #[error("Module path error: {0}")]
    ModulePath(#[from] crate::model::ModulePathError),
}

impl From<crate::model::PinError> for SealError {
    fn from(err: crate::model::PinError) -> Self {
        SealError::Domain(DomainError::Pin(err))
    }
}

impl From<crate::model::KeyLabelError> for SealError {
    fn from(err: crate::model::KeyLabelError) -> Self {
        SealError::Domain(DomainError::KeyLabel(err))
    }
}

impl From<crate::model::ModulePathError> for SealError {
    fn from(err: crate::model::ModulePathError) -> Self {
        SealError::Domain(DomainError::ModulePath(err))
    }
}
