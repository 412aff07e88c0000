//! Key object references
//!
//! Key material never leaves the token. What the library hands around are
//! [`KeyHandle`]s: capabilities bound to the session that resolved them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

/// PKCS#11 object class of a key-pair half
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyClass {
    Private,
    Public,
}

impl fmt::Display for KeyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyClass::Private => f.write_str("private"),
            KeyClass::Public => f.write_str("public"),
        }
    }
}

/// `CKA_LABEL` shared by the two halves of a key pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyLabel(String);

impl KeyLabel {
    pub fn new(label: impl Into<String>) -> Result<Self, KeyLabelError> {
        let label = label.into();
        if label.is_empty() {
            return Err(KeyLabelError::Empty);
        }
        Ok(Self(label))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl TryFrom<&str> for KeyLabel {
    type Error = KeyLabelError;

    fn try_from(label: &str) -> Result<Self, Self::Error> {
        Self::new(label)
    }
}

impl fmt::Display for KeyLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyLabelError {
    #[error("key label must not be empty")]
    Empty,
}

/// Process-unique identity of an open session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Reference to a key object resolved within one session
///
/// Neither `Clone` nor serializable: a handle is only
/// meaningful to the session that produced it, and sessions reject handles
/// carrying another session's id.
#[derive(Debug, PartialEq, Eq)]
pub struct KeyHandle {
    session: SessionId,
    class: KeyClass,
    object: usize,
}

impl KeyHandle {
    pub(crate) fn new(session: SessionId, class: KeyClass, object: usize) -> Self {
        Self {
            session,
            class,
            object,
        }
    }

    pub fn class(&self) -> KeyClass {
        self.class
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Index into the owning session's object table
    pub(crate) fn object(&self) -> usize {
        self.object
    }
}

/// Private and public halves sharing one label
#[derive(Debug)]
pub struct KeyPair {
    pub label: KeyLabel,
    pub private: KeyHandle,
    pub public: KeyHandle,
}
