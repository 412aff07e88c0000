//! KeyFinder trait - capability to resolve key objects by class and label

use tracing::{debug, warn};

use crate::error::{SealResult, TokenError};
use crate::model::{KeyClass, KeyHandle, KeyLabel, KeyPair};

/// Upper bound on private keys returned by a listing
pub const MAX_LISTED_KEYS: usize = 100;

/// Capability to search the token for key objects
///
/// Implementors provide the two primitives; pair resolution and label
/// listing are built on top of them so every adapter shares the same rules.
pub trait KeyFinder {
    /// Search for objects of `class`, optionally restricted to `label`
    ///
    /// At most `limit` handles are returned. The search context is always
    /// released before returning, including on error.
    fn find_objects(
        &mut self,
        class: KeyClass,
        label: Option<&KeyLabel>,
        limit: usize,
    ) -> SealResult<Vec<KeyHandle>>;

    /// Read `CKA_LABEL` of an object found in this session
    fn read_label(&mut self, handle: &KeyHandle) -> SealResult<String>;

    /// Resolve the private and public halves sharing `label`
    ///
    /// # Errors
    ///
    /// `TokenError::KeyNotFound` naming the missing half.
    fn find_key_pair(&mut self, label: &KeyLabel) -> SealResult<KeyPair> {
        let private = find_one(self, KeyClass::Private, label)?;
        let public = find_one(self, KeyClass::Public, label)?;
        debug!("Resolved key pair '{}'", label);
        Ok(KeyPair {
            label: label.clone(),
            private,
            public,
        })
    }

    /// Labels of the private keys visible in this session
    ///
    /// Objects whose label cannot be read are skipped with a warning.
    fn list_private_key_labels(&mut self) -> SealResult<Vec<String>> {
        let handles = self.find_objects(KeyClass::Private, None, MAX_LISTED_KEYS)?;
        let mut labels = Vec::with_capacity(handles.len());
        for handle in &handles {
            match self.read_label(handle) {
                Ok(label) => labels.push(label),
                Err(err) => warn!("Skipping private key with unreadable label: {}", err),
            }
        }
        Ok(labels)
    }
}

fn find_one<F>(finder: &mut F, class: KeyClass, label: &KeyLabel) -> SealResult<KeyHandle>
where
    F: KeyFinder + ?Sized,
{
    // Ask for two so duplicates can be reported.
    let mut found = finder.find_objects(class, Some(label), 2)?;
    if found.len() > 1 {
        warn!(
            "Several {} keys are labeled '{}'; using the first one",
            class, label
        );
    }
    if found.is_empty() {
        return Err(TokenError::KeyNotFound {
            half: class,
            label: label.to_string(),
        }
        .into());
    }
    Ok(found.swap_remove(0))
}
