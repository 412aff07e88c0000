use std::fmt;

use thiserror::Error;
use zeroize::Zeroizing;

/// User PIN presented to `C_Login`
///
/// The PIN is held in a zeroizing buffer and never printed. Length rules are
/// token specific, so only obviously unusable values are rejected here and the
/// token has the final word.
#[derive(Clone, PartialEq, Eq)]
pub struct Pin(Zeroizing<String>);

impl Pin {
    pub const MAX_LENGTH: usize = 255;

    pub fn new(pin: String) -> Result<Self, PinError> {
        let pin = Zeroizing::new(pin);
        if pin.is_empty() {
            return Err(PinError::Empty);
        }
        if pin.len() > Self::MAX_LENGTH {
            return Err(PinError::TooLong);
        }
        Ok(Self(pin))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(pin: &str) -> Result<Self, PinError> {
        Self::new(pin.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pin([REDACTED])")
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinError {
    #[error("PIN must not be empty")]
    Empty,

    #[error("PIN must be at most {max} characters", max = Pin::MAX_LENGTH)]
    TooLong,
}
