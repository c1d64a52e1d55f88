use thiserror::Error;

/// Errors raised while reading a [`Body`](crate::Body).
///
/// Conversion failures deliberately carry only the target representation, the
/// underlying cause is logged and dropped so callers see the same message on
/// every host.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BodyError {
    #[error("body already used")]
    AlreadyUsed,

    #[error("unsupported operation: {reason}")]
    UnsupportedOperation { reason: String },

    #[error("could not read body as {target}")]
    ConversionFailure { target: &'static str },
}

impl BodyError {
    pub fn unsupported<S: ToString>(str: S) -> Self {
        Self::UnsupportedOperation { reason: str.to_string() }
    }

    pub fn conversion(target: &'static str) -> Self {
        Self::ConversionFailure { target }
    }

    /// Returns true if the read was rejected by the consumption guard
    #[inline]
    pub fn is_already_used(&self) -> bool {
        matches!(self, BodyError::AlreadyUsed)
    }
}
