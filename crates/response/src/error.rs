use micro_body::BodyError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("invalid builder configuration: {reason}")]
    Configuration { reason: String },

    #[error("the full fragment's body was already used")]
    BodyAlreadyUsedInMerge,

    #[error("body error: {source}")]
    Body {
        #[from]
        source: BodyError,
    },
}

impl MergeError {
    pub fn configuration<S: ToString>(str: S) -> Self {
        Self::Configuration { reason: str.to_string() }
    }
}
