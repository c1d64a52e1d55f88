//! The "read at most once" state machine of a body.
//!
//! ```text
//! NotUsed --consume--> Used       (terminal, reads fail)
//! NotUsed --exempt---> Exempted   (reads always pass)
//! ```

use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::BodyError;

const NOT_USED: u8 = 0;
const USED: u8 = 1;
const EXEMPTED: u8 = 2;

/// How a read was let through the guard.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Admission {
    /// The only read this body will ever allow
    Once,
    /// One of arbitrarily many reads of an exempted body
    Exempt,
}

#[derive(Debug, Default)]
pub(crate) struct ConsumptionGuard {
    state: AtomicU8,
}

impl ConsumptionGuard {
    /// Admits a read, marking the body used unless it is exempted
    pub(crate) fn consume(&self) -> Result<Admission, BodyError> {
        match self.state.compare_exchange(NOT_USED, USED, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => Ok(Admission::Once),
            Err(EXEMPTED) => Ok(Admission::Exempt),
            Err(_) => Err(BodyError::AlreadyUsed),
        }
    }

    /// Enters the exempted state; a no-op once used or already exempted.
    ///
    /// Returns true if this call performed the transition.
    pub(crate) fn exempt(&self) -> bool {
        self.state.compare_exchange(NOT_USED, EXEMPTED, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }

    #[inline]
    pub(crate) fn is_used(&self) -> bool {
        self.state.load(Ordering::Acquire) == USED
    }

    #[inline]
    pub(crate) fn is_exempt(&self) -> bool {
        self.state.load(Ordering::Acquire) == EXEMPTED
    }
}
