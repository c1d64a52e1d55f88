//! Host capability descriptor.
//!
//! Which representations a host can produce is decided once, at start-up, and
//! handed to every [`Body`](crate::Body). Nothing probes the environment per
//! call.

use once_cell::sync::OnceCell;
use tracing::debug;

static CURRENT: OnceCell<Capabilities> = OnceCell::new();

/// The set of body representations the host can produce.
///
/// A missing capability affects two places: classification of the input at
/// construction time (the value falls through to the next matching rule), and
/// extraction, where asking for that representation fails with
/// [`BodyError::UnsupportedOperation`](crate::BodyError::UnsupportedOperation).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools, reason = "each flag is an independent host feature")]
pub struct Capabilities {
    /// Native byte buffers, also required for byte streams
    pub byte_buffer: bool,
    /// Raw byte views
    pub raw_bytes: bool,
    /// Binary large objects
    pub blob: bool,
    /// Structured form fields
    pub form_data: bool,
    /// URL search parameters
    pub search_params: bool,
}

impl Capabilities {
    pub const fn all() -> Self {
        Self { byte_buffer: true, raw_bytes: true, blob: true, form_data: true, search_params: true }
    }

    pub const fn none() -> Self {
        Self { byte_buffer: false, raw_bytes: false, blob: false, form_data: false, search_params: false }
    }

    /// Installs the process-wide descriptor.
    ///
    /// Only the first call wins; later calls hand their value back as the error.
    /// If nothing is installed before the first [`current`](Self::current) call,
    /// the host is assumed to support everything.
    pub fn install(self) -> Result<(), Capabilities> {
        CURRENT.set(self)?;
        debug!(capabilities = ?self, "installed host capabilities");
        Ok(())
    }

    /// Returns the process-wide descriptor
    pub fn current() -> Capabilities {
        *CURRENT.get_or_init(Capabilities::all)
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::all()
    }
}
