//! Fetch-style message bodies with single-use reads and replayable streams.
//!
//! A [`Body`] wraps one value, a string, a byte buffer, a blob, form fields, a
//! raw byte view or a one-shot byte stream, and lets it be read back in any of
//! those shapes. Reads follow the fetch contract: a body can be read once.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use futures::stream;
//! use micro_body::{Body, BodyInit};
//!
//! # futures::executor::block_on(async {
//! let chunks = stream::iter(["a", "b", "c"].map(|s| Ok::<_, std::io::Error>(Bytes::from(s))));
//! let body = Body::new(BodyInit::stream(chunks));
//!
//! body.exempt_from_consumption();
//!
//! assert_eq!(body.as_text().await.unwrap(), "abc");
//! assert_eq!(body.as_byte_buffer().await.unwrap(), Bytes::from("abc"));
//! # });
//! ```
//!
//! # Architecture
//!
//! - [`representation`]: the values a body is built from ([`BodyInit`]) and handed out as
//!   ([`Representation`]). Construction picks exactly one canonical representation; the
//!   others are converted on demand.
//! - `guard`: the consumption state machine. A read marks the body used *before* any
//!   conversion is attempted, so a failed conversion still counts as a read.
//! - `replay`: the buffer that gives an exempted stream body multi-read semantics. The
//!   source stream is drained exactly once and every reader replays the same chunks.
//! - [`Capabilities`]: which representations the host supports, fixed at start-up.
//!
//! # Conversions
//!
//! | canonical \ read | text        | byte buffer | raw bytes       | blob   |
//! |------------------|-------------|-------------|-----------------|--------|
//! | text             | as is       | UTF-8       | UTF-16 units    | UTF-8  |
//! | byte buffer      | UTF-8       | as is       | copy            | copy   |
//! | blob             | UTF-8       | bytes       | bytes           | as is  |
//! | raw bytes        | byte → char | copy        | as is           | copy   |
//! | form data        | urlencoded  | urlencoded  | urlencoded      | urlencoded |
//! | stream           | drain       | drain       | drain           | drain  |
//!
//! A stream is only ever handed out for bodies built from one; it is never
//! synthesised from another representation.
//!
//! # Errors
//!
//! Every read returns a [`BodyError`]: `AlreadyUsed` from the guard,
//! `UnsupportedOperation` when the host lacks a capability, and
//! `ConversionFailure` with a stable per-target message when a conversion fails.

mod body;
mod capability;
mod convert;
mod error;
mod guard;
mod replay;
mod stream;

pub mod representation;

pub use body::Body;
pub use capability::Capabilities;
pub use error::BodyError;
pub use representation::{Blob, BodyInit, ByteStream, FormData, Representation, RepresentationKind, SearchParams};
pub use stream::BodyStream;

mod utils;
pub(crate) use utils::ensure;
