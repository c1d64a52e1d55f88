use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use mime::Mime;
use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::capability::Capabilities;
use crate::convert::{byte_chars, utf8_text, utf16_units};
use crate::ensure;
use crate::error::BodyError;
use crate::guard::{Admission, ConsumptionGuard};
use crate::replay::ReplayBuffer;
use crate::representation::{Blob, BodyInit, ByteStream, FormData, Representation, RepresentationKind, describe};
use crate::stream::BodyStream;

const JSON: &str = "json";

/// A fetch-style message body.
///
/// The body is classified into exactly one canonical [`RepresentationKind`]
/// when it is constructed. Every `as_*` read first passes the consumption
/// guard, which lets a body be read only once unless
/// [`exempt_from_consumption`](Body::exempt_from_consumption) was called before
/// the first read. Other representations are converted on demand and never
/// cached.
///
/// # Example
///
/// ```
/// use micro_body::Body;
///
/// # futures::executor::block_on(async {
/// let body = Body::new("hello");
/// assert_eq!(body.as_text().await.unwrap(), "hello");
/// assert!(body.as_text().await.unwrap_err().is_already_used());
/// # });
/// ```
pub struct Body {
    stored: Stored,
    guard: ConsumptionGuard,
    replay: OnceCell<Option<Arc<ReplayBuffer>>>,
    capabilities: Capabilities,
    content_type: Option<Mime>,
}

/// The canonical value, never exposed directly.
enum Stored {
    Text(String),
    ByteBuffer(Bytes),
    Blob(Blob),
    FormData(FormData),
    RawBytes(Bytes),
    Stream(Mutex<Option<ByteStream>>),
}

impl Stored {
    fn kind(&self) -> RepresentationKind {
        match self {
            Stored::Text(_) => RepresentationKind::Text,
            Stored::ByteBuffer(_) => RepresentationKind::ByteBuffer,
            Stored::Blob(_) => RepresentationKind::Blob,
            Stored::FormData(_) => RepresentationKind::FormData,
            Stored::RawBytes(_) => RepresentationKind::RawBytes,
            Stored::Stream(_) => RepresentationKind::ByteStream,
        }
    }
}

/// Picks the canonical representation; the first matching rule wins.
fn classify(init: BodyInit, capabilities: Capabilities) -> (Stored, Option<Mime>) {
    match init {
        BodyInit::Empty => (Stored::Text(String::new()), None),
        BodyInit::Text(text) => {
            let content_type = (!text.is_empty()).then_some(mime::TEXT_PLAIN_UTF_8);
            (Stored::Text(text), content_type)
        }
        BodyInit::Stream(stream) if capabilities.byte_buffer => (Stored::Stream(Mutex::new(Some(stream))), None),
        BodyInit::Buffer(bytes) if capabilities.byte_buffer => (Stored::ByteBuffer(bytes), None),
        BodyInit::Buffer(bytes) if capabilities.raw_bytes => (Stored::RawBytes(bytes), None),
        BodyInit::Blob(blob) if capabilities.blob => {
            let content_type = blob.content_type().cloned();
            (Stored::Blob(blob), content_type)
        }
        BodyInit::FormData(form) if capabilities.form_data => (Stored::FormData(form), None),
        BodyInit::SearchParams(params) if capabilities.search_params => {
            (Stored::Text(params.to_string()), Some(mime::APPLICATION_WWW_FORM_URLENCODED))
        }
        BodyInit::Raw(bytes) if capabilities.raw_bytes => (Stored::RawBytes(bytes), None),
        BodyInit::Opaque(text) => (Stored::Text(text), Some(mime::TEXT_PLAIN_UTF_8)),
        unsupported => {
            let name = match unsupported {
                BodyInit::Stream(_) => "Stream",
                BodyInit::Buffer(_) => "Buffer",
                BodyInit::Blob(_) => "Blob",
                BodyInit::FormData(_) => "FormData",
                BodyInit::SearchParams(_) => "SearchParams",
                _ => "RawBytes",
            };
            trace!(name, "host cannot hold body value natively, describing it as text");
            (Stored::Text(describe(name)), Some(mime::TEXT_PLAIN_UTF_8))
        }
    }
}

impl Body {
    /// Creates a body using the process-wide [`Capabilities`]
    pub fn new(init: impl Into<BodyInit>) -> Self {
        Self::with_capabilities(init, Capabilities::current())
    }

    pub fn with_capabilities(init: impl Into<BodyInit>, capabilities: Capabilities) -> Self {
        let (stored, content_type) = classify(init.into(), capabilities);
        Self { stored, guard: ConsumptionGuard::default(), replay: OnceCell::new(), capabilities, content_type }
    }

    pub fn empty() -> Self {
        Self::new(BodyInit::Empty)
    }

    /// The canonical representation chosen at construction
    #[inline]
    pub fn kind(&self) -> RepresentationKind {
        self.stored.kind()
    }

    #[inline]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// The content type a response carrying this body should default to
    pub fn content_type_hint(&self) -> Option<&Mime> {
        self.content_type.as_ref()
    }

    /// Returns true once a non-exempt read has consumed the body
    #[inline]
    pub fn body_used(&self) -> bool {
        self.guard.is_used()
    }

    /// Returns true if the canonical value can be handed out without draining a stream.
    ///
    /// Empty text counts as no content.
    pub fn has_direct_content(&self) -> bool {
        match &self.stored {
            Stored::Text(text) => !text.is_empty(),
            Stored::Stream(_) => false,
            _ => true,
        }
    }

    /// Clones the canonical value without passing the consumption guard.
    ///
    /// Returns `None` for stream bodies and empty text; reading those needs
    /// [`as_stream`](Body::as_stream), which does count as a read.
    pub fn direct_content(&self) -> Option<Representation> {
        if !self.has_direct_content() {
            return None;
        }
        match &self.stored {
            Stored::Text(text) => Some(Representation::Text(text.clone())),
            Stored::ByteBuffer(bytes) => Some(Representation::ByteBuffer(bytes.clone())),
            Stored::Blob(blob) => Some(Representation::Blob(blob.clone())),
            Stored::FormData(form) => Some(Representation::FormData(form.clone())),
            Stored::RawBytes(bytes) => Some(Representation::RawBytes(bytes.clone())),
            Stored::Stream(_) => None,
        }
    }

    /// Allows this body to be read any number of times.
    ///
    /// Must be called before the first read; afterwards, and on repeated
    /// calls, it does nothing. Stream bodies start buffering their source so
    /// that every read replays the same chunks.
    pub fn exempt_from_consumption(&self) -> &Self {
        if self.guard.exempt() {
            debug!(kind = %self.kind(), "body exempted from consumption");
            if let Stored::Stream(_) = self.stored {
                self.replay_buffer();
            }
        }
        self
    }

    pub async fn as_text(&self) -> Result<String, BodyError> {
        let admission = self.guard.consume()?;
        self.read_text(admission, RepresentationKind::Text.name()).await
    }

    pub async fn as_byte_buffer(&self) -> Result<Bytes, BodyError> {
        let admission = self.guard.consume()?;
        ensure!(self.capabilities.byte_buffer, BodyError::unsupported("byte buffers are not available"));
        let target = RepresentationKind::ByteBuffer.name();

        match &self.stored {
            Stored::ByteBuffer(bytes) | Stored::RawBytes(bytes) => Ok(bytes.clone()),
            Stored::Text(text) => Ok(Bytes::from(text.clone())),
            Stored::Blob(blob) => Ok(blob.bytes().clone()),
            Stored::FormData(form) => Self::urlencoded(form, target).map(Bytes::from),
            Stored::Stream(_) => self.drain(admission, target).await,
        }
    }

    pub async fn as_raw_bytes(&self) -> Result<Bytes, BodyError> {
        let admission = self.guard.consume()?;
        ensure!(self.capabilities.raw_bytes, BodyError::unsupported("raw byte views are not available"));
        let target = RepresentationKind::RawBytes.name();

        match &self.stored {
            Stored::RawBytes(bytes) | Stored::ByteBuffer(bytes) => Ok(bytes.clone()),
            Stored::Text(text) => Ok(utf16_units(text)),
            Stored::Blob(blob) => Ok(blob.bytes().clone()),
            Stored::FormData(form) => Self::urlencoded(form, target).map(Bytes::from),
            Stored::Stream(_) => self.drain(admission, target).await,
        }
    }

    pub async fn as_blob(&self) -> Result<Blob, BodyError> {
        let admission = self.guard.consume()?;
        ensure!(self.capabilities.blob, BodyError::unsupported("blobs are not available"));
        let target = RepresentationKind::Blob.name();

        match &self.stored {
            Stored::Blob(blob) => Ok(blob.clone()),
            Stored::ByteBuffer(bytes) | Stored::RawBytes(bytes) => Ok(Blob::new(bytes.clone())),
            Stored::Text(text) => Ok(Blob::new(text.clone())),
            Stored::FormData(form) => Self::urlencoded(form, target).map(Blob::new),
            Stored::Stream(_) => self.drain(admission, target).await.map(Blob::new),
        }
    }

    pub async fn as_form_data(&self) -> Result<FormData, BodyError> {
        let admission = self.guard.consume()?;
        ensure!(self.capabilities.form_data, BodyError::unsupported("form data is not available"));
        let target = RepresentationKind::FormData.name();

        if let Stored::FormData(form) = &self.stored {
            return Ok(form.clone());
        }

        let text = self.read_text(admission, target).await?;
        FormData::parse(&text).map_err(|e| {
            trace!(cause = %e, "failed to parse form data");
            BodyError::conversion(target)
        })
    }

    /// Reads the body as text and deserialises it as JSON
    pub async fn as_json<T: DeserializeOwned>(&self) -> Result<T, BodyError> {
        let admission = self.guard.consume()?;
        let text = self.read_text(admission, JSON).await?;
        serde_json::from_str(&text).map_err(|e| {
            trace!(cause = %e, "failed to parse json body");
            BodyError::conversion(JSON)
        })
    }

    /// Hands out the canonical representation; stream bodies yield their
    /// source, or a replay of it when exempted.
    pub async fn as_best_suited(&self) -> Result<Representation, BodyError> {
        let admission = self.guard.consume()?;

        Ok(match &self.stored {
            Stored::Text(text) => Representation::Text(text.clone()),
            Stored::ByteBuffer(bytes) => Representation::ByteBuffer(bytes.clone()),
            Stored::Blob(blob) => Representation::Blob(blob.clone()),
            Stored::FormData(form) => Representation::FormData(form.clone()),
            Stored::RawBytes(bytes) => Representation::RawBytes(bytes.clone()),
            Stored::Stream(_) => Representation::ByteStream(self.open_stream(admission)?),
        })
    }

    /// Only bodies constructed from a stream can be read as one
    pub async fn as_stream(&self) -> Result<BodyStream, BodyError> {
        let admission = self.guard.consume()?;
        ensure!(self.capabilities.byte_buffer, BodyError::unsupported("byte buffers are not available"));

        match &self.stored {
            Stored::Stream(_) => self.open_stream(admission),
            _ => Err(BodyError::unsupported("could not read as stream")),
        }
    }

    async fn read_text(&self, admission: Admission, target: &'static str) -> Result<String, BodyError> {
        match &self.stored {
            Stored::Text(text) => Ok(text.clone()),
            Stored::ByteBuffer(bytes) => Ok(utf8_text(bytes)),
            Stored::Blob(blob) => Ok(utf8_text(blob.bytes())),
            Stored::RawBytes(bytes) => Ok(byte_chars(bytes)),
            Stored::FormData(form) => Self::urlencoded(form, target),
            Stored::Stream(_) => self.drain(admission, target).await.map(|bytes| utf8_text(&bytes)),
        }
    }

    fn urlencoded(form: &FormData, target: &'static str) -> Result<String, BodyError> {
        form.to_urlencoded().map_err(|e| {
            trace!(cause = %e, "failed to serialise form data");
            BodyError::conversion(target)
        })
    }

    async fn drain(&self, admission: Admission, target: &'static str) -> Result<Bytes, BodyError> {
        let stream = self.open_stream(admission)?;
        stream.drain().await.map_err(|e| {
            debug!(cause = %e, target, "failed to drain body stream");
            BodyError::conversion(target)
        })
    }

    fn take_source(&self) -> Option<ByteStream> {
        match &self.stored {
            Stored::Stream(source) => source.lock().unwrap_or_else(PoisonError::into_inner).take(),
            _ => None,
        }
    }

    /// Acquires the replay buffer at most once per body
    fn replay_buffer(&self) -> Option<Arc<ReplayBuffer>> {
        self.replay.get_or_init(|| self.take_source().map(ReplayBuffer::new)).clone()
    }

    // an exempted stream body moved its source into the replay buffer when it was exempted
    fn open_stream(&self, admission: Admission) -> Result<BodyStream, BodyError> {
        let stream = match admission {
            Admission::Exempt => self.replay_buffer().map(|buffer| BodyStream::replay(buffer.reader())),
            Admission::Once => self.take_source().map(BodyStream::source),
        };
        stream.ok_or(BodyError::AlreadyUsed)
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("kind", &self.kind())
            .field("used", &self.guard.is_used())
            .field("exempt", &self.guard.is_exempt())
            .finish_non_exhaustive()
    }
}
