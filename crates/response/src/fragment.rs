//! Partial and full response fragments.
//!
//! A fragment is one unit handed to the [`ResponseBuilder`](crate::ResponseBuilder):
//! headers, an optional body and, for full fragments, a status. Fragments are
//! fully initialised on construction and never change afterwards; the headers
//! are only reachable by shared reference.

use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use micro_body::{Body, BodyInit};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FragmentKind {
    /// Contributes headers and possibly a fallback body
    Partial,
    /// A complete response with a definitive status
    Full,
}

/// Status, status text and headers for a new fragment.
#[derive(Debug, Default, Clone)]
pub struct ResponseInit {
    pub status: Option<StatusCode>,
    pub status_text: Option<String>,
    pub headers: HeaderMap,
}

impl ResponseInit {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn status_text(mut self, status_text: impl Into<String>) -> Self {
        self.status_text = Some(status_text.into());
        self
    }

    #[must_use]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Appends one header value, keeping values already present under `name`
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }
}

#[derive(Debug)]
pub struct Fragment {
    kind: FragmentKind,
    headers: HeaderMap,
    body: Option<Body>,
    status: Option<StatusCode>,
    status_text: Option<String>,
}

impl Fragment {
    /// Creates a full fragment; the status defaults to `200 OK`.
    ///
    /// If `init` carries no `content-type`, the body's default content type is used.
    pub fn full(body: impl Into<BodyInit>, init: ResponseInit) -> Self {
        Self::with_body(FragmentKind::Full, Body::new(body), init)
    }

    pub fn partial(body: impl Into<BodyInit>, init: ResponseInit) -> Self {
        Self::with_body(FragmentKind::Partial, Body::new(body), init)
    }

    /// Creates a partial fragment that carries headers only
    pub fn headers_only(headers: HeaderMap) -> Self {
        Self::assemble(FragmentKind::Partial, headers, None, None, None)
    }

    /// Creates a fragment around an already constructed body
    pub fn with_body(kind: FragmentKind, body: Body, init: ResponseInit) -> Self {
        let ResponseInit { status, status_text, mut headers } = init;
        let status = match kind {
            FragmentKind::Full => status.or(Some(StatusCode::OK)),
            FragmentKind::Partial => status,
        };

        if !headers.contains_key(CONTENT_TYPE) {
            if let Some(value) = body.content_type_hint().and_then(|mime| HeaderValue::from_str(mime.as_ref()).ok()) {
                headers.insert(CONTENT_TYPE, value);
            }
        }

        Self::assemble(kind, headers, Some(body), status, status_text)
    }

    /// Assembles a fragment from its parts as given, deriving neither headers nor a status
    pub(crate) fn assemble(
        kind: FragmentKind,
        headers: HeaderMap,
        body: Option<Body>,
        status: Option<StatusCode>,
        status_text: Option<String>,
    ) -> Self {
        Self { kind, headers, body, status, status_text }
    }

    #[inline]
    pub fn kind(&self) -> FragmentKind {
        self.kind
    }

    #[inline]
    pub fn is_partial(&self) -> bool {
        self.kind == FragmentKind::Partial
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn status_text(&self) -> Option<&str> {
        self.status_text.as_deref()
    }

    /// Delegates to the body's consumption guard; a fragment without a body is never used
    pub fn body_used(&self) -> bool {
        self.body.as_ref().is_some_and(Body::body_used)
    }

    /// Returns true for a `2xx` status
    pub fn ok(&self) -> bool {
        self.status.is_some_and(|status| status.is_success())
    }
}
