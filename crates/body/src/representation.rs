use std::error::Error as StdError;
use std::fmt;
use std::io;

use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt, TryStreamExt};
use http_body_util::BodyExt;
use mime::Mime;

use crate::stream::BodyStream;

/// A one-shot source of body chunks.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Tags the representation a body was constructed from, or a read returned.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RepresentationKind {
    Text,
    ByteBuffer,
    Blob,
    FormData,
    RawBytes,
    ByteStream,
}

impl RepresentationKind {
    pub fn name(&self) -> &'static str {
        match self {
            RepresentationKind::Text => "text",
            RepresentationKind::ByteBuffer => "byte buffer",
            RepresentationKind::Blob => "blob",
            RepresentationKind::FormData => "form data",
            RepresentationKind::RawBytes => "raw bytes",
            RepresentationKind::ByteStream => "stream",
        }
    }
}

impl fmt::Display for RepresentationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An immutable binary large object with an optional media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    bytes: Bytes,
    content_type: Option<Mime>,
}

impl Blob {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self { bytes: bytes.into(), content_type: None }
    }

    #[must_use]
    pub fn with_type(mut self, content_type: Mime) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn content_type(&self) -> Option<&Mime> {
        self.content_type.as_ref()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

/// An ordered collection of form fields; names may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    fields: Vec<(String, String)>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Returns the first value recorded for `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.iter().find(|(field, _)| field == name).map(|(_, value)| value.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields.iter().filter(move |(field, _)| field == name).map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parses an `application/x-www-form-urlencoded` string.
    ///
    /// Surrounding whitespace is ignored, empty pairs are skipped and `+` decodes to a space.
    pub fn parse(input: &str) -> Result<Self, serde_urlencoded::de::Error> {
        let fields = serde_urlencoded::from_str::<Vec<(String, String)>>(input.trim())?;
        Ok(Self { fields })
    }

    pub fn to_urlencoded(&self) -> Result<String, serde_urlencoded::ser::Error> {
        serde_urlencoded::to_string(&self.fields)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormData {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self { fields: iter.into_iter().map(|(name, value)| (name.into(), value.into())).collect() }
    }
}

/// URL search parameters. Bodies built from them are stored as their serialised text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchParams {
    pairs: Vec<(String, String)>,
}

impl SearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((name.into(), value.into()));
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SearchParams {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self { pairs: iter.into_iter().map(|(name, value)| (name.into(), value.into())).collect() }
    }
}

impl fmt::Display for SearchParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = serde_urlencoded::to_string(&self.pairs).map_err(|_err| fmt::Error)?;
        f.write_str(&encoded)
    }
}

/// Every value a [`Body`](crate::Body) can be constructed from.
pub enum BodyInit {
    Empty,
    Text(String),
    Stream(ByteStream),
    Buffer(Bytes),
    Blob(Blob),
    FormData(FormData),
    SearchParams(SearchParams),
    /// A copy of a typed byte or numeric view
    Raw(Bytes),
    /// A value with no body meaning of its own, already described as text
    Opaque(String),
}

impl BodyInit {
    /// Wraps any fallible byte stream
    pub fn stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<Box<dyn StdError + Send + Sync>> + 'static,
    {
        BodyInit::Stream(stream.map_err(io::Error::other).boxed())
    }

    /// Wraps the data frames of an [`http_body::Body`]; trailers are dropped
    pub fn from_http_body<B>(body: B) -> Self
    where
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn StdError + Send + Sync>> + 'static,
    {
        Self::stream(Box::pin(body).into_data_stream())
    }

    /// Describes a value that has no body meaning, e.g. `[object my_crate::Thing]`
    pub fn opaque<T: ?Sized>(_value: &T) -> Self {
        BodyInit::Opaque(describe(std::any::type_name::<T>()))
    }
}

pub(crate) fn describe(name: &str) -> String {
    format!("[object {name}]")
}

impl fmt::Debug for BodyInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyInit::Empty => f.write_str("Empty"),
            BodyInit::Text(text) => f.debug_tuple("Text").field(text).finish(),
            BodyInit::Stream(_) => f.write_str("Stream(..)"),
            BodyInit::Buffer(bytes) => f.debug_tuple("Buffer").field(bytes).finish(),
            BodyInit::Blob(blob) => f.debug_tuple("Blob").field(blob).finish(),
            BodyInit::FormData(form) => f.debug_tuple("FormData").field(form).finish(),
            BodyInit::SearchParams(params) => f.debug_tuple("SearchParams").field(params).finish(),
            BodyInit::Raw(bytes) => f.debug_tuple("Raw").field(bytes).finish(),
            BodyInit::Opaque(text) => f.debug_tuple("Opaque").field(text).finish(),
        }
    }
}

impl From<()> for BodyInit {
    fn from(_: ()) -> Self {
        BodyInit::Empty
    }
}

impl<T: Into<BodyInit>> From<Option<T>> for BodyInit {
    fn from(option: Option<T>) -> Self {
        option.map_or(BodyInit::Empty, Into::into)
    }
}

impl From<String> for BodyInit {
    fn from(value: String) -> Self {
        BodyInit::Text(value)
    }
}

impl From<&str> for BodyInit {
    fn from(value: &str) -> Self {
        BodyInit::Text(value.to_owned())
    }
}

impl From<Bytes> for BodyInit {
    fn from(value: Bytes) -> Self {
        BodyInit::Buffer(value)
    }
}

impl From<Vec<u8>> for BodyInit {
    fn from(value: Vec<u8>) -> Self {
        BodyInit::Buffer(Bytes::from(value))
    }
}

impl From<Blob> for BodyInit {
    fn from(value: Blob) -> Self {
        BodyInit::Blob(value)
    }
}

impl From<FormData> for BodyInit {
    fn from(value: FormData) -> Self {
        BodyInit::FormData(value)
    }
}

impl From<SearchParams> for BodyInit {
    fn from(value: SearchParams) -> Self {
        BodyInit::SearchParams(value)
    }
}

impl From<BodyStream> for BodyInit {
    fn from(value: BodyStream) -> Self {
        BodyInit::Stream(StreamExt::boxed(value))
    }
}

impl From<&[u8]> for BodyInit {
    fn from(view: &[u8]) -> Self {
        BodyInit::Raw(Bytes::copy_from_slice(view))
    }
}

macro_rules! impl_from_numeric_view {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<&[$ty]> for BodyInit {
                fn from(view: &[$ty]) -> Self {
                    let mut bytes = BytesMut::with_capacity(std::mem::size_of_val(view));
                    for value in view {
                        bytes.extend_from_slice(&value.to_ne_bytes());
                    }
                    BodyInit::Raw(bytes.freeze())
                }
            }
        )*
    };
}

impl_from_numeric_view!(u16, u32, u64, i8, i16, i32, i64, f32, f64);

/// A body representation handed out by a read.
#[derive(Debug)]
pub enum Representation {
    Text(String),
    ByteBuffer(Bytes),
    Blob(Blob),
    FormData(FormData),
    RawBytes(Bytes),
    ByteStream(BodyStream),
}

impl Representation {
    pub fn kind(&self) -> RepresentationKind {
        match self {
            Representation::Text(_) => RepresentationKind::Text,
            Representation::ByteBuffer(_) => RepresentationKind::ByteBuffer,
            Representation::Blob(_) => RepresentationKind::Blob,
            Representation::FormData(_) => RepresentationKind::FormData,
            Representation::RawBytes(_) => RepresentationKind::RawBytes,
            Representation::ByteStream(_) => RepresentationKind::ByteStream,
        }
    }
}

impl From<Representation> for BodyInit {
    fn from(representation: Representation) -> Self {
        match representation {
            Representation::Text(text) => BodyInit::Text(text),
            Representation::ByteBuffer(bytes) => BodyInit::Buffer(bytes),
            Representation::Blob(blob) => BodyInit::Blob(blob),
            Representation::FormData(form) => BodyInit::FormData(form),
            Representation::RawBytes(bytes) => BodyInit::Raw(bytes),
            Representation::ByteStream(stream) => stream.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_data_parse_decodes_plus_and_percent() {
        let form = FormData::parse("  name=John+Smith&city=New%20York&&tag=a&tag=b \n").unwrap();

        assert_eq!(form.len(), 4);
        assert_eq!(form.get("name"), Some("John Smith"));
        assert_eq!(form.get("city"), Some("New York"));
        assert_eq!(form.get_all("tag").collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(form.get("missing"), None);
    }

    #[test]
    fn form_data_keeps_order_when_serialised() {
        let form: FormData = [("b", "2"), ("a", "1 2"), ("b", "3")].into_iter().collect();
        assert_eq!(form.to_urlencoded().unwrap(), "b=2&a=1+2&b=3");
    }

    #[test]
    fn search_params_display_is_urlencoded() {
        let params: SearchParams = [("q", "rust lang"), ("page", "2")].into_iter().collect();
        assert_eq!(params.to_string(), "q=rust+lang&page=2");
    }

    #[test]
    fn numeric_views_are_copied_native_endian() {
        let view: &[u16] = &[0x0102, 0x0304];
        let BodyInit::Raw(bytes) = BodyInit::from(view) else {
            panic!("expected raw bytes");
        };

        let mut expected = Vec::new();
        expected.extend_from_slice(&0x0102u16.to_ne_bytes());
        expected.extend_from_slice(&0x0304u16.to_ne_bytes());
        assert_eq!(&bytes[..], &expected[..]);
    }

    #[test]
    fn byte_views_are_defensively_cloned() {
        let mut source = vec![1u8, 2, 3];
        let init = BodyInit::from(source.as_slice());
        source[0] = 9;

        let BodyInit::Raw(bytes) = init else {
            panic!("expected raw bytes");
        };
        assert_eq!(&bytes[..], &[1, 2, 3]);
    }

    #[test]
    fn opaque_values_are_described_by_type() {
        struct Widget;
        let BodyInit::Opaque(text) = BodyInit::opaque(&Widget) else {
            panic!("expected opaque");
        };
        assert!(text.starts_with("[object "));
        assert!(text.ends_with("Widget]"));
    }

    #[test]
    fn option_none_is_empty() {
        assert!(matches!(BodyInit::from(None::<String>), BodyInit::Empty));
        assert!(matches!(BodyInit::from(Some("x")), BodyInit::Text(ref text) if text == "x"));
    }
}
