use std::fmt;
use std::sync::Arc;

use http::header::{
    CONTENT_DISPOSITION, CONTENT_ENCODING, CONTENT_LANGUAGE, CONTENT_LENGTH, CONTENT_LOCATION, CONTENT_TYPE,
};
use http::{HeaderMap, HeaderName};
use serde::Deserialize;

use crate::MergeError;

/// Transforms the accumulated headers of a merged response; its output replaces them entirely
pub type HeaderProcessor = Arc<dyn Fn(HeaderMap) -> HeaderMap + Send + Sync>;

fn default_entity_headers() -> Vec<HeaderName> {
    vec![CONTENT_TYPE, CONTENT_LENGTH, CONTENT_ENCODING, CONTENT_DISPOSITION, CONTENT_LANGUAGE, CONTENT_LOCATION]
}

/// Options for [`ResponseBuilder::with_options`](crate::ResponseBuilder::with_options).
///
/// Every field except the header post-processor can be loaded with serde, missing
/// fields fall back to [`Default`]:
///
/// ```
/// use micro_response::BuilderOptions;
///
/// let options: BuilderOptions = serde_json::from_str(r#"{ "replace_subsequent_full": true }"#).unwrap();
/// assert!(options.replace_subsequent_full);
/// assert!(options.prefer_partial_result);
/// ```
#[derive(Clone, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools, reason = "every flag is an independent option")]
pub struct BuilderOptions {
    /// Drop a Full fragment appended while another one is present
    pub ignore_subsequent_full: bool,
    /// Remove every earlier Full fragment when a new one is appended
    pub replace_subsequent_full: bool,
    /// Never read stream bodies while looking for a fallback body
    pub disable_stream_fallback: bool,
    #[serde(skip)]
    pub header_post_processor: Option<HeaderProcessor>,
    /// Later values of entity headers overwrite earlier ones instead of appending
    pub entity_header_replace: bool,
    pub entity_header_names: Vec<String>,
    pub prefer_partial_result: bool,
}

impl BuilderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn header_post_processor<F>(mut self, processor: F) -> Self
    where
        F: Fn(HeaderMap) -> HeaderMap + Send + Sync + 'static,
    {
        self.header_post_processor = Some(Arc::new(processor));
        self
    }
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            ignore_subsequent_full: false,
            replace_subsequent_full: false,
            disable_stream_fallback: false,
            header_post_processor: None,
            entity_header_replace: false,
            entity_header_names: default_entity_headers().iter().map(|name| name.as_str().to_owned()).collect(),
            prefer_partial_result: true,
        }
    }
}

impl fmt::Debug for BuilderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuilderOptions")
            .field("ignore_subsequent_full", &self.ignore_subsequent_full)
            .field("replace_subsequent_full", &self.replace_subsequent_full)
            .field("disable_stream_fallback", &self.disable_stream_fallback)
            .field("header_post_processor", &self.header_post_processor.is_some())
            .field("entity_header_replace", &self.entity_header_replace)
            .field("entity_header_names", &self.entity_header_names)
            .field("prefer_partial_result", &self.prefer_partial_result)
            .finish()
    }
}

/// What happens when a Full fragment is appended while another one is present
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DuplicateFullPolicy {
    Error,
    Ignore,
    Replace,
}

/// Validated form of [`BuilderOptions`], fixed for the builder's lifetime.
pub(crate) struct MergeConfig {
    pub(crate) duplicate_full: DuplicateFullPolicy,
    pub(crate) disable_stream_fallback: bool,
    pub(crate) header_post_processor: Option<HeaderProcessor>,
    pub(crate) entity_header_replace: bool,
    pub(crate) entity_header_names: Vec<HeaderName>,
    pub(crate) prefer_partial_result: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            duplicate_full: DuplicateFullPolicy::Error,
            disable_stream_fallback: false,
            header_post_processor: None,
            entity_header_replace: false,
            entity_header_names: default_entity_headers(),
            prefer_partial_result: true,
        }
    }
}

impl MergeConfig {
    pub(crate) fn is_entity_header(&self, name: &HeaderName) -> bool {
        self.entity_header_replace && self.entity_header_names.contains(name)
    }
}

impl TryFrom<BuilderOptions> for MergeConfig {
    type Error = MergeError;

    fn try_from(options: BuilderOptions) -> Result<Self, Self::Error> {
        if options.ignore_subsequent_full && options.replace_subsequent_full {
            return Err(MergeError::configuration(
                "ignore_subsequent_full and replace_subsequent_full are mutually exclusive",
            ));
        }

        let duplicate_full = match (options.ignore_subsequent_full, options.replace_subsequent_full) {
            (true, _) => DuplicateFullPolicy::Ignore,
            (_, true) => DuplicateFullPolicy::Replace,
            _ => DuplicateFullPolicy::Error,
        };

        let entity_header_names = options
            .entity_header_names
            .iter()
            .map(|name| {
                HeaderName::from_bytes(name.as_bytes())
                    .map_err(|_err| MergeError::configuration(format!("invalid entity header name: {name:?}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            duplicate_full,
            disable_stream_fallback: options.disable_stream_fallback,
            header_post_processor: options.header_post_processor,
            entity_header_replace: options.entity_header_replace,
            entity_header_names,
            prefer_partial_result: options.prefer_partial_result,
        })
    }
}

impl fmt::Debug for MergeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeConfig")
            .field("duplicate_full", &self.duplicate_full)
            .field("entity_header_replace", &self.entity_header_replace)
            .field("prefer_partial_result", &self.prefer_partial_result)
            .finish_non_exhaustive()
    }
}
