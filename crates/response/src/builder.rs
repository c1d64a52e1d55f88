//! The merge engine.
//!
//! [`ResponseBuilder`] keeps an ordered list of [`Fragment`]s and folds them
//! into a single response when [`build`](ResponseBuilder::build) is called:
//!
//! - headers of every fragment are accumulated in append order
//! - the Full fragment, if any, supplies body and status unconditionally
//! - otherwise the first fragment with an unused body supplies the body, and its
//!   status if it carries one
//!
//! The fold result is memoized until the list changes, and every caller of
//! `build` during one period shares the same in-flight fold.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use http::{HeaderMap, StatusCode};
use micro_body::{Body, RepresentationKind};
use tracing::{debug, trace, warn};

use crate::fragment::{Fragment, FragmentKind};
use crate::options::{BuilderOptions, DuplicateFullPolicy, MergeConfig};
use crate::MergeError;

/// The outcome of one fold, shared by every caller of [`ResponseBuilder::build`]
pub type BuildFuture = Shared<BoxFuture<'static, Result<Arc<Fragment>, MergeError>>>;

pub struct ResponseBuilder {
    config: Arc<MergeConfig>,
    fragments: Vec<Option<Arc<Fragment>>>,
    // `None` whenever the fragment list changed since the last build
    memo: Mutex<Option<BuildFuture>>,
}

impl ResponseBuilder {
    pub fn new() -> Self {
        Self::with_config(MergeConfig::default())
    }

    /// Creates a builder with validated options
    pub fn with_options(options: BuilderOptions) -> Result<Self, MergeError> {
        Ok(Self::with_config(MergeConfig::try_from(options)?))
    }

    fn with_config(config: MergeConfig) -> Self {
        Self { config: Arc::new(config), fragments: Vec::new(), memo: Mutex::new(None) }
    }

    /// Appends a fragment, or a placeholder for `None`.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::Configuration`] when a second Full fragment is
    /// appended and neither the ignore nor the replace policy is configured.
    pub fn append(&mut self, fragment: impl Into<Option<Fragment>>) -> Result<&mut Self, MergeError> {
        let Some(fragment) = fragment.into() else {
            // recorded for position only, the fold result does not change
            self.fragments.push(None);
            return Ok(self);
        };

        if fragment.kind() == FragmentKind::Full && self.has_full() {
            match self.config.duplicate_full {
                DuplicateFullPolicy::Ignore => {
                    debug!("ignoring subsequent full fragment");
                    return Ok(self);
                }
                DuplicateFullPolicy::Replace => {
                    debug!("replacing previously appended full fragment");
                    self.fragments.retain(|slot| slot.as_ref().is_none_or(|fragment| fragment.is_partial()));
                }
                DuplicateFullPolicy::Error => return Err(MergeError::configuration("duplicate full response")),
            }
        }

        self.fragments.push(Some(Arc::new(fragment)));
        self.invalidate();
        Ok(self)
    }

    /// Appends every fragment in order, stopping at the first error
    pub fn append_all<I, F>(&mut self, fragments: I) -> Result<&mut Self, MergeError>
    where
        I: IntoIterator<Item = F>,
        F: Into<Option<Fragment>>,
    {
        for fragment in fragments {
            self.append(fragment)?;
        }
        Ok(self)
    }

    /// Appends one header-only Partial fragment per header set
    pub fn with_headers<I>(&mut self, headers: I) -> &mut Self
    where
        I: IntoIterator<Item = HeaderMap>,
    {
        for headers in headers {
            self.fragments.push(Some(Arc::new(Fragment::headers_only(headers))));
            self.invalidate();
        }
        self
    }

    pub fn clear(&mut self) -> &mut Self {
        self.fragments.clear();
        self.invalidate();
        self
    }

    #[inline]
    pub fn duplicate_full_policy(&self) -> DuplicateFullPolicy {
        self.config.duplicate_full
    }

    /// A copy of the fragment list, placeholders included
    pub fn fragments(&self) -> Vec<Option<Arc<Fragment>>> {
        self.fragments.clone()
    }

    /// Folds the fragments into one response.
    ///
    /// Returns the memoized fold if nothing was appended or cleared since the
    /// previous call; concurrent callers await the same fold, so no body is
    /// read twice.
    pub fn build(&self) -> BuildFuture {
        let mut memo = self.memo.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(build) = memo.as_ref() {
            trace!("reusing memoized build");
            return build.clone();
        }

        let fragments = self.fragments.iter().flatten().map(Arc::clone).collect::<Vec<_>>();
        let build = fold(Arc::clone(&self.config), fragments).boxed().shared();
        *memo = Some(build.clone());
        build
    }

    fn has_full(&self) -> bool {
        self.fragments.iter().flatten().any(|fragment| fragment.kind() == FragmentKind::Full)
    }

    fn invalidate(&mut self) {
        *self.memo.get_mut().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl fmt::Debug for ResponseBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let memoized = self.memo.lock().unwrap_or_else(PoisonError::into_inner).is_some();
        f.debug_struct("ResponseBuilder")
            .field("config", &self.config)
            .field("fragments", &self.fragments)
            .field("memoized", &memoized)
            .finish()
    }
}

impl Default for ResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

async fn fold(config: Arc<MergeConfig>, fragments: Vec<Arc<Fragment>>) -> Result<Arc<Fragment>, MergeError> {
    let full = fragments.iter().find(|fragment| fragment.kind() == FragmentKind::Full);

    let mut body: Option<Body> = None;
    let mut status: Option<StatusCode> = None;
    let mut status_text: Option<String> = None;
    let mut partial = true;

    if let Some(full) = full {
        if full.body_used() {
            return Err(MergeError::BodyAlreadyUsedInMerge);
        }
        body = read_body(&config, full).await;
        status = full.status();
        status_text = full.status_text().map(ToOwned::to_owned);
        partial = false;
    }

    let mut headers = HeaderMap::new();

    for fragment in &fragments {
        merge_headers(&config, &mut headers, fragment.headers());

        if fragment.kind() == FragmentKind::Full {
            partial = false;
        }

        if full.is_some() || body.is_some() || fragment.body_used() {
            continue;
        }

        let Some(adopted) = read_body(&config, fragment).await else {
            continue;
        };
        body = Some(adopted);

        if let Some(fragment_status) = fragment.status() {
            status = Some(fragment_status);
            status_text = fragment.status_text().map(ToOwned::to_owned);
        }
    }

    if let Some(processor) = &config.header_post_processor {
        headers = processor(headers);
    }

    let kind = if partial && config.prefer_partial_result { FragmentKind::Partial } else { FragmentKind::Full };
    debug!(?kind, ?status, has_body = body.is_some(), fragments = fragments.len(), "folded response fragments");

    Ok(Arc::new(Fragment::assemble(kind, headers, body, status, status_text)))
}

fn merge_headers(config: &MergeConfig, merged: &mut HeaderMap, headers: &HeaderMap) {
    for name in headers.keys() {
        if config.is_entity_header(name) {
            merged.remove(name);
        }
        for value in headers.get_all(name) {
            merged.append(name.clone(), value.clone());
        }
    }
}

/// Takes a fragment's body into a fresh one owned by the merged response.
///
/// Direct content is cloned and leaves the fragment's body unused, so a later
/// fold sees the same body again. Only stream bodies are read through the
/// consumption guard. Returns `None` when the fragment contributes no body: no
/// body at all, empty text, or a stream that is disabled or cannot be read.
async fn read_body(config: &MergeConfig, fragment: &Fragment) -> Option<Body> {
    let body = fragment.body()?;
    let capabilities = body.capabilities();

    if body.kind() != RepresentationKind::ByteStream {
        return body.direct_content().map(|representation| Body::with_capabilities(representation, capabilities));
    }

    if config.disable_stream_fallback {
        return None;
    }
    match body.as_stream().await {
        Ok(stream) => Some(Body::with_capabilities(stream, capabilities)),
        Err(e) => {
            warn!(cause = %e, "failed to read fragment body as stream, skipping it");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::ResponseInit;
    use bytes::Bytes;
    use futures::{StreamExt, stream};
    use http::HeaderValue;
    use http::header::{CONTENT_TYPE, LINK};
    use micro_body::BodyInit;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn link(value: &'static str) -> Fragment {
        Fragment::headers_only(header(LINK, value))
    }

    fn header(name: http::HeaderName, value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_static(value));
        headers
    }

    fn counted_stream(reads: Arc<AtomicUsize>) -> BodyInit {
        let chunks = stream::iter([Ok::<_, Infallible>(Bytes::from_static(b"streamed"))]).inspect(move |_| {
            reads.fetch_add(1, Ordering::SeqCst);
        });
        BodyInit::stream(chunks)
    }

    async fn text(fragment: &Fragment) -> String {
        fragment.body().expect("merged body").as_text().await.unwrap()
    }

    #[tokio::test]
    async fn full_fragment_with_partial_headers() {
        let mut builder = ResponseBuilder::new();
        builder.append(Fragment::full("A", ResponseInit::new().status(StatusCode::OK))).unwrap();
        builder.append(link("<.acl>; rel=acl")).unwrap();

        let response = builder.build().await.unwrap();

        assert_eq!(response.kind(), FragmentKind::Full);
        assert_eq!(response.status(), Some(StatusCode::OK));
        assert_eq!(response.headers().get(LINK).unwrap(), "<.acl>; rel=acl");
        assert_eq!(text(&response).await, "A");
    }

    #[tokio::test]
    async fn replace_policy_keeps_the_last_full_fragment() {
        let options = BuilderOptions { replace_subsequent_full: true, ..Default::default() };
        let mut builder = ResponseBuilder::with_options(options).unwrap();
        assert_eq!(builder.duplicate_full_policy(), DuplicateFullPolicy::Replace);

        builder
            .append_all([
                link("<.acl>; rel=acl"),
                link("<..>; rel=up"),
                Fragment::full("Hey! 1", ResponseInit::new()),
                link("<?page=2>; rel=next"),
                Fragment::full("Hey! 2", ResponseInit::new().status(StatusCode::CREATED).status_text("Second")),
            ])
            .unwrap();

        let response = builder.build().await.unwrap();
        let links = response.headers().get_all(LINK).iter().collect::<Vec<_>>();

        assert_eq!(links, vec!["<.acl>; rel=acl", "<..>; rel=up", "<?page=2>; rel=next"]);
        assert_eq!(response.headers().get_all(CONTENT_TYPE).iter().count(), 1);
        assert_eq!(response.status(), Some(StatusCode::CREATED));
        assert_eq!(response.status_text(), Some("Second"));
        assert_eq!(text(&response).await, "Hey! 2");
        assert_eq!(builder.fragments().len(), 4);
    }

    #[test]
    fn duplicate_full_fragment_is_an_error() {
        let mut builder = ResponseBuilder::new();
        builder.append(Fragment::full("one", ResponseInit::new())).unwrap();

        let error = builder.append(Fragment::full("two", ResponseInit::new())).unwrap_err();

        assert_eq!(error, MergeError::configuration("duplicate full response"));
        assert_eq!(builder.fragments().len(), 1);
    }

    #[tokio::test]
    async fn ignore_policy_keeps_the_first_full_fragment() {
        let options = BuilderOptions { ignore_subsequent_full: true, ..Default::default() };
        let mut builder = ResponseBuilder::with_options(options).unwrap();
        builder.append(Fragment::full("first", ResponseInit::new())).unwrap();
        builder.append(Fragment::full("second", ResponseInit::new())).unwrap();

        let response = builder.build().await.unwrap();

        assert_eq!(builder.fragments().len(), 1);
        assert_eq!(text(&response).await, "first");
    }

    #[test]
    fn conflicting_policies_fail_construction() {
        let options =
            BuilderOptions { ignore_subsequent_full: true, replace_subsequent_full: true, ..Default::default() };
        assert!(matches!(ResponseBuilder::with_options(options), Err(MergeError::Configuration { .. })));
    }

    #[tokio::test]
    async fn build_is_memoized_until_the_list_changes() {
        let reads = Arc::new(AtomicUsize::new(0));
        let mut builder = ResponseBuilder::new();
        builder.append(Fragment::full(counted_stream(Arc::clone(&reads)), ResponseInit::new())).unwrap();

        let first = builder.build().await.unwrap();
        assert_eq!(text(&first).await, "streamed");
        assert_eq!(reads.load(Ordering::SeqCst), 1);

        let second = builder.build().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rebuild_after_append_keeps_direct_bodies() {
        let mut partial = ResponseBuilder::new();
        partial.append(Fragment::partial("A", ResponseInit::new().status(StatusCode::ACCEPTED))).unwrap();
        let first = partial.build().await.unwrap();

        partial.with_headers([header(LINK, "<.acl>; rel=acl")]);
        let second = partial.build().await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.headers().contains_key(LINK));
        assert_eq!(second.status(), Some(StatusCode::ACCEPTED));
        assert_eq!(text(&first).await, "A");
        assert_eq!(text(&second).await, "A");

        let mut full = ResponseBuilder::new();
        full.append(Fragment::full("B", ResponseInit::new())).unwrap();
        full.build().await.unwrap();

        full.with_headers([header(LINK, "<..>; rel=up")]);
        let rebuilt = full.build().await.unwrap();

        assert_eq!(rebuilt.kind(), FragmentKind::Full);
        assert!(!full.fragments()[0].as_ref().unwrap().body_used());
        assert_eq!(text(&rebuilt).await, "B");
    }

    #[tokio::test]
    async fn rebuild_after_append_cannot_reread_a_full_stream() {
        let mut builder = ResponseBuilder::new();
        builder.append(Fragment::full(counted_stream(Arc::default()), ResponseInit::new())).unwrap();
        builder.build().await.unwrap();

        builder.append(link("<.acl>; rel=acl")).unwrap();
        assert_eq!(builder.build().await.unwrap_err(), MergeError::BodyAlreadyUsedInMerge);
    }

    #[tokio::test]
    async fn concurrent_builds_share_one_fold() {
        let reads = Arc::new(AtomicUsize::new(0));
        let mut builder = ResponseBuilder::new();
        builder.append(Fragment::partial(counted_stream(Arc::clone(&reads)), ResponseInit::new())).unwrap();

        let (left, right) = tokio::join!(builder.build(), builder.build());
        let (left, right) = (left.unwrap(), right.unwrap());

        assert!(Arc::ptr_eq(&left, &right));
        assert_eq!(text(&left).await, "streamed");
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn placeholders_are_recorded_but_do_not_invalidate() {
        let mut builder = ResponseBuilder::new();
        builder.append(Fragment::partial("body", ResponseInit::new())).unwrap();

        let first = builder.build().await.unwrap();
        builder.append(None::<Fragment>).unwrap();
        let second = builder.build().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        let fragments = builder.fragments();
        assert_eq!(fragments.len(), 2);
        assert!(fragments[1].is_none());
    }

    #[tokio::test]
    async fn full_fragment_with_used_body_fails_the_fold() {
        let full = Fragment::full("gone", ResponseInit::new());
        full.body().unwrap().as_text().await.unwrap();

        let mut builder = ResponseBuilder::new();
        builder.append(full).unwrap();

        assert_eq!(builder.build().await.unwrap_err(), MergeError::BodyAlreadyUsedInMerge);
    }

    #[tokio::test]
    async fn first_unused_partial_body_wins() {
        let used = Fragment::partial("used", ResponseInit::new().status(StatusCode::IM_A_TEAPOT));
        used.body().unwrap().as_text().await.unwrap();

        let mut builder = ResponseBuilder::new();
        builder
            .append_all([
                Fragment::partial((), ResponseInit::new().status(StatusCode::INTERNAL_SERVER_ERROR)),
                used,
                Fragment::partial("first", ResponseInit::new()),
                Fragment::partial("second", ResponseInit::new().status(StatusCode::NOT_FOUND)),
            ])
            .unwrap();

        let response = builder.build().await.unwrap();

        assert_eq!(response.kind(), FragmentKind::Partial);
        assert_eq!(response.status(), None);
        assert_eq!(text(&response).await, "first");
    }

    #[tokio::test]
    async fn status_comes_from_the_adopted_fragment() {
        let mut builder = ResponseBuilder::new();
        builder
            .append_all([
                Fragment::partial("adopted", ResponseInit::new().status(StatusCode::ACCEPTED).status_text("Queued")),
                Fragment::partial("later", ResponseInit::new().status(StatusCode::NOT_FOUND)),
            ])
            .unwrap();

        let response = builder.build().await.unwrap();

        assert_eq!(response.status(), Some(StatusCode::ACCEPTED));
        assert_eq!(response.status_text(), Some("Queued"));
    }

    #[tokio::test]
    async fn partial_result_can_be_disabled() {
        let options = BuilderOptions { prefer_partial_result: false, ..Default::default() };
        let mut builder = ResponseBuilder::with_options(options).unwrap();
        builder.append(Fragment::partial("only partial", ResponseInit::new())).unwrap();

        let response = builder.build().await.unwrap();

        assert_eq!(response.kind(), FragmentKind::Full);
        assert_eq!(response.status(), None);
    }

    #[tokio::test]
    async fn entity_headers_append_unless_replace_is_enabled() {
        let fragments = || {
            [
                Fragment::headers_only(header(CONTENT_TYPE, "text/html")),
                Fragment::headers_only(header(CONTENT_TYPE, "application/json")),
            ]
        };

        let mut appending = ResponseBuilder::new();
        appending.append_all(fragments()).unwrap();
        let response = appending.build().await.unwrap();
        assert_eq!(response.headers().get_all(CONTENT_TYPE).iter().count(), 2);

        let options = BuilderOptions { entity_header_replace: true, ..Default::default() };
        let mut replacing = ResponseBuilder::with_options(options).unwrap();
        replacing.append_all(fragments()).unwrap();
        let response = replacing.build().await.unwrap();
        let values = response.headers().get_all(CONTENT_TYPE).iter().collect::<Vec<_>>();
        assert_eq!(values, vec!["application/json"]);
    }

    #[tokio::test]
    async fn custom_entity_header_names_replace_only_those_headers() {
        let options = BuilderOptions {
            entity_header_replace: true,
            entity_header_names: vec!["link".into()],
            ..Default::default()
        };
        let mut builder = ResponseBuilder::with_options(options).unwrap();
        builder.with_headers([
            header(LINK, "<.acl>; rel=acl"),
            header(CONTENT_TYPE, "text/html"),
            header(LINK, "<..>; rel=up"),
            header(CONTENT_TYPE, "application/json"),
        ]);

        let response = builder.build().await.unwrap();

        let links = response.headers().get_all(LINK).iter().collect::<Vec<_>>();
        assert_eq!(links, vec!["<..>; rel=up"]);
        let types = response.headers().get_all(CONTENT_TYPE).iter().collect::<Vec<_>>();
        assert_eq!(types, vec!["text/html", "application/json"]);
    }

    #[test]
    fn append_all_stops_at_the_first_error() {
        let mut builder = ResponseBuilder::new();

        let result = builder.append_all([
            Fragment::full("one", ResponseInit::new()),
            link("<.acl>; rel=acl"),
            Fragment::full("two", ResponseInit::new()),
            link("<..>; rel=up"),
        ]);

        assert!(matches!(result, Err(MergeError::Configuration { .. })));
        let fragments = builder.fragments();
        assert_eq!(fragments.len(), 2);
        assert!(fragments[1].as_ref().unwrap().is_partial());
    }

    #[tokio::test]
    async fn post_processor_output_replaces_headers() {
        let options = BuilderOptions::new().header_post_processor(|_headers| header(LINK, "<processed>"));
        let mut builder = ResponseBuilder::with_options(options).unwrap();
        builder.with_headers([header(CONTENT_TYPE, "text/html"), header(LINK, "<original>")]);

        let response = builder.build().await.unwrap();

        assert_eq!(response.headers().len(), 1);
        assert_eq!(response.headers().get(LINK).unwrap(), "<processed>");
    }

    #[tokio::test]
    async fn stream_fallback_can_be_disabled() {
        let reads = Arc::new(AtomicUsize::new(0));
        let options = BuilderOptions { disable_stream_fallback: true, ..Default::default() };
        let mut builder = ResponseBuilder::with_options(options).unwrap();
        let fragment = Fragment::partial(counted_stream(Arc::clone(&reads)), ResponseInit::new());
        builder.append(fragment).unwrap();

        let response = builder.build().await.unwrap();

        assert!(response.body().is_none());
        assert!(!builder.fragments()[0].as_ref().unwrap().body_used());
        assert_eq!(reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn clear_resets_fragments_and_memo() {
        let mut builder = ResponseBuilder::new();
        builder.append(Fragment::full("full", ResponseInit::new())).unwrap();
        let first = builder.build().await.unwrap();

        builder.clear();
        assert!(builder.fragments().is_empty());

        // a full fragment may be appended again after clearing
        builder.append(Fragment::full("again", ResponseInit::new())).unwrap();
        let second = builder.build().await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(text(&second).await, "again");
    }
}
