//! Folding partial and full response fragments into one response.
//!
//! Several layers of an application may each contribute part of a response:
//! one adds `Link` headers, another supplies the body, a third decides the
//! status. Each contribution is a [`Fragment`], and a [`ResponseBuilder`]
//! folds an ordered list of them into a single merged fragment.
//!
//! # Example
//!
//! ```
//! use http::header::LINK;
//! use http::{HeaderValue, StatusCode};
//! use micro_response::{Fragment, ResponseBuilder, ResponseInit};
//!
//! # futures::executor::block_on(async {
//! let mut builder = ResponseBuilder::new();
//! builder.append(Fragment::full("hello", ResponseInit::new().status(StatusCode::OK))).unwrap();
//! builder
//!     .append(Fragment::partial((), ResponseInit::new().header(LINK, HeaderValue::from_static("<.acl>; rel=acl"))))
//!     .unwrap();
//!
//! let response = builder.build().await.unwrap();
//! assert_eq!(response.status(), Some(StatusCode::OK));
//! assert!(response.headers().contains_key(LINK));
//! assert_eq!(response.body().unwrap().as_text().await.unwrap(), "hello");
//! # });
//! ```
//!
//! # Duplicate full fragments
//!
//! At most one Full fragment survives in a builder. What happens to a second
//! one is decided by [`BuilderOptions`]: by default appending it fails with
//! [`MergeError::Configuration`]; `ignore_subsequent_full` drops it and
//! `replace_subsequent_full` removes the earlier ones instead.

mod builder;
mod error;
mod fragment;
mod options;

pub use builder::{BuildFuture, ResponseBuilder};
pub use error::MergeError;
pub use fragment::{Fragment, FragmentKind, ResponseInit};
pub use options::{BuilderOptions, DuplicateFullPolicy, HeaderProcessor};
