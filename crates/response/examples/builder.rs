//! Merges link headers from partial fragments with the last of two full fragments.
//!
//! Run from the workspace root: `cargo run -p micro-response --example builder`

use bytes::Bytes;
use http::HeaderValue;
use http::header::LINK;
use micro_response::{BuilderOptions, Fragment, MergeError, ResponseBuilder, ResponseInit};
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

fn link(value: &'static str) -> Fragment {
    Fragment::partial((), ResponseInit::new().header(LINK, HeaderValue::from_static(value)))
}

async fn merge() -> Result<(), MergeError> {
    let options = BuilderOptions { replace_subsequent_full: true, ..Default::default() };
    let mut builder = ResponseBuilder::with_options(options)?;

    builder
        .append(link(r#"<.acl>; rel="acl""#))?
        .append(link(r#"<../>; rel="up""#))?
        .append(Fragment::full(Bytes::from_static(b"Hey! 1"), ResponseInit::new()))?
        .append(link(r#"<./next>; rel="next""#))?
        .append(Fragment::full(Bytes::from_static(b"Hey! 2"), ResponseInit::new()))?;

    let response = builder.build().await?;

    for (name, value) in response.headers() {
        info!("header: {name}: {value:?}");
    }
    if let Some(body) = response.body() {
        info!("body: {}", body.as_text().await?);
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = merge().await {
        error!(cause = %e, "failed to merge response fragments");
    }
}
