//! Reads a file-backed stream body twice after exempting it from consumption.
//!
//! Run from the workspace root: `cargo run -p micro-body --example replay`

use micro_body::{Body, BodyInit};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let file = match File::open("Cargo.toml").await {
        Ok(file) => file,
        Err(e) => {
            error!(cause = %e, "failed to open Cargo.toml");
            return;
        }
    };

    let body = Body::new(BodyInit::stream(ReaderStream::new(file)));
    body.exempt_from_consumption();

    info!("reading body twice");
    let first = body.as_byte_buffer().await;
    let second = body.as_byte_buffer().await;

    match (first, second) {
        (Ok(first), Ok(second)) => {
            info!(len = first.len(), identical = first == second, "read body twice");
        }
        (Err(e), _) | (_, Err(e)) => error!(cause = %e, "failed to read body"),
    }
}
