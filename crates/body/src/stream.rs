use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use http_body::{Body as HttpBody, Frame};
use tracing::trace;

use crate::replay::ReplayStream;
use crate::representation::ByteStream;

/// The byte stream handed out by [`Body::as_stream`](crate::Body::as_stream).
///
/// Depending on the body's consumption state this is either the original
/// source, handed over exactly once, or a replay of the buffered source.
/// It implements both [`Stream`] and [`http_body::Body`].
pub struct BodyStream {
    inner: Kind,
}

enum Kind {
    Source(ByteStream),
    Replay(ReplayStream),
}

impl BodyStream {
    pub(crate) fn source(stream: ByteStream) -> Self {
        Self { inner: Kind::Source(stream) }
    }

    pub(crate) fn replay(stream: ReplayStream) -> Self {
        Self { inner: Kind::Replay(stream) }
    }

    /// Returns true if this stream replays buffered chunks
    #[inline]
    pub fn is_replay(&self) -> bool {
        matches!(self.inner, Kind::Replay(_))
    }

    /// Reads the remaining chunks into one contiguous buffer
    pub async fn drain(mut self) -> io::Result<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.next().await {
            buf.extend_from_slice(&chunk?);
        }
        trace!(len = buf.len(), replay = self.is_replay(), "drained body stream");
        Ok(buf.freeze())
    }
}

impl fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyStream").field("replay", &self.is_replay()).finish()
    }
}

impl Stream for BodyStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match &mut self.get_mut().inner {
            Kind::Source(stream) => stream.as_mut().poll_next(cx),
            Kind::Replay(stream) => Pin::new(stream).poll_next(cx),
        }
    }
}

impl HttpBody for BodyStream {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        self.poll_next(cx).map(|item| item.map(|chunk| chunk.map(Frame::data)))
    }
}
