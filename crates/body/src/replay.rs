//! Multi-read support for one-shot byte streams.
//!
//! A [`ReplayBuffer`] owns the source stream of an exempted body. Readers pull
//! through it: whichever reader is furthest ahead polls the source, the chunk
//! is appended to the buffer and every reader then sees it at its own position.
//! The source is therefore drained exactly once, no matter how many readers
//! exist or how they interleave.
//!
//! Readers that are waiting for data register their wakers in a shared
//! [`WakerSet`]; the source is always polled with a waker that fans out to the
//! whole set, so a chunk pulled on behalf of one reader wakes all of them.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, Waker};

use bytes::Bytes;
use futures::Stream;
use futures::task::{ArcWake, waker_ref};
use tracing::{debug, trace};

use crate::representation::ByteStream;

pub(crate) struct ReplayBuffer {
    state: Mutex<ReplayState>,
    wakers: Arc<WakerSet>,
}

struct ReplayState {
    source: Option<ByteStream>,
    chunks: Vec<Bytes>,
    failure: Option<(io::ErrorKind, String)>,
    exhausted: bool,
}

impl ReplayBuffer {
    pub(crate) fn new(source: ByteStream) -> Arc<Self> {
        debug!("acquired replay buffer for body stream");
        Arc::new(Self {
            state: Mutex::new(ReplayState {
                source: Some(source),
                chunks: Vec::new(),
                failure: None,
                exhausted: false,
            }),
            wakers: Arc::new(WakerSet::default()),
        })
    }

    /// Creates a reader positioned at the first chunk
    pub(crate) fn reader(self: &Arc<Self>) -> ReplayStream {
        ReplayStream { buffer: Arc::clone(self), position: 0, finished: false }
    }

    fn poll_chunk(&self, position: usize, cx: &mut Context<'_>) -> Poll<Option<io::Result<Bytes>>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        loop {
            if let Some(chunk) = state.chunks.get(position) {
                return Poll::Ready(Some(Ok(chunk.clone())));
            }

            if state.exhausted {
                let failure = state.failure.as_ref().map(|(kind, message)| Err(io::Error::new(*kind, message.clone())));
                return Poll::Ready(failure);
            }

            let Some(source) = state.source.as_mut() else {
                state.exhausted = true;
                continue;
            };

            self.wakers.register(cx.waker());
            let waker = waker_ref(&self.wakers);
            let mut source_cx = Context::from_waker(&waker);

            match source.as_mut().poll_next(&mut source_cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(chunk))) => {
                    trace!(len = chunk.len(), position = state.chunks.len(), "buffered replay chunk");
                    state.chunks.push(chunk);
                }
                Poll::Ready(Some(Err(e))) => {
                    debug!(cause = %e, "replay source failed");
                    state.failure = Some((e.kind(), e.to_string()));
                    state.source = None;
                    state.exhausted = true;
                }
                Poll::Ready(None) => {
                    debug!(chunks = state.chunks.len(), "replay source exhausted");
                    state.source = None;
                    state.exhausted = true;
                }
            }

            self.wakers.wake_all();
        }
    }
}

#[derive(Default)]
struct WakerSet {
    wakers: Mutex<Vec<Waker>>,
}

impl WakerSet {
    fn register(&self, waker: &Waker) {
        let mut wakers = self.wakers.lock().unwrap_or_else(PoisonError::into_inner);
        if !wakers.iter().any(|registered| registered.will_wake(waker)) {
            wakers.push(waker.clone());
        }
    }

    fn wake_all(&self) {
        let wakers = std::mem::take(&mut *self.wakers.lock().unwrap_or_else(PoisonError::into_inner));
        for waker in wakers {
            waker.wake();
        }
    }
}

impl ArcWake for WakerSet {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.wake_all();
    }
}

/// One replay of a buffered body stream.
pub(crate) struct ReplayStream {
    buffer: Arc<ReplayBuffer>,
    position: usize,
    finished: bool,
}

impl Stream for ReplayStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        match this.buffer.poll_chunk(this.position, cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.position += 1;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(other) => {
                this.finished = true;
                Poll::Ready(other)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
