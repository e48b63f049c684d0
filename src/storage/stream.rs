//! Content stream adapters.

use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use super::ByteStream;

/// Passes chunks through unchanged while checking that the stream carries
/// exactly `declared` bytes.
///
/// Yields an `InvalidData` error as soon as more bytes than declared arrive
/// and an `UnexpectedEof` error if the source ends early. Either error makes
/// the consuming upload fail instead of committing a truncated blob.
pub struct ExactLength {
    inner: ByteStream,
    declared: u64,
    seen: u64,
    done: bool,
}

impl ExactLength {
    pub fn new(inner: ByteStream, declared: u64) -> Self {
        Self {
            inner,
            declared,
            seen: 0,
            done: false,
        }
    }

    pub fn boxed(self) -> ByteStream {
        Box::pin(self)
    }
}

impl Stream for ExactLength {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        match ready!(self.inner.poll_next_unpin(cx)) {
            Some(Ok(chunk)) => {
                self.seen += chunk.len() as u64;
                if self.seen > self.declared {
                    self.done = true;
                    let msg = format!("body exceeds declared length of {} bytes", self.declared);
                    return Poll::Ready(Some(Err(io::Error::new(io::ErrorKind::InvalidData, msg))));
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Some(Err(err)) => {
                self.done = true;
                Poll::Ready(Some(Err(err)))
            }
            None => {
                self.done = true;
                if self.seen < self.declared {
                    let msg = format!(
                        "body ended after {} of {} declared bytes",
                        self.seen, self.declared
                    );
                    return Poll::Ready(Some(Err(io::Error::new(io::ErrorKind::UnexpectedEof, msg))));
                }
                Poll::Ready(None)
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Fails the stream with `TimedOut` when no chunk arrives within `idle`.
/// A slow source that keeps sending is never cut off.
pub fn idle_timeout(inner: ByteStream, idle: Duration) -> ByteStream {
    stream::unfold(Some(inner), move |state| async move {
        let mut inner = state?;
        match tokio::time::timeout(idle, inner.next()).await {
            Ok(Some(item)) => Some((item, Some(inner))),
            Ok(None) => None,
            Err(_) => {
                let msg = format!("no data received for {:?}", idle);
                Some((Err(io::Error::new(io::ErrorKind::TimedOut, msg)), None))
            }
        }
    })
    .boxed()
}
