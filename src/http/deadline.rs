//! Response body bounded by the forward deadline.
//!
//! The deadline is fixed when forwarding starts and covers the whole exchange:
//! waiting for the response head and streaming the body. When it passes while
//! the body is still open, the stream ends with `DeadlineElapsed`.
//!
//! An optional finish hook runs exactly once, when the stream ends, fails, or
//! is dropped early by a disconnecting client.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use http_body::{Body, Frame, SizeHint};
use thiserror::Error;
use tokio::time::{Instant, Sleep};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The forward deadline passed before the body finished.
#[derive(Debug, Error)]
#[error("response not finished within {0:?}")]
pub struct DeadlineElapsed(pub Duration);

/// Body wrapper ending the stream at a fixed instant.
pub struct DeadlineBody<B> {
    inner: B,
    sleep: Pin<Box<Sleep>>,
    timeout: Duration,
    on_finish: Option<Box<dyn FnOnce() + Send>>,
}

impl<B> DeadlineBody<B> {
    /// Bound `inner` by `deadline`; `timeout` is only used in the error.
    pub fn new(inner: B, deadline: Instant, timeout: Duration) -> Self {
        Self {
            inner,
            sleep: Box::pin(tokio::time::sleep_until(deadline)),
            timeout,
            on_finish: None,
        }
    }

    /// Run `hook` once the stream is over, however it ends.
    pub fn on_finish(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_finish = Some(Box::new(hook));
        self
    }

    fn finish(&mut self) {
        if let Some(hook) = self.on_finish.take() {
            hook();
        }
    }
}

impl<B> Body for DeadlineBody<B>
where
    B: Body + Unpin,
    B::Error: Into<BoxError>,
{
    type Data = B::Data;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        if let Poll::Ready(frame) = Pin::new(&mut this.inner).poll_frame(cx) {
            return match frame {
                Some(Ok(frame)) => Poll::Ready(Some(Ok(frame))),
                Some(Err(e)) => {
                    this.finish();
                    Poll::Ready(Some(Err(e.into())))
                }
                None => {
                    this.finish();
                    Poll::Ready(None)
                }
            };
        }

        if this.sleep.as_mut().poll(cx).is_ready() {
            this.finish();
            return Poll::Ready(Some(Err(Box::new(DeadlineElapsed(this.timeout)))));
        }

        Poll::Pending
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B> Drop for DeadlineBody<B> {
    fn drop(&mut self) {
        self.finish();
    }
}
