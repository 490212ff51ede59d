//! Caller-owned handle over an open status stream.

use std::{
    fmt,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use futures::{
    Stream, StreamExt,
    stream::{self, BoxStream},
};
use tracing::debug;

use crate::{
    codec::{Frame, FrameDecoder},
    types::{StatusUpdate, WatchError},
};

/// An open status subscription.
///
/// Yields updates in the order the server sent them. After the first error
/// the stream terminates: it yields at most one `Err` and then `None`
/// forever. Dropping the stream, or calling [`StatusStream::close`], tears
/// down the underlying connection.
pub struct StatusStream {
    /// The decoding pipeline; `None` once closed or finished.
    inner: Option<BoxStream<'static, Result<StatusUpdate, WatchError>>>,
}

impl fmt::Debug for StatusStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusStream").field("closed", &self.is_closed()).finish()
    }
}

impl StatusStream {
    /// Wraps a response body stream.
    ///
    /// `decoder` carries the frame limit; `idle_timeout` bounds the wait for
    /// each body chunk.
    pub fn from_body<S, B, E>(
        body: S,
        decoder: FrameDecoder,
        idle_timeout: Option<Duration>,
    ) -> Self
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let state = Decoding {
            body: Box::pin(body),
            decoder,
            idle_timeout,
            eof: false,
            done: false,
        };
        let inner = stream::unfold(state, |mut state| async move {
            let item = state.next_update().await?;
            Some((item, state))
        });
        Self { inner: Some(inner.boxed()) }
    }

    /// Closes the stream. Subsequent polls return `None`.
    pub fn close(&mut self) {
        if self.inner.take().is_some() {
            debug!("status stream closed by caller");
        }
    }

    /// Returns true once the stream is closed or has terminated.
    pub const fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

impl Stream for StatusStream {
    type Item = Result<StatusUpdate, WatchError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        let poll = inner.poll_next_unpin(cx);
        if matches!(poll, Poll::Ready(None)) {
            this.inner = None;
        }
        poll
    }
}

/// Decoding state carried between stream items.
struct Decoding<B, E> {
    /// The raw response body.
    body: Pin<Box<dyn Stream<Item = Result<B, E>> + Send>>,
    /// Line decoder.
    decoder: FrameDecoder,
    /// Maximum wait for a single chunk.
    idle_timeout: Option<Duration>,
    /// Whether the body has ended.
    eof: bool,
    /// Whether the stream has terminated.
    done: bool,
}

impl<B, E> Decoding<B, E>
where
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    /// Produces the next stream item, terminating after end or error.
    async fn next_update(&mut self) -> Option<Result<StatusUpdate, WatchError>> {
        if self.done {
            return None;
        }
        match self.advance().await {
            Ok(Some(update)) => Some(Ok(update)),
            Ok(None) => {
                self.done = true;
                debug!("status stream ended");
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }

    /// Reads until a full update, a clean end, or a failure.
    async fn advance(&mut self) -> Result<Option<StatusUpdate>, WatchError> {
        loop {
            if let Some(frame) = self.decoder.next_frame()? {
                return Self::on_frame(frame);
            }
            if self.eof {
                return match self.decoder.finish()? {
                    Some(frame) => Self::on_frame(frame),
                    None => Ok(None),
                };
            }
            match self.read_chunk().await? {
                Some(chunk) => self.decoder.push(chunk.as_ref()),
                None => self.eof = true,
            }
        }
    }

    /// Waits for the next body chunk, honouring the idle timeout.
    async fn read_chunk(&mut self) -> Result<Option<B>, WatchError> {
        let next = match self.idle_timeout {
            Some(limit) => tokio::time::timeout(limit, self.body.next())
                .await
                .map_err(|_elapsed| WatchError::Timeout(limit))?,
            None => self.body.next().await,
        };
        next.transpose().map_err(|e| WatchError::Stream(e.to_string()))
    }

    fn on_frame(frame: Frame) -> Result<Option<StatusUpdate>, WatchError> {
        match frame {
            Frame::Update(update) => Ok(Some(update)),
            Frame::Status(status) => {
                debug!(
                    code = status.code,
                    details = %status.details,
                    metadata = ?status.metadata,
                    "received stream status"
                );
                status.into_result().map(|()| None)
            }
        }
    }
}
