//! HTTP body adapter for the streaming filter.
//!
//! [`FilteredBody`] wraps an upstream response body and drives a
//! [`StreamFilter`] over each data frame, emitting the filtered output as
//! new frames. Frames are forwarded as soon as the filter releases bytes;
//! nothing is held beyond what the filter itself must buffer to resolve a
//! partial element. Trailer frames are passed through after the filter's
//! tail. The filter is finalized on end-of-stream, so buffered bytes are
//! never leaked even when the array was truncated.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::HeaderMap;
use http_body::{Body, Frame, SizeHint};

use crate::error::BoxError;
use crate::filter::{ChunkQueueSink, RemovalFn, StreamFilter};

/// Response body that filters a named JSON array while streaming.
pub struct FilteredBody<B> {
    inner: B,
    filter: Option<StreamFilter<RemovalFn, ChunkQueueSink>>,
    /// Output released by finalize, drained after the inner stream ends.
    tail: VecDeque<Bytes>,
    /// Trailers held back until the filtered tail has been emitted.
    trailers: Option<HeaderMap>,
}

impl<B> FilteredBody<B> {
    /// Wrap `inner`, filtering through `filter`.
    pub fn new(inner: B, filter: StreamFilter<RemovalFn, ChunkQueueSink>) -> Self {
        Self {
            inner,
            filter: Some(filter),
            tail: VecDeque::new(),
            trailers: None,
        }
    }
}

impl<B> Body for FilteredBody<B>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        loop {
            // Drain output the filter has already released.
            if let Some(filter) = this.filter.as_mut() {
                if let Some(chunk) = filter.sink_mut().pop_chunk() {
                    return Poll::Ready(Some(Ok(Frame::data(chunk))));
                }
            } else {
                if let Some(chunk) = this.tail.pop_front() {
                    return Poll::Ready(Some(Ok(Frame::data(chunk))));
                }
                if let Some(trailers) = this.trailers.take() {
                    return Poll::Ready(Some(Ok(Frame::trailers(trailers))));
                }
                return Poll::Ready(None);
            }

            match Pin::new(&mut this.inner).poll_frame(cx) {
                Poll::Ready(Some(Ok(frame))) => match frame.into_data() {
                    Ok(data) => {
                        let filter = this
                            .filter
                            .as_mut()
                            .expect("filter present while inner stream is active");
                        if let Err(e) = filter.consume(&data) {
                            this.filter = None;
                            return Poll::Ready(Some(Err(e.into())));
                        }
                    }
                    Err(frame) => {
                        if let Ok(trailers) = frame.into_trailers() {
                            this.trailers = Some(trailers);
                        }
                    }
                },
                Poll::Ready(Some(Err(e))) => {
                    // Inner stream failed; drop filter state, propagate.
                    this.filter = None;
                    this.tail.clear();
                    return Poll::Ready(Some(Err(e.into())));
                }
                Poll::Ready(None) => {
                    let filter = this
                        .filter
                        .take()
                        .expect("filter present while inner stream is active");
                    match filter.finalize() {
                        Ok(mut sink) => {
                            while let Some(chunk) = sink.pop_chunk() {
                                this.tail.push_back(chunk);
                            }
                        }
                        Err(e) => return Poll::Ready(Some(Err(e.into()))),
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.filter.is_none() && self.tail.is_empty() && self.trailers.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        // Filtering can shrink the body; the final length is unknown until
        // the stream completes.
        SizeHint::default()
    }
}
