//! Implementation of `http_body::Body` for `SteadyEtagResBody`
//! for `ResBody` types that yield `bytes::Bytes` data.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};

use super::{SteadyEtagResBody, SteadyEtagResBodyProj};

impl<ResBody: Body<Data = Bytes>> Body for SteadyEtagResBody<ResBody> {
    /// Data has to be Bytes due to axum's blanket IntoResponse impl
    /// for Response<B: Body<Data = Bytes>>
    type Data = Bytes;

    type Error = ResBody::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            SteadyEtagResBodyProj::Buffered(b) => {
                if let Some(data) = b.next_data() {
                    return Poll::Ready(Some(Ok(Frame::data(data))));
                }
                Poll::Ready(b.take_trailers().map(|t| Ok(Frame::trailers(t))))
            }
            SteadyEtagResBodyProj::Passthrough(b) => b.poll_frame(cx),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Self::Buffered(b) => b.is_end_stream(),
            Self::Passthrough(b) => b.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            Self::Buffered(b) => SizeHint::with_exact(b.remaining()),
            Self::Passthrough(b) => b.size_hint(),
        }
    }
}
