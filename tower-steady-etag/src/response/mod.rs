use std::{fmt, pin::Pin};

use bytes::Bytes;
use http::HeaderMap;
use pin_project::pin_project;

use crate::{BoxError, EmittedChunks, Release};

mod http_body_impl;

/// `http::Response` body type of [`SteadyEtag`](crate::SteadyEtag)
#[pin_project(project = SteadyEtagResBodyProj)]
pub enum SteadyEtagResBody<ResBody> {
    /// The upstream frames, collected while fingerprinting and replayed as-is
    Buffered(BufferedBody<ResBody>),

    /// Streamed straight from the upstream body
    Passthrough(#[pin] ResBody),
}

impl<ResBody> SteadyEtagResBody<ResBody> {
    pub fn passthrough_resp(resp: http::Response<ResBody>) -> http::Response<Self> {
        let (parts, body) = resp.into_parts();
        http::Response::from_parts(parts, Self::Passthrough(body))
    }
}

/// Drained upstream body, kept alive until the replayed frames are done with
pub struct Drained<ResBody>(Pin<Box<ResBody>>);

impl<ResBody> Drained<ResBody> {
    pub fn new(body: Pin<Box<ResBody>>) -> Self {
        Self(body)
    }
}

impl<ResBody> Release for Drained<ResBody> {
    fn release(self) -> Result<(), BoxError> {
        drop(self.0);
        Ok(())
    }
}

pub struct BufferedBody<ResBody> {
    data: EmittedChunks<Drained<ResBody>>,
    trailers: Option<HeaderMap>,
}

impl<ResBody> BufferedBody<ResBody> {
    pub fn new(data: Vec<Bytes>, trailers: Option<HeaderMap>, origin: Drained<ResBody>) -> Self {
        Self {
            data: EmittedChunks::new(data, origin),
            trailers,
        }
    }

    pub(crate) fn next_data(&mut self) -> Option<Bytes> {
        self.data.next()
    }

    pub(crate) fn take_trailers(&mut self) -> Option<HeaderMap> {
        self.trailers.take()
    }

    pub(crate) fn remaining(&self) -> u64 {
        self.data.remaining()
    }

    pub(crate) fn is_end_stream(&self) -> bool {
        self.data.is_exhausted() && self.trailers.is_none()
    }
}

impl<ResBody> fmt::Debug for BufferedBody<ResBody> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedBody")
            .field("data", &self.data)
            .field("trailers", &self.trailers.is_some())
            .finish()
    }
}
