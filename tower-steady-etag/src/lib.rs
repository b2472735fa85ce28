//! Tower middleware that sets weak `ETag`s which stay the same across
//! requests whose HTML differs only in per-request tokens (CSRF meta tags,
//! CSP nonces, authenticity tokens), and defaults `Cache-Control` depending
//! on whether a fingerprint could be computed.
//!
//! [`Fingerprinter`] does the work on a plain in-memory response;
//! [`SteadyEtagLayer`] applies it to any `http_body::Body` response in a
//! tower stack.

use std::task::Poll;

use bytes::Bytes;
use http_body::Body;
use tower_service::Service;

mod body;
mod config;
mod digest;
mod err;
mod fingerprinter;
mod future;
mod layer;
mod policy;
mod response;

pub mod eligibility;
pub mod passthrough_predicate;
pub mod scrub;

pub use body::*;
pub use config::*;
pub use digest::*;
pub use err::*;
pub use fingerprinter::Fingerprinter;
pub use future::*;
pub use layer::*;
pub use passthrough_predicate::{DefaultPredicate, PassthroughPredicate};
pub use policy::*;
pub use response::*;
pub use scrub::{ContentScrubber, PatternRule, ScrubRule, ScrubRules, TransformRule};

#[derive(Clone, Debug)]
pub struct SteadyEtag<P, S> {
    fingerprinter: Fingerprinter,
    predicate: P,
    inner: S,
}

impl<P, S> SteadyEtag<P, S> {
    pub fn new(inner: S, fingerprinter: Fingerprinter, predicate: P) -> Self {
        Self {
            fingerprinter,
            predicate,
            inner,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<ReqBody, ResBody, P, S> Service<http::Request<ReqBody>> for SteadyEtag<P, S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>> + Clone,
    ResBody: Body<Data = Bytes>,
    P: PassthroughPredicate,
{
    type Response = http::Response<SteadyEtagResBody<ResBody>>;

    type Error = SteadyEtagServiceError<S::Error, ResBody::Error>;

    type Future = SteadyEtagFuture<ReqBody, ResBody, P, S>;

    /// `SteadyEtagFuture` poll_ready()s the inner service
    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<ReqBody>) -> Self::Future {
        if self.predicate.should_passthrough_req(&req) {
            return SteadyEtagFuture::passthrough(
                self.fingerprinter.clone(),
                self.predicate.clone(),
                self.inner.clone(),
                req,
            );
        }
        SteadyEtagFuture::start(
            self.fingerprinter.clone(),
            self.predicate.clone(),
            self.inner.clone(),
            req,
        )
    }
}
