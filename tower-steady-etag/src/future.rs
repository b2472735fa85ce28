use std::{
    future::Future,
    mem,
    pin::Pin,
    task::{ready, Context, Poll},
};

use bytes::Bytes;
use http::HeaderMap;
use http_body::Body;
use pin_project::pin_project;
use tower_service::Service;

use crate::{
    eligibility::is_eligible, fingerprinter::log_skipped, passthrough_predicate::response_body_kind, BufferedBody,
    DigestAccumulator, Drained, Fingerprinter, IdentitySeed, PassthroughPredicate,
    SteadyEtagResBody, SteadyEtagServiceError,
};

const POLLED_AFTER_COMPLETION: &str = "SteadyEtagFuture polled after completion";

#[pin_project]
pub struct SteadyEtagFuture<
    ReqBody,
    ResBody,
    P,
    S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>,
> {
    fingerprinter: Fingerprinter,
    predicate: P,
    inner: S,
    seed: Option<IdentitySeed>,
    #[pin]
    state: SteadyEtagFutureState<ReqBody, ResBody, S>,
}

impl<
        ReqBody,
        ResBody,
        P,
        S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>,
    > SteadyEtagFuture<ReqBody, ResBody, P, S>
{
    pub fn start(
        fingerprinter: Fingerprinter,
        predicate: P,
        inner: S,
        req: http::Request<ReqBody>,
    ) -> Self {
        let seed = req.extensions().get::<IdentitySeed>().cloned();
        Self {
            fingerprinter,
            predicate,
            inner,
            seed,
            state: SteadyEtagFutureState::InnerBefore {
                passthrough: false,
                req: Some(req),
            },
        }
    }

    /// Only the inner service is called; the response is returned untouched
    pub fn passthrough(
        fingerprinter: Fingerprinter,
        predicate: P,
        inner: S,
        req: http::Request<ReqBody>,
    ) -> Self {
        Self {
            fingerprinter,
            predicate,
            inner,
            seed: None,
            state: SteadyEtagFutureState::InnerBefore {
                passthrough: true,
                req: Some(req),
            },
        }
    }
}

// using options just to take() and move fields to next state easily
#[pin_project(project = SteadyEtagFutureStateProj)]
pub enum SteadyEtagFutureState<ReqBody, ResBody, S: Service<http::Request<ReqBody>>> {
    InnerBefore {
        passthrough: bool,
        req: Option<http::Request<ReqBody>>,
    },
    Inner {
        passthrough: bool,
        #[pin]
        fut: S::Future,
    },
    /// Reading the upstream body frame by frame, digesting data as it arrives
    Collect {
        parts: Option<http::response::Parts>,
        body: Option<Pin<Box<ResBody>>>,
        chunks: Vec<Bytes>,
        trailers: Option<HeaderMap>,
        accumulator: Option<DigestAccumulator>,
    },
    Done,
}

impl<ReqBody, ResBody, P, S> Future for SteadyEtagFuture<ReqBody, ResBody, P, S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>,
    ResBody: Body<Data = Bytes>,
    P: PassthroughPredicate,
{
    type Output = Result<
        http::Response<SteadyEtagResBody<ResBody>>,
        SteadyEtagServiceError<S::Error, ResBody::Error>,
    >;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();

        loop {
            match this.state.as_mut().project() {
                SteadyEtagFutureStateProj::InnerBefore { passthrough, req } => {
                    if let Err(e) = ready!(this.inner.poll_ready(cx)) {
                        this.state.set(SteadyEtagFutureState::Done);
                        return Poll::Ready(Err(SteadyEtagServiceError::Inner(e)));
                    }
                    let passthrough = *passthrough;
                    let fut = this.inner.call(req.take().expect(POLLED_AFTER_COMPLETION));
                    this.state
                        .set(SteadyEtagFutureState::Inner { passthrough, fut });
                }
                SteadyEtagFutureStateProj::Inner { passthrough, fut } => {
                    let result = ready!(fut.poll(cx));
                    let passthrough = *passthrough;
                    this.state.set(SteadyEtagFutureState::Done);
                    let resp = match result {
                        Ok(r) => r,
                        Err(e) => return Poll::Ready(Err(SteadyEtagServiceError::Inner(e))),
                    };
                    if passthrough {
                        return Poll::Ready(Ok(SteadyEtagResBody::passthrough_resp(resp)));
                    }
                    let body_kind = response_body_kind(&resp);
                    if !is_eligible(resp.status(), resp.headers(), body_kind)
                        || this.predicate.should_passthrough_resp(&resp)
                    {
                        log_skipped(resp.status(), body_kind);
                        let mut resp = SteadyEtagResBody::passthrough_resp(resp);
                        this.fingerprinter.resolve(None, resp.headers_mut());
                        return Poll::Ready(Ok(resp));
                    }
                    let (parts, body) = resp.into_parts();
                    let accumulator = this
                        .fingerprinter
                        .accumulator(&parts.headers, this.seed.as_ref());
                    this.state.set(SteadyEtagFutureState::Collect {
                        parts: Some(parts),
                        body: Some(Box::pin(body)),
                        chunks: Vec::new(),
                        trailers: None,
                        accumulator: Some(accumulator),
                    });
                }
                SteadyEtagFutureStateProj::Collect {
                    parts,
                    body,
                    chunks,
                    trailers,
                    accumulator,
                } => {
                    let upstream = body.as_mut().expect(POLLED_AFTER_COMPLETION);
                    match ready!(upstream.as_mut().poll_frame(cx)) {
                        Some(Ok(frame)) => match frame.into_data() {
                            Ok(data) => {
                                if let Some(acc) = accumulator.as_mut() {
                                    acc.update(&data);
                                }
                                chunks.push(data);
                            }
                            Err(frame) => {
                                if let Ok(t) = frame.into_trailers() {
                                    trailers.get_or_insert_with(HeaderMap::new).extend(t);
                                }
                            }
                        },
                        Some(Err(e)) => {
                            this.state.set(SteadyEtagFutureState::Done);
                            return Poll::Ready(Err(SteadyEtagServiceError::ReadResBody(e)));
                        }
                        None => {
                            let mut parts = parts.take().expect(POLLED_AFTER_COMPLETION);
                            let fingerprint =
                                accumulator.take().and_then(DigestAccumulator::finalize);
                            this.fingerprinter
                                .resolve(fingerprint.as_ref(), &mut parts.headers);
                            let buffered = BufferedBody::new(
                                mem::take(chunks),
                                trailers.take(),
                                Drained::new(body.take().expect(POLLED_AFTER_COMPLETION)),
                            );
                            this.state.set(SteadyEtagFutureState::Done);
                            return Poll::Ready(Ok(http::Response::from_parts(
                                parts,
                                SteadyEtagResBody::Buffered(buffered),
                            )));
                        }
                    }
                }
                SteadyEtagFutureStateProj::Done => panic!("{}", POLLED_AFTER_COMPLETION),
            }
        }
    }
}
