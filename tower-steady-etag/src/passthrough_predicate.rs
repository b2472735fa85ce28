use crate::{eligibility::BodyKind, Sendfile};

pub trait PassthroughPredicate: Clone {
    /// Returns true if the given request should skip the SteadyEtag service
    /// entirely and only be processed by the inner service.
    /// The response of such a request gets no ETag and no Cache-Control default.
    fn should_passthrough_req<T>(&mut self, req: &http::Request<T>) -> bool;

    /// Returns true if the given inner service response shouldn't be buffered
    /// and fingerprinted. Its Cache-Control default is still applied.
    ///
    /// Only consulted for responses that pass
    /// [`is_eligible`](crate::eligibility::is_eligible): a predicate can
    /// exclude more responses, never re-admit ineligible ones.
    fn should_passthrough_resp<T>(&mut self, resp: &http::Response<T>) -> bool;
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct DefaultPredicate;

impl PassthroughPredicate for DefaultPredicate {
    /// Every request goes through the fingerprinter
    fn should_passthrough_req<T>(&mut self, _req: &http::Request<T>) -> bool {
        false
    }

    /// Every eligible response is fingerprinted
    fn should_passthrough_resp<T>(&mut self, _resp: &http::Response<T>) -> bool {
        false
    }
}

/// [`BodyKind::External`] if the response carries a [`Sendfile`] extension
pub fn response_body_kind<T>(resp: &http::Response<T>) -> BodyKind {
    if resp.extensions().get::<Sendfile>().is_some() {
        BodyKind::External
    } else {
        BodyKind::Chunks
    }
}
