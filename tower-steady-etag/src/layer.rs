use tower_layer::Layer;

use crate::{DefaultPredicate, Fingerprinter, SteadyEtag};

/// Applies [`SteadyEtag`] to services
#[derive(Clone, Debug, Default)]
pub struct SteadyEtagLayer<P = DefaultPredicate> {
    fingerprinter: Fingerprinter,
    predicate: P,
}

impl SteadyEtagLayer {
    pub fn new(fingerprinter: Fingerprinter) -> Self {
        Self::with_predicate(fingerprinter, DefaultPredicate)
    }
}

impl<P> SteadyEtagLayer<P> {
    pub fn with_predicate(fingerprinter: Fingerprinter, predicate: P) -> Self {
        Self {
            fingerprinter,
            predicate,
        }
    }
}

impl<P: Clone, S> Layer<S> for SteadyEtagLayer<P> {
    type Service = SteadyEtag<P, S>;

    fn layer(&self, inner: S) -> Self::Service {
        SteadyEtag::new(inner, self.fingerprinter.clone(), self.predicate.clone())
    }
}
