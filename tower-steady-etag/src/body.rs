use std::{fmt, path::PathBuf};

use bytes::Bytes;

use crate::{eligibility::BodyKind, BoxError};

/// Per-session value mixed into the digest so that different sessions never
/// share a fingerprint for the same body.
///
/// Insert it as a request extension (e.g. from a session middleware) and the
/// [`SteadyEtag`](crate::SteadyEtag) service will pick it up.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct IdentitySeed(String);

impl IdentitySeed {
    pub fn new(seed: impl Into<String>) -> Self {
        Self(seed.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<String> for IdentitySeed {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for IdentitySeed {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

// never print session ids
impl fmt::Debug for IdentitySeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IdentitySeed(..)")
    }
}

/// Response extension marking the body as a file meant for sendfile-style
/// delivery by the transport. Such responses are never buffered or fingerprinted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sendfile(pub PathBuf);

/// Releases the resource behind an upstream body.
///
/// Taking `self` by value makes a second release impossible.
pub trait Release {
    fn release(self) -> Result<(), BoxError>;
}

impl Release for () {
    fn release(self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Adapts a closure into a [`Release`]
pub struct OnRelease<F>(pub F);

impl<F: FnOnce() -> Result<(), BoxError>> Release for OnRelease<F> {
    fn release(self) -> Result<(), BoxError> {
        (self.0)()
    }
}

/// Body as handed over by the upstream application.
#[derive(Debug)]
pub enum UpstreamBody<R = ()> {
    /// In-memory chunk sequence. `origin` is released once the emitted copy
    /// is done with.
    Chunks { chunks: Vec<Bytes>, origin: R },

    /// Non-bufferable resource, left to the transport as-is
    External(R),
}

impl UpstreamBody<()> {
    pub fn from_chunks<I, T>(chunks: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Bytes>,
    {
        Self::Chunks {
            chunks: chunks.into_iter().map(Into::into).collect(),
            origin: (),
        }
    }
}

impl<R> UpstreamBody<R> {
    pub fn kind(&self) -> BodyKind {
        match self {
            Self::Chunks { .. } => BodyKind::Chunks,
            Self::External(_) => BodyKind::External,
        }
    }
}

/// Body handed back to the caller.
#[derive(Debug)]
pub enum EmittedBody<R: Release = ()> {
    Chunks(EmittedChunks<R>),
    External(R),
}

impl<R: Release> EmittedBody<R> {
    /// Concatenation of all remaining chunks. Releases the origin.
    /// `None` for external bodies.
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Self::Chunks(chunks) => Some(chunks.flat_map(|c| c.to_vec()).collect()),
            Self::External(_) => None,
        }
    }
}

/// The original chunks, yielded back unchanged.
///
/// The origin is released exactly once: after the last chunk has been yielded,
/// on [`close`](Self::close), or on drop, whichever happens first.
pub struct EmittedChunks<R: Release> {
    chunks: std::vec::IntoIter<Bytes>,
    remaining: u64,
    origin: Option<R>,
}

impl<R: Release> EmittedChunks<R> {
    pub fn new(chunks: Vec<Bytes>, origin: R) -> Self {
        let remaining = chunks.iter().map(|c| c.len() as u64).sum();
        Self {
            chunks: chunks.into_iter(),
            remaining,
            origin: Some(origin),
        }
    }

    /// Number of bytes not yet yielded
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// True once every chunk has been yielded
    pub fn is_exhausted(&self) -> bool {
        self.chunks.len() == 0
    }

    pub fn is_released(&self) -> bool {
        self.origin.is_none()
    }

    /// Releases the origin without waiting for the remaining chunks.
    /// Safe to call more than once; only the first call releases.
    ///
    /// A failing release is logged and otherwise ignored.
    pub fn close(&mut self) {
        let Some(origin) = self.origin.take() else {
            return;
        };
        if let Err(e) = origin.release() {
            tracing::warn!(error = %e, "failed to release upstream response body");
        }
    }
}

impl<R: Release> Iterator for EmittedChunks<R> {
    type Item = Bytes;

    fn next(&mut self) -> Option<Self::Item> {
        match self.chunks.next() {
            Some(chunk) => {
                self.remaining -= chunk.len() as u64;
                Some(chunk)
            }
            None => {
                self.close();
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl<R: Release> Drop for EmittedChunks<R> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<R: Release> fmt::Debug for EmittedChunks<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmittedChunks")
            .field("chunks", &self.chunks.len())
            .field("remaining", &self.remaining)
            .field("released", &self.is_released())
            .finish()
    }
}
