use http::{
    header::{Entry, CACHE_CONTROL, ETAG},
    HeaderMap, HeaderName, HeaderValue,
};

use crate::{ConfigError, Fingerprint};

pub const DEFAULT_CACHE_CONTROL: &str = "max-age=0, private, must-revalidate";

/// Inserts `value` under `name` only if no value is present yet.
///
/// Returns true if the header was inserted.
pub fn set_default(headers: &mut HeaderMap, name: HeaderName, value: HeaderValue) -> bool {
    match headers.entry(name) {
        Entry::Occupied(_) => false,
        Entry::Vacant(v) => {
            v.insert(value);
            true
        }
    }
}

/// The two default `Cache-Control` directives, one for responses that got a
/// fingerprint and one for responses that didn't.
///
/// `None` means leave `Cache-Control` unset for that outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    digest: Option<HeaderValue>,
    no_digest: Option<HeaderValue>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            digest: Some(HeaderValue::from_static(DEFAULT_CACHE_CONTROL)),
            no_digest: None,
        }
    }
}

impl CachePolicy {
    /// Empty strings are treated the same as `None`
    pub fn new(digest: Option<&str>, no_digest: Option<&str>) -> Result<Self, ConfigError> {
        Ok(Self {
            digest: parse_directive(digest)?,
            no_digest: parse_directive(no_digest)?,
        })
    }

    pub fn digest(&self) -> Option<&HeaderValue> {
        self.digest.as_ref()
    }

    pub fn no_digest(&self) -> Option<&HeaderValue> {
        self.no_digest.as_ref()
    }

    /// Sets `ETag` from the fingerprint, if any and not already present, then
    /// defaults `Cache-Control` according to whether a fingerprint exists.
    ///
    /// Runs for every response, including ones that failed eligibility.
    pub fn resolve(&self, fingerprint: Option<&Fingerprint>, headers: &mut HeaderMap) {
        if let Some(fp) = fingerprint {
            set_default(headers, ETAG, fp.weak_etag());
        }
        let directive = match fingerprint {
            Some(_) => self.digest.as_ref(),
            None => self.no_digest.as_ref(),
        };
        if let Some(directive) = directive {
            set_default(headers, CACHE_CONTROL, directive.clone());
        }
    }
}

fn parse_directive(value: Option<&str>) -> Result<Option<HeaderValue>, ConfigError> {
    match value {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => HeaderValue::from_str(s)
            .map(Some)
            .map_err(|source| ConfigError::CacheControl {
                value: s.to_owned(),
                source,
            }),
    }
}
