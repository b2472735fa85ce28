use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};

use crate::{
    eligibility::{is_eligible, BodyKind},
    CachePolicy, ContentScrubber, DigestAccumulator, EmittedBody, EmittedChunks, Fingerprint,
    FingerprinterBuilder, IdentitySeed, Release, UpstreamBody,
};

#[derive(Debug)]
struct Config {
    policy: CachePolicy,
    scrubber: ContentScrubber,
}

/// Assigns weak ETags to responses and defaults their `Cache-Control`.
///
/// Holds only immutable configuration behind an `Arc`, so clones are cheap
/// and may be shared between concurrently processed responses.
#[derive(Clone, Debug)]
pub struct Fingerprinter(Arc<Config>);

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::from_parts(CachePolicy::default(), ContentScrubber::default())
    }
}

impl Fingerprinter {
    pub fn builder() -> FingerprinterBuilder {
        FingerprinterBuilder::new()
    }

    pub fn from_parts(policy: CachePolicy, scrubber: ContentScrubber) -> Self {
        Self(Arc::new(Config { policy, scrubber }))
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.0.policy
    }

    pub fn scrubber(&self) -> &ContentScrubber {
        &self.0.scrubber
    }

    /// A fresh accumulator for a response with these headers, scrubbing only
    /// if the content type allows it
    pub fn accumulator(
        &self,
        headers: &HeaderMap,
        seed: Option<&IdentitySeed>,
    ) -> DigestAccumulator {
        DigestAccumulator::new(seed.cloned(), self.0.scrubber.rules_for(headers))
    }

    /// Digest of the given chunks, as the body of a response with `headers`
    pub fn fingerprint<'c, I>(
        &self,
        headers: &HeaderMap,
        seed: Option<&IdentitySeed>,
        chunks: I,
    ) -> Option<Fingerprint>
    where
        I: IntoIterator<Item = &'c [u8]>,
    {
        let mut acc = self.accumulator(headers, seed);
        for chunk in chunks {
            acc.update(chunk);
        }
        acc.finalize()
    }

    /// Sets `ETag` and `Cache-Control` defaults on `headers` for the outcome
    pub fn resolve(&self, fingerprint: Option<&Fingerprint>, headers: &mut HeaderMap) {
        match fingerprint {
            Some(fp) => tracing::debug!(fingerprint = %fp, "response fingerprinted"),
            None => tracing::debug!("response not fingerprinted"),
        }
        self.0.policy.resolve(fingerprint, headers);
    }

    /// Runs the whole pipeline over one response.
    ///
    /// The emitted body yields exactly the upstream chunks. For chunked bodies
    /// the upstream `origin` is released once the emitted chunks are consumed,
    /// closed or dropped.
    pub fn process<R: Release>(
        &self,
        resp: http::Response<UpstreamBody<R>>,
        seed: Option<&IdentitySeed>,
    ) -> http::Response<EmittedBody<R>> {
        let (mut parts, body) = resp.into_parts();
        let eligible = is_eligible(parts.status, &parts.headers, body.kind());
        let emitted = match body {
            UpstreamBody::Chunks { chunks, origin } => {
                let fingerprint = if eligible {
                    self.fingerprint(&parts.headers, seed, chunks.iter().map(Bytes::as_ref))
                } else {
                    log_skipped(parts.status, BodyKind::Chunks);
                    None
                };
                self.resolve(fingerprint.as_ref(), &mut parts.headers);
                EmittedBody::Chunks(EmittedChunks::new(chunks, origin))
            }
            UpstreamBody::External(origin) => {
                log_skipped(parts.status, BodyKind::External);
                self.resolve(None, &mut parts.headers);
                EmittedBody::External(origin)
            }
        };
        http::Response::from_parts(parts, emitted)
    }
}

pub(crate) fn log_skipped(status: StatusCode, body: BodyKind) {
    tracing::debug!(%status, ?body, "response not eligible for fingerprinting");
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use http::{
        header::{CACHE_CONTROL, CONTENT_TYPE, ETAG, LAST_MODIFIED},
        HeaderValue,
    };

    use super::*;
    use crate::{policy::DEFAULT_CACHE_CONTROL, OnRelease};

    const HELLO_ETAG: &str = "W/\"dffd6021bb2bd5b0af676290809ec3a5\"";

    fn response(
        status: u16,
        headers: &[(&str, &str)],
        chunks: &[&str],
    ) -> http::Response<UpstreamBody> {
        let mut builder = http::Response::builder().status(status);
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        let chunks = chunks.iter().map(|c| Bytes::copy_from_slice(c.as_bytes()));
        builder.body(UpstreamBody::from_chunks(chunks)).unwrap()
    }

    fn etag_of(fp: &Fingerprinter, resp: http::Response<UpstreamBody>) -> Option<HeaderValue> {
        fp.process(resp, None).headers().get(ETAG).cloned()
    }

    #[test]
    fn sets_etag_on_200_and_201() {
        let fp = Fingerprinter::default();
        for status in [200, 201] {
            let resp = fp.process(
                response(status, &[("Content-Type", "text/plain")], &["Hello, World!"]),
                None,
            );
            assert_eq!(resp.headers()[ETAG], HELLO_ETAG);
            assert_eq!(resp.headers()[CACHE_CONTROL], DEFAULT_CACHE_CONTROL);
        }
    }

    #[test]
    fn custom_digest_cache_control() {
        let fp = Fingerprinter::builder()
            .digest_cache_control(Some("public"))
            .build()
            .unwrap();
        let resp = fp.process(response(201, &[], &["Hello, World!"]), None);
        assert_eq!(resp.headers()[CACHE_CONTROL], "public");
    }

    #[test]
    fn empty_body_uses_no_digest_cache_control() {
        let fp = Fingerprinter::builder()
            .no_digest_cache_control(Some("no-cache"))
            .build()
            .unwrap();
        let resp = fp.process(response(200, &[("Content-Type", "text/plain")], &[]), None);
        assert!(!resp.headers().contains_key(ETAG));
        assert_eq!(resp.headers()[CACHE_CONTROL], "no-cache");
    }

    #[test]
    fn existing_cache_control_is_kept() {
        let fp = Fingerprinter::default();
        let resp = fp.process(
            response(201, &[("Cache-Control", "public")], &["Hello, World!"]),
            None,
        );
        assert_eq!(resp.headers()[CACHE_CONTROL], "public");
    }

    #[test]
    fn no_cache_control_when_both_policies_unset() {
        let fp = Fingerprinter::builder()
            .digest_cache_control(None)
            .no_digest_cache_control(None)
            .build()
            .unwrap();
        let resp = fp.process(response(200, &[], &["Hello, World!"]), None);
        assert!(resp.headers().get(CACHE_CONTROL).is_none());
        assert_eq!(resp.headers()[ETAG], HELLO_ETAG);
    }

    #[test]
    fn preset_etag_is_untouched() {
        let resp = Fingerprinter::default().process(
            response(200, &[("ETag", "\"abc\"")], &["Hello, World!"]),
            None,
        );
        assert_eq!(resp.headers()[ETAG], "\"abc\"");
        // no digest, so the no-digest policy (unset by default) applies
        assert!(resp.headers().get(CACHE_CONTROL).is_none());
    }

    #[test]
    fn last_modified_skips_etag() {
        let fp = Fingerprinter::default();
        let resp = response(
            200,
            &[("Last-Modified", "Wed, 21 Oct 2015 07:28:00 GMT")],
            &["Hello, World!"],
        );
        let resp = fp.process(resp, None);
        assert!(resp.headers().get(ETAG).is_none());
        assert_eq!(
            resp.headers()[LAST_MODIFIED],
            "Wed, 21 Oct 2015 07:28:00 GMT"
        );
    }

    #[test]
    fn non_200_still_gets_cache_control_default() {
        let fp = Fingerprinter::builder()
            .no_digest_cache_control(Some("no-store"))
            .build()
            .unwrap();
        let resp = fp.process(response(401, &[], &["Access denied."]), None);
        assert!(resp.headers().get(ETAG).is_none());
        assert_eq!(resp.headers()[CACHE_CONTROL], "no-store");
    }

    #[test]
    fn etag_set_even_with_no_cache() {
        let resp = Fingerprinter::default().process(
            response(
                200,
                &[("Cache-Control", "no-cache, must-revalidate")],
                &["Hello, World!"],
            ),
            None,
        );
        assert_eq!(resp.headers()[ETAG], HELLO_ETAG);
    }

    #[test]
    fn external_body_is_not_fingerprinted() {
        let resp = http::Response::builder()
            .status(200)
            .body(UpstreamBody::External(()))
            .unwrap();
        let resp = Fingerprinter::default().process(resp, None);
        assert!(resp.headers().get(ETAG).is_none());
        assert!(matches!(resp.body(), EmittedBody::External(())));
    }

    #[test]
    fn html_volatile_tokens_do_not_change_etag() {
        let fp = Fingerprinter::default();
        let page = |token: &str, nonce: &str| {
            let html = format!(
                r#"<html><head><meta name="csrf-token" content="{token}"><meta name='csp-nonce' content="{nonce}"><script nonce="{nonce}">go()</script></head><body><form><input type="hidden" name="authenticity_token" value="{token}"></form><p>Same</p></body></html>"#
            );
            response(200, &[("Content-Type", "text/html; charset=utf-8")], &[&html])
        };
        let a = etag_of(&fp, page("token-a", "nonce-a"));
        let b = etag_of(&fp, page("token-b", "nonce-b"));
        assert!(a.is_some());
        assert_eq!(a, b);
    }

    #[test]
    fn nonce_split_across_chunks_is_not_scrubbed() {
        let fp = Fingerprinter::default();
        let html = [("Content-Type", "text/html")];
        let page = |nonce: &str| {
            let head = format!(r#"<script nonce="{nonce}"#);
            response(200, &html, &[head.as_str(), r#"">go()</script>"#])
        };
        assert_ne!(etag_of(&fp, page("abc")), etag_of(&fp, page("xyz")));
    }

    #[test]
    fn html_content_changes_change_etag() {
        let fp = Fingerprinter::default();
        let html = [("Content-Type", "text/html")];
        assert_ne!(
            etag_of(&fp, response(200, &html, &["<p>one</p>"])),
            etag_of(&fp, response(200, &html, &["<p>two</p>"]))
        );
    }

    #[test]
    fn non_html_is_never_scrubbed() {
        let fp = Fingerprinter::default();
        let json = [("Content-Type", "application/json")];
        assert_ne!(
            etag_of(
                &fp,
                response(200, &json, &[r#"{"x":"<meta name="csrf-token" content="a">"}"#])
            ),
            etag_of(
                &fp,
                response(200, &json, &[r#"{"x":"<meta name="csrf-token" content="b">"}"#])
            )
        );
    }

    #[test]
    fn seed_changes_etag() {
        let fp = Fingerprinter::default();
        let a = IdentitySeed::new("session-a");
        let b = IdentitySeed::new("session-b");
        let tag = |seed: Option<&IdentitySeed>| {
            fp.process(response(200, &[], &["Hello, World!"]), seed)
                .headers()
                .get(ETAG)
                .cloned()
        };
        assert_ne!(tag(Some(&a)), tag(Some(&b)));
        assert_ne!(tag(Some(&a)), tag(None));
        assert_eq!(tag(Some(&a)), tag(Some(&a)));
    }

    #[test]
    fn emitted_body_matches_input() {
        let chunks = ["<meta name=\"csrf-token\" content=\"x\">", "", "<p>hi</p>"];
        let resp = Fingerprinter::default().process(
            response(200, &[("Content-Type", "text/html")], &chunks),
            None,
        );
        let EmittedBody::Chunks(emitted) = resp.into_body() else {
            panic!("expected chunks");
        };
        let emitted: Vec<Bytes> = emitted.collect();
        assert_eq!(emitted, chunks.map(Bytes::from));
    }

    #[test]
    fn closes_original_body_after_caller_closes() {
        let closed = Arc::new(AtomicUsize::new(0));
        let origin = {
            let closed = Arc::clone(&closed);
            OnRelease(move || {
                closed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };
        let resp = http::Response::builder()
            .status(200)
            .body(UpstreamBody::Chunks {
                chunks: vec![Bytes::from_static(b"data")],
                origin,
            })
            .unwrap();
        let resp = Fingerprinter::default().process(resp, None);
        assert_eq!(closed.load(Ordering::SeqCst), 0);

        let EmittedBody::Chunks(mut emitted) = resp.into_body() else {
            panic!("expected chunks");
        };
        emitted.close();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        drop(emitted);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn content_type_header_lookup_is_case_insensitive() {
        let fp = Fingerprinter::default();
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("TEXT/HTML"));
        let a = fp.fingerprint(&headers, None, [&br#"<meta name="csrf-token" content="1">"#[..]]);
        let b = fp.fingerprint(&headers, None, [&br#"<meta name="csrf-token" content="2">"#[..]]);
        assert_eq!(a, b);
    }
}
