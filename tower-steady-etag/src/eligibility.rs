use http::{
    header::{ETAG, LAST_MODIFIED},
    HeaderMap, StatusCode,
};

/// Shape of a response body as far as the gate is concerned
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BodyKind {
    /// Sequence of in-memory chunks
    Chunks,

    /// Non-bufferable resource, e.g. a file for sendfile
    External,
}

/// Only fingerprint:
/// - 200 and 201 responses
/// - responses that dont already have an ETag or Last-Modified header, since
///   the application has taken over cache validation for those
/// - bodies that can be buffered
pub fn is_eligible(status: StatusCode, headers: &HeaderMap, body: BodyKind) -> bool {
    if !matches!(status, StatusCode::OK | StatusCode::CREATED) {
        return false;
    }
    if headers.contains_key(ETAG) || headers.contains_key(LAST_MODIFIED) {
        return false;
    }
    body == BodyKind::Chunks
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    #[test]
    fn only_ok_and_created_pass() {
        let headers = HeaderMap::new();
        assert!(is_eligible(StatusCode::OK, &headers, BodyKind::Chunks));
        assert!(is_eligible(StatusCode::CREATED, &headers, BodyKind::Chunks));
        for status in [
            StatusCode::ACCEPTED,
            StatusCode::NO_CONTENT,
            StatusCode::NOT_MODIFIED,
            StatusCode::UNAUTHORIZED,
            StatusCode::INTERNAL_SERVER_ERROR,
        ] {
            assert!(!is_eligible(status, &headers, BodyKind::Chunks), "{status}");
        }
    }

    #[test]
    fn preset_validators_fail() {
        let mut headers = HeaderMap::new();
        headers.insert("etag", HeaderValue::from_static("\"abc\""));
        assert!(!is_eligible(StatusCode::OK, &headers, BodyKind::Chunks));

        let mut headers = HeaderMap::new();
        headers.insert(
            "Last-Modified",
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert!(!is_eligible(StatusCode::OK, &headers, BodyKind::Chunks));
    }

    #[test]
    fn external_bodies_fail() {
        assert!(!is_eligible(
            StatusCode::OK,
            &HeaderMap::new(),
            BodyKind::External
        ));
    }
}
