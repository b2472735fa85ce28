use http::header::InvalidHeaderValue;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Raised by [`FingerprinterBuilder::build`](crate::FingerprinterBuilder::build).
/// Nothing in per-response processing fails once a [`Fingerprinter`](crate::Fingerprinter) exists.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid Cache-Control value {value:?}: {source}")]
    CacheControl {
        value: String,
        #[source]
        source: InvalidHeaderValue,
    },

    #[error("invalid scrub pattern: {0}")]
    ScrubPattern(#[from] regex::Error),

    #[error("invalid content type {0:?}")]
    ContentType(String),
}

// Error type must implement std::Error else axum will throw
// `the trait bound HandleError<...> is not satisfied`

#[derive(Debug, Error)]
pub enum SteadyEtagServiceError<InnerError, ResBodyError> {
    #[error("inner service error: {0}")]
    Inner(InnerError),

    #[error("failed to read response body: {0}")]
    ReadResBody(ResBodyError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_error_displays_source() {
        let err: SteadyEtagServiceError<&str, &str> = SteadyEtagServiceError::ReadResBody("reset");
        assert_eq!(err.to_string(), "failed to read response body: reset");
    }

    #[test]
    fn content_type_error_quotes_value() {
        let err = ConfigError::ContentType("text html".to_owned());
        assert_eq!(err.to_string(), "invalid content type \"text html\"");
    }

    #[test]
    fn errors_are_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ConfigError>();
        assert_send_sync::<SteadyEtagServiceError<BoxError, BoxError>>();
    }
}
