use std::sync::Arc;

use crate::{
    policy::DEFAULT_CACHE_CONTROL, scrub::DEFAULT_SCRUBBABLE_CONTENT_TYPES, CachePolicy,
    ConfigError, ContentScrubber, Fingerprinter, ScrubRule, ScrubRules,
};

/// Builds an immutable [`Fingerprinter`]. Every knob starts at its default.
///
/// ```
/// use tower_steady_etag::Fingerprinter;
///
/// let fingerprinter = Fingerprinter::builder()
///     .digest_cache_control(Some("private, no-cache"))
///     .no_digest_cache_control(Some("no-store"))
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct FingerprinterBuilder {
    digest_cache_control: Option<String>,
    no_digest_cache_control: Option<String>,
    scrub_rules: Vec<Arc<dyn ScrubRule>>,
    scrubbable_content_types: Vec<String>,
}

impl Default for FingerprinterBuilder {
    fn default() -> Self {
        Self {
            digest_cache_control: Some(DEFAULT_CACHE_CONTROL.to_owned()),
            no_digest_cache_control: None,
            scrub_rules: ScrubRules::default().iter().cloned().collect(),
            scrubbable_content_types: DEFAULT_SCRUBBABLE_CONTENT_TYPES
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
        }
    }
}

impl FingerprinterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Cache-Control` set when a fingerprint was computed. `None` or empty sets nothing.
    pub fn digest_cache_control(mut self, value: Option<&str>) -> Self {
        self.digest_cache_control = value.map(str::to_owned);
        self
    }

    /// `Cache-Control` set when no fingerprint was computed. `None` or empty sets nothing.
    pub fn no_digest_cache_control(mut self, value: Option<&str>) -> Self {
        self.no_digest_cache_control = value.map(str::to_owned);
        self
    }

    /// Replaces the scrub rules, including the built-in ones
    pub fn scrub_rules(mut self, rules: Vec<Arc<dyn ScrubRule>>) -> Self {
        self.scrub_rules = rules;
        self
    }

    /// Appends a rule that runs after the ones already configured
    pub fn push_scrub_rule(mut self, rule: impl ScrubRule + 'static) -> Self {
        self.scrub_rules.push(Arc::new(rule));
        self
    }

    pub fn scrubbable_content_types<I, T>(mut self, content_types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.scrubbable_content_types = content_types.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> Result<Fingerprinter, ConfigError> {
        let policy = CachePolicy::new(
            self.digest_cache_control.as_deref(),
            self.no_digest_cache_control.as_deref(),
        )?;
        let scrubber = ContentScrubber::new(
            ScrubRules::new(self.scrub_rules),
            &self.scrubbable_content_types,
        )?;
        Ok(Fingerprinter::from_parts(policy, scrubber))
    }
}

/// Plain-data form of the builder's knobs, for loading from config files.
///
/// `extra_scrub_patterns` are byte regexes whose matches are removed, run
/// after the built-in rules.
#[cfg(feature = "serde")]
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub digest_cache_control: Option<String>,
    pub no_digest_cache_control: Option<String>,
    pub scrubbable_content_types: Vec<String>,
    pub extra_scrub_patterns: Vec<String>,
}

#[cfg(feature = "serde")]
impl Default for Settings {
    fn default() -> Self {
        Self {
            digest_cache_control: Some(DEFAULT_CACHE_CONTROL.to_owned()),
            no_digest_cache_control: None,
            scrubbable_content_types: DEFAULT_SCRUBBABLE_CONTENT_TYPES
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            extra_scrub_patterns: Vec::new(),
        }
    }
}

#[cfg(feature = "serde")]
impl Settings {
    pub fn into_builder(self) -> Result<FingerprinterBuilder, ConfigError> {
        let mut builder = FingerprinterBuilder::new()
            .digest_cache_control(self.digest_cache_control.as_deref())
            .no_digest_cache_control(self.no_digest_cache_control.as_deref())
            .scrubbable_content_types(self.scrubbable_content_types);
        for (i, pattern) in self.extra_scrub_patterns.iter().enumerate() {
            let rule = crate::PatternRule::removing(format!("extra-{i}"), pattern)?;
            builder = builder.push_scrub_rule(rule);
        }
        Ok(builder)
    }
}
