//! Rewrites per-request volatile markup (CSRF tokens, CSP nonces) out of the
//! bytes fed to the digest. The transmitted body is never touched.
//!
//! Matching runs on raw bytes with ASCII case folding, so chunks that are not
//! valid in their declared charset are matched as-is and never cause an error.
//!
//! Rules are applied per chunk. A volatile token split across two chunks is
//! not reassembled: each half is matched on its own, which for the script
//! nonce rule can pair an opening `nonce="` with a later closing quote. Chunk
//! boundary independence of the fingerprint only holds when no rule match
//! straddles a boundary.

use std::{borrow::Cow, collections::HashSet, fmt, sync::Arc};

use http::{header::CONTENT_TYPE, HeaderMap};
use lazy_static::lazy_static;
use regex::bytes::Regex;

use crate::ConfigError;

pub const DEFAULT_SCRUBBABLE_CONTENT_TYPES: [&str; 2] = ["text/html", "application/xhtml+xml"];

/// A single rewrite step over one body chunk.
pub trait ScrubRule: Send + Sync {
    /// Short name used in trace events
    fn name(&self) -> &str;

    /// Returns the chunk unchanged as [`Cow::Borrowed`] if nothing matched
    fn apply<'a>(&self, chunk: &'a [u8]) -> Cow<'a, [u8]>;
}

/// Replaces every match of a byte regex.
///
/// `replacement` supports `$1`/`${name}` group expansion like
/// [`Regex::replace_all`].
#[derive(Debug, Clone)]
pub struct PatternRule {
    name: String,
    regex: Regex,
    replacement: Vec<u8>,
}

impl PatternRule {
    pub fn new(
        name: impl Into<String>,
        pattern: &str,
        replacement: impl Into<Vec<u8>>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            name: name.into(),
            regex: Regex::new(pattern)?,
            replacement: replacement.into(),
        })
    }

    /// A rule that deletes every match
    pub fn removing(name: impl Into<String>, pattern: &str) -> Result<Self, ConfigError> {
        Self::new(name, pattern, Vec::new())
    }
}

impl ScrubRule for PatternRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply<'a>(&self, chunk: &'a [u8]) -> Cow<'a, [u8]> {
        self.regex.replace_all(chunk, self.replacement.as_slice())
    }
}

/// Arbitrary transform. The closure returns `None` to leave the chunk as-is.
pub struct TransformRule<F> {
    name: String,
    f: F,
}

impl<F: Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync> TransformRule<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F: Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync> ScrubRule for TransformRule<F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply<'a>(&self, chunk: &'a [u8]) -> Cow<'a, [u8]> {
        match (self.f)(chunk) {
            Some(rewritten) => Cow::Owned(rewritten),
            None => Cow::Borrowed(chunk),
        }
    }
}

impl<F> fmt::Debug for TransformRule<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformRule")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Ordered, immutable list of rules. Cheap to clone.
#[derive(Clone)]
pub struct ScrubRules(Arc<[Arc<dyn ScrubRule>]>);

impl ScrubRules {
    pub fn new(rules: Vec<Arc<dyn ScrubRule>>) -> Self {
        Self(rules.into())
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ScrubRule>> {
        self.0.iter()
    }

    /// Runs every rule in order, each on the previous rule's output
    pub fn apply<'a>(&self, chunk: &'a [u8]) -> Cow<'a, [u8]> {
        let mut out = Cow::Borrowed(chunk);
        for rule in self.0.iter() {
            let rewritten = match rule.apply(&out) {
                Cow::Owned(v) => Some(v),
                Cow::Borrowed(_) => None,
            };
            if let Some(v) = rewritten {
                tracing::trace!(rule = rule.name(), "scrub rule rewrote chunk");
                out = Cow::Owned(v);
            }
        }
        out
    }
}

impl Default for ScrubRules {
    fn default() -> Self {
        DEFAULT_RULES.clone()
    }
}

impl fmt::Debug for ScrubRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.0.iter().map(|r| r.name()))
            .finish()
    }
}

/// Matches a whole `<tag ...>` element whose `name` attribute equals `value`,
/// quoted with `"` or `'` or unquoted.
fn named_element_pattern(tag: &str, value: &str) -> String {
    let v = regex::escape(value);
    format!(r#"(?i-u)<{tag}\b[^>]*\bname\s*=\s*(?:"{v}"|'{v}'|{v})(?:[\s/][^>]*)?>"#)
}

/// Captures everything in a `<script>` tag up to the nonce value so it can be
/// kept while the value itself is blanked.
const SCRIPT_NONCE_PATTERN: &str =
    r#"(?i-u)(<script\b[^>]*?\snonce\s*=\s*)(?:"[^"]*"|'[^']*'|[^\s"'>]+)"#;

lazy_static! {
    static ref DEFAULT_RULES: ScrubRules = {
        let rules: Vec<Arc<dyn ScrubRule>> = vec![
            Arc::new(
                PatternRule::removing("csrf-token", &named_element_pattern("meta", "csrf-token"))
                    .expect("csrf-token pattern compiles"),
            ),
            Arc::new(
                PatternRule::removing("csp-nonce", &named_element_pattern("meta", "csp-nonce"))
                    .expect("csp-nonce pattern compiles"),
            ),
            Arc::new(
                PatternRule::removing(
                    "authenticity_token",
                    &named_element_pattern("input", "authenticity_token"),
                )
                .expect("authenticity_token pattern compiles"),
            ),
            Arc::new(
                PatternRule::new("script-nonce", SCRIPT_NONCE_PATTERN, &b"${1}\"\""[..])
                    .expect("script nonce pattern compiles"),
            ),
        ];
        ScrubRules::new(rules)
    };
}

/// Scrub rules plus the set of media types they apply to.
#[derive(Clone, Debug)]
pub struct ContentScrubber {
    rules: ScrubRules,
    content_types: HashSet<String>,
}

impl Default for ContentScrubber {
    fn default() -> Self {
        Self {
            rules: ScrubRules::default(),
            content_types: DEFAULT_SCRUBBABLE_CONTENT_TYPES
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
        }
    }
}

impl ContentScrubber {
    /// Content types are validated and lowercased; parameters such as
    /// `; charset=utf-8` are rejected since matching ignores them anyway.
    pub fn new<I, T>(rules: ScrubRules, content_types: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let content_types = content_types
            .into_iter()
            .map(|ct| normalize_content_type(ct.as_ref()))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            rules,
            content_types,
        })
    }

    pub fn rules(&self) -> &ScrubRules {
        &self.rules
    }

    pub fn content_types(&self) -> &HashSet<String> {
        &self.content_types
    }

    /// Returns the rules to run for a response with these headers, or `None`
    /// if its content type isn't scrubbable.
    pub fn rules_for(&self, headers: &HeaderMap) -> Option<ScrubRules> {
        if self.rules.is_empty() {
            return None;
        }
        let media_type = media_type(headers)?;
        self.content_types
            .contains(&media_type)
            .then(|| self.rules.clone())
    }
}

/// Lowercased media type of the `Content-Type` header, without parameters.
pub fn media_type(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CONTENT_TYPE)?.to_str().ok()?;
    let essence = value.split(';').next()?.trim();
    if essence.is_empty() {
        return None;
    }
    Some(essence.to_ascii_lowercase())
}

fn normalize_content_type(ct: &str) -> Result<String, ConfigError> {
    let trimmed = ct.trim();
    let valid = match trimmed.split_once('/') {
        Some((ty, subty)) => {
            !ty.is_empty()
                && !subty.is_empty()
                && trimmed
                    .bytes()
                    .all(|b| b.is_ascii_graphic() && b != b';' && b != b',')
        }
        None => false,
    };
    if !valid {
        return Err(ConfigError::ContentType(ct.to_owned()));
    }
    Ok(trimmed.to_ascii_lowercase())
}
