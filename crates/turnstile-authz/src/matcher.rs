use crate::{LicenseError, LicenseResult};
use regex::Regex;

/// How an expected `iss` or `aud` value is compared.
///
/// Some deployments pin a single audience string, others accept a family of
/// equivalent identifiers; the variant makes the caller pick one explicitly.
#[derive(Debug, Clone)]
pub enum ClaimMatcher {
    Exact(String),
    /// Anchored: the whole claim value must match.
    Pattern(Regex),
}

impl ClaimMatcher {
    pub fn exact(value: impl Into<String>) -> Self {
        ClaimMatcher::Exact(value.into())
    }

    /// Compile `pattern` so that it must match the entire claim value.
    pub fn pattern(pattern: &str) -> LicenseResult<Self> {
        let anchored = format!("^(?:{pattern})$");
        let regex = Regex::new(&anchored)
            .map_err(|err| LicenseError::InvalidClaim(format!("invalid pattern {pattern:?}: {err}")))?;
        Ok(ClaimMatcher::Pattern(regex))
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            ClaimMatcher::Exact(expected) => expected == value,
            ClaimMatcher::Pattern(regex) => regex.is_match(value),
        }
    }
}

impl From<&str> for ClaimMatcher {
    fn from(value: &str) -> Self {
        ClaimMatcher::exact(value)
    }
}

impl From<String> for ClaimMatcher {
    fn from(value: String) -> Self {
        ClaimMatcher::Exact(value)
    }
}
