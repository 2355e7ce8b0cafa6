use crate::keyset::PublisherKeySet;
use crate::matcher::ClaimMatcher;
use crate::verifier::{DEFAULT_CLOCK_SKEW, DEFAULT_MAX_PROOF_AGE, VerifyOptions};
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

// Verifier settings sourced from environment variables, optionally overridden by YAML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierSettings {
    // Exact expected `iss`.
    pub issuer: Option<String>,
    // Regex for `iss`; wins over `issuer` when both are set.
    pub issuer_pattern: Option<String>,
    // Exact expected `aud`.
    pub audience: Option<String>,
    // Regex for `aud`; wins over `audience` when both are set.
    pub audience_pattern: Option<String>,
    pub clock_skew_secs: u64,
    pub max_proof_age_secs: u64,
    // JWKS document with the publisher keys.
    pub jwks_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VerifierSettingsOverride {
    issuer: Option<String>,
    issuer_pattern: Option<String>,
    audience: Option<String>,
    audience_pattern: Option<String>,
    clock_skew_secs: Option<u64>,
    max_proof_age_secs: Option<u64>,
    jwks_path: Option<PathBuf>,
}

impl VerifierSettings {
    pub fn from_env() -> Result<Self> {
        let settings = Self::read_env()?;
        settings.validate()?;
        Ok(settings)
    }

    /// `from_env`, then apply the YAML file named by `TURNSTILE_CONFIG` if set.
    pub fn from_env_or_yaml() -> Result<Self> {
        let mut settings = Self::read_env()?;
        if let Ok(path) = std::env::var("TURNSTILE_CONFIG") {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read TURNSTILE_CONFIG: {path}"))?;
            let override_cfg: VerifierSettingsOverride =
                serde_yaml::from_str(&contents).with_context(|| "parse verifier config yaml")?;
            if let Some(value) = override_cfg.issuer {
                settings.issuer = Some(value);
            }
            if let Some(value) = override_cfg.issuer_pattern {
                settings.issuer_pattern = Some(value);
            }
            if let Some(value) = override_cfg.audience {
                settings.audience = Some(value);
            }
            if let Some(value) = override_cfg.audience_pattern {
                settings.audience_pattern = Some(value);
            }
            if let Some(value) = override_cfg.clock_skew_secs {
                settings.clock_skew_secs = value;
            }
            if let Some(value) = override_cfg.max_proof_age_secs {
                settings.max_proof_age_secs = value;
            }
            if let Some(value) = override_cfg.jwks_path {
                settings.jwks_path = Some(value);
            }
        }
        settings.validate()?;
        Ok(settings)
    }

    fn read_env() -> Result<Self> {
        Ok(Self {
            issuer: non_empty_env("TURNSTILE_ISSUER"),
            issuer_pattern: non_empty_env("TURNSTILE_ISSUER_PATTERN"),
            audience: non_empty_env("TURNSTILE_AUDIENCE"),
            audience_pattern: non_empty_env("TURNSTILE_AUDIENCE_PATTERN"),
            clock_skew_secs: secs_env("TURNSTILE_CLOCK_SKEW_SECS", DEFAULT_CLOCK_SKEW)?,
            max_proof_age_secs: secs_env("TURNSTILE_MAX_PROOF_AGE_SECS", DEFAULT_MAX_PROOF_AGE)?,
            jwks_path: non_empty_env("TURNSTILE_JWKS_PATH").map(PathBuf::from),
        })
    }

    fn validate(&self) -> Result<()> {
        self.issuer_matcher()?;
        self.audience_matcher()?;
        Ok(())
    }

    pub fn issuer_matcher(&self) -> Result<ClaimMatcher> {
        matcher("issuer", self.issuer.as_deref(), self.issuer_pattern.as_deref())
    }

    pub fn audience_matcher(&self) -> Result<ClaimMatcher> {
        matcher(
            "audience",
            self.audience.as_deref(),
            self.audience_pattern.as_deref(),
        )
    }

    pub fn verify_options(&self) -> VerifyOptions {
        VerifyOptions::default()
            .with_clock_skew(Duration::from_secs(self.clock_skew_secs))
            .with_max_proof_age(Duration::from_secs(self.max_proof_age_secs))
    }

    pub fn load_key_set(&self) -> Result<PublisherKeySet> {
        let Some(path) = &self.jwks_path else {
            bail!("TURNSTILE_JWKS_PATH is not set");
        };
        let contents = fs::read_to_string(path)
            .with_context(|| format!("read jwks: {}", path.display()))?;
        PublisherKeySet::from_json(&contents)
            .with_context(|| format!("parse jwks: {}", path.display()))
    }
}

fn matcher(name: &str, exact: Option<&str>, pattern: Option<&str>) -> Result<ClaimMatcher> {
    match (pattern, exact) {
        (Some(pattern), _) => {
            ClaimMatcher::pattern(pattern).with_context(|| format!("compile {name} pattern"))
        }
        (None, Some(exact)) => Ok(ClaimMatcher::exact(exact)),
        (None, None) => bail!("{name} or {name} pattern must be configured"),
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn secs_env(key: &str, default: Duration) -> Result<u64> {
    match non_empty_env(key) {
        Some(value) => value.parse::<u64>().with_context(|| format!("parse {key}")),
        None => Ok(default.as_secs()),
    }
}
