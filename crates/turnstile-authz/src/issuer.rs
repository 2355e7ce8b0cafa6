//! License issuance.
//!
//! # Purpose
//! Sign license claims with a publisher key. Issuance is a pure function of its
//! inputs apart from the clock read in [`LicenseIssuer`]; nothing is persisted.
//!
//! # Key invariants
//! - Claims are validated before any signing happens; invalid input never
//!   produces a token.
//! - The header always carries `alg = ES256` and the publisher `kid`.
//! - `nbf` is moved back by [`NOT_BEFORE_SKEW_SECS`] to absorb drift between
//!   the issuer and verifier clocks.
use crate::claims::{Confirmation, LicenseClaims};
use crate::keyset::PublisherKeySet;
use crate::{LicenseError, LicenseResult, duration_secs, now_epoch_seconds};
use jsonwebtoken::{Header, encode};
use std::time::Duration;
use turnstile_crypto::{ALGORITHM, PublisherKey, SigningKeyPair};
use uuid::Uuid;

/// Backward margin applied to `nbf` at issuance. Fixed, not configurable.
pub const NOT_BEFORE_SKEW_SECS: i64 = 30;

/// Sign `claims` as a license under `key_id`.
///
/// # Errors
/// - `LicenseError::MissingClaim` / `LicenseError::InvalidClaim` when the
///   claims fail [`LicenseClaims::validate`].
/// - `LicenseError::Signing` if the key cannot be encoded for signing.
pub fn issue_license(
    signing_key: &SigningKeyPair,
    key_id: &str,
    mut claims: LicenseClaims,
) -> LicenseResult<String> {
    claims.validate()?;
    claims.nbf = Some(claims.effective_not_before() - NOT_BEFORE_SKEW_SECS);

    let mut header = Header::new(ALGORITHM);
    header.kid = Some(key_id.to_string());
    let encoding_key = signing_key.encoding_key()?;
    let token = encode(&header, &claims, &encoding_key)
        .map_err(|err| LicenseError::Signing(err.to_string()))?;

    metrics::counter!("turnstile_licenses_issued_total").increment(1);
    tracing::debug!(
        kid = %key_id,
        jti = %claims.jti,
        sub = %claims.sub,
        exp = claims.exp,
        "license issued"
    );
    Ok(token)
}

/// Issues licenses for one issuer/audience pair with a fixed lifetime.
#[derive(Debug, Clone)]
pub struct LicenseIssuer {
    issuer: String,
    audience: String,
    ttl: Duration,
    key: PublisherKey,
}

impl LicenseIssuer {
    pub fn new(
        issuer: impl Into<String>,
        audience: impl Into<String>,
        ttl: Duration,
        key: PublisherKey,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            ttl,
            key,
        }
    }

    /// Issue a license bound to the operator key with thumbprint `jkt`.
    ///
    /// `iat` is now, `exp` is now plus the configured TTL, and `jti` is a
    /// random UUIDv4.
    pub fn issue(
        &self,
        subject: impl Into<String>,
        permissions: Vec<String>,
        budget: f64,
        jkt: impl Into<String>,
        extra: serde_json::Map<String, serde_json::Value>,
    ) -> LicenseResult<String> {
        let now = now_epoch_seconds();
        let claims = LicenseClaims {
            iss: self.issuer.clone(),
            sub: subject.into(),
            aud: self.audience.clone(),
            jti: Uuid::new_v4().to_string(),
            iat: now,
            nbf: None,
            exp: now.saturating_add(duration_secs(self.ttl)),
            permissions,
            budget,
            cnf: Confirmation { jkt: jkt.into() },
            extra,
        };
        issue_license(&self.key.key_pair, self.key.kid.as_str(), claims)
    }

    /// The key set a verifier needs to check licenses from this issuer.
    pub fn key_set(&self) -> PublisherKeySet {
        PublisherKeySet::from_keys([(self.key.kid.clone(), self.key.key_pair.public_key())])
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }
}
