//! License + proof verification at the enforcement point.
//!
//! # Purpose
//! Decide, without calling the issuer, whether a (license, proof) pair
//! authorizes one concrete request.
//!
//! # Pipeline
//! Every gate is a hard stop and they always run in this order:
//! 1. license header: `kid` present and known to the key set
//! 2. license signature (ES256 only), claim shape, `nbf`/`exp` with clock skew
//! 3. issuer and audience matchers
//! 4. license replay (ledger entry lives until `exp`)
//! 5. proof header: `typ`, `alg`, embedded P-256 JWK
//! 6. proof signature against its own embedded key
//! 7. proof freshness: `|now - iat| <= max_proof_age + clock_skew`
//! 8. proof `htm`/`htu` equal the canonical request method and URL
//! 9. transport: https, or http to a loopback host
//! 10. proof replay (ledger entry lives until `iat + max_proof_age + clock_skew`)
//! 11. binding: proof key thumbprint equals `cnf.jkt`
//!
//! # Concurrency model
//! The two ledger calls are the only suspension points. Dropping the future
//! before gate 4 has no side effects; after it, only ledger entries remain.
//!
//! # Security
//! Token strings and key material are never logged. Binding failures are
//! logged at `error` on the `turnstile::security` target.
use crate::claims::{LicenseClaims, PROOF_TYPE, ProofClaims};
use crate::config::VerifierSettings;
use crate::errors::{from_jwt_header, from_jwt_verify};
use crate::keyset::PublisherKeySet;
use crate::ledger::{ReplayKind, ReplayLedger};
use crate::matcher::ClaimMatcher;
use crate::target::{canonical_method, canonical_target, ensure_secure_transport};
use crate::{ErrorCategory, LicenseError, LicenseResult, duration_secs, now_epoch_seconds};
use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use turnstile_crypto::{ALGORITHM, PublicKey, thumbprints_match};

pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_PROOF_AGE: Duration = Duration::from_secs(120);

const SECURITY_TARGET: &str = "turnstile::security";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyOptions {
    pub clock_skew: Duration,
    pub max_proof_age: Duration,
    /// Evaluation time in seconds since epoch; `None` reads the wall clock.
    pub now: Option<i64>,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            clock_skew: DEFAULT_CLOCK_SKEW,
            max_proof_age: DEFAULT_MAX_PROOF_AGE,
            now: None,
        }
    }
}

impl VerifyOptions {
    pub fn with_now(mut self, now: i64) -> Self {
        self.now = Some(now);
        self
    }

    pub fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew;
        self
    }

    pub fn with_max_proof_age(mut self, max_proof_age: Duration) -> Self {
        self.max_proof_age = max_proof_age;
        self
    }
}

/// The two tokens plus the request they were presented with.
#[derive(Debug, Clone, Copy)]
pub struct VerifyRequest<'a> {
    pub license: &'a str,
    pub proof: &'a str,
    pub method: &'a str,
    pub url: &'a str,
}

/// Result of a successful verification.
#[derive(Debug, Clone)]
pub struct VerifiedLicense {
    pub claims: LicenseClaims,
    /// The operator public key embedded in the proof.
    pub operator_key: Jwk,
    /// Equal to `claims.cnf.jkt`.
    pub binding_thumbprint: String,
    pub algorithm: Algorithm,
}

/// Run the full verification pipeline.
///
/// # Errors
/// The first failing gate's error; see [`LicenseError::category`] for how
/// they group.
pub async fn verify_license(
    request: &VerifyRequest<'_>,
    keys: &PublisherKeySet,
    expected_issuer: &ClaimMatcher,
    expected_audience: &ClaimMatcher,
    ledger: &dyn ReplayLedger,
    options: &VerifyOptions,
) -> LicenseResult<VerifiedLicense> {
    let result = run_gates(
        request,
        keys,
        expected_issuer,
        expected_audience,
        ledger,
        options,
    )
    .await;
    match &result {
        Ok(verified) => {
            metrics::counter!("turnstile_verifications_total", "outcome" => "ok").increment(1);
            tracing::debug!(
                jti = %verified.claims.jti,
                sub = %verified.claims.sub,
                "license verified"
            );
        }
        Err(err) => {
            let category = err.category();
            metrics::counter!("turnstile_verifications_total", "outcome" => category.as_str())
                .increment(1);
            // Replay and binding rejections are already logged at their gate.
            if !matches!(category, ErrorCategory::Replay | ErrorCategory::Binding) {
                tracing::debug!(category = %category, error = %err, "license rejected");
            }
        }
    }
    result
}

async fn run_gates(
    request: &VerifyRequest<'_>,
    keys: &PublisherKeySet,
    expected_issuer: &ClaimMatcher,
    expected_audience: &ClaimMatcher,
    ledger: &dyn ReplayLedger,
    options: &VerifyOptions,
) -> LicenseResult<VerifiedLicense> {
    let now = options.now.unwrap_or_else(now_epoch_seconds);
    let skew = duration_secs(options.clock_skew);
    let max_age = duration_secs(options.max_proof_age);
    let validation = signature_only_validation();

    // 1. License header.
    let license_header = decode_header(request.license).map_err(from_jwt_header)?;
    let kid = license_header.kid.ok_or(LicenseError::MissingKeyId)?;
    let publisher_key = keys.resolve(&kid)?;

    // 2. Signature, claim shape, validity window.
    let claims = decode::<LicenseClaims>(
        request.license,
        &publisher_key.decoding_key()?,
        &validation,
    )
    .map_err(from_jwt_verify)?
    .claims;
    claims.validate()?;
    if now.saturating_sub(skew) >= claims.exp {
        return Err(LicenseError::Expired);
    }
    if now.saturating_add(skew) < claims.effective_not_before() {
        return Err(LicenseError::NotYetValid);
    }

    // 3. Issuer and audience.
    if !expected_issuer.matches(&claims.iss) {
        return Err(LicenseError::IssuerMismatch);
    }
    if !expected_audience.matches(&claims.aud) {
        return Err(LicenseError::AudienceMismatch);
    }

    // 4. License replay.
    if ledger.seen(ReplayKind::License, &claims.jti, claims.exp).await? {
        tracing::warn!(kind = "license", jti = %claims.jti, sub = %claims.sub, "replay rejected");
        return Err(LicenseError::LicenseReplay);
    }

    // 5. Proof header.
    let proof_header = decode_header(request.proof).map_err(from_jwt_header)?;
    match proof_header.typ.as_deref() {
        Some(typ) if typ.eq_ignore_ascii_case(PROOF_TYPE) => {}
        other => {
            return Err(LicenseError::InvalidProofType(
                other.unwrap_or("none").to_string(),
            ));
        }
    }
    if proof_header.alg != ALGORITHM {
        return Err(LicenseError::UnsupportedAlgorithm(format!(
            "{:?}",
            proof_header.alg
        )));
    }
    let operator_jwk = proof_header.jwk.ok_or(LicenseError::MissingProofKey)?;
    let operator_key = PublicKey::from_jwk(&operator_jwk)?;

    // 6. Proof signature, self-verified.
    let proof = decode::<ProofClaims>(
        request.proof,
        &operator_key.decoding_key()?,
        &validation,
    )
    .map_err(from_jwt_verify)?
    .claims;
    if proof.jti.trim().is_empty() {
        return Err(LicenseError::MissingClaim("jti"));
    }

    // 7. Freshness.
    if now.abs_diff(proof.iat) > max_age.saturating_add(skew) as u64 {
        return Err(LicenseError::StaleProof);
    }

    // 8. Method and URL.
    let expected_method = canonical_method(request.method)?;
    let expected_url = canonical_target(request.url)?;
    let proof_method = canonical_method(&proof.htm)?;
    if proof_method != expected_method {
        return Err(LicenseError::MethodMismatch {
            expected: expected_method,
            actual: proof_method,
        });
    }
    let proof_url = canonical_target(&proof.htu)?;
    if proof_url != expected_url {
        return Err(LicenseError::TargetMismatch {
            expected: expected_url,
            actual: proof_url,
        });
    }

    // 9. Transport.
    ensure_secure_transport(&expected_url)?;

    // 10. Proof replay.
    let proof_expires_at = proof.iat.saturating_add(max_age).saturating_add(skew);
    if ledger
        .seen(ReplayKind::Proof, &proof.jti, proof_expires_at)
        .await?
    {
        tracing::warn!(kind = "proof", jti = %proof.jti, sub = %claims.sub, "replay rejected");
        return Err(LicenseError::ProofReplay);
    }

    // 11. Binding.
    let binding_thumbprint = operator_key.thumbprint();
    if !thumbprints_match(&binding_thumbprint, &claims.cnf.jkt) {
        tracing::error!(
            target: SECURITY_TARGET,
            jti = %claims.jti,
            sub = %claims.sub,
            expected = %claims.cnf.jkt,
            presented = %binding_thumbprint,
            "proof key does not match license binding"
        );
        return Err(LicenseError::BindingMismatch);
    }

    Ok(VerifiedLicense {
        claims,
        operator_key: operator_jwk,
        binding_thumbprint,
        algorithm: ALGORITHM,
    })
}

/// Signature and algorithm only: the time window is checked against the
/// injected `now`, and `aud`/`iss` go through [`ClaimMatcher`].
fn signature_only_validation() -> Validation {
    let mut validation = Validation::new(ALGORITHM);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();
    validation
}

/// A verifier bound to one key set, one issuer/audience policy and one ledger.
#[derive(Clone)]
pub struct LicenseVerifier {
    keys: Arc<PublisherKeySet>,
    issuer: ClaimMatcher,
    audience: ClaimMatcher,
    ledger: Arc<dyn ReplayLedger>,
    options: VerifyOptions,
}

impl LicenseVerifier {
    pub fn new(
        keys: PublisherKeySet,
        issuer: ClaimMatcher,
        audience: ClaimMatcher,
        ledger: Arc<dyn ReplayLedger>,
    ) -> Self {
        Self {
            keys: Arc::new(keys),
            issuer,
            audience,
            ledger,
            options: VerifyOptions::default(),
        }
    }

    pub fn with_options(mut self, options: VerifyOptions) -> Self {
        self.options = options;
        self
    }

    /// Build from loaded settings; the key set is read from `jwks_path`.
    pub fn from_settings(
        settings: &VerifierSettings,
        ledger: Arc<dyn ReplayLedger>,
    ) -> anyhow::Result<Self> {
        let keys = settings.load_key_set()?;
        Ok(Self::new(
            keys,
            settings.issuer_matcher()?,
            settings.audience_matcher()?,
            ledger,
        )
        .with_options(settings.verify_options()))
    }

    pub fn options(&self) -> &VerifyOptions {
        &self.options
    }

    pub fn key_set(&self) -> &PublisherKeySet {
        &self.keys
    }

    pub async fn verify(
        &self,
        license: &str,
        proof: &str,
        method: &str,
        url: &str,
    ) -> LicenseResult<VerifiedLicense> {
        let request = VerifyRequest {
            license,
            proof,
            method,
            url,
        };
        verify_license(
            &request,
            &self.keys,
            &self.issuer,
            &self.audience,
            self.ledger.as_ref(),
            &self.options,
        )
        .await
    }
}

impl std::fmt::Debug for LicenseVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseVerifier")
            .field("keys", &self.keys.len())
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
