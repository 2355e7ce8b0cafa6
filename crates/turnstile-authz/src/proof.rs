//! Proof-of-possession tokens, created by the operator for every request.
//!
//! A proof is self-signed: its header embeds the operator's full public JWK so
//! the verifier can check the signature and recompute the thumbprint without
//! any key lookup. The payload pins the canonical method and URL of exactly one
//! request.
use crate::claims::{PROOF_TYPE, ProofClaims};
use crate::target::{canonical_method, canonical_target, ensure_secure_transport};
use crate::{LicenseError, LicenseResult, now_epoch_seconds};
use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::{Header, encode};
use turnstile_crypto::{ALGORITHM, SigningKeyPair};
use uuid::Uuid;

/// Sign a proof for `method url`.
///
/// `iat` defaults to the current time. The transport rule is checked before
/// anything is signed, so a plaintext target never yields a proof.
///
/// # Errors
/// - `LicenseError::InsecureTransport` for non-https targets outside loopback.
/// - `LicenseError::InvalidRequest` for a bad method or non-absolute URL.
/// - `LicenseError::MissingClaim("jti")` for a blank identifier.
pub fn create_proof(
    operator_key: &SigningKeyPair,
    method: &str,
    url: &str,
    jti: &str,
    iat: Option<i64>,
    nonce: Option<&str>,
) -> LicenseResult<String> {
    ensure_secure_transport(url)?;
    if jti.trim().is_empty() {
        return Err(LicenseError::MissingClaim("jti"));
    }
    let claims = ProofClaims {
        htm: canonical_method(method)?,
        htu: canonical_target(url)?,
        iat: iat.unwrap_or_else(now_epoch_seconds),
        jti: jti.to_string(),
        nonce: nonce.map(str::to_string),
    };

    let mut header = Header::new(ALGORITHM);
    header.typ = Some(PROOF_TYPE.to_string());
    header.jwk = Some(operator_key.public_key().to_jwk());
    let encoding_key = operator_key.encoding_key()?;
    let token = encode(&header, &claims, &encoding_key)
        .map_err(|err| LicenseError::Signing(err.to_string()))?;

    metrics::counter!("turnstile_proofs_created_total").increment(1);
    Ok(token)
}

/// Operator-side helper that owns the proof key.
#[derive(Debug, Clone)]
pub struct ProofSigner {
    key: SigningKeyPair,
}

impl ProofSigner {
    pub fn new(key: SigningKeyPair) -> Self {
        Self { key }
    }

    pub fn generate() -> Self {
        Self::new(SigningKeyPair::generate())
    }

    /// Thumbprint to present as `cnf.jkt` when requesting a license.
    pub fn thumbprint(&self) -> String {
        self.key.public_key().thumbprint()
    }

    pub fn public_jwk(&self) -> Jwk {
        self.key.public_key().to_jwk()
    }

    /// Sign a fresh proof for one request, with a random `jti` and `iat = now`.
    pub fn sign(&self, method: &str, url: &str, nonce: Option<&str>) -> LicenseResult<String> {
        let jti = Uuid::new_v4().to_string();
        create_proof(&self.key, method, url, &jti, None, nonce)
    }
}
