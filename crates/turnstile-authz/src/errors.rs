use crate::ledger::LedgerError;
use thiserror::Error;
use turnstile_crypto::CryptoError;

/// Coarse failure classes used for logging, metrics, and caller policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Caller bug: missing fields, wrong key type, empty permissions. Never retried.
    Malformed,
    /// Signature mismatch, unknown signing key, or a foreign algorithm.
    Cryptographic,
    /// Expired or not-yet-valid license, stale proof.
    Temporal,
    /// Issuer/audience, method/URL, or transport rules not satisfied.
    Policy,
    /// The license or the proof identifier was already consumed.
    Replay,
    /// Proof key does not match `cnf.jkt`. Treat as a possible security incident.
    Binding,
    /// Ledger or signing backend failure.
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Malformed => "malformed",
            ErrorCategory::Cryptographic => "cryptographic",
            ErrorCategory::Temporal => "temporal",
            ErrorCategory::Policy => "policy",
            ErrorCategory::Replay => "replay",
            ErrorCategory::Binding => "binding",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum LicenseError {
    #[error("malformed token: {0}")]
    MalformedToken(String),
    #[error("missing key id")]
    MissingKeyId,
    #[error("missing claim: {0}")]
    MissingClaim(&'static str),
    #[error("invalid claim: {0}")]
    InvalidClaim(String),
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("invalid proof type: {0}")]
    InvalidProofType(String),
    #[error("proof header does not embed a public key")]
    MissingProofKey,
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unknown signing key: {0}")]
    UnknownKeyId(String),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("license expired")]
    Expired,
    #[error("license not yet valid")]
    NotYetValid,
    #[error("stale proof")]
    StaleProof,

    #[error("issuer not accepted")]
    IssuerMismatch,
    #[error("audience not accepted")]
    AudienceMismatch,
    #[error("proof method mismatch: expected {expected}, got {actual}")]
    MethodMismatch { expected: String, actual: String },
    #[error("proof target mismatch: expected {expected}, got {actual}")]
    TargetMismatch { expected: String, actual: String },
    #[error("insecure transport: {0}")]
    InsecureTransport(String),

    #[error("license replayed")]
    LicenseReplay,
    #[error("proof replayed")]
    ProofReplay,

    #[error("proof key does not match license confirmation thumbprint")]
    BindingMismatch,

    #[error("replay ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("signing failed: {0}")]
    Signing(String),
}

impl LicenseError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            LicenseError::MalformedToken(_)
            | LicenseError::MissingKeyId
            | LicenseError::MissingClaim(_)
            | LicenseError::InvalidClaim(_)
            | LicenseError::InvalidKey(_)
            | LicenseError::InvalidProofType(_)
            | LicenseError::MissingProofKey
            | LicenseError::InvalidRequest(_) => ErrorCategory::Malformed,
            LicenseError::UnknownKeyId(_)
            | LicenseError::InvalidSignature
            | LicenseError::UnsupportedAlgorithm(_) => ErrorCategory::Cryptographic,
            LicenseError::Expired | LicenseError::NotYetValid | LicenseError::StaleProof => {
                ErrorCategory::Temporal
            }
            LicenseError::IssuerMismatch
            | LicenseError::AudienceMismatch
            | LicenseError::MethodMismatch { .. }
            | LicenseError::TargetMismatch { .. }
            | LicenseError::InsecureTransport(_) => ErrorCategory::Policy,
            LicenseError::LicenseReplay | LicenseError::ProofReplay => ErrorCategory::Replay,
            LicenseError::BindingMismatch => ErrorCategory::Binding,
            LicenseError::Ledger(_) | LicenseError::Signing(_) => ErrorCategory::Internal,
        }
    }
}

impl From<CryptoError> for LicenseError {
    fn from(value: CryptoError) -> Self {
        match value {
            CryptoError::InvalidKey(msg) => LicenseError::InvalidKey(msg),
            CryptoError::UnsupportedAlgorithm(alg) => LicenseError::UnsupportedAlgorithm(alg),
            CryptoError::Encoding(msg) => LicenseError::Signing(msg),
        }
    }
}

pub type LicenseResult<T> = Result<T, LicenseError>;

/// Map a `jsonwebtoken` failure raised while checking a signature.
///
/// Anything that stops the signature from verifying (bad base64, wrong length,
/// mismatch) is cryptographic; only payload JSON problems count as malformed,
/// and those can only surface once the signature has already passed.
pub(crate) fn from_jwt_verify(err: jsonwebtoken::errors::Error) -> LicenseError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
            LicenseError::UnsupportedAlgorithm(err.to_string())
        }
        ErrorKind::Json(_) | ErrorKind::Utf8(_) => LicenseError::MalformedToken(err.to_string()),
        ErrorKind::MissingRequiredClaim(claim) => LicenseError::InvalidClaim(claim.clone()),
        _ => LicenseError::InvalidSignature,
    }
}

/// Map a `jsonwebtoken` failure raised while only parsing a header.
pub(crate) fn from_jwt_header(err: jsonwebtoken::errors::Error) -> LicenseError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::InvalidAlgorithmName => LicenseError::UnsupportedAlgorithm(err.to_string()),
        _ => LicenseError::MalformedToken(format!("header: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::errors::{Error as JwtError, ErrorKind};

    #[test]
    fn every_variant_has_a_category() {
        let cases = vec![
            (LicenseError::MissingKeyId, ErrorCategory::Malformed),
            (LicenseError::MissingClaim("jti"), ErrorCategory::Malformed),
            (LicenseError::InvalidProofType("JWT".into()), ErrorCategory::Malformed),
            (LicenseError::InvalidRequest("method".into()), ErrorCategory::Malformed),
            (LicenseError::UnknownKeyId("k9".into()), ErrorCategory::Cryptographic),
            (LicenseError::InvalidSignature, ErrorCategory::Cryptographic),
            (LicenseError::Expired, ErrorCategory::Temporal),
            (LicenseError::StaleProof, ErrorCategory::Temporal),
            (LicenseError::AudienceMismatch, ErrorCategory::Policy),
            (
                LicenseError::InsecureTransport("http".into()),
                ErrorCategory::Policy,
            ),
            (LicenseError::LicenseReplay, ErrorCategory::Replay),
            (LicenseError::ProofReplay, ErrorCategory::Replay),
            (LicenseError::BindingMismatch, ErrorCategory::Binding),
            (
                LicenseError::Ledger(LedgerError::Unavailable("down".into())),
                ErrorCategory::Internal,
            ),
        ];
        for (error, category) in cases {
            assert!(!error.to_string().is_empty());
            assert_eq!(error.category(), category, "{error}");
        }
    }

    #[test]
    fn replay_kinds_are_reported_distinctly() {
        assert_ne!(
            LicenseError::LicenseReplay.to_string(),
            LicenseError::ProofReplay.to_string()
        );
    }

    #[test]
    fn jwt_signature_errors_are_cryptographic() {
        let err = from_jwt_verify(JwtError::from(ErrorKind::InvalidSignature));
        assert!(matches!(err, LicenseError::InvalidSignature));
        let err = from_jwt_verify(JwtError::from(ErrorKind::InvalidToken));
        assert_eq!(err.category(), ErrorCategory::Cryptographic);
        let err = from_jwt_verify(JwtError::from(ErrorKind::InvalidAlgorithm));
        assert!(matches!(err, LicenseError::UnsupportedAlgorithm(_)));
    }

    #[test]
    fn crypto_errors_keep_their_class() {
        let err: LicenseError = CryptoError::InvalidKey("curve".into()).into();
        assert_eq!(err.category(), ErrorCategory::Malformed);
        let err: LicenseError = CryptoError::UnsupportedAlgorithm("HS256".into()).into();
        assert_eq!(err.category(), ErrorCategory::Cryptographic);
    }

    #[test]
    fn category_labels_are_stable() {
        assert_eq!(ErrorCategory::Binding.as_str(), "binding");
        assert_eq!(ErrorCategory::Replay.to_string(), "replay");
    }
}
