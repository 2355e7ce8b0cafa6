//! The one signature algorithm Turnstile speaks.
//!
//! Licenses and proofs are both ES256 (ECDSA over P-256 with SHA-256). There is
//! no registry and no negotiation: any other `alg` is rejected outright so an
//! attacker cannot steer a verifier onto a weaker or symmetric algorithm.
use crate::{CryptoError, CryptoResult};
use jsonwebtoken::Algorithm;

/// Algorithm used for every license and proof.
pub const ALGORITHM: Algorithm = Algorithm::ES256;

/// JOSE name of [`ALGORITHM`].
pub const ALGORITHM_NAME: &str = "ES256";

/// JWK `crv` value for the only supported curve.
pub const CURVE_NAME: &str = "P-256";

/// JWK `kty` value for the only supported key type.
pub const KEY_TYPE: &str = "EC";

/// Reject anything that is not ES256.
///
/// ```rust
/// use jsonwebtoken::Algorithm;
/// use turnstile_crypto::ensure_supported;
///
/// assert!(ensure_supported(Algorithm::ES256).is_ok());
/// assert!(ensure_supported(Algorithm::HS256).is_err());
/// ```
pub fn ensure_supported(alg: Algorithm) -> CryptoResult<()> {
    if alg == ALGORITHM {
        Ok(())
    } else {
        Err(CryptoError::UnsupportedAlgorithm(format!("{alg:?}")))
    }
}
