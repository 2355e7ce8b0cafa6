//! RFC 7638 JWK thumbprints for P-256 keys.
//!
//! A license's `cnf.jkt` is the thumbprint of the operator's public key. The
//! verifier recomputes it from the key embedded in each proof, so the hash
//! input has to be byte-for-byte identical across implementations: required
//! members only (`crv`, `kty`, `x`, `y`), lexicographic order, no whitespace.
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::algorithm::{CURVE_NAME, KEY_TYPE};

/// Compute the SHA-256 JWK thumbprint of an EC public key.
///
/// `x` and `y` are the base64url (unpadded) affine coordinates exactly as they
/// appear in the JWK.
///
/// ```rust
/// use turnstile_crypto::jwk_thumbprint;
///
/// let a = jwk_thumbprint("eA", "eQ");
/// assert_eq!(a, jwk_thumbprint("eA", "eQ"));
/// assert_ne!(a, jwk_thumbprint("eQ", "eA"));
/// ```
pub fn jwk_thumbprint(x: &str, y: &str) -> String {
    let canonical = format!(r#"{{"crv":"{CURVE_NAME}","kty":"{KEY_TYPE}","x":"{x}","y":"{y}"}}"#);
    let digest = Sha256::digest(canonical.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Constant-time thumbprint comparison.
pub fn thumbprints_match(a: &str, b: &str) -> bool {
    // Length is public; only the content comparison needs to be constant time.
    a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}
