//! Cryptographic primitives shared by the Turnstile issuer, operator, and verifier.
//!
//! # Purpose
//! Holds the single fixed signature algorithm (ES256), P-256 key handling, and
//! the RFC 7638 thumbprint that binds a license to its operator key.
//!
//! # How it fits
//! `turnstile-authz` signs and verifies tokens through `jsonwebtoken`, using the
//! encoding/decoding keys and JWK conversions defined here. Nothing in this
//! crate performs I/O or keeps state.
//!
//! # Key invariants
//! - ES256 only; every other algorithm is rejected.
//! - Public keys are validated as P-256 points on import.
//!
//! # Examples
//! ```rust
//! use turnstile_crypto::{PublicKey, SigningKeyPair};
//!
//! let operator = SigningKeyPair::generate();
//! let jwk = operator.public_key().to_jwk();
//! let imported = PublicKey::from_jwk(&jwk).expect("valid jwk");
//! assert_eq!(imported.thumbprint(), operator.public_key().thumbprint());
//! ```
mod algorithm;
mod error;
mod keys;
mod thumbprint;

pub use algorithm::{ALGORITHM, ALGORITHM_NAME, CURVE_NAME, KEY_TYPE, ensure_supported};
pub use error::{CryptoError, CryptoResult};
pub use keys::{KeyId, PublicKey, PublisherKey, SigningKeyPair, generate_publisher_key};
pub use thumbprint::{jwk_thumbprint, thumbprints_match};
