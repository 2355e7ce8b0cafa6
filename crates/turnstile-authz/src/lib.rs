//! Offline licenses bound to a proof-of-possession key.
//!
//! # Purpose
//! A publisher signs a short-lived license naming permissions, a budget and the
//! thumbprint of an operator key. The operator signs a fresh proof for every
//! request. An enforcement point verifies the pair locally, without calling
//! the publisher.
//!
//! # How it fits
//! - [`issue_license`] / [`LicenseIssuer`] run at the publisher.
//! - [`create_proof`] / [`ProofSigner`] run at the operator.
//! - [`verify_license`] / [`LicenseVerifier`] run at the edge, with a
//!   [`PublisherKeySet`] and an injected [`ReplayLedger`].
//!
//! # Key invariants
//! - ES256 is the only algorithm, for both token kinds.
//! - Verification is all-or-nothing: eleven ordered gates, no partial result.
//! - A license is only usable together with a proof signed by the key whose
//!   thumbprint it carries in `cnf.jkt`.
//!
//! # Important configuration
//! - [`VerifierSettings`] reads `TURNSTILE_*` environment variables and an
//!   optional YAML file named by `TURNSTILE_CONFIG`.
//!
//! # Examples
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use turnstile_authz::{
//!     ClaimMatcher, LicenseIssuer, LicenseVerifier, MemoryReplayLedger, ProofSigner,
//! };
//! use turnstile_crypto::generate_publisher_key;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let issuer = LicenseIssuer::new(
//!     "https://publisher.example",
//!     "https://edge.example",
//!     Duration::from_secs(300),
//!     generate_publisher_key(),
//! );
//! let operator = ProofSigner::generate();
//! let license = issuer
//!     .issue("crawler-7", vec!["read".into()], 10.0, operator.thumbprint(), Default::default())
//!     .unwrap();
//!
//! let verifier = LicenseVerifier::new(
//!     issuer.key_set(),
//!     ClaimMatcher::exact("https://publisher.example"),
//!     ClaimMatcher::exact("https://edge.example"),
//!     Arc::new(MemoryReplayLedger::new()),
//! );
//! let proof = operator.sign("GET", "https://edge.example/article/1", None).unwrap();
//! let verified = verifier
//!     .verify(&license, &proof, "GET", "https://edge.example/article/1")
//!     .await
//!     .unwrap();
//! assert_eq!(verified.claims.sub, "crawler-7");
//! # }
//! ```
//!
//! # Common pitfalls
//! - Sharing one [`MemoryReplayLedger`] across processes is impossible; a fleet
//!   of enforcement points needs a distributed [`ReplayLedger`].
//! - Proofs are bound to the canonical URL; proxies that rewrite paths before
//!   verification will cause target mismatches.

mod claims;
mod config;
mod errors;
mod issuer;
mod keyset;
mod ledger;
mod matcher;
mod observability;
mod proof;
mod target;
mod verifier;

pub use claims::{Confirmation, LicenseClaims, PROOF_TYPE, ProofClaims};
pub use config::VerifierSettings;
pub use errors::{ErrorCategory, LicenseError, LicenseResult};
pub use issuer::{LicenseIssuer, NOT_BEFORE_SKEW_SECS, issue_license};
pub use keyset::PublisherKeySet;
pub use ledger::{
    LedgerClock, LedgerError, MemoryReplayLedger, ReplayKind, ReplayLedger, SWEEP_INTERVAL,
};
pub use matcher::ClaimMatcher;
pub use observability::init_observability;
pub use proof::{ProofSigner, create_proof};
pub use target::{canonical_method, canonical_target, ensure_secure_transport, is_loopback_host};
pub use verifier::{
    DEFAULT_CLOCK_SKEW, DEFAULT_MAX_PROOF_AGE, LicenseVerifier, VerifiedLicense, VerifyOptions,
    VerifyRequest, verify_license,
};

use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub(crate) fn now_epoch_seconds() -> i64 {
    duration_secs(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|_| Duration::from_secs(0)),
    )
}

/// Whole seconds of `duration`, saturating at `i64::MAX`.
pub(crate) fn duration_secs(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}
