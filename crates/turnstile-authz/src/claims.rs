//! License and proof claim sets.
//!
//! # Purpose
//! Defines the JSON payloads carried by the two token streams and the shape
//! rules a license must satisfy both when it is issued and when it is verified.
//!
//! # Key invariants
//! - A license names exactly one confirmation thumbprint (`cnf.jkt`); it is set
//!   at issuance and never changes.
//! - `permissions` is a non-empty ordered set: no blanks, no duplicates.
//! - `budget` is finite and strictly positive.
//! - Unknown payload members are kept in `extra` and never interpreted.
//!
//! # Examples
//! ```rust
//! use turnstile_authz::{Confirmation, LicenseClaims};
//!
//! let claims = LicenseClaims {
//!     iss: "https://publisher.example".to_string(),
//!     sub: "crawler-7".to_string(),
//!     aud: "https://edge.example".to_string(),
//!     jti: "lic-1".to_string(),
//!     iat: 1_700_000_000,
//!     nbf: None,
//!     exp: 1_700_000_600,
//!     permissions: vec!["read".to_string()],
//!     budget: 5.0,
//!     cnf: Confirmation { jkt: "thumb".to_string() },
//!     extra: Default::default(),
//! };
//! assert!(claims.validate().is_ok());
//! assert_eq!(claims.effective_not_before(), 1_700_000_000);
//! ```
use crate::{LicenseError, LicenseResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Header `typ` of a proof-of-possession token.
pub const PROOF_TYPE: &str = "dpop+jwt";

/// Key confirmation (`cnf`) member of a license.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confirmation {
    /// RFC 7638 thumbprint of the operator public key.
    pub jkt: String,
}

/// Payload of a license token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub jti: String,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    pub exp: i64,
    pub permissions: Vec<String>,
    pub budget: f64,
    pub cnf: Confirmation,
    /// Free-form metadata carried alongside the license.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl LicenseClaims {
    /// `nbf` if present, otherwise `iat`.
    pub fn effective_not_before(&self) -> i64 {
        self.nbf.unwrap_or(self.iat)
    }

    /// Check the shape rules shared by issuance and verification.
    ///
    /// # Errors
    /// - `LicenseError::MissingClaim` for blank identity fields or `cnf.jkt`.
    /// - `LicenseError::InvalidClaim` for empty/duplicate permissions, a
    ///   non-positive budget, or `exp` not after `iat`.
    pub fn validate(&self) -> LicenseResult<()> {
        require_non_blank("iss", &self.iss)?;
        require_non_blank("sub", &self.sub)?;
        require_non_blank("aud", &self.aud)?;
        require_non_blank("jti", &self.jti)?;
        require_non_blank("cnf.jkt", &self.cnf.jkt)?;

        if self.permissions.is_empty() {
            return Err(LicenseError::InvalidClaim(
                "permissions must not be empty".to_string(),
            ));
        }
        let mut seen = HashSet::with_capacity(self.permissions.len());
        for permission in &self.permissions {
            if permission.trim().is_empty() {
                return Err(LicenseError::InvalidClaim(
                    "permissions must not contain blank entries".to_string(),
                ));
            }
            if !seen.insert(permission.as_str()) {
                return Err(LicenseError::InvalidClaim(format!(
                    "duplicate permission {permission}"
                )));
            }
        }

        if !self.budget.is_finite() || self.budget <= 0.0 {
            return Err(LicenseError::InvalidClaim(
                "budget must be a finite positive number".to_string(),
            ));
        }
        if self.exp <= self.iat {
            return Err(LicenseError::InvalidClaim(
                "exp must be after iat".to_string(),
            ));
        }
        Ok(())
    }
}

/// Payload of a proof-of-possession token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofClaims {
    /// Canonical HTTP method.
    pub htm: String,
    /// Canonical absolute request URL.
    pub htu: String,
    pub iat: i64,
    pub jti: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

fn require_non_blank(name: &'static str, value: &str) -> LicenseResult<()> {
    if value.trim().is_empty() {
        return Err(LicenseError::MissingClaim(name));
    }
    Ok(())
}
