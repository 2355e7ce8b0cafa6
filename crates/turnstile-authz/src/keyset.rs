//! Publisher key set used to resolve the `kid` in a license header.
//!
//! The verifier only ever performs a local lookup here. Fetching, refreshing and
//! rotating the set is the embedding service's job.
use crate::{LicenseError, LicenseResult};
use jsonwebtoken::jwk::{Jwk, JwkSet};
use turnstile_crypto::{CryptoError, KeyId, PublicKey};

#[derive(Debug, Clone)]
pub struct PublisherKeySet {
    set: JwkSet,
}

impl Default for PublisherKeySet {
    fn default() -> Self {
        Self {
            set: JwkSet { keys: Vec::new() },
        }
    }
}

impl PublisherKeySet {
    pub fn new(set: JwkSet) -> Self {
        Self { set }
    }

    /// Parse a JWKS document (`{"keys": [...]}`).
    pub fn from_json(json: &str) -> LicenseResult<Self> {
        let set: JwkSet = serde_json::from_str(json)
            .map_err(|err| LicenseError::InvalidKey(format!("jwks: {err}")))?;
        Ok(Self { set })
    }

    pub fn from_keys<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = (KeyId, PublicKey)>,
    {
        let keys = keys
            .into_iter()
            .map(|(kid, key)| key.to_jwk_with_kid(&kid))
            .collect();
        Self {
            set: JwkSet { keys },
        }
    }

    pub fn to_json(&self) -> LicenseResult<String> {
        serde_json::to_string(&self.set)
            .map_err(|err| LicenseError::InvalidKey(format!("jwks: {err}")))
    }

    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.set.find(kid)
    }

    /// Resolve `kid` to a usable ES256 verification key.
    ///
    /// # Errors
    /// - `LicenseError::UnknownKeyId` when no entry carries `kid`.
    /// - `LicenseError::UnsupportedAlgorithm` when the entry is not a P-256 key
    ///   or declares an algorithm other than ES256.
    pub fn resolve(&self, kid: &str) -> LicenseResult<PublicKey> {
        let jwk = self
            .find(kid)
            .ok_or_else(|| LicenseError::UnknownKeyId(kid.to_string()))?;
        PublicKey::from_jwk(jwk).map_err(|err| match err {
            CryptoError::InvalidKey(msg) | CryptoError::UnsupportedAlgorithm(msg) => {
                LicenseError::UnsupportedAlgorithm(format!("key {kid}: {msg}"))
            }
            other => other.into(),
        })
    }

    pub fn jwk_set(&self) -> &JwkSet {
        &self.set
    }

    pub fn len(&self) -> usize {
        self.set.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.keys.is_empty()
    }
}

impl From<JwkSet> for PublisherKeySet {
    fn from(set: JwkSet) -> Self {
        Self::new(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::jwk::KeyAlgorithm;
    use turnstile_crypto::{SigningKeyPair, generate_publisher_key};

    #[test]
    fn resolve_finds_published_key() {
        let publisher = generate_publisher_key();
        let keys = PublisherKeySet::from_keys([(
            publisher.kid.clone(),
            publisher.key_pair.public_key(),
        )]);
        assert_eq!(keys.len(), 1);
        let resolved = keys.resolve(publisher.kid.as_str()).expect("resolve");
        assert_eq!(resolved, publisher.key_pair.public_key());
    }

    #[test]
    fn unknown_kid_is_reported() {
        let keys = PublisherKeySet::default();
        assert!(keys.is_empty());
        let err = keys.resolve("missing").expect_err("unknown kid");
        assert!(matches!(err, LicenseError::UnknownKeyId(kid) if kid == "missing"));
    }

    #[test]
    fn json_roundtrip() {
        let publisher = generate_publisher_key();
        let keys = PublisherKeySet::new(JwkSet {
            keys: vec![publisher.public_jwk()],
        });
        let json = keys.to_json().expect("to json");
        assert!(!json.contains("\"d\""));
        let parsed = PublisherKeySet::from_json(&json).expect("from json");
        assert!(parsed.find(publisher.kid.as_str()).is_some());
    }

    #[test]
    fn foreign_algorithm_entries_do_not_resolve() {
        let public = SigningKeyPair::generate().public_key();
        let mut jwk = public.to_jwk_with_kid(&KeyId::new("k1"));
        jwk.common.key_algorithm = Some(KeyAlgorithm::ES384);
        let keys = PublisherKeySet::new(JwkSet { keys: vec![jwk] });
        let err = keys.resolve("k1").expect_err("ES384 entry");
        assert!(matches!(err, LicenseError::UnsupportedAlgorithm(_)));
    }

    #[test]
    fn malformed_jwks_is_rejected() {
        let err = PublisherKeySet::from_json("{\"keys\": 7}").expect_err("bad jwks");
        assert!(matches!(err, LicenseError::InvalidKey(_)));
    }
}
