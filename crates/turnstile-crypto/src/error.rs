use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("key encoding failed: {0}")]
    Encoding(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
