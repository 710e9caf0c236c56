use thiserror::Error;
use x509_parser::prelude::X509Error;

use super::store::CrlStoreError;

/// CRL-related errors
#[derive(Error, Debug)]
pub enum CrlError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CRL parsing failed: {0}")]
    Parse(#[from] X509Error),

    #[error("Malformed DER in extension: {0}")]
    Decode(String),

    #[error("Malformed CRL: {0}")]
    MalformedCrl(String),

    #[error("CRL validation failed: {0}")]
    Validation(String),

    #[error("CRL distribution point not found in certificate")]
    NoDistributionPoint,

    #[error("No CRL could be obtained from any distribution point")]
    Unavailable,

    #[error("Timeout while fetching CRL")]
    Timeout,

    #[error("Invalid CRL URL: {0}")]
    InvalidUrl(String),

    #[error("CRL response exceeds {limit} bytes")]
    ResponseTooLarge { limit: usize },

    #[error("CRL store error: {0}")]
    Store(#[from] CrlStoreError),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl CrlError {
    /// Whether the failure is local to one distribution point, so the next URL should be tried.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CrlError::Http(_)
                | CrlError::Parse(_)
                | CrlError::Decode(_)
                | CrlError::MalformedCrl(_)
                | CrlError::Timeout
                | CrlError::InvalidUrl(_)
                | CrlError::ResponseTooLarge { .. }
                | CrlError::Custom(_)
        )
    }
}

impl From<url::ParseError> for CrlError {
    fn from(e: url::ParseError) -> Self {
        CrlError::InvalidUrl(e.to_string())
    }
}

/// Convenient Result type alias
pub type CrlResult<T> = Result<T, CrlError>;
