//! Unified error type definition

use serde::Serialize;
use thiserror::Error;

// Re-export library error types
pub use mailzone_provider::{ErrorClass, ProviderError, RecordValidationError};
pub use mailzone_verifier::VerifierError;

use crate::types::ApplyReport;

/// Core layer error type
#[derive(Error, Debug, Serialize)]
#[serde(tag = "code", content = "details")]
pub enum CoreError {
    /// No zone of the account contains the domain
    #[error("Zone not found for domain: {0}")]
    ZoneNotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Template rendering error (e.g. undefined variable)
    #[error("Template error: {0}")]
    Template(String),

    /// Some plan operations failed; the report lists every step
    #[error("{} of {} operations failed", .0.failed, .0.steps.len())]
    PartialFailure(ApplyReport),

    /// The caller's deadline expired
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Result cache error
    #[error("Cache error: {0}")]
    Cache(String),

    /// Provider error (converting from library)
    #[error("{0}")]
    Provider(#[from] ProviderError),

    /// Verifier input error
    #[error("{0}")]
    Verifier(#[from] VerifierError),
}

impl CoreError {
    /// Whether it is expected behavior (user input, resource does not exist, etc.) is used for log classification.
    ///
    /// Level `warn` should be used when returning `true` and level `error` when returning `false`.
    /// **Please update this method simultaneously when new variants are added. **
    #[must_use]
    pub fn is_expected(&self) -> bool {
        match self {
            Self::ZoneNotFound(_)
            | Self::Validation(_)
            | Self::Template(_)
            | Self::Cancelled(_) => true,
            Self::Verifier(e) => !matches!(e, VerifierError::Unresolved(_)),
            Self::Provider(e) => e.is_expected(),
            Self::PartialFailure(_) | Self::Config(_) | Self::Cache(_) => false,
        }
    }
}

impl From<RecordValidationError> for CoreError {
    fn from(e: RecordValidationError) -> Self {
        Self::Validation(e.to_string())
    }
}

/// Core layer Result type alias
pub type CoreResult<T> = std::result::Result<T, CoreError>;
