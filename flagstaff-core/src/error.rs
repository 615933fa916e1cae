//! Error types for feature resolution and storage.

use thiserror::Error;

/// Result type for feature operations.
pub type FeatureResult<T> = Result<T, FeatureError>;

/// Feature-specific errors.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// No closure or resolver is registered under the feature name
    #[error("Feature not defined: {0}")]
    NotDefined(String),

    /// The manager was built without a configuration
    #[error("Feature manager not configured: {0}")]
    NotConfigured(String),

    /// No configuration entry exists for the driver name
    #[error("Feature store [{0}] is not defined")]
    UnknownDriver(String),

    /// No factory is registered for the configured driver kind
    #[error("Driver [{0}] is not supported")]
    UnsupportedDriver(String),

    /// Persistence backend error
    #[error("Store error: {0}")]
    Store(String),

    /// A fallible resolver returned an error
    #[error("Resolver for feature [{feature}] failed: {message}")]
    Resolver { feature: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FeatureError {
    /// Build a resolver error for `feature`.
    pub fn resolver(feature: impl Into<String>, message: impl ToString) -> Self {
        Self::Resolver {
            feature: feature.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error came from the persistence backend.
    pub fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}
