//! Error types for the campaign sender.

use std::path::PathBuf;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Recipient source error: {0}")]
    Source(#[from] SourceError),

    #[error("Progress store error: {0}")]
    Store(#[from] StoreError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors reading the recipient dataset. All of these are fatal and surface
/// before the first send.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Recipient file {path} unavailable: {reason}")]
    Unavailable { path: PathBuf, reason: String },

    #[error("Required field '{field}' missing {location}")]
    Schema { field: String, location: String },

    #[error("Recipient file is malformed: {0}")]
    Malformed(String),
}

/// Errors from the delivery provider for a single message.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider {provider} request failed: {reason}")]
    Request { provider: String, reason: String },

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Progress persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to persist progress to {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    #[error("Progress file {path} is corrupt ({reason}); fix or remove it manually before resuming")]
    Corrupt { path: PathBuf, reason: String },
}

/// Template loading errors.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Template {path} unavailable: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for the campaign sender.
pub type Result<T> = std::result::Result<T, Error>;
