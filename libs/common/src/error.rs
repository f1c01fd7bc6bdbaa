//! Custom error types for the common library
//!
//! This module defines the error taxonomy shared by the session and sheets
//! services, plus the storage error returned by the persistence backends.

use serde_json::Value;
use thiserror::Error;

/// Error type for the key-value persistence backends
#[derive(Error, Debug)]
pub enum StorageError {
    /// Error occurred reading or writing a file-backed entry
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error occurred talking to Redis
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Configuration error
    #[error("Storage configuration error: {0}")]
    Configuration(String),
}

/// Type alias for Result with StorageError
pub type StorageResult<T> = Result<T, StorageError>;

/// Failure reported by the identity provider for a token request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// The user closed the consent window
    #[error("Login was canceled. Please try again.")]
    Cancelled,

    /// The consent window could not be opened
    #[error("Failed to open login window. Please check your browser pop-up blocker.")]
    PopupBlocked,

    /// A silent request could not be satisfied without user interaction
    #[error("User interaction required")]
    InteractionRequired,

    /// Any other provider error
    #[error("An unknown login error occurred.")]
    Provider(String),
}

/// Application error taxonomy
///
/// Every error that reaches the last-error slot is one of these. Variants are
/// cloneable so the status board can hand out snapshots.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppError {
    /// One of the external SDKs failed to load or initialise
    #[error("Failed to load {sdk}: {reason}")]
    SdkLoad { sdk: String, reason: String },

    /// The identity provider rejected a token request
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// The local session is missing or expired
    #[error("{0}")]
    SessionInvalid(String),

    /// The spreadsheet service returned an error payload
    #[error("Remote API error (status {status:?}): {details}")]
    RemoteApi { status: Option<u16>, details: Value },

    /// A persisted record could not be parsed
    #[error("Malformed persisted record '{key}': {reason}")]
    MalformedRecord { key: String, reason: String },

    /// Tabular input could not be mapped to rows of cells
    #[error("Malformed import: {0}")]
    MalformedImport(String),

    /// The persistence backend failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// A required user setting is missing
    #[error("Not configured: {0}")]
    NotConfigured(String),
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::Storage(err.to_string())
    }
}
