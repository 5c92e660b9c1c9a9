//! # Sync Error Types
//!
//! Error types for store access, sync engines and the sale workflow.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │     Domain      │  │     Remote Store        │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Core(..)       │  │  Store(NotFound)        │ │
//! │  │  ConfigLoad     │  │  NotFound       │  │  StoreUnavailable       │ │
//! │  │  ConfigSave     │  │  InsufficientSt │  │  Contention             │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │   Local Cache   │  │    Internal     │                              │
//! │  │                 │  │                 │                              │
//! │  │  Cache(DbError) │  │  Serialization  │                              │
//! │  │                 │  │  Internal       │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant maps onto one [`ErrorKind`] through [`SyncError::kind`].

use rawnak_core::{CoreError, ErrorKind};
use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type alias for raw store calls.
pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Store Errors
// =============================================================================

/// Failures reported by a [`RemoteStore`](crate::store::RemoteStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// An update targeted a document that does not exist.
    #[error("Document not found: {path}")]
    NotFound { path: String },

    /// The store cannot be reached.
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),

    /// A document could not be encoded or decoded.
    #[error("Document serialization failed at {path}: {reason}")]
    Serialization { path: String, reason: String },

    /// The store rejected the path or payload.
    #[error("Invalid store request: {0}")]
    InvalidRequest(String),
}

impl StoreError {
    pub fn not_found(path: impl Into<String>) -> Self {
        StoreError::NotFound { path: path.into() }
    }

    pub fn serialization(path: impl Into<String>, err: serde_json::Error) -> Self {
        StoreError::Serialization {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

// =============================================================================
// Sync Errors
// =============================================================================

/// Error type for every public operation of this crate.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Domain Errors
    // =========================================================================
    /// A business rule rejected the operation.
    #[error(transparent)]
    Core(#[from] CoreError),

    // =========================================================================
    // Remote Store Errors
    // =========================================================================
    /// A store call failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The operation needs the remote store and none is configured.
    #[error("{operation} requires the remote store, which is not configured")]
    StoreUnavailable { operation: &'static str },

    /// Optimistic transaction kept conflicting.
    #[error("Transaction aborted after {attempts} conflicting attempts")]
    Contention { attempts: u32 },

    // =========================================================================
    // Local Cache Errors
    // =========================================================================
    /// A cache write failed.
    #[error("Local cache error: {0}")]
    Cache(#[from] rawnak_db::DbError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Failed to encode or decode a value.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Internal sync error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<rawnak_core::ValidationError> for SyncError {
    fn from(err: rawnak_core::ValidationError) -> Self {
        SyncError::Core(CoreError::Validation(err))
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Kind reported to callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Core(e) => e.kind(),
            SyncError::Store(StoreError::NotFound { .. }) => ErrorKind::NotFound,
            SyncError::Store(StoreError::Unavailable(_)) => ErrorKind::StoreUnavailable,
            SyncError::Store(_) => ErrorKind::Internal,
            SyncError::StoreUnavailable { .. } => ErrorKind::StoreUnavailable,
            SyncError::Contention { .. } => ErrorKind::Conflict,
            SyncError::InvalidConfig(_) => ErrorKind::InvalidArgument,
            SyncError::ConfigLoadFailed(_)
            | SyncError::ConfigSaveFailed(_)
            | SyncError::Cache(_)
            | SyncError::SerializationFailed(_)
            | SyncError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Contention { .. } | SyncError::Store(StoreError::Unavailable(_))
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}
