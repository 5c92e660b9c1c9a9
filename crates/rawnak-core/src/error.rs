//! # Error Types
//!
//! Domain-specific error types for rawnak-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  rawnak-core errors (this file)                                        │
//! │  ├── CoreError        - Business rule violations                       │
//! │  ├── ValidationError  - Input validation failures                      │
//! │  └── ErrorKind        - Caller-facing taxonomy                         │
//! │                                                                         │
//! │  rawnak-db errors (separate crate)                                     │
//! │  └── DbError          - Local cache failures                           │
//! │                                                                         │
//! │  rawnak-sync errors (separate crate)                                   │
//! │  ├── StoreError       - Remote store failures                          │
//! │  └── SyncError        - What callers see, classified by ErrorKind      │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError → ErrorKind             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (product, customer, entry ids)
//! 3. Errors are enum variants, never String
//! 4. Every variant maps onto exactly one [`ErrorKind`]

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

// =============================================================================
// Error Kind
// =============================================================================

/// Caller-facing classification of every failure the sync core reports.
///
/// Serialized as SCREAMING_SNAKE_CASE so UI collaborators can switch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum ErrorKind {
    /// A referenced product, customer, ledger entry or branch is missing.
    NotFound,
    /// A sale line asks for more units than the store holds.
    InsufficientStock,
    /// A category is still referenced by at least one product.
    CategoryInUse,
    /// The caller's role does not allow the operation.
    PermissionDenied,
    /// Input rejected before any I/O (empty name, empty cart, ...).
    InvalidArgument,
    /// No remote store is configured. Reads fall back to seed data.
    StoreUnavailable,
    /// Optimistic transaction retries were exhausted.
    Conflict,
    /// Store, cache or serialization failure.
    Internal,
}

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations. They are produced by
/// the pure functions of this crate and carried unchanged through the
/// sync layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Product referenced by a cart line does not exist in the branch.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Customer does not exist in the branch.
    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    /// Ledger entry is not part of the customer's ledger.
    #[error("Ledger entry {entry_id} not found for customer {customer_id}")]
    LedgerEntryNotFound {
        customer_id: String,
        entry_id: String,
    },

    /// Branch does not exist in the registry.
    #[error("Branch not found: {0}")]
    BranchNotFound(String),

    /// Insufficient stock to complete a sale.
    ///
    /// ## User Workflow
    /// ```text
    /// Cart: Organic Apples × 5
    ///      │
    ///      ▼
    /// Read phase: stock = 3
    ///      │
    ///      ▼
    /// InsufficientStock { product: "2", available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// Nothing is written: no sale, no stock change, no ledger entry
    /// ```
    #[error("Insufficient stock for {product}: available {available}, requested {requested}")]
    InsufficientStock {
        product: String,
        available: i64,
        requested: i64,
    },

    /// Category cannot be deleted while products reference it.
    #[error("Category '{name}' is used by {products} product(s)")]
    CategoryInUse { name: String, products: usize },

    /// Operation requires a role the caller does not hold.
    #[error("Permission denied: {action} requires the Admin role")]
    PermissionDenied { action: String },

    /// The default branch can never be deleted.
    #[error("The default branch '{0}' cannot be deleted")]
    DefaultBranchProtected(String),

    /// A sale needs at least one cart line.
    #[error("Cart is empty")]
    EmptyCart,

    /// Cart has exceeded maximum allowed lines.
    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Classifies this error for callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::ProductNotFound(_)
            | CoreError::CustomerNotFound(_)
            | CoreError::LedgerEntryNotFound { .. }
            | CoreError::BranchNotFound(_) => ErrorKind::NotFound,
            CoreError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            CoreError::CategoryInUse { .. } => ErrorKind::CategoryInUse,
            CoreError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            CoreError::DefaultBranchProtected(_)
            | CoreError::EmptyCart
            | CoreError::CartTooLarge { .. }
            | CoreError::Validation(_) => ErrorKind::InvalidArgument,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Used for early validation before business logic runs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., an id that does not fit its kind).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
