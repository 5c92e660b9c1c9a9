//! # rawnak-core: Pure Business Logic for Rawnak Sales
//!
//! This crate holds the domain model and every business rule of the sync
//! core as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Rawnak Sales Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 UI collaborators (out of scope)                 │   │
//! │  │      Products page ── Sales page ── Debts page ── Settings      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  rawnak-sync (SyncAgent)                        │   │
//! │  │   EntitySync ── CategoryRegistry ── BranchRegistry ── Coordinator│   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ rawnak-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │  ledger   │  │   sale    │  │   │
//! │  │   │  Product  │  │   Money   │  │ DEBIT/    │  │ plan_sale │  │   │
//! │  │   │  Customer │  │  Discount │  │ CREDIT    │  │ (pure)    │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO STORE • NO CACHE • PURE FUNCTIONS                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Branch, Product, Customer, Sale, Settings)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`ledger`] - Customer debt ledger rules
//! - [`sale`] - Pure read/validate/write planning for recording a sale
//! - [`category`] - Category list rules (case-insensitive set)
//! - [`seed`] - Fixed demo dataset used when no remote store exists
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use rawnak_core::money::Money;
//! use rawnak_core::types::Discount;
//!
//! let subtotal = Money::from_cents(10_000);
//! let discount = Discount::percentage(1000, subtotal); // 10%
//! assert_eq!(discount.amount.cents(), 1_000);
//! ```

pub mod category;
pub mod error;
pub mod ledger;
pub mod money;
pub mod sale;
pub mod seed;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Identifier of the distinguished default branch.
///
/// This branch is created on first run, is the fallback for an unknown
/// persisted selection, and can never be deleted.
pub const DEFAULT_BRANCH_ID: &str = "main";

/// Prefix marking ad-hoc cart items that are not backed by a Product.
pub const CUSTOM_ITEM_PREFIX: &str = "custom-";

/// Low-stock threshold applied when a product has none configured.
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 10;

/// Maximum lines allowed in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single line in a cart.
pub const MAX_ITEM_QUANTITY: i64 = 9_999;
