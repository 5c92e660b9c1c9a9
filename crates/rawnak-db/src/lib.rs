//! # rawnak-db: Local Cache Layer for Rawnak Sales
//!
//! This crate provides the local persisted cache: a keyed store mapping
//! `(entityKind, branchId)` to a serialized collection, read instantly at
//! subscription time and overwritten on every authoritative snapshot.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Rawnak Sales Data Flow                           │
//! │                                                                         │
//! │  EntitySync::subscribe(scope)                                          │
//! │       │                                                                 │
//! │       │ 1. read cache (instant, maybe stale)                            │
//! │       │ 2. remote snapshot → write cache → publish                      │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    rawnak-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │  LocalCache   │    │  Repository   │    │  Migrations  │  │   │
//! │  │   │  (cache.rs)   │    │  (cache.rs)   │    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ MemoryCache   │    │ CacheRepo     │◄───│ 001_local_   │  │   │
//! │  │   │ CacheRepo ────┼───►│ SqlitePool    │    │   cache.sql  │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   <data dir>/com.rawnak.sales/cache.db                          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`cache`] - `LocalCache` trait, key scheme, typed JSON helpers, in-memory fake
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - SQL for the cache table
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rawnak_db::{cache, Database, DbConfig, LocalCache};
//!
//! let db = Database::new(DbConfig::new("./cache.db")).await?;
//! let store = db.cache();
//! cache::write_json(&store, &cache::collection_key("products", "main"), &products).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cache;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use cache::{LocalCache, MemoryCache};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::cache::CacheRepository;
