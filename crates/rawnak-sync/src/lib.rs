//! # rawnak-sync: Branch-Scoped Sync Layer for Rawnak Sales
//!
//! Mirrors each branch's products, customers, sales, categories and
//! settings from a remote document store into observable views, and
//! records sales as single atomic updates.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         rawnak-sync Architecture                        │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                     SyncAgent (orchestrator)                     │  │
//! │  │  active BranchScope ─► re-scopes every component on change       │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │   ┌──────────────┬────────────┼───────────┬──────────────────────┐     │
//! │   ▼              ▼            ▼           ▼                      ▼      │
//! │ EntitySync<E>  CategoryRegistry  SettingsStore  BranchRegistry  Sale   │
//! │ products        (DocumentSync)   (DocumentSync)  /branches      Coord- │
//! │ customers                                        activeBranchId inator │
//! │ sales                                                                   │
//! │   │                  │                │             │            │      │
//! │   └──────────────────┴────────┬───────┴─────────────┘            │      │
//! │                               ▼                                  ▼      │
//! │            ┌─────────────────────────────┐        ┌────────────────┐    │
//! │            │ RemoteStore (trait)         │◄───────│ AtomicUpdate   │    │
//! │            │  get / list / commit        │        │ read_versions  │    │
//! │            │  watch_collection / _doc    │        │ try_commit     │    │
//! │            │  MemoryStore                │        │ retry ≤ N      │    │
//! │            └─────────────────────────────┘        └────────────────┘    │
//! │            ┌─────────────────────────────┐                             │
//! │            │ LocalCache (rawnak-db)      │  written on authoritative   │
//! │            │  SQLite  |  memory          │  snapshots only             │
//! │            └─────────────────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`agent`] - `SyncAgent` orchestrator and event emitter
//! - [`config`] - Sync configuration (store mode, cache backend, retries)
//! - [`error`] - Store and sync error types
//! - [`store`] - Remote store trait, in-memory store, atomic updates
//! - [`engine`] - Generic branch-scoped collection mirror
//! - `scoped` - Subscription lifecycle shared by the engine and documents
//! - [`document`] - Branch-scoped singleton document mirror
//! - [`products`], [`customers`] - Typed entity operations
//! - [`categories`] - Category list and its edits
//! - [`settings`] - Notification and invoice settings
//! - [`branch`] - Branch list and active branch
//! - [`coordinator`] - Atomic sale recording
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rawnak_sync::{SyncAgent, SyncConfig};
//!
//! let config = SyncConfig::load_or_default(None);
//! let agent = SyncAgent::from_config(config).await?;
//! let scope = agent.start().await?;
//!
//! let mut products = agent.products().watch();
//! products.changed().await?;
//! println!("{} products in {}", products.borrow().items.len(), scope);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod branch;
pub mod categories;
pub mod config;
pub mod coordinator;
pub mod customers;
pub mod document;
pub mod engine;
pub mod error;
pub mod products;
mod scoped;
pub mod settings;
pub mod store;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{NoOpEmitter, SyncAgent, SyncEventEmitter, SyncStatus};
pub use branch::BranchRegistry;
pub use categories::CategoryRegistry;
pub use config::{CacheBackend, StoreMode, SyncConfig};
pub use coordinator::SaleCoordinator;
pub use document::{DocumentSync, DocumentView, SyncDocument};
pub use engine::{
    CollectionView, CustomerSync, EntitySync, ProductSync, SaleSync, SyncEntity, ViewSource,
};
pub use error::{StoreError, StoreResult, SyncError, SyncResult};
pub use settings::SettingsStore;
pub use store::{AtomicUpdate, MemoryStore, RemoteStore, WriteOp};
