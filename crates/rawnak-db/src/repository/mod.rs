//! # Repository Module
//!
//! SQL access for the local cache.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  EntitySync / BranchRegistry                                           │
//! │       │                                                                 │
//! │       │  cache.get("products_main")                                    │
//! │       ▼                                                                 │
//! │  CacheRepository                                                       │
//! │  ├── get(&self, key)                                                   │
//! │  ├── put(&self, key, value)                                            │
//! │  ├── remove(&self, key)                                                │
//! │  └── keys_with_prefix(&self, prefix)                                   │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  local_cache table                                                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
