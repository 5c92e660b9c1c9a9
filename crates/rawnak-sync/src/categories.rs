//! # Category Registry
//!
//! The category list of a branch, plus the three edits on it. Renames and
//! deletes also look at the branch's products.
//!
//! ```text
//! add(name)          AtomicUpdate on data/categories
//!                    case-insensitive duplicate → no write
//!
//! rename(old, new)   one batch:  Set data/categories { list }
//!                                Update products/{id} { category: new }
//!                                for every product with category == old
//!
//! delete(name)       products in use? → CategoryInUse, list unchanged
//!                    else Set data/categories without name
//! ```
//!
//! `delete` reads the products before it writes the list, so a product
//! created in between can still end up in a deleted category.

use std::sync::Arc;

use rawnak_core::category;
use rawnak_core::{BranchScope, CoreError, Product};
use serde_json::json;
use tokio::sync::watch;
use tracing::info;

use crate::document::{DocumentSync, DocumentView, SyncDocument};
use crate::engine::ProductSync;
use crate::error::{SyncError, SyncResult};
use crate::store::{self, collection_path, AtomicUpdate, RemoteStore, WriteOp};

/// Branch-scoped category list.
pub struct CategoryRegistry {
    doc: DocumentSync<Vec<String>>,
    products: Arc<ProductSync>,
}

impl CategoryRegistry {
    /// `products` is consulted for renames and deletes, and must share the
    /// registry's store.
    pub fn new(
        store: Option<Arc<dyn RemoteStore>>,
        cache: Arc<dyn rawnak_db::LocalCache>,
        products: Arc<ProductSync>,
    ) -> Self {
        CategoryRegistry {
            doc: DocumentSync::new(store, cache),
            products,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.doc = self.doc.with_max_attempts(attempts);
        self
    }

    pub fn watch(&self) -> watch::Receiver<DocumentView<Vec<String>>> {
        self.doc.watch()
    }

    pub fn current(&self) -> DocumentView<Vec<String>> {
        self.doc.current()
    }

    /// The category names of the current view.
    pub fn list(&self) -> Vec<String> {
        self.doc.value()
    }

    pub async fn subscribe(&self, scope: &BranchScope) -> SyncResult<()> {
        self.doc.subscribe(scope).await
    }

    pub async fn unsubscribe(&self) {
        self.doc.unsubscribe().await
    }

    // =========================================================================
    // Edits
    // =========================================================================

    /// Adds `name` unless a case-insensitive match exists.
    ///
    /// Returns whether the list changed.
    pub async fn add(&self, scope: &BranchScope, name: &str) -> SyncResult<bool> {
        let Some(store) = self.doc.store() else {
            let mut changed = false;
            self.doc
                .modify_local(scope, |list| {
                    let next = category::with_added(list, name)?;
                    changed = next.is_some();
                    Ok(next)
                })
                .await?;
            return Ok(changed);
        };

        let path = Vec::<String>::path(scope.branch_id());
        let changed = AtomicUpdate::new(vec![path.clone()])
            .max_attempts(self.doc.max_attempts())
            .run(store.as_ref(), |snapshot| {
                let current: Vec<String> = snapshot
                    .get(&path)
                    .map(|data| Vec::<String>::from_body(data.clone()))
                    .transpose()?
                    .unwrap_or_default();
                match category::with_added(&current, name)? {
                    Some(next) => Ok((vec![WriteOp::set(path.clone(), next.to_body()?)], true)),
                    None => Ok((Vec::new(), false)),
                }
            })
            .await?;

        if changed {
            info!(branch_id = %scope, category = %name.trim(), "Category added");
        }
        Ok(changed)
    }

    /// Renames `old` to `new` and moves every product of `old` along.
    ///
    /// Renaming onto an existing name merges the two entries.
    pub async fn rename(&self, scope: &BranchScope, old: &str, new: &str) -> SyncResult<()> {
        let Some(store) = self.doc.store() else {
            return self.rename_local(scope, old, new).await;
        };

        let path = Vec::<String>::path(scope.branch_id());
        let current = self.read_list(store.as_ref(), &path).await?;
        let Some(next) = category::with_renamed(&current, old, new)? else {
            return Ok(());
        };
        let new = new.trim();

        let products = self.read_products(store.as_ref(), scope).await?;
        let mut batch = vec![WriteOp::set(path, next.to_body()?)];
        let mut moved = 0usize;
        for product in category::products_in(&products, old) {
            let product_path = self.products.doc_path(scope, &product.id);
            batch.push(WriteOp::update(product_path, json!({ "category": new })));
            moved += 1;
        }

        store.commit(batch).await?;
        info!(branch_id = %scope, old, new, products = moved, "Category renamed");
        Ok(())
    }

    /// Removes `name` when no product of the branch uses it.
    ///
    /// ## Errors
    /// `CategoryInUse` with the number of referencing products.
    pub async fn delete(&self, scope: &BranchScope, name: &str) -> SyncResult<()> {
        let Some(store) = self.doc.store() else {
            let products = self.products.local_items(scope).await;
            ensure_unused(&products, name)?;
            self.doc
                .modify_local(scope, |list| Ok(category::with_removed(list, name)))
                .await?;
            return Ok(());
        };

        let products = self.read_products(store.as_ref(), scope).await?;
        ensure_unused(&products, name)?;

        let path = Vec::<String>::path(scope.branch_id());
        let current = self.read_list(store.as_ref(), &path).await?;
        if let Some(next) = category::with_removed(&current, name) {
            store.set(&path, next.to_body()?).await?;
            info!(branch_id = %scope, category = name, "Category deleted");
        }
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn rename_local(&self, scope: &BranchScope, old: &str, new: &str) -> SyncResult<()> {
        let mut renamed = false;
        self.doc
            .modify_local(scope, |list| {
                let next = category::with_renamed(list, old, new)?;
                renamed = next.is_some();
                Ok(next)
            })
            .await?;
        if !renamed {
            return Ok(());
        }

        let new = new.trim();
        let products = self.products.local_items(scope).await;
        for product in category::products_in(&products, old) {
            self.products
                .patch(scope, &product.id, json!({ "category": new }))
                .await?;
        }
        Ok(())
    }

    async fn read_list(&self, store: &dyn RemoteStore, path: &str) -> SyncResult<Vec<String>> {
        Ok(match store.get(path).await? {
            Some(doc) => Vec::<String>::from_body(doc.data)?,
            None => Vec::new(),
        })
    }

    async fn read_products(&self, store: &dyn RemoteStore, scope: &BranchScope) -> SyncResult<Vec<Product>> {
        let docs = store
            .list(&collection_path(scope.branch_id(), "products"))
            .await?;
        docs.iter()
            .map(|doc| store::decode::<Product>(doc).map_err(SyncError::from))
            .collect()
    }
}

fn ensure_unused(products: &[Product], name: &str) -> SyncResult<()> {
    let in_use = category::products_in(products, name).count();
    if in_use > 0 {
        return Err(CoreError::CategoryInUse {
            name: name.to_string(),
            products: in_use,
        }
        .into());
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
