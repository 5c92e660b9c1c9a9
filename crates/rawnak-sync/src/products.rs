//! # Product Operations
//!
//! Typed writes on the product engine. Reads go through the engine's view.

use chrono::Utc;
use rawnak_core::validation::{
    validate_price, validate_product_draft, validate_product_name, validate_stock,
};
use rawnak_core::{BranchScope, Product, ProductDraft, ProductPatch};
use tracing::info;
use uuid::Uuid;

use crate::engine::EntitySync;
use crate::error::SyncResult;

impl EntitySync<Product> {
    /// Creates a product with a generated id and `createdAt = now`.
    pub async fn add(&self, scope: &BranchScope, draft: ProductDraft) -> SyncResult<Product> {
        let draft = validate_product_draft(draft)?;
        let product = Product::from_draft(Uuid::new_v4().to_string(), draft, Utc::now());

        self.put(scope, product.clone()).await?;
        info!(branch_id = %scope, product_id = %product.id, name = %product.name, "Product added");
        Ok(product)
    }

    /// Applies the present fields of `patch`. An empty patch is a no-op.
    pub async fn update(&self, scope: &BranchScope, id: &str, patch: ProductPatch) -> SyncResult<()> {
        let mut patch = patch;
        if let Some(name) = &patch.name {
            patch.name = Some(validate_product_name(name)?);
        }
        if let Some(price) = patch.price {
            validate_price("price", price)?;
        }
        if let Some(cost) = patch.purchase_price {
            validate_price("purchase price", cost)?;
        }
        if let Some(stock) = patch.stock {
            validate_stock(stock)?;
        }
        if let Some(threshold) = patch.low_stock_threshold {
            validate_stock(threshold)?;
        }

        if patch == ProductPatch::default() {
            return Ok(());
        }

        let fields = serde_json::to_value(&patch)?;
        self.patch(scope, id, fields).await?;
        info!(branch_id = %scope, product_id = %id, "Product updated");
        Ok(())
    }

    pub async fn delete(&self, scope: &BranchScope, id: &str) -> SyncResult<()> {
        self.remove(scope, id).await?;
        info!(branch_id = %scope, product_id = %id, "Product deleted");
        Ok(())
    }

    /// Products of the current view at or under their low-stock threshold.
    pub fn low_stock(&self) -> Vec<Product> {
        self.items().into_iter().filter(Product::is_low_stock).collect()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ProductSync, ViewSource};
    use crate::store::{MemoryStore, RemoteStore};
    use crate::testing::wait_for;
    use rawnak_core::{ErrorKind, Money};
    use rawnak_db::MemoryCache;
    use std::sync::Arc;

    fn draft(name: &str, stock: i64) -> ProductDraft {
        ProductDraft {
            name: name.into(),
            category: "Grains".into(),
            price: Money::from_cents(250),
            purchase_price: Money::from_cents(180),
            stock,
            description: None,
            low_stock_threshold: None,
        }
    }

    #[tokio::test]
    async fn test_add_update_delete_remote() {
        let store = Arc::new(MemoryStore::new());
        let products = ProductSync::new(
            Some(store.clone() as Arc<dyn RemoteStore>),
            Arc::new(MemoryCache::new()),
        );
        let scope = BranchScope::new("b2");
        let mut rx = products.watch();
        products.subscribe(&scope).await.unwrap();

        let added = products.add(&scope, draft("  Basmati Rice ", 40)).await.unwrap();
        assert_eq!(added.name, "Basmati Rice");

        let view = wait_for(&mut rx, |v| v.source == ViewSource::Remote && v.items.len() == 1).await;
        assert_eq!(view.items[0].id, added.id);

        products
            .update(
                &scope,
                &added.id,
                ProductPatch {
                    stock: Some(4),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let view = wait_for(&mut rx, |v| v.items.first().map(|p| p.stock) == Some(4)).await;
        assert_eq!(view.items[0].name, "Basmati Rice");
        assert_eq!(products.low_stock().len(), 1);

        products.delete(&scope, &added.id).await.unwrap();
        wait_for(&mut rx, |v| v.items.is_empty()).await;
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected_before_io() {
        let store = Arc::new(MemoryStore::new());
        let products = ProductSync::new(
            Some(store.clone() as Arc<dyn RemoteStore>),
            Arc::new(MemoryCache::new()),
        );
        let scope = BranchScope::new("b2");

        let err = products.add(&scope, draft("   ", 1)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = products.add(&scope, draft("Rice", -1)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = products
            .update(
                &scope,
                "1",
                ProductPatch {
                    price: Some(Money::from_cents(-5)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_offline_add_is_local() {
        let products = ProductSync::new(None, Arc::new(MemoryCache::new()));
        let scope = BranchScope::default_branch();
        products.subscribe(&scope).await.unwrap();

        let added = products.add(&scope, draft("Dates", 12)).await.unwrap();
        let view = products.current();
        assert_eq!(view.items.len(), 6);
        assert_eq!(view.items[0].id, added.id);
    }
}
