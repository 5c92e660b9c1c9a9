//! # Customer Operations
//!
//! Typed writes on the customer engine, including the two ledger mutations
//! that run as atomic updates.
//!
//! ## Ledger Mutations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  delete_ledger_entry(customer, entry)                                  │
//! │  record_payment(customer, amount)                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  AtomicUpdate { reads: [branches/{b}/customers/{id}] }                 │
//! │       │  read customer  (missing → CustomerNotFound)                   │
//! │       │  ledger::remove_entry / ledger::append_credit                   │
//! │       │     total recomputed as Σ DEBIT − Σ CREDIT                      │
//! │       ▼                                                                 │
//! │  Update { totalDebt, transactions }    conflict → retry                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use rawnak_core::ledger::{self, LedgerUpdate};
use rawnak_core::validation::{validate_customer_name, validate_payment_amount};
use rawnak_core::{
    BranchScope, CoreError, CoreResult, Customer, CustomerDraft, CustomerPatch, Money,
};
use tracing::info;
use uuid::Uuid;

use crate::engine::EntitySync;
use crate::error::SyncResult;
use crate::store::{self, AtomicUpdate, WriteOp};

/// Description used when a payment is recorded without one.
pub const DEFAULT_PAYMENT_DESCRIPTION: &str = "Payment";

impl EntitySync<Customer> {
    /// Creates a customer with zero debt and an empty ledger.
    pub async fn add(&self, scope: &BranchScope, draft: CustomerDraft) -> SyncResult<Customer> {
        let name = validate_customer_name(&draft.name)?;
        let customer = Customer::new(
            Uuid::new_v4().to_string(),
            CustomerDraft {
                name,
                phone: draft.phone,
            },
            Utc::now(),
        );

        self.put(scope, customer.clone()).await?;
        info!(branch_id = %scope, customer_id = %customer.id, debt_id = %customer.debt_id, "Customer added");
        Ok(customer)
    }

    /// Applies the present fields of `patch`. An empty patch is a no-op.
    pub async fn update(&self, scope: &BranchScope, id: &str, patch: CustomerPatch) -> SyncResult<()> {
        let mut patch = patch;
        if let Some(name) = &patch.name {
            patch.name = Some(validate_customer_name(name)?);
        }
        if patch == CustomerPatch::default() {
            return Ok(());
        }

        let fields = serde_json::to_value(&patch)?;
        self.patch(scope, id, fields).await?;
        info!(branch_id = %scope, customer_id = %id, "Customer updated");
        Ok(())
    }

    pub async fn delete(&self, scope: &BranchScope, id: &str) -> SyncResult<()> {
        self.remove(scope, id).await?;
        info!(branch_id = %scope, customer_id = %id, "Customer deleted");
        Ok(())
    }

    /// Removes one ledger entry and recomputes the total debt.
    ///
    /// ## Errors
    /// - `CustomerNotFound` / `NotFound` when the customer is missing
    /// - `LedgerEntryNotFound` when the entry is not in the ledger
    pub async fn delete_ledger_entry(
        &self,
        scope: &BranchScope,
        customer_id: &str,
        entry_id: &str,
    ) -> SyncResult<Customer> {
        let customer = self
            .apply_ledger(scope, customer_id, |c| ledger::remove_entry(c, entry_id))
            .await?;
        info!(
            branch_id = %scope,
            customer_id,
            entry_id,
            total_debt = %customer.total_debt,
            "Ledger entry deleted"
        );
        Ok(customer)
    }

    /// Appends a CREDIT for a payment and recomputes the total debt.
    pub async fn record_payment(
        &self,
        scope: &BranchScope,
        customer_id: &str,
        amount: Money,
        description: Option<&str>,
    ) -> SyncResult<Customer> {
        validate_payment_amount(amount)?;

        let now = Utc::now();
        let entry = ledger::payment_credit(
            ledger::new_entry_id(now),
            description
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .unwrap_or(DEFAULT_PAYMENT_DESCRIPTION),
            amount,
            now,
        );

        let customer = self
            .apply_ledger(scope, customer_id, |c| Ok(ledger::append_credit(c, entry.clone())))
            .await?;
        info!(
            branch_id = %scope,
            customer_id,
            amount = %amount,
            total_debt = %customer.total_debt,
            "Payment recorded"
        );
        Ok(customer)
    }

    /// Runs a ledger change against the freshest customer document.
    async fn apply_ledger<F>(&self, scope: &BranchScope, customer_id: &str, change: F) -> SyncResult<Customer>
    where
        F: Fn(&Customer) -> CoreResult<LedgerUpdate> + Send + Sync,
    {
        let Some(store) = self.store() else {
            return self
                .modify_local(scope, customer_id, |customer| {
                    change(customer)?.apply(customer);
                    Ok(customer.clone())
                })
                .await;
        };

        let path = self.doc_path(scope, customer_id);
        AtomicUpdate::new(vec![path.clone()])
            .max_attempts(self.max_attempts())
            .run(store.as_ref(), |snapshot| {
                let mut customer: Customer = snapshot
                    .decode(&path)?
                    .ok_or_else(|| CoreError::CustomerNotFound(customer_id.to_string()))?;
                let update = change(&customer)?;
                let data = store::encode(&path, &update)?;
                update.apply(&mut customer);
                Ok((vec![WriteOp::update(path.clone(), data)], customer))
            })
            .await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::CustomerSync;
    use crate::store::{MemoryStore, RemoteStore};
    use rawnak_core::ledger::compute_total_debt;
    use rawnak_core::{EntryKind, ErrorKind};
    use rawnak_db::MemoryCache;
    use std::sync::Arc;

    fn remote() -> (Arc<MemoryStore>, CustomerSync) {
        let store = Arc::new(MemoryStore::new());
        let customers = CustomerSync::new(
            Some(store.clone() as Arc<dyn RemoteStore>),
            Arc::new(MemoryCache::new()),
        );
        (store, customers)
    }

    async fn read(store: &MemoryStore, scope: &BranchScope, id: &str) -> Customer {
        let doc = store
            .get(&format!("branches/{}/customers/{}", scope, id))
            .await
            .unwrap()
            .unwrap();
        store::decode(&doc).unwrap()
    }

    #[tokio::test]
    async fn test_add_assigns_debt_account() {
        let (store, customers) = remote();
        let scope = BranchScope::new("b2");

        let added = customers
            .add(
                &scope,
                CustomerDraft {
                    name: " Ali Hassan ".into(),
                    phone: Some("".into()),
                },
            )
            .await
            .unwrap();

        assert_eq!(added.name, "Ali Hassan");
        assert!(added.debt_id.starts_with('D'));
        assert_eq!(added.phone, None);
        assert!(added.total_debt.is_zero());
        assert_eq!(read(&store, &scope, &added.id).await, added);
    }

    #[tokio::test]
    async fn test_payment_then_delete_entry_keeps_total_consistent() {
        let (store, customers) = remote();
        let scope = BranchScope::default_branch();
        let seeded = rawnak_core::seed::initial_customers(Utc::now().date_naive());
        let c001 = seeded.iter().find(|c| c.id == "C001").unwrap().clone();
        let path = "branches/main/customers/C001";
        store.set(path, store::encode(path, &c001).unwrap()).await.unwrap();

        let after_payment = customers
            .record_payment(&scope, "C001", Money::from_cents(50_000), None)
            .await
            .unwrap();
        assert_eq!(after_payment.total_debt, c001.total_debt - Money::from_cents(50_000));
        let credit = after_payment.ledger.last().unwrap();
        assert_eq!(credit.kind, EntryKind::Credit);
        assert_eq!(credit.description, "Payment");

        let after_delete = customers
            .delete_ledger_entry(&scope, "C001", &credit.id)
            .await
            .unwrap();
        assert_eq!(after_delete.total_debt, compute_total_debt(&after_delete.ledger));
        assert_eq!(after_delete.total_debt, c001.total_debt);

        let stored = read(&store, &scope, "C001").await;
        assert_eq!(stored.total_debt, compute_total_debt(&stored.ledger));
    }

    #[tokio::test]
    async fn test_ledger_errors() {
        let (store, customers) = remote();
        let scope = BranchScope::new("b2");

        let err = customers
            .delete_ledger_entry(&scope, "missing", "T1")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let added = customers
            .add(
                &scope,
                CustomerDraft {
                    name: "Sara".into(),
                    phone: None,
                },
            )
            .await
            .unwrap();
        let err = customers
            .delete_ledger_entry(&scope, &added.id, "T404")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = customers
            .record_payment(&scope, &added.id, Money::zero(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        assert_eq!(read(&store, &scope, &added.id).await, added);
    }

    #[tokio::test]
    async fn test_offline_ledger_edit() {
        let customers = CustomerSync::new(None, Arc::new(MemoryCache::new()));
        let scope = BranchScope::default_branch();
        customers.subscribe(&scope).await.unwrap();

        let c002 = customers.items().into_iter().find(|c| c.id == "C002").unwrap();
        let entry_id = c002.ledger[0].id.clone();

        let updated = customers
            .delete_ledger_entry(&scope, "C002", &entry_id)
            .await
            .unwrap();
        assert_eq!(updated.ledger.len(), c002.ledger.len() - 1);
        assert_eq!(updated.total_debt, compute_total_debt(&updated.ledger));

        let in_view = customers.items().into_iter().find(|c| c.id == "C002").unwrap();
        assert_eq!(in_view, updated);
    }
}
