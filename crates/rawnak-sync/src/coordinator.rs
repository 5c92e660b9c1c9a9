//! # Sale Coordinator
//!
//! Records a sale as one atomic update over every document it touches.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  record_sale(scope, request)                                           │
//! │                                                                         │
//! │  request.validate()            empty cart, bad quantities, ...         │
//! │  stamp = (sale id, invoice no, ledger entry id, now)   fixed once      │
//! │                                                                         │
//! │  AtomicUpdate {                                                        │
//! │    reads: products/{id} for each inventory line                        │
//! │           customers/{id} when paying by debt                           │
//! │  }                                                                      │
//! │    │  plan_sale(request, stamp, observed)                              │
//! │    │     missing product    → ProductNotFound     (nothing written)    │
//! │    │     demand > stock     → InsufficientStock   (nothing written)    │
//! │    │     missing customer   → CustomerNotFound    (nothing written)    │
//! │    ▼                                                                    │
//! │  Set    sales/{saleId}                                                 │
//! │  Update products/{id}   { stock }                                      │
//! │  Update customers/{id}  { totalDebt, transactions }                    │
//! │                                                                         │
//! │  conflict → re-read and re-plan, up to max_attempts                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Ad-hoc (`custom-`) cart lines are neither read nor written.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rawnak_core::sale::{plan_sale, ObservedState, SaleRequest, SaleStamp};
use rawnak_core::{BranchScope, Customer, PaymentMethod, Sale};
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::store::{self, collection_path, doc_path, AtomicUpdate, RemoteStore, WriteOp};

pub struct SaleCoordinator {
    store: Option<Arc<dyn RemoteStore>>,
    max_attempts: u32,
}

impl SaleCoordinator {
    pub fn new(store: Option<Arc<dyn RemoteStore>>) -> Self {
        SaleCoordinator {
            store,
            max_attempts: 5,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Records `request` in `scope`, adjusting stock and the customer's
    /// ledger in the same commit.
    ///
    /// ## Errors
    /// - `InvalidArgument` for a request that fails validation
    /// - `StoreUnavailable` without a remote store
    /// - `NotFound` / `InsufficientStock` from the plan, with no writes
    /// - `Conflict` when every attempt lost a race
    pub async fn record_sale(&self, scope: &BranchScope, request: SaleRequest) -> SyncResult<Sale> {
        request.validate()?;

        let Some(store) = &self.store else {
            return Err(SyncError::StoreUnavailable {
                operation: "record_sale",
            });
        };

        let stamp = SaleStamp::new(Uuid::new_v4().to_string(), Utc::now());
        let products = collection_path(scope.branch_id(), "products");
        let customers = collection_path(scope.branch_id(), "customers");
        let sale_path = doc_path(&collection_path(scope.branch_id(), "sales"), &stamp.sale_id);

        let product_paths: Vec<(String, String)> = request
            .demand()
            .into_iter()
            .map(|(id, _)| {
                let path = doc_path(&products, &id);
                (id, path)
            })
            .collect();
        let customer_path = match request.payment_method {
            PaymentMethod::Debt => Some(doc_path(&customers, &request.customer.id)),
            PaymentMethod::Paid => None,
        };

        let mut reads: Vec<String> = product_paths.iter().map(|(_, path)| path.clone()).collect();
        reads.extend(customer_path.clone());

        let sale = AtomicUpdate::new(reads)
            .max_attempts(self.max_attempts)
            .run(store.as_ref(), |snapshot| {
                let mut observed = ObservedState {
                    stock: HashMap::with_capacity(product_paths.len()),
                    customer: None,
                };
                for (id, path) in &product_paths {
                    let stock = snapshot
                        .get(path)
                        .map(|data| data.get("stock").and_then(Value::as_i64).unwrap_or(0));
                    observed.stock.insert(id.clone(), stock);
                }
                if let Some(path) = &customer_path {
                    observed.customer = snapshot.decode::<Customer>(path)?;
                }

                let plan = plan_sale(&request, &stamp, &observed)?;

                let mut writes = Vec::with_capacity(plan.stock_updates.len() + 2);
                writes.push(WriteOp::set(
                    sale_path.clone(),
                    store::encode(&sale_path, &plan.sale)?,
                ));
                for update in &plan.stock_updates {
                    writes.push(WriteOp::update(
                        doc_path(&products, &update.product_id),
                        json!({ "stock": update.stock }),
                    ));
                }
                if let (Some(path), Some(update)) = (&customer_path, &plan.customer_update) {
                    writes.push(WriteOp::update(path.clone(), store::encode(path, update)?));
                }

                debug!(sale_id = %plan.sale.id, writes = writes.len(), "Sale planned");
                Ok((writes, plan.sale))
            })
            .await?;

        info!(
            branch_id = %scope,
            sale_id = %sale.id,
            invoice = %sale.invoice_number,
            total = %sale.total,
            status = ?sale.status,
            "Sale recorded"
        );
        Ok(sale)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
