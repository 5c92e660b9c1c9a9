//! # Sale Planning
//!
//! The pure half of recording a sale. The sync layer runs the read phase
//! inside a store transaction, hands what it read to [`plan_sale`], and
//! writes the returned [`SalePlan`]. If the transaction conflicts the
//! plan is simply recomputed from the fresh reads.
//!
//! ## Workflow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Recording a Sale                                 │
//! │                                                                         │
//! │  SaleRequest ──validate()──► inventory_demand()                         │
//! │                                   │ (product_id, summed qty)            │
//! │                                   ▼                                     │
//! │  ┌────────────── store transaction (retried on conflict) ────────────┐ │
//! │  │ READ      product docs + customer doc (debt only)                 │ │
//! │  │             │                                                     │ │
//! │  │             ▼                                                     │ │
//! │  │ VALIDATE  plan_sale(request, stamp, observed)  ◄── THIS MODULE    │ │
//! │  │             │  missing product  → ProductNotFound                 │ │
//! │  │             │  stock < demand   → InsufficientStock               │ │
//! │  │             │  missing customer → CustomerNotFound (debt only)    │ │
//! │  │             ▼                                                     │ │
//! │  │ WRITE     sale + stock updates + ledger update                    │ │
//! │  └───────────────────────────────────────────────────────────────────┘ │
//! │                                   │                                     │
//! │                                   ▼                                     │
//! │                        fully populated Sale                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Ids, invoice number and timestamps live in a [`SaleStamp`] generated once
//! per call, so retries never mint a second invoice number.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::ledger::{self, LedgerUpdate};
use crate::money::Money;
use crate::types::{Customer, Discount, PaymentMethod, Sale, SaleItem};
use crate::validation::validate_cart;

// =============================================================================
// Request
// =============================================================================

/// The customer a sale is recorded against, with denormalized display data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerRef {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
}

impl From<&Customer> for CustomerRef {
    fn from(customer: &Customer) -> Self {
        Self {
            id: customer.id.clone(),
            name: customer.name.clone(),
            phone: customer.phone.clone(),
        }
    }
}

/// Everything the caller supplies to record a sale.
#[derive(Debug, Clone)]
pub struct SaleRequest {
    pub cart: Vec<SaleItem>,
    pub customer: CustomerRef,
    /// Precomputed total after discount.
    pub total: Money,
    pub payment_method: PaymentMethod,
    pub discount: Option<Discount>,
}

impl SaleRequest {
    /// Checks that do not depend on store state.
    pub fn validate(&self) -> CoreResult<()> {
        if self.cart.is_empty() {
            return Err(CoreError::EmptyCart);
        }
        validate_cart(&self.cart)?;

        if self.total.is_negative() {
            return Err(ValidationError::MustNotBeNegative {
                field: "total".to_string(),
            }
            .into());
        }

        if self.customer.id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "customer id".to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Inventory demand of this cart. See [`inventory_demand`].
    pub fn demand(&self) -> Vec<(String, i64)> {
        inventory_demand(&self.cart)
    }
}

/// Σ price × quantity over the cart, before any discount.
pub fn cart_subtotal(cart: &[SaleItem]) -> Money {
    cart.iter().map(SaleItem::line_total).sum()
}

/// Inventory-backed product ids with their summed quantities.
///
/// Ad-hoc (`custom-`) lines are dropped. Order follows first appearance in
/// the cart, which keeps the read set and the writes deterministic.
///
/// ```rust
/// use rawnak_core::{Money, SaleItem};
/// use rawnak_core::sale::inventory_demand;
///
/// let mut a = SaleItem::custom("Rice", Money::from_cents(250), 2);
/// a.product_id = "1".into();
/// let mut b = a.clone();
/// b.quantity = 3;
/// let bag = SaleItem::custom("Bag", Money::zero(), 1);
///
/// assert_eq!(inventory_demand(&[a, bag, b]), vec![("1".to_string(), 5)]);
/// ```
pub fn inventory_demand(cart: &[SaleItem]) -> Vec<(String, i64)> {
    let mut order: Vec<(String, i64)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for item in cart.iter().filter(|i| !i.is_custom()) {
        match index.get(item.product_id.as_str()) {
            Some(&i) => order[i].1 += item.quantity,
            None => {
                index.insert(item.product_id.as_str(), order.len());
                order.push((item.product_id.clone(), item.quantity));
            }
        }
    }

    order
}

// =============================================================================
// Stamp
// =============================================================================

/// Identity and time of one sale, fixed before the first attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleStamp {
    pub sale_id: String,
    pub invoice_number: String,
    pub ledger_entry_id: String,
    pub date: DateTime<Utc>,
}

impl SaleStamp {
    pub fn new(sale_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            sale_id: sale_id.into(),
            invoice_number: invoice_number(now),
            ledger_entry_id: ledger::new_entry_id(now),
            date: now,
        }
    }
}

/// `S-` followed by the last six digits of `now` in milliseconds.
///
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use rawnak_core::sale::invoice_number;
///
/// let now = Utc.timestamp_millis_opt(1_718_000_012_345).unwrap();
/// assert_eq!(invoice_number(now), "S-012345");
/// ```
pub fn invoice_number(now: DateTime<Utc>) -> String {
    format!("S-{:06}", now.timestamp_millis().rem_euclid(1_000_000))
}

// =============================================================================
// Plan
// =============================================================================

/// What the read phase observed inside the transaction.
#[derive(Debug, Clone, Default)]
pub struct ObservedState {
    /// Stock per referenced product. `None` when the document is missing.
    pub stock: HashMap<String, Option<i64>>,
    /// The customer document. Only read for debt sales.
    pub customer: Option<Customer>,
}

/// New stock value for one product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockUpdate {
    pub product_id: String,
    pub stock: i64,
}

/// The write phase of a sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalePlan {
    pub sale: Sale,
    pub stock_updates: Vec<StockUpdate>,
    /// Present only for debt sales.
    pub customer_update: Option<LedgerUpdate>,
}

/// Validates a sale against freshly read state and computes its writes.
///
/// ## Errors
/// - `ProductNotFound` when a referenced product was not read
/// - `InsufficientStock` when summed demand exceeds the stock read
/// - `CustomerNotFound` when paying by debt and the customer is missing
///
/// Any error means nothing may be written.
pub fn plan_sale(
    request: &SaleRequest,
    stamp: &SaleStamp,
    observed: &ObservedState,
) -> CoreResult<SalePlan> {
    let mut stock_updates = Vec::new();

    for (product_id, requested) in request.demand() {
        let available = observed
            .stock
            .get(&product_id)
            .copied()
            .flatten()
            .ok_or_else(|| CoreError::ProductNotFound(product_id.clone()))?;

        if available < requested {
            return Err(CoreError::InsufficientStock {
                product: product_id,
                available,
                requested,
            });
        }

        stock_updates.push(StockUpdate {
            product_id,
            stock: available - requested,
        });
    }

    let customer_update = match request.payment_method {
        PaymentMethod::Paid => None,
        PaymentMethod::Debt => {
            let customer = observed
                .customer
                .as_ref()
                .ok_or_else(|| CoreError::CustomerNotFound(request.customer.id.clone()))?;
            let entry = ledger::sale_debit(
                stamp.ledger_entry_id.clone(),
                &stamp.invoice_number,
                request.total,
                &request.cart,
                stamp.date,
            );
            Some(ledger::append_debit(customer, entry))
        }
    };

    let sale = Sale {
        id: stamp.sale_id.clone(),
        invoice_number: stamp.invoice_number.clone(),
        date: stamp.date,
        customer_id: request.customer.id.clone(),
        customer_name: request.customer.name.clone(),
        customer_phone: request.customer.phone.clone(),
        items: request.cart.clone(),
        total: request.total,
        status: request.payment_method.status(),
        discount: request.discount,
    };

    Ok(SalePlan {
        sale,
        stock_updates,
        customer_update,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CustomerDraft, EntryKind, SaleStatus};

    fn item(product_id: &str, price: i64, qty: i64) -> SaleItem {
        SaleItem {
            product_id: product_id.to_string(),
            name: format!("Product {}", product_id),
            price: Money::from_cents(price),
            quantity: qty,
            purchase_price: None,
        }
    }

    fn customer() -> Customer {
        Customer::new(
            "C003",
            CustomerDraft {
                name: "Zainab Mahmoud".into(),
                phone: Some("07901122334".into()),
            },
            Utc::now(),
        )
    }

    fn request(cart: Vec<SaleItem>, method: PaymentMethod) -> SaleRequest {
        let total = cart_subtotal(&cart);
        SaleRequest {
            cart,
            customer: CustomerRef::from(&customer()),
            total,
            payment_method: method,
            discount: None,
        }
    }

    fn observed(stock: &[(&str, Option<i64>)], customer: Option<Customer>) -> ObservedState {
        ObservedState {
            stock: stock
                .iter()
                .map(|(id, s)| (id.to_string(), *s))
                .collect(),
            customer,
        }
    }

    #[test]
    fn test_validate_empty_cart() {
        let req = request(vec![], PaymentMethod::Paid);
        assert!(matches!(req.validate(), Err(CoreError::EmptyCart)));
    }

    #[test]
    fn test_paid_sale_plan() {
        let req = request(vec![item("2", 300, 3)], PaymentMethod::Paid);
        let stamp = SaleStamp::new("sale-1", Utc::now());
        let plan = plan_sale(&req, &stamp, &observed(&[("2", Some(8))], None)).unwrap();

        assert_eq!(
            plan.stock_updates,
            vec![StockUpdate {
                product_id: "2".into(),
                stock: 5
            }]
        );
        assert!(plan.customer_update.is_none());
        assert_eq!(plan.sale.status, SaleStatus::Paid);
        assert_eq!(plan.sale.total.cents(), 900);
        assert_eq!(plan.sale.invoice_number, stamp.invoice_number);
    }

    #[test]
    fn test_debt_sale_appends_debit() {
        let req = request(vec![item("1", 15000, 1)], PaymentMethod::Debt);
        let stamp = SaleStamp::new("sale-2", Utc::now());
        let plan = plan_sale(
            &req,
            &stamp,
            &observed(&[("1", Some(10))], Some(customer())),
        )
        .unwrap();

        let update = plan.customer_update.unwrap();
        assert_eq!(update.total_debt.cents(), 15000);
        assert_eq!(update.ledger.len(), 1);
        let entry = &update.ledger[0];
        assert_eq!(entry.kind, EntryKind::Debit);
        assert_eq!(entry.description, format!("Sale #{}", stamp.invoice_number));
        assert_eq!(entry.items.as_ref().unwrap().len(), 1);
        assert_eq!(plan.sale.status, SaleStatus::Debt);
    }

    #[test]
    fn test_missing_product() {
        let req = request(vec![item("9", 100, 1)], PaymentMethod::Paid);
        let stamp = SaleStamp::new("s", Utc::now());
        let err = plan_sale(&req, &stamp, &observed(&[("9", None)], None)).unwrap_err();
        assert_eq!(err, CoreError::ProductNotFound("9".into()));
    }

    #[test]
    fn test_insufficient_stock_uses_summed_quantity() {
        let req = request(
            vec![item("2", 300, 3), item("2", 300, 3)],
            PaymentMethod::Paid,
        );
        let stamp = SaleStamp::new("s", Utc::now());
        let err = plan_sale(&req, &stamp, &observed(&[("2", Some(5))], None)).unwrap_err();
        assert_eq!(
            err,
            CoreError::InsufficientStock {
                product: "2".into(),
                available: 5,
                requested: 6
            }
        );
    }

    #[test]
    fn test_missing_customer_only_matters_for_debt() {
        let stamp = SaleStamp::new("s", Utc::now());
        let state = observed(&[("1", Some(10))], None);

        let paid = request(vec![item("1", 100, 1)], PaymentMethod::Paid);
        assert!(plan_sale(&paid, &stamp, &state).is_ok());

        let debt = request(vec![item("1", 100, 1)], PaymentMethod::Debt);
        let err = plan_sale(&debt, &stamp, &state).unwrap_err();
        assert_eq!(err, CoreError::CustomerNotFound("C003".into()));
    }

    #[test]
    fn test_custom_items_skip_inventory() {
        let bag = SaleItem::custom("Delivery", Money::from_cents(500), 1);
        let req = request(vec![bag], PaymentMethod::Paid);
        assert!(req.demand().is_empty());
        let plan = plan_sale(&req, &SaleStamp::new("s", Utc::now()), &ObservedState::default())
            .unwrap();
        assert!(plan.stock_updates.is_empty());
    }

    #[test]
    fn test_invoice_number_pads() {
        let now = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_042).unwrap();
        assert_eq!(invoice_number(now), "S-000042");
    }
}
