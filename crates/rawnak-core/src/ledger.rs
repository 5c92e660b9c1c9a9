//! # Ledger Module
//!
//! Rules for a customer's append-only debt ledger.
//!
//! ## The Debt Invariant
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   total_debt == Σ amount(DEBIT) − Σ amount(CREDIT)                      │
//! │                                                                         │
//! │   Append DEBIT  (sale on debt)  → total = total_at_read + amount        │
//! │   Append CREDIT (payment)       → total = recomputed from ledger        │
//! │   Remove entry                  → total = recomputed from ledger        │
//! │                                                                         │
//! │   The total is never decremented in place. Removing an entry always     │
//! │   re-sums the remaining ledger so a stale cached total heals itself.    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every function here is pure: it takes the customer as read inside a
//! transaction and returns the [`LedgerUpdate`] to write back.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{Customer, EntryKind, LedgerEntry, SaleItem};

/// New ledger and total for a customer document.
///
/// Serializes to exactly the two customer fields it replaces, so the sync
/// layer can write it as a partial update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerUpdate {
    pub total_debt: Money,
    #[serde(rename = "transactions")]
    pub ledger: Vec<LedgerEntry>,
}

impl LedgerUpdate {
    pub fn apply(self, customer: &mut Customer) {
        customer.total_debt = self.total_debt;
        customer.ledger = self.ledger;
    }
}

/// Ledger entry id: `T<millis>-<8 hex>`.
///
/// Entries written in the same millisecond still get distinct ids.
pub fn new_entry_id(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("T{}-{}", now.timestamp_millis(), &suffix[..8])
}

/// Σ DEBIT − Σ CREDIT over the given entries.
///
/// ```rust
/// use rawnak_core::ledger::compute_total_debt;
///
/// assert!(compute_total_debt(&[]).is_zero());
/// ```
pub fn compute_total_debt(entries: &[LedgerEntry]) -> Money {
    entries.iter().map(LedgerEntry::signed_amount).sum()
}

/// Builds the DEBIT entry recorded for a sale on debt.
pub fn sale_debit(
    entry_id: impl Into<String>,
    invoice_number: &str,
    amount: Money,
    items: &[SaleItem],
    date: DateTime<Utc>,
) -> LedgerEntry {
    LedgerEntry {
        id: entry_id.into(),
        date,
        description: format!("Sale #{}", invoice_number),
        kind: EntryKind::Debit,
        amount,
        items: Some(items.to_vec()),
    }
}

/// Builds a CREDIT entry for a payment.
pub fn payment_credit(
    entry_id: impl Into<String>,
    description: impl Into<String>,
    amount: Money,
    date: DateTime<Utc>,
) -> LedgerEntry {
    LedgerEntry {
        id: entry_id.into(),
        date,
        description: description.into(),
        kind: EntryKind::Credit,
        amount,
        items: None,
    }
}

/// Appends a DEBIT: `total = total_at_read + amount`.
pub fn append_debit(customer: &Customer, entry: LedgerEntry) -> LedgerUpdate {
    debug_assert_eq!(entry.kind, EntryKind::Debit);
    let total_debt = customer.total_debt + entry.amount;
    let mut ledger = customer.ledger.clone();
    ledger.push(entry);
    LedgerUpdate { total_debt, ledger }
}

/// Appends a CREDIT and recomputes the total from the ledger.
pub fn append_credit(customer: &Customer, entry: LedgerEntry) -> LedgerUpdate {
    debug_assert_eq!(entry.kind, EntryKind::Credit);
    let mut ledger = customer.ledger.clone();
    ledger.push(entry);
    LedgerUpdate {
        total_debt: compute_total_debt(&ledger),
        ledger,
    }
}

/// Removes one entry and recomputes the total.
///
/// ## Errors
/// `LedgerEntryNotFound` when no entry carries `entry_id`.
pub fn remove_entry(customer: &Customer, entry_id: &str) -> CoreResult<LedgerUpdate> {
    if !customer.ledger.iter().any(|e| e.id == entry_id) {
        return Err(CoreError::LedgerEntryNotFound {
            customer_id: customer.id.clone(),
            entry_id: entry_id.to_string(),
        });
    }

    let ledger: Vec<LedgerEntry> = customer
        .ledger
        .iter()
        .filter(|e| e.id != entry_id)
        .cloned()
        .collect();

    Ok(LedgerUpdate {
        total_debt: compute_total_debt(&ledger),
        ledger,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
