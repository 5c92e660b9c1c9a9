//! # Domain Types
//!
//! Core domain types shared by every Rawnak Sales component.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Branch       │   │    Product      │   │    Customer     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id ("main")    │   │  id             │   │  id / debt_id   │       │
//! │  │  name           │   │  category       │   │  total_debt     │       │
//! │  │  contact        │   │  price / stock  │   │  ledger ────────┼──┐    │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘  │    │
//! │                                                                    │    │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐  │    │
//! │  │      Sale       │   │    SaleItem     │   │  LedgerEntry    │◄─┘    │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  invoice_number │──►│  product_id     │◄──│  DEBIT / CREDIT │       │
//! │  │  status         │   │  price × qty    │   │  amount, items  │       │
//! │  │  discount       │   └─────────────────┘   └─────────────────┘       │
//! │  └─────────────────┘                                                    │
//! │                                                                         │
//! │  Branch-scoped singletons: BranchSettings, category list               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Shape
//! Every type serializes with camelCase field names, which is the shape of
//! the documents in the remote store and of the local cache entries. The
//! `id` of a stored entity is its document id and is stripped from the
//! document body by the store adapter.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::{Money, BPS_SCALE};
use crate::{CUSTOM_ITEM_PREFIX, DEFAULT_BRANCH_ID, DEFAULT_LOW_STOCK_THRESHOLD};

// =============================================================================
// Branch
// =============================================================================

/// A physical shop location. All other data is partitioned by branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Branch {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub contact: String,
}

impl Branch {
    /// Whether this is the undeletable default branch.
    #[inline]
    pub fn is_default(&self) -> bool {
        self.id == DEFAULT_BRANCH_ID
    }
}

/// Partial update of the active branch's display info.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
}

impl BranchPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.contact.is_none()
    }

    pub fn apply(&self, branch: &mut Branch) {
        if let Some(name) = &self.name {
            branch.name = name.clone();
        }
        if let Some(contact) = &self.contact {
            branch.contact = contact.clone();
        }
    }
}

/// The branch every branch-scoped call operates on.
///
/// Passed explicitly to engines and registries instead of being read from
/// ambient state, so a call can never silently target the wrong branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BranchScope {
    branch_id: String,
}

impl BranchScope {
    pub fn new(branch_id: impl Into<String>) -> Self {
        Self {
            branch_id: branch_id.into(),
        }
    }

    /// Scope of the default branch.
    pub fn default_branch() -> Self {
        Self::new(DEFAULT_BRANCH_ID)
    }

    #[inline]
    pub fn branch_id(&self) -> &str {
        &self.branch_id
    }

    #[inline]
    pub fn is_default(&self) -> bool {
        self.branch_id == DEFAULT_BRANCH_ID
    }
}

impl std::fmt::Display for BranchScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.branch_id)
    }
}

// =============================================================================
// Role
// =============================================================================

/// Role of the signed-in user. Authentication itself lives elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum Role {
    Admin,
    Cashier,
}

impl Role {
    #[inline]
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

// =============================================================================
// Product
// =============================================================================

/// Stock level classification used by low-stock alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
}

/// A product held in a branch's inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub name: String,

    /// Exact name of a category in the branch's category list.
    pub category: String,

    /// Sale price per unit.
    pub price: Money,

    /// Purchase cost per unit.
    pub purchase_price: Money,

    /// Units on hand, never negative.
    pub stock: i64,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub low_stock_threshold: Option<i64>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Builds a product from a draft with the given id and creation time.
    pub fn from_draft(id: impl Into<String>, draft: ProductDraft, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: draft.name,
            category: draft.category,
            price: draft.price,
            purchase_price: draft.purchase_price,
            stock: draft.stock,
            description: draft.description,
            low_stock_threshold: draft.low_stock_threshold,
            created_at,
        }
    }

    /// Threshold below which stock counts as low.
    #[inline]
    pub fn threshold(&self) -> i64 {
        self.low_stock_threshold.unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD)
    }

    pub fn stock_status(&self) -> StockStatus {
        if self.stock <= 0 {
            StockStatus::OutOfStock
        } else if self.stock < self.threshold() {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }

    /// True when the product is out of stock or under its threshold.
    #[inline]
    pub fn is_low_stock(&self) -> bool {
        self.stock_status() != StockStatus::InStock
    }
}

/// Fields supplied when creating a product. The id and creation time are
/// assigned by the sync layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDraft {
    pub name: String,
    pub category: String,
    pub price: Money,
    pub purchase_price: Money,
    pub stock: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub low_stock_threshold: Option<i64>,
}

/// Partial product update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_price: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_stock_threshold: Option<i64>,
}

impl ProductPatch {
    pub fn apply(&self, product: &mut Product) {
        if let Some(v) = &self.name {
            product.name = v.clone();
        }
        if let Some(v) = &self.category {
            product.category = v.clone();
        }
        if let Some(v) = self.price {
            product.price = v;
        }
        if let Some(v) = self.purchase_price {
            product.purchase_price = v;
        }
        if let Some(v) = self.stock {
            product.stock = v;
        }
        if let Some(v) = &self.description {
            product.description = Some(v.clone());
        }
        if let Some(v) = self.low_stock_threshold {
            product.low_stock_threshold = Some(v);
        }
    }
}

// =============================================================================
// Customer & Ledger
// =============================================================================

/// Direction of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "UPPERCASE")]
#[ts(export)]
pub enum EntryKind {
    /// Increases what the customer owes (a sale on debt).
    Debit,
    /// Decreases what the customer owes (a payment).
    Credit,
}

/// One line in a customer's transaction ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LedgerEntry {
    pub id: String,
    #[ts(as = "String")]
    pub date: DateTime<Utc>,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Always non-negative. The direction is carried by `kind`.
    pub amount: Money,
    /// Snapshot of the cart when the entry came from a sale.
    #[serde(default)]
    pub items: Option<Vec<SaleItem>>,
}

impl LedgerEntry {
    /// Signed contribution of this entry to the customer's total debt.
    #[inline]
    pub fn signed_amount(&self) -> Money {
        match self.kind {
            EntryKind::Debit => self.amount,
            EntryKind::Credit => -self.amount,
        }
    }
}

/// A customer with a running debt account.
///
/// ## Invariant
/// `total_debt == Σ DEBIT − Σ CREDIT` over `ledger`. The total is only
/// ever changed by the functions in [`crate::ledger`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Customer {
    pub id: String,
    /// Debt-account identifier shown on statements (`D<millis>`).
    pub debt_id: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub total_debt: Money,
    #[ts(as = "String")]
    pub customer_since: DateTime<Utc>,
    #[serde(default, rename = "transactions")]
    pub ledger: Vec<LedgerEntry>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub due_date: Option<NaiveDate>,
}

impl Customer {
    /// A new customer with an empty ledger and zero debt.
    pub fn new(id: impl Into<String>, draft: CustomerDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            debt_id: format!("D{}", now.timestamp_millis()),
            name: draft.name,
            phone: draft.phone.filter(|p| !p.trim().is_empty()),
            total_debt: Money::zero(),
            customer_since: now,
            ledger: Vec::new(),
            due_date: None,
        }
    }

    /// Whether the due date lies strictly before `today`.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.due_date.map(|due| due < today).unwrap_or(false)
    }
}

/// Fields supplied when creating a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerDraft {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Partial customer update. Ledger and total are not patchable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

impl CustomerPatch {
    pub fn apply(&self, customer: &mut Customer) {
        if let Some(v) = &self.name {
            customer.name = v.clone();
        }
        if let Some(v) = &self.phone {
            customer.phone = Some(v.clone());
        }
        if let Some(v) = self.due_date {
            customer.due_date = Some(v);
        }
    }
}

// =============================================================================
// Sale
// =============================================================================

/// Payment status recorded on a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum SaleStatus {
    Paid,
    Debt,
}

/// How the customer settles a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum PaymentMethod {
    /// Paid in full at the counter.
    Paid,
    /// Added to the customer's debt ledger.
    Debt,
}

impl PaymentMethod {
    #[inline]
    pub fn status(&self) -> SaleStatus {
        match self {
            PaymentMethod::Paid => SaleStatus::Paid,
            PaymentMethod::Debt => SaleStatus::Debt,
        }
    }
}

/// A cart line. Either backed by a Product or ad-hoc (`custom-` id).
///
/// Uses the snapshot pattern: name and prices are frozen at sale time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SaleItem {
    pub product_id: String,
    pub name: String,
    pub price: Money,
    pub quantity: i64,
    #[serde(default)]
    pub purchase_price: Option<Money>,
}

impl SaleItem {
    /// A cart line for a product from inventory.
    pub fn from_product(product: &Product, quantity: i64) -> Self {
        Self {
            product_id: product.id.clone(),
            name: product.name.clone(),
            price: product.price,
            quantity,
            purchase_price: Some(product.purchase_price),
        }
    }

    /// An ad-hoc line not tracked in inventory.
    pub fn custom(name: impl Into<String>, price: Money, quantity: i64) -> Self {
        Self {
            product_id: format!("{}{}", CUSTOM_ITEM_PREFIX, uuid::Uuid::new_v4()),
            name: name.into(),
            price,
            quantity,
            purchase_price: None,
        }
    }

    /// Ad-hoc lines skip stock checks and stock writes.
    #[inline]
    pub fn is_custom(&self) -> bool {
        self.product_id.starts_with(CUSTOM_ITEM_PREFIX)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        self.price.multiply_quantity(self.quantity)
    }
}

/// Discount flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum DiscountKind {
    /// `value` is in basis points (1000 = 10%).
    Percentage,
    /// `value` is in cents.
    Fixed,
}

/// A discount descriptor with its resolved amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Discount {
    #[serde(rename = "type")]
    pub kind: DiscountKind,
    pub value: i64,
    pub amount: Money,
}

impl Discount {
    /// A percentage discount, capped at 100%.
    ///
    /// ```rust
    /// use rawnak_core::{Discount, Money};
    ///
    /// let d = Discount::percentage(15_000, Money::from_cents(2_000)); // 150%
    /// assert_eq!(d.value, 10_000);
    /// assert_eq!(d.amount.cents(), 2_000);
    /// ```
    pub fn percentage(bps: i64, subtotal: Money) -> Self {
        let bps = bps.clamp(0, BPS_SCALE);
        Self {
            kind: DiscountKind::Percentage,
            value: bps,
            amount: subtotal.percentage_of(bps),
        }
    }

    /// A fixed discount, capped at the subtotal.
    pub fn fixed(value: Money, subtotal: Money) -> Self {
        let amount = value.min(subtotal).max(Money::zero());
        Self {
            kind: DiscountKind::Fixed,
            value: value.cents().max(0),
            amount,
        }
    }

    /// Re-resolves the descriptor against a subtotal.
    pub fn resolve(&self, subtotal: Money) -> Self {
        match self.kind {
            DiscountKind::Percentage => Self::percentage(self.value, subtotal),
            DiscountKind::Fixed => Self::fixed(Money::from_cents(self.value), subtotal),
        }
    }
}

/// A recorded sale. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Sale {
    pub id: String,
    /// `S-` followed by the last six digits of the creation time in ms.
    pub invoice_number: String,
    #[ts(as = "String")]
    pub date: DateTime<Utc>,
    pub customer_id: String,
    pub customer_name: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    pub items: Vec<SaleItem>,
    pub total: Money,
    pub status: SaleStatus,
    #[serde(default)]
    pub discount: Option<Discount>,
}

// =============================================================================
// Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase", default)]
#[ts(export)]
pub struct NotificationSettings {
    pub low_stock_alerts: bool,
    pub debt_reminders: bool,
    pub updates_email: String,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            low_stock_alerts: true,
            debt_reminders: false,
            updates_email: "owner@rawnak.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_stock_alerts: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debt_reminders: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updates_email: Option<String>,
}

impl NotificationSettingsPatch {
    pub fn apply(&self, settings: &mut NotificationSettings) {
        if let Some(v) = self.low_stock_alerts {
            settings.low_stock_alerts = v;
        }
        if let Some(v) = self.debt_reminders {
            settings.debt_reminders = v;
        }
        if let Some(v) = &self.updates_email {
            settings.updates_email = v.clone();
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum InvoiceTemplate {
    #[default]
    Standard,
    Compact,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase", default)]
#[ts(export)]
pub struct InvoiceSettings {
    pub template: InvoiceTemplate,
    pub footer_text: String,
}

impl Default for InvoiceSettings {
    fn default() -> Self {
        Self {
            template: InvoiceTemplate::Standard,
            footer_text: "Thank you for your business!\nشكراً لتعاملكم معنا!".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceSettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<InvoiceTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer_text: Option<String>,
}

impl InvoiceSettingsPatch {
    pub fn apply(&self, settings: &mut InvoiceSettings) {
        if let Some(v) = self.template {
            settings.template = v;
        }
        if let Some(v) = &self.footer_text {
            settings.footer_text = v.clone();
        }
    }
}

/// The branch's `data/settings` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase", default)]
#[ts(export)]
pub struct BranchSettings {
    pub notification_settings: NotificationSettings,
    pub invoice_settings: InvoiceSettings,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn product(stock: i64, threshold: Option<i64>) -> Product {
        Product {
            id: "p1".into(),
            name: "Fresh Milk (1L)".into(),
            category: "Dairy".into(),
            price: Money::from_cents(120),
            purchase_price: Money::from_cents(96),
            stock,
            description: None,
            low_stock_threshold: threshold,
            created_at: Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_stock_status() {
        assert_eq!(product(0, Some(20)).stock_status(), StockStatus::OutOfStock);
        assert_eq!(product(19, Some(20)).stock_status(), StockStatus::LowStock);
        assert_eq!(product(20, Some(20)).stock_status(), StockStatus::InStock);
        // default threshold of 10
        assert!(product(9, None).is_low_stock());
        assert!(!product(10, None).is_low_stock());
    }

    #[test]
    fn test_product_wire_shape() {
        let json = serde_json::to_value(product(75, Some(20))).unwrap();
        assert_eq!(json["purchasePrice"], 96);
        assert_eq!(json["lowStockThreshold"], 20);
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn test_customer_ledger_serializes_as_transactions() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 14, 30, 0).unwrap();
        let customer = Customer::new(
            "C9",
            CustomerDraft {
                name: "Fatima".into(),
                phone: Some("  ".into()),
            },
            now,
        );
        assert_eq!(customer.debt_id, format!("D{}", now.timestamp_millis()));
        assert_eq!(customer.phone, None);
        assert!(customer.total_debt.is_zero());

        let json = serde_json::to_value(&customer).unwrap();
        assert!(json["transactions"].as_array().unwrap().is_empty());
        assert_eq!(json["totalDebt"], 0);
    }

    #[test]
    fn test_customer_overdue() {
        let mut customer = Customer::new(
            "C1",
            CustomerDraft {
                name: "Ahmed".into(),
                phone: None,
            },
            Utc::now(),
        );
        let today = NaiveDate::from_ymd_opt(2024, 8, 2).unwrap();
        assert!(!customer.is_overdue(today));

        customer.due_date = NaiveDate::from_ymd_opt(2024, 8, 1);
        assert!(customer.is_overdue(today));
        customer.due_date = NaiveDate::from_ymd_opt(2024, 8, 2);
        assert!(!customer.is_overdue(today));
    }

    #[test]
    fn test_ledger_entry_wire_shape() {
        let entry = LedgerEntry {
            id: "T1".into(),
            date: Utc::now(),
            description: "Cash Payment".into(),
            kind: EntryKind::Credit,
            amount: Money::from_cents(15000),
            items: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "CREDIT");
        assert_eq!(entry.signed_amount().cents(), -15000);
    }

    #[test]
    fn test_custom_sale_item() {
        let item = SaleItem::custom("Delivery", Money::from_cents(500), 2);
        assert!(item.is_custom());
        assert_eq!(item.line_total().cents(), 1000);

        let backed = SaleItem::from_product(&product(5, None), 1);
        assert!(!backed.is_custom());
    }

    #[test]
    fn test_discount_caps() {
        let subtotal = Money::from_cents(2000);

        let pct = Discount::percentage(1000, subtotal);
        assert_eq!(pct.amount.cents(), 200);

        let capped = Discount::fixed(Money::from_cents(5000), subtotal);
        assert_eq!(capped.amount, subtotal);
        assert_eq!(capped.value, 5000);

        let resolved = capped.resolve(Money::from_cents(1000));
        assert_eq!(resolved.amount.cents(), 1000);
    }

    #[test]
    fn test_payment_method_status() {
        assert_eq!(PaymentMethod::Debt.status(), SaleStatus::Debt);
        assert_eq!(
            serde_json::to_string(&PaymentMethod::Paid).unwrap(),
            "\"paid\""
        );
        assert_eq!(serde_json::to_string(&SaleStatus::Paid).unwrap(), "\"Paid\"");
    }

    #[test]
    fn test_settings_defaults_fill_missing_fields() {
        let settings: BranchSettings =
            serde_json::from_str(r#"{"notificationSettings":{"debtReminders":true}}"#).unwrap();
        assert!(settings.notification_settings.debt_reminders);
        assert!(settings.notification_settings.low_stock_alerts);
        assert_eq!(settings.invoice_settings.template, InvoiceTemplate::Standard);
    }

    #[test]
    fn test_patches_apply_only_present_fields() {
        let mut p = product(10, None);
        ProductPatch {
            stock: Some(3),
            ..Default::default()
        }
        .apply(&mut p);
        assert_eq!(p.stock, 3);
        assert_eq!(p.name, "Fresh Milk (1L)");

        let json = serde_json::to_value(ProductPatch {
            price: Some(Money::from_cents(150)),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"price": 150}));
    }

    #[test]
    fn test_branch_scope() {
        assert!(BranchScope::default_branch().is_default());
        assert_eq!(BranchScope::new("b2").branch_id(), "b2");
    }
}
