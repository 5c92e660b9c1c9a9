//! # Seed Data
//!
//! The fixed demo dataset. It is surfaced when no remote store is
//! configured, and written once into an empty default branch on first run.
//!
//! Sales have no seed: a fresh install starts with an empty sales history.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use crate::money::Money;
use crate::types::{Branch, Customer, EntryKind, LedgerEntry, Product, SaleItem};
use crate::DEFAULT_BRANCH_ID;

/// The default branch document created when `/branches` is empty.
pub fn default_branch() -> Branch {
    Branch {
        id: DEFAULT_BRANCH_ID.to_string(),
        name: "Rawnak Sales - Main Branch".to_string(),
        contact: "+964 770 123 4567".to_string(),
    }
}

/// Initial category list, sorted.
pub fn initial_categories() -> Vec<String> {
    let mut list: Vec<String> = [
        "Grains",
        "Fruits",
        "Dairy",
        "Bakery",
        "Meat",
        "Beverages",
        "Trucks",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    list.sort();
    list
}

fn noon(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0)
        .single()
        .unwrap_or_default()
}

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0)
        .single()
        .unwrap_or_default()
}

#[allow(clippy::too_many_arguments)]
fn product(
    id: &str,
    name: &str,
    category: &str,
    price: i64,
    purchase_price: i64,
    stock: i64,
    threshold: i64,
    created_at: DateTime<Utc>,
) -> Product {
    Product {
        id: id.to_string(),
        name: name.to_string(),
        category: category.to_string(),
        price: Money::from_cents(price),
        purchase_price: Money::from_cents(purchase_price),
        stock,
        description: None,
        low_stock_threshold: Some(threshold),
        created_at,
    }
}

/// The five demo products.
pub fn initial_products() -> Vec<Product> {
    vec![
        product("1", "Basmati Rice (1kg)", "Grains", 250, 200, 150, 10, noon(2024, 5, 1)),
        product("2", "Organic Apples", "Fruits", 300, 240, 8, 10, noon(2024, 5, 5)),
        product("3", "Fresh Milk (1L)", "Dairy", 120, 96, 75, 20, noon(2024, 6, 10)),
        product("4", "Whole Wheat Bread", "Bakery", 200, 160, 0, 5, noon(2024, 7, 1)),
        product("5", "Chicken Breast (500g)", "Meat", 550, 440, 40, 15, noon(2024, 7, 15)),
    ]
}

fn entry(
    id: &str,
    date: DateTime<Utc>,
    description: &str,
    kind: EntryKind,
    amount: i64,
    items: Option<Vec<SaleItem>>,
) -> LedgerEntry {
    LedgerEntry {
        id: id.to_string(),
        date,
        description: description.to_string(),
        kind,
        amount: Money::from_cents(amount),
        items,
    }
}

fn line(product_id: &str, name: &str, quantity: i64, price: i64) -> SaleItem {
    SaleItem {
        product_id: product_id.to_string(),
        name: name.to_string(),
        price: Money::from_cents(price),
        quantity,
        purchase_price: None,
    }
}

/// The three demo customers. One is long overdue, one has settled, and
/// one is due fifteen days after `today`.
pub fn initial_customers(today: NaiveDate) -> Vec<Customer> {
    let ahmed_since = at(2023, 1, 15, 10, 0);
    let fatima_since = at(2024, 3, 10, 14, 30);
    let zainab_since = at(2024, 6, 20, 9, 0);

    vec![
        Customer {
            id: "C001".to_string(),
            debt_id: "D001".to_string(),
            name: "Ahmed Ali (متأخر جداً)".to_string(),
            phone: Some("07712345678".to_string()),
            total_debt: Money::from_cents(150_000),
            customer_since: ahmed_since,
            ledger: vec![entry(
                "T001",
                ahmed_since,
                "Initial large purchase",
                EntryKind::Debit,
                150_000,
                Some(vec![
                    line("1", "Basmati Rice (1kg)", 100, 250),
                    line("5", "Chicken Breast (500g)", 227, 550),
                ]),
            )],
            due_date: NaiveDate::from_ymd_opt(2023, 8, 1),
        },
        Customer {
            id: "C002".to_string(),
            debt_id: "D002".to_string(),
            name: "Fatima Kadhim".to_string(),
            phone: Some("07809876543".to_string()),
            total_debt: Money::zero(),
            customer_since: fatima_since,
            ledger: vec![
                entry("T002", fatima_since, "Sale #S-240310", EntryKind::Debit, 15_000, None),
                entry(
                    "T003",
                    at(2024, 4, 1, 11, 0),
                    "Cash Payment",
                    EntryKind::Credit,
                    15_000,
                    None,
                ),
            ],
            due_date: None,
        },
        Customer {
            id: "C003".to_string(),
            debt_id: "D003".to_string(),
            name: "Zainab Mahmoud".to_string(),
            phone: Some("07901122334".to_string()),
            total_debt: Money::from_cents(7_550),
            customer_since: zainab_since,
            ledger: vec![entry(
                "T004",
                zainab_since,
                "Sale #S-240620",
                EntryKind::Debit,
                7_550,
                None,
            )],
            due_date: Some(today + Duration::days(15)),
        },
    ]
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category;
    use crate::ledger::compute_total_debt;

    #[test]
    fn test_seed_customers_hold_debt_invariant() {
        let today = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        for c in initial_customers(today) {
            assert_eq!(c.total_debt, compute_total_debt(&c.ledger), "{}", c.id);
        }
    }

    #[test]
    fn test_seed_overdue_flags() {
        let today = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        let customers = initial_customers(today);
        assert!(customers[0].is_overdue(today));
        assert!(!customers[1].is_overdue(today));
        assert!(!customers[2].is_overdue(today));
    }

    #[test]
    fn test_seed_products_reference_seed_categories() {
        let categories = initial_categories();
        for p in initial_products() {
            assert!(category::contains(&categories, &p.category), "{}", p.name);
        }
        assert!(initial_products()[3].is_low_stock());
    }

    #[test]
    fn test_default_branch() {
        let branch = default_branch();
        assert!(branch.is_default());
        assert_eq!(branch.name, "Rawnak Sales - Main Branch");
    }
}
