//! # Validation Module
//!
//! Input validation for Rawnak Sales operations.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: UI collaborators                                             │
//! │  └── Form checks and immediate feedback (out of scope here)            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  └── Rejects input before any store or cache I/O (InvalidArgument)     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Transaction validate phase (crate::sale)                     │
//! │  └── Rules that depend on freshly read state (stock, customer)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Name validators return the trimmed value so callers store what was
//! checked.

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{ProductDraft, SaleItem};
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_NAME_LEN: usize = 200;

// =============================================================================
// String Validators
// =============================================================================

fn validate_name(field: &str, value: &str) -> ValidationResult<String> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(value.to_string())
}

/// Validates a branch name.
///
/// ```rust
/// use rawnak_core::validation::validate_branch_name;
///
/// assert_eq!(validate_branch_name("  Karrada  ").unwrap(), "Karrada");
/// assert!(validate_branch_name("   ").is_err());
/// ```
pub fn validate_branch_name(name: &str) -> ValidationResult<String> {
    validate_name("branch name", name)
}

pub fn validate_category_name(name: &str) -> ValidationResult<String> {
    validate_name("category name", name)
}

pub fn validate_customer_name(name: &str) -> ValidationResult<String> {
    validate_name("customer name", name)
}

pub fn validate_product_name(name: &str) -> ValidationResult<String> {
    validate_name("product name", name)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a cart line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price. Zero is allowed (free items).
pub fn validate_price(field: &str, price: Money) -> ValidationResult<()> {
    if price.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }

    Ok(())
}

pub fn validate_stock(stock: i64) -> ValidationResult<()> {
    if stock < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "stock".to_string(),
        });
    }

    Ok(())
}

/// Validates a payment amount. Must be positive.
pub fn validate_payment_amount(amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "payment amount".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Composite Validators
// =============================================================================

/// Validates a product draft and returns it with its name trimmed.
pub fn validate_product_draft(draft: ProductDraft) -> ValidationResult<ProductDraft> {
    let name = validate_product_name(&draft.name)?;
    validate_price("price", draft.price)?;
    validate_price("purchase price", draft.purchase_price)?;
    validate_stock(draft.stock)?;
    if let Some(threshold) = draft.low_stock_threshold {
        validate_stock(threshold)?;
    }

    Ok(ProductDraft { name, ..draft })
}

/// Validates every cart line.
///
/// ## Rules
/// - At most MAX_CART_ITEMS lines
/// - Every line has a valid quantity and a non-negative price
/// - Every line has a product id
pub fn validate_cart(items: &[SaleItem]) -> ValidationResult<()> {
    if items.len() > MAX_CART_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "cart items".to_string(),
            min: 1,
            max: MAX_CART_ITEMS as i64,
        });
    }

    for item in items {
        if item.product_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "product id".to_string(),
            });
        }
        validate_quantity(item.quantity)?;
        validate_price("price", item.price)?;
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_names() {
        assert_eq!(validate_category_name(" Dairy ").unwrap(), "Dairy");
        assert!(validate_category_name("").is_err());
        assert!(validate_branch_name(&"A".repeat(300)).is_err());
        // Arabic names count characters, not bytes
        assert!(validate_customer_name(&"ع".repeat(150)).is_ok());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_ITEM_QUANTITY).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(MAX_ITEM_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_validate_price_and_stock() {
        assert!(validate_price("price", Money::zero()).is_ok());
        assert!(validate_price("price", Money::from_cents(-1)).is_err());
        assert!(validate_stock(0).is_ok());
        assert!(validate_stock(-3).is_err());
        assert!(validate_payment_amount(Money::zero()).is_err());
    }

    #[test]
    fn test_validate_product_draft_trims_name() {
        let draft = ProductDraft {
            name: "  Organic Apples ".into(),
            category: "Fruits".into(),
            price: Money::from_cents(300),
            purchase_price: Money::from_cents(240),
            stock: 8,
            description: None,
            low_stock_threshold: Some(10),
        };
        assert_eq!(validate_product_draft(draft).unwrap().name, "Organic Apples");
    }

    #[test]
    fn test_validate_cart() {
        let ok = vec![SaleItem::custom("Bag", Money::from_cents(25), 1)];
        assert!(validate_cart(&ok).is_ok());

        let bad = vec![SaleItem::custom("Bag", Money::from_cents(25), 0)];
        assert!(validate_cart(&bad).is_err());

        let too_many: Vec<_> = (0..=MAX_CART_ITEMS)
            .map(|_| SaleItem::custom("x", Money::zero(), 1))
            .collect();
        assert!(validate_cart(&too_many).is_err());
    }
}
