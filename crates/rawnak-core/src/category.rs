//! # Category Rules
//!
//! A branch's categories are a sorted list of names, unique
//! case-insensitively, stored as one document (`{ list: [...] }`).
//! Products reference a category by exact string equality.
//!
//! Each function returns `None` when the operation is a no-op, so callers
//! can skip the write entirely.

use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::types::Product;
use crate::validation::validate_category_name;

/// Shape of the `data/categories` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryList {
    #[serde(default)]
    pub list: Vec<String>,
}

/// Case-insensitive membership.
pub fn contains(list: &[String], name: &str) -> bool {
    let needle = name.to_lowercase();
    list.iter().any(|c| c.to_lowercase() == needle)
}

/// List with `name` inserted, kept sorted.
///
/// `Ok(None)` when a case-insensitive match already exists.
///
/// ```rust
/// use rawnak_core::category::with_added;
///
/// let list = vec!["Dairy".to_string()];
/// assert_eq!(with_added(&list, "dairy").unwrap(), None);
/// assert_eq!(
///     with_added(&list, " Bakery ").unwrap(),
///     Some(vec!["Bakery".to_string(), "Dairy".to_string()])
/// );
/// ```
pub fn with_added(list: &[String], name: &str) -> CoreResult<Option<Vec<String>>> {
    let name = validate_category_name(name)?;
    if contains(list, &name) {
        return Ok(None);
    }

    let mut next = list.to_vec();
    next.push(name);
    next.sort();
    Ok(Some(next))
}

/// List with `old` replaced by `new`.
///
/// `Ok(None)` when the trimmed new name equals `old`. Renaming onto another
/// existing name merges the two entries.
pub fn with_renamed(list: &[String], old: &str, new: &str) -> CoreResult<Option<Vec<String>>> {
    let new = validate_category_name(new)?;
    if old == new {
        return Ok(None);
    }

    let mut next: Vec<String> = Vec::with_capacity(list.len());
    for c in list {
        let candidate = if c == old { new.clone() } else { c.clone() };
        if !contains(&next, &candidate) {
            next.push(candidate);
        }
    }
    next.sort();
    Ok(Some(next))
}

/// List without `name`. `None` when `name` is not present.
pub fn with_removed(list: &[String], name: &str) -> Option<Vec<String>> {
    if !list.iter().any(|c| c == name) {
        return None;
    }
    Some(list.iter().filter(|c| *c != name).cloned().collect())
}

/// Products whose category is exactly `name`.
pub fn products_in<'a>(products: &'a [Product], name: &'a str) -> impl Iterator<Item = &'a Product> {
    products.iter().filter(move |p| p.category == name)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CoreError, ErrorKind};

    fn list(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_add_is_case_insensitive() {
        let first = with_added(&[], "Dairy").unwrap().unwrap();
        assert_eq!(first, list(&["Dairy"]));
        assert_eq!(with_added(&first, "dairy").unwrap(), None);
        assert_eq!(with_added(&first, "  DAIRY ").unwrap(), None);
    }

    #[test]
    fn test_add_keeps_sorted() {
        let next = with_added(&list(&["Bakery", "Meat"]), "Fruits").unwrap().unwrap();
        assert_eq!(next, list(&["Bakery", "Fruits", "Meat"]));
    }

    #[test]
    fn test_add_empty_name_is_invalid() {
        let err = with_added(&[], "   ").unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_rename() {
        let current = list(&["Bakery", "Meat"]);
        assert_eq!(with_renamed(&current, "Meat", " Meat ").unwrap(), None);
        assert_eq!(
            with_renamed(&current, "Meat", "Butchery").unwrap().unwrap(),
            list(&["Bakery", "Butchery"])
        );
        // merge onto an existing name
        assert_eq!(
            with_renamed(&current, "Meat", "bakery").unwrap().unwrap(),
            list(&["Bakery"])
        );
    }

    #[test]
    fn test_remove() {
        let current = list(&["Bakery", "Meat"]);
        assert_eq!(with_removed(&current, "Meat").unwrap(), list(&["Bakery"]));
        assert_eq!(with_removed(&current, "Trucks"), None);
    }

    #[test]
    fn test_document_shape() {
        let doc: CategoryList = serde_json::from_str(r#"{"list":["Dairy"]}"#).unwrap();
        assert_eq!(doc.list, list(&["Dairy"]));
        let empty: CategoryList = serde_json::from_str("{}").unwrap();
        assert!(empty.list.is_empty());
    }
}
