//! Identifier handling
//!
//! Requests name schema-qualified tables with a double underscore
//! (`sales__orders`); internally the separator is a dot (`sales.orders`).

use crate::error::{StrataError, StrataResult};
use once_cell::sync::Lazy;
use regex::Regex;

static SAFE_IDENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*(\.[A-Za-z_][A-Za-z0-9_$]*)*$")
        .expect("identifier pattern must compile")
});

/// `schema__table` -> `schema.table`
pub fn normalize_table(name: &str) -> String {
    name.replace("__", ".")
}

/// `schema.table` -> `schema__table`
pub fn external_table(name: &str) -> String {
    name.replace('.', "__")
}

/// Identifiers are emitted unquoted, so only plain dotted names are allowed
pub fn is_safe_identifier(name: &str) -> bool {
    SAFE_IDENT_RE.is_match(name)
}

pub fn ensure_identifier(context: &str, name: &str) -> StrataResult<()> {
    if is_safe_identifier(name) {
        Ok(())
    } else {
        Err(StrataError::SuspiciousInput {
            key: context.to_string(),
            value: name.to_string(),
        })
    }
}

/// Qualify a column with `table` unless it already names one.
///
/// Multi-segment paths keep their last two segments (`table.column`),
/// with the table segment normalized.
pub fn qualify(table: &str, column: &str) -> String {
    let segments: Vec<&str> = column.split('.').collect();
    match segments.as_slice() {
        [col] => format!("{}.{}", table, col),
        [.., tbl, col] => format!("{}.{}", normalize_table(tbl), col),
        [] => table.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_and_back() {
        assert_eq!(normalize_table("sales__orders"), "sales.orders");
        assert_eq!(normalize_table("orders"), "orders");
        assert_eq!(external_table("sales.orders"), "sales__orders");
    }

    #[test]
    fn test_safe_identifiers() {
        assert!(is_safe_identifier("users"));
        assert!(is_safe_identifier("sales.orders"));
        assert!(is_safe_identifier("_id2"));
        assert!(!is_safe_identifier("id; drop"));
        assert!(!is_safe_identifier("a b"));
        assert!(!is_safe_identifier("1abc"));
        assert!(!is_safe_identifier(""));
    }

    #[test]
    fn test_qualify() {
        assert_eq!(qualify("users", "age"), "users.age");
        assert_eq!(qualify("users", "orders.total"), "orders.total");
        assert_eq!(qualify("users", "orders.items.qty"), "items.qty");
        assert_eq!(qualify("users", "sales__orders.total"), "sales.orders.total");
    }
}
