//! `sort` argument: `"col"`, `"-col"`, ordinals, or arrays of those

use crate::error::{StrataError, StrataResult};
use crate::guard;
use crate::ident::{ensure_identifier, qualify};
use serde_json::Value;

/// Compile a sort value into ORDER BY terms
pub fn compile_sort(value: &Value, main_table: &str) -> StrataResult<Vec<String>> {
    guard::check_value("sort", value)?;
    let mut terms = Vec::new();
    push_terms(value, main_table, &mut terms)?;
    Ok(terms)
}

fn push_terms(value: &Value, main_table: &str, terms: &mut Vec<String>) -> StrataResult<()> {
    match value {
        Value::Null => Ok(()),
        Value::String(spec) => {
            let spec = spec.trim();
            if spec.is_empty() {
                return Ok(());
            }
            let (column, descending) = match spec.strip_prefix('-') {
                Some(column) => (column.trim(), true),
                None => (spec, false),
            };
            let qualified = qualify(main_table, column);
            ensure_identifier("sort", &qualified)?;
            terms.push(direction(qualified, descending));
            Ok(())
        }
        Value::Number(n) => {
            let ordinal = n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
                .unwrap_or(0);
            if ordinal == 0 {
                return Err(StrataError::invalid("sort ordinal must be non-zero"));
            }
            terms.push(direction(ordinal.abs().to_string(), ordinal < 0));
            Ok(())
        }
        Value::Array(items) => items
            .iter()
            .try_for_each(|item| push_terms(item, main_table, terms)),
        other => Err(StrataError::invalid(format!(
            "sort must be a string, a number or an array, got {}",
            other
        ))),
    }
}

fn direction(term: String, descending: bool) -> String {
    if descending {
        format!("{} DESC", term)
    } else {
        term
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_forms() {
        assert_eq!(compile_sort(&json!("name"), "users").unwrap(), vec!["users.name"]);
        assert_eq!(
            compile_sort(&json!("-name"), "users").unwrap(),
            vec!["users.name DESC"]
        );
        assert_eq!(
            compile_sort(&json!("orders.total"), "users").unwrap(),
            vec!["orders.total"]
        );
    }

    #[test]
    fn test_ordinals_and_arrays() {
        assert_eq!(
            compile_sort(&json!([2, -1, "-age"]), "users").unwrap(),
            vec!["2", "1 DESC", "users.age DESC"]
        );
        assert!(compile_sort(&json!(0), "users").is_err());
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(compile_sort(&json!({"name": 1}), "users").is_err());
        assert!(compile_sort(&json!("name; drop"), "users").is_err());
        assert!(matches!(
            compile_sort(&json!("x DROP TABLE y"), "users"),
            Err(StrataError::SuspiciousInput { .. })
        ));
    }
}
