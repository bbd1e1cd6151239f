//! Blocked keyword and pattern screening for request values
//!
//! Values are checked in their JSON-serialized form, case-insensitively.
//! A keyword matches anywhere in the text, including glued to a preceding
//! word (`usersDROP TABLE`), but must end at a word boundary so column
//! names like `updated_at` or `created_at` stay usable. The lists are
//! process-wide constants.

use crate::error::{StrataError, StrataResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// DDL/DML keywords that may not appear in a request value
pub const BLOCKED_KEYWORDS: &[&str] = &[
    "SELECT",
    "INSERT",
    "UPDATE",
    "DELETE FROM",
    "CREATE",
    "DROP",
    "ALTER",
    "TRUNCATE",
    "RENAME",
    "GRANT",
    "REVOKE",
    "COMMIT",
    "ROLLBACK",
    "SAVEPOINT",
];

/// Quote-breaking patterns that may not appear in a request value
pub const BLOCKED_PATTERNS: &[&str] = &[r"OR\s*'", r"AND\s*'"];

static BLOCKED: Lazy<Vec<Regex>> = Lazy::new(|| {
    let keywords = BLOCKED_KEYWORDS.iter().map(|kw| {
        let body = kw.split_whitespace().collect::<Vec<_>>().join(r"\s+");
        format!(r"(?i){}\b", body)
    });
    let patterns = BLOCKED_PATTERNS.iter().map(|p| format!("(?i){}", p));

    keywords
        .chain(patterns)
        .map(|p| Regex::new(&p).expect("blocked pattern must compile"))
        .collect()
});

/// True when the text trips any blocked keyword or pattern
pub fn is_blocked(text: &str) -> bool {
    BLOCKED.iter().any(|re| re.is_match(text))
}

/// Check a single value under `key`.
///
/// Objects and arrays are walked so the error names the innermost key;
/// object keys are screened as well since they become identifiers.
pub fn check_value(key: &str, value: &Value) -> StrataResult<()> {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                if is_blocked(k) {
                    return Err(suspicious(key, &Value::String(k.clone())));
                }
                check_value(k, v)?;
            }
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(|v| check_value(key, v)),
        Value::Null | Value::Bool(_) | Value::Number(_) => Ok(()),
        Value::String(_) => {
            let serialized = value.to_string();
            if is_blocked(&serialized) {
                Err(suspicious(key, value))
            } else {
                Ok(())
            }
        }
    }
}

/// Check a plain string (sort keys, calc expressions, raw identifiers)
pub fn check_str(key: &str, text: &str) -> StrataResult<()> {
    check_value(key, &Value::String(text.to_string()))
}

fn suspicious(key: &str, value: &Value) -> StrataError {
    StrataError::SuspiciousInput {
        key: key.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_drop_table_any_case() {
        for text in ["DROP TABLE users", "drop table users", "x; DrOp TaBlE y"] {
            assert!(is_blocked(text), "{text} should be blocked");
        }
    }

    #[test]
    fn test_keywords_match_inside_words() {
        for text in ["usersDROP TABLE t", "x_drop table t", "1DROP TABLE t", "a;select 1"] {
            assert!(is_blocked(text), "{text} should be blocked");
            assert!(check_str("where", text).is_err());
        }
        assert!(is_blocked("please DELETE   FROM here"));
    }

    #[test]
    fn test_keyword_prefixes_of_longer_words_pass() {
        assert!(!is_blocked("dropbox"));
        assert!(!is_blocked("selection"));
        assert!(!is_blocked("updated_at"));
        assert!(!is_blocked("created_at"));
        assert!(!is_blocked("delete me"));
    }

    #[test]
    fn test_quote_break_patterns() {
        assert!(is_blocked("x' OR '1'='1"));
        assert!(is_blocked("a' and'b"));
        assert!(!is_blocked("oregon"));
    }

    #[test]
    fn test_check_value_names_innermost_key() {
        let value = json!({"name": {"$eq": "bob"}, "note": {"$like": "x; drop table t"}});
        match check_value("where", &value) {
            Err(StrataError::SuspiciousInput { key, value }) => {
                assert_eq!(key, "$like");
                assert!(value.contains("drop table"));
            }
            other => panic!("expected SuspiciousInput, got {:?}", other),
        }
    }

    #[test]
    fn test_check_value_screens_keys() {
        let value = json!({"id; DROP TABLE users": 1});
        assert!(check_value("where", &value).is_err());
    }

    #[test]
    fn test_scalars_pass() {
        assert!(check_value("limit", &json!(10)).is_ok());
        assert!(check_value("where", &json!({"age": {"$gte": 18}})).is_ok());
        assert!(check_str("sort", "-name").is_ok());
    }
}
