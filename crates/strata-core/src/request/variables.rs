use super::Operation;
use crate::dialect::SqlDialect;
use crate::error::{StrataError, StrataResult};
use crate::guard;
use serde_json::{Map, Value};

/// Request variables by name
pub type Variables = Map<String, Value>;

/// Operation defaults overlaid with the request's own variables
pub fn resolve_variables(operation: &Operation, supplied: &Variables) -> Variables {
    let mut resolved = Variables::new();
    for definition in &operation.variables {
        if let Some(default) = definition
            .default
            .as_ref()
            .and_then(|d| d.resolve(supplied))
        {
            resolved.insert(definition.name.clone(), default);
        }
    }
    for (name, value) in supplied {
        resolved.insert(name.clone(), value.clone());
    }
    resolved
}

/// Replace `$name` tokens in a raw statement with dialect placeholders.
///
/// Tokens inside single-quoted literals are left alone. Every bound value
/// is screened by the blocked-word guard.
pub fn bind_template(
    sql: &str,
    variables: &Variables,
    dialect: &dyn SqlDialect,
) -> StrataResult<(String, Vec<Value>)> {
    let mut out = String::with_capacity(sql.len());
    let mut params = Vec::new();
    let mut chars = sql.char_indices().peekable();
    let mut in_literal = false;

    while let Some((i, c)) = chars.next() {
        if c == '\'' {
            in_literal = !in_literal;
            out.push(c);
            continue;
        }

        let starts_name = matches!(chars.peek(), Some((_, n)) if n.is_ascii_alphabetic() || *n == '_');
        if c != '$' || in_literal || !starts_name {
            out.push(c);
            continue;
        }

        let start = i + 1;
        let mut end = start;
        while let Some((j, n)) = chars.peek().copied() {
            if n.is_ascii_alphanumeric() || n == '_' {
                end = j + n.len_utf8();
                chars.next();
            } else {
                break;
            }
        }

        let name = &sql[start..end];
        let value = variables
            .get(name)
            .ok_or_else(|| StrataError::invalid(format!("unknown variable `${}`", name)))?;
        guard::check_value(name, value)?;

        params.push(value.clone());
        out.push_str(&dialect.placeholder(params.len()));
    }

    Ok((out, params))
}
