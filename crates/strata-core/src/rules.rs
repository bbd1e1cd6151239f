//! Collaborator seams: security rules, value transforms, expressions.
//!
//! The engine treats rule definitions as opaque JSON attached per table in
//! the [`SchemaRegistry`](crate::schema::SchemaRegistry). The default
//! implementations pass everything through; [`DeclarativeRules`] is a small
//! built-in interpreter for JSON rule documents.

use crate::error::{StrataError, StrataResult};
use crate::request::Variables;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Outcome of a security rule
#[derive(Debug, Clone, PartialEq)]
pub enum SecurityDecision {
    Allow,
    Deny(String),
    /// Filter tree ANDed into the compiled WHERE clause
    Filter(Value),
}

pub trait SecurityRules: Send + Sync {
    fn evaluate(
        &self,
        _table: &str,
        _rule: Option<&Value>,
        _variables: &Variables,
    ) -> StrataResult<SecurityDecision> {
        Ok(SecurityDecision::Allow)
    }
}

pub trait ValueTransform: Send + Sync {
    /// Forced column values applied to a document before planning
    fn overwrite(
        &self,
        _table: &str,
        _rule: Option<&Value>,
        _document: &Map<String, Value>,
        _variables: &Variables,
    ) -> StrataResult<Map<String, Value>> {
        Ok(Map::new())
    }

    /// Rewrite assembled rows before they are returned
    fn transform_output(
        &self,
        _table: &str,
        _rule: Option<&Value>,
        rows: Vec<Value>,
    ) -> StrataResult<Vec<Value>> {
        Ok(rows)
    }
}

/// Resolves `calc` expressions into SQL text
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, expression: &str, _variables: &Variables) -> StrataResult<String> {
        Ok(expression.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl SecurityRules for PassThrough {}
impl ValueTransform for PassThrough {}
impl ExpressionEvaluator for PassThrough {}

/// Bundle of collaborators handed to the compiler and planner
#[derive(Clone)]
pub struct Rules {
    pub security: Arc<dyn SecurityRules>,
    pub transform: Arc<dyn ValueTransform>,
    pub expressions: Arc<dyn ExpressionEvaluator>,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            security: Arc::new(PassThrough),
            transform: Arc::new(PassThrough),
            expressions: Arc::new(PassThrough),
        }
    }
}

impl std::fmt::Debug for Rules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rules").finish_non_exhaustive()
    }
}

/// JSON rule documents.
///
/// Security: `{"deny": "reason"}` or `{"where": {...}}`.
/// Transform: `{"overwrite": {"column": value}}`.
/// String values of the form `$name` are replaced by request variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclarativeRules;

impl DeclarativeRules {
    fn substitute(value: &Value, variables: &Variables) -> StrataResult<Value> {
        Ok(match value {
            Value::String(s) => match s.strip_prefix('$') {
                Some(name) if !name.starts_with('$') && !name.is_empty() => {
                    variables.get(name).cloned().ok_or_else(|| StrataError::RuleFailure {
                        source_name: "declarative".to_string(),
                        message: format!("variable `{}` is not set", name),
                    })?
                }
                _ => value.clone(),
            },
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| Self::substitute(v, variables))
                    .collect::<StrataResult<_>>()?,
            ),
            Value::Object(map) => {
                let mut out = Map::new();
                for (k, v) in map {
                    out.insert(k.clone(), Self::substitute(v, variables)?);
                }
                Value::Object(out)
            }
            other => other.clone(),
        })
    }
}

impl SecurityRules for DeclarativeRules {
    fn evaluate(
        &self,
        _table: &str,
        rule: Option<&Value>,
        variables: &Variables,
    ) -> StrataResult<SecurityDecision> {
        let Some(rule) = rule else {
            return Ok(SecurityDecision::Allow);
        };
        if let Some(reason) = rule.get("deny") {
            let reason = reason.as_str().unwrap_or("access denied").to_string();
            return Ok(SecurityDecision::Deny(reason));
        }
        match rule.get("where") {
            Some(filter) => Ok(SecurityDecision::Filter(Self::substitute(filter, variables)?)),
            None => Ok(SecurityDecision::Allow),
        }
    }
}

impl ValueTransform for DeclarativeRules {
    fn overwrite(
        &self,
        _table: &str,
        rule: Option<&Value>,
        _document: &Map<String, Value>,
        variables: &Variables,
    ) -> StrataResult<Map<String, Value>> {
        match rule.and_then(|r| r.get("overwrite")) {
            Some(Value::Object(map)) => match Self::substitute(&Value::Object(map.clone()), variables)? {
                Value::Object(map) => Ok(map),
                _ => Ok(Map::new()),
            },
            Some(_) => Err(StrataError::RuleFailure {
                source_name: "declarative".to_string(),
                message: "`overwrite` must be an object".to_string(),
            }),
            None => Ok(Map::new()),
        }
    }
}

impl ExpressionEvaluator for DeclarativeRules {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars() -> Variables {
        json!({"user_id": 7}).as_object().cloned().unwrap()
    }

    #[test]
    fn test_pass_through_defaults() {
        let rules = Rules::default();
        assert_eq!(
            rules.security.evaluate("users", None, &vars()).unwrap(),
            SecurityDecision::Allow
        );
        assert_eq!(rules.expressions.evaluate("a + b", &vars()).unwrap(), "a + b");
    }

    #[test]
    fn test_declarative_filter_substitutes_variables() {
        let rule = json!({"where": {"owner_id": "$user_id", "op": {"$gte": 1}}});
        assert_eq!(
            SecurityRules::evaluate(&DeclarativeRules, "docs", Some(&rule), &vars()).unwrap(),
            SecurityDecision::Filter(json!({"owner_id": 7, "op": {"$gte": 1}}))
        );

        let missing = json!({"where": {"owner_id": "$tenant"}});
        assert!(matches!(
            SecurityRules::evaluate(&DeclarativeRules, "docs", Some(&missing), &vars()),
            Err(StrataError::RuleFailure { .. })
        ));
    }

    #[test]
    fn test_declarative_deny_and_overwrite() {
        let rule = json!({"deny": "read only"});
        assert_eq!(
            SecurityRules::evaluate(&DeclarativeRules, "docs", Some(&rule), &vars()).unwrap(),
            SecurityDecision::Deny("read only".to_string())
        );

        let rule = json!({"overwrite": {"created_by": "$user_id"}});
        let forced = DeclarativeRules
            .overwrite("docs", Some(&rule), &Map::new(), &vars())
            .unwrap();
        assert_eq!(forced.get("created_by"), Some(&json!(7)));
    }
}
