//! Request documents.
//!
//! A request is a GraphQL-style text with one or more `query` / `mutation`
//! operations. Parsing yields an AST whose argument values may still hold
//! `$variable` references; they are resolved against the request variables
//! when an operation is compiled.

mod parser;
mod variables;

pub use parser::parse_document;
pub use variables::{bind_template, resolve_variables, Variables};

use serde_json::{Map, Number, Value};

/// Argument value before variable resolution
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<InputValue>),
    Object(Vec<(String, InputValue)>),
    Variable(String),
}

impl InputValue {
    /// Resolve into JSON; an unknown variable resolves to `None`.
    ///
    /// Inside objects absent entries are dropped, inside lists they become
    /// `null`.
    pub fn resolve(&self, variables: &Variables) -> Option<Value> {
        match self {
            Self::Null => Some(Value::Null),
            Self::Bool(b) => Some(Value::Bool(*b)),
            Self::Int(i) => Some(Value::Number((*i).into())),
            Self::Float(f) => Some(Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null)),
            Self::String(s) => Some(Value::String(s.clone())),
            Self::List(items) => Some(Value::Array(
                items
                    .iter()
                    .map(|v| v.resolve(variables).unwrap_or(Value::Null))
                    .collect(),
            )),
            Self::Object(entries) => {
                let mut map = Map::new();
                for (key, value) in entries {
                    if let Some(value) = value.resolve(variables) {
                        map.insert(key.clone(), value);
                    }
                }
                Some(Value::Object(map))
            }
            Self::Variable(name) => variables.get(name).cloned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: String,
    pub value: InputValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub name: String,
    pub arguments: Vec<Argument>,
}

impl Directive {
    pub fn argument(&self, name: &str) -> Option<&InputValue> {
        self.arguments.iter().find(|a| a.name == name).map(|a| &a.value)
    }
}

/// `alias: name(args) @directive { selection }`
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub alias: Option<String>,
    pub name: String,
    pub arguments: Vec<Argument>,
    pub directives: Vec<Directive>,
    pub selection: Vec<Field>,
}

impl Field {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            alias: None,
            name: name.into(),
            arguments: Vec::new(),
            directives: Vec::new(),
            selection: Vec::new(),
        }
    }

    /// Key this field occupies in the response
    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn argument(&self, name: &str) -> Option<&InputValue> {
        self.arguments.iter().find(|a| a.name == name).map(|a| &a.value)
    }

    /// Resolved argument; unknown variables and explicit nulls are `None`
    pub fn resolved(&self, name: &str, variables: &Variables) -> Option<Value> {
        self.argument(name)
            .and_then(|v| v.resolve(variables))
            .filter(|v| !v.is_null())
    }

    pub fn directive(&self, name: &str) -> Option<&Directive> {
        self.directives.iter().find(|d| d.name == name)
    }

    pub fn has_directive(&self, name: &str) -> bool {
        self.directive(name).is_some()
    }

    pub fn is_leaf(&self) -> bool {
        self.selection.is_empty()
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: InputValue) -> Self {
        self.arguments.push(Argument {
            name: name.into(),
            value,
        });
        self
    }

    pub fn with_selection(mut self, selection: Vec<Field>) -> Self {
        self.selection = selection;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
}

/// `$name: Type = default`
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    pub name: String,
    pub type_name: String,
    pub default: Option<InputValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub name: Option<String>,
    pub variables: Vec<VariableDefinition>,
    pub directives: Vec<Directive>,
    pub selection: Vec<Field>,
}

impl Operation {
    pub fn directive(&self, name: &str) -> Option<&Directive> {
        self.directives.iter().find(|d| d.name == name)
    }

    pub fn has_directive(&self, name: &str) -> bool {
        self.directive(name).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub operations: Vec<Operation>,
}

impl Document {
    /// Named operation lookup, used by `insertselect_*` fields
    pub fn operation(&self, name: &str) -> Option<&Operation> {
        self.operations
            .iter()
            .find(|op| op.name.as_deref() == Some(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_drops_unknown_variables_in_objects() {
        let mut vars = Variables::new();
        vars.insert("age".to_string(), json!(21));

        let value = InputValue::Object(vec![
            ("age".to_string(), InputValue::Variable("age".to_string())),
            ("name".to_string(), InputValue::Variable("missing".to_string())),
        ]);
        assert_eq!(value.resolve(&vars), Some(json!({"age": 21})));
        assert_eq!(InputValue::Variable("missing".to_string()).resolve(&vars), None);
    }

    #[test]
    fn test_field_output_name() {
        let mut field = Field::new("users");
        assert_eq!(field.output_name(), "users");
        field.alias = Some("adults".to_string());
        assert_eq!(field.output_name(), "adults");
    }
}
