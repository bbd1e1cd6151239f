//! chumsky grammar for request documents

use super::{
    Argument, Directive, Document, Field, InputValue, Operation, OperationKind,
    VariableDefinition,
};
use crate::error::{StrataError, StrataResult};
use chumsky::extra;
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

type Extra<'src> = extra::Err<Rich<'src, char>>;

/// Parse a full request document
pub fn parse_document(input: &str) -> StrataResult<Document> {
    document_parser()
        .parse(input)
        .into_result()
        .map_err(|errs| StrataError::Parse(format_errors(&errs, input)))
}

/// Whitespace and `#` line comments
fn ws<'src>() -> impl Parser<'src, &'src str, (), Extra<'src>> + Clone {
    let comment = just('#')
        .then(any().and_is(just('\n').not()).repeated())
        .ignored();
    choice((any().filter(|c: &char| c.is_whitespace()).ignored(), comment))
        .repeated()
        .ignored()
}

fn ident<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    any()
        .filter(|c: &char| c.is_ascii_alphanumeric() || *c == '_')
        .repeated()
        .at_least(1)
        .to_slice()
        .map(|s: &str| s.to_string())
        .labelled("name")
}

fn kw<'src>(keyword: &'static str) -> impl Parser<'src, &'src str, (), Extra<'src>> + Clone {
    text::keyword::<&str, _, Extra<'src>>(keyword).ignored()
}

fn symbol<'src>(c: char) -> impl Parser<'src, &'src str, char, Extra<'src>> + Clone {
    just(c).padded_by(ws())
}

fn string_literal<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    let escape = just('\\').ignore_then(choice((
        just('n').to('\n'),
        just('t').to('\t'),
        just('r').to('\r'),
        any(),
    )));

    let double = just('"')
        .ignore_then(
            choice((escape.clone(), none_of("\\\"")))
                .repeated()
                .collect::<String>(),
        )
        .then_ignore(just('"'));
    let single = just('\'')
        .ignore_then(choice((escape, none_of("\\'"))).repeated().collect::<String>())
        .then_ignore(just('\''));

    double.or(single).labelled("string")
}

fn number<'src>() -> impl Parser<'src, &'src str, InputValue, Extra<'src>> + Clone {
    let digits = any()
        .filter(|c: &char| c.is_ascii_digit())
        .repeated()
        .at_least(1);

    just('-')
        .or_not()
        .then(digits.clone())
        .then(just('.').then(digits.clone()).or_not())
        .then(
            one_of("eE")
                .then(one_of("+-").or_not())
                .then(digits)
                .or_not(),
        )
        .to_slice()
        .try_map(|s: &str, span: SimpleSpan| {
            if s.contains(['.', 'e', 'E']) {
                s.parse::<f64>()
                    .map(InputValue::Float)
                    .map_err(|_| Rich::custom(span, "invalid float literal"))
            } else {
                s.parse::<i64>()
                    .map(InputValue::Int)
                    .map_err(|_| Rich::custom(span, "integer overflow"))
            }
        })
        .labelled("number")
}

fn value_parser<'src>() -> impl Parser<'src, &'src str, InputValue, Extra<'src>> + Clone {
    recursive(|value| {
        let list = value
            .clone()
            .separated_by(symbol(','))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(symbol('['), symbol(']'))
            .map(InputValue::List);

        // bare, `$op` and dotted keys, or quoted
        let bare_key = just('$')
            .or_not()
            .then(
                any()
                    .filter(|c: &char| c.is_ascii_alphanumeric() || *c == '_' || *c == '.')
                    .repeated()
                    .at_least(1),
            )
            .to_slice()
            .map(|s: &str| s.to_string());
        let key = choice((string_literal(), bare_key)).padded_by(ws());

        let object = key
            .then_ignore(symbol(':'))
            .then(value)
            .separated_by(symbol(','))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(symbol('{'), symbol('}'))
            .map(InputValue::Object);

        let variable = just('$').ignore_then(ident()).map(InputValue::Variable);

        let keyword = choice((
            kw("true").to(InputValue::Bool(true)),
            kw("false").to(InputValue::Bool(false)),
            kw("null").to(InputValue::Null),
        ));

        // enum-style bare words read as strings
        let word = ident().map(InputValue::String);

        choice((
            variable,
            string_literal().map(InputValue::String),
            number(),
            keyword,
            word,
            list,
            object,
        ))
        .padded_by(ws())
        .labelled("value")
    })
}

fn arguments<'src>() -> impl Parser<'src, &'src str, Vec<Argument>, Extra<'src>> + Clone {
    ident()
        .padded_by(ws())
        .then_ignore(symbol(':'))
        .then(value_parser())
        .map(|(name, value)| Argument { name, value })
        .separated_by(symbol(','))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(symbol('('), symbol(')'))
        .labelled("arguments")
}

fn directives<'src>() -> impl Parser<'src, &'src str, Vec<Directive>, Extra<'src>> + Clone {
    just('@')
        .ignore_then(ident())
        .then(arguments().or_not())
        .map(|(name, arguments)| Directive {
            name,
            arguments: arguments.unwrap_or_default(),
        })
        .padded_by(ws())
        .repeated()
        .collect::<Vec<_>>()
}

fn field_parser<'src>() -> impl Parser<'src, &'src str, Field, Extra<'src>> + Clone {
    recursive(|field| {
        let selection = field
            .repeated()
            .collect::<Vec<_>>()
            .delimited_by(symbol('{'), symbol('}'));

        let alias_and_name = ident()
            .padded_by(ws())
            .then(symbol(':').ignore_then(ident().padded_by(ws())).or_not())
            .map(|(first, second)| match second {
                Some(name) => (Some(first), name),
                None => (None, first),
            });

        alias_and_name
            .then(arguments().or_not())
            .then(directives())
            .then(selection.or_not())
            .then_ignore(symbol(',').or_not())
            .map(|((((alias, name), arguments), directives), selection)| Field {
                alias,
                name,
                arguments: arguments.unwrap_or_default(),
                directives,
                selection: selection.unwrap_or_default(),
            })
            .labelled("field")
    })
}

fn selection_set<'src>() -> impl Parser<'src, &'src str, Vec<Field>, Extra<'src>> + Clone {
    field_parser()
        .repeated()
        .at_least(1)
        .collect::<Vec<_>>()
        .delimited_by(symbol('{'), symbol('}'))
        .labelled("selection set")
}

fn variable_definitions<'src>(
) -> impl Parser<'src, &'src str, Vec<VariableDefinition>, Extra<'src>> + Clone {
    let type_name = any()
        .filter(|c: &char| c.is_ascii_alphanumeric() || matches!(c, '_' | '[' | ']' | '!'))
        .repeated()
        .at_least(1)
        .to_slice()
        .map(|s: &str| s.to_string())
        .padded_by(ws());

    just('$')
        .ignore_then(ident())
        .padded_by(ws())
        .then_ignore(symbol(':'))
        .then(type_name)
        .then(symbol('=').ignore_then(value_parser()).or_not())
        .map(|((name, type_name), default)| VariableDefinition {
            name,
            type_name,
            default,
        })
        .separated_by(symbol(','))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(symbol('('), symbol(')'))
}

fn operation_parser<'src>() -> impl Parser<'src, &'src str, Operation, Extra<'src>> + Clone {
    let kind = choice((
        kw("query").to(OperationKind::Query),
        kw("mutation").to(OperationKind::Mutation),
    ))
    .padded_by(ws());

    let named = kind
        .then(ident().padded_by(ws()).or_not())
        .then(variable_definitions().or_not())
        .then(directives())
        .then(selection_set())
        .map(|((((kind, name), variables), directives), selection)| Operation {
            kind,
            name,
            variables: variables.unwrap_or_default(),
            directives,
            selection,
        });

    let shorthand = selection_set().map(|selection| Operation {
        kind: OperationKind::Query,
        name: None,
        variables: Vec::new(),
        directives: Vec::new(),
        selection,
    });

    choice((named, shorthand)).labelled("operation")
}

fn document_parser<'src>() -> impl Parser<'src, &'src str, Document, Extra<'src>> {
    operation_parser()
        .repeated()
        .at_least(1)
        .collect::<Vec<_>>()
        .padded_by(ws())
        .then_ignore(end())
        .map(|operations| Document { operations })
}

fn format_errors(errs: &[Rich<'_, char>], input: &str) -> String {
    errs.iter()
        .map(|e| {
            let start = e.span().start.min(input.len());
            let line = input[..start].matches('\n').count() + 1;
            let column = start - input[..start].rfind('\n').map_or(0, |i| i + 1) + 1;
            let found = e
                .found()
                .map_or("end of input".to_string(), |c| format!("'{}'", c));
            format!("line {}, column {}: {} (found {})", line, column, e.reason(), found)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        query active @source(name: "main") {
          users(where: {age: {$gte: 18}}, sort: "-name", limit: 10) {
            id
            name
            orders { id total }
            spend: total(aggregate: "sum")
          }
        }
        # writes
        mutation @singleTxn {
          added: insert_users(docs: [{name: "a", orders: [{total: 5}]}], txn: true) {
            returning { id name }
            error
          }
        }
    "#;

    #[test]
    fn test_parse_sample_document() {
        let doc = parse_document(SAMPLE).unwrap();
        assert_eq!(doc.operations.len(), 2);

        let query = &doc.operations[0];
        assert_eq!(query.kind, OperationKind::Query);
        assert_eq!(query.name.as_deref(), Some("active"));
        assert_eq!(
            query.directive("source").and_then(|d| d.argument("name")),
            Some(&InputValue::String("main".to_string()))
        );

        let users = &query.selection[0];
        assert_eq!(users.name, "users");
        assert_eq!(users.selection.len(), 4);
        assert_eq!(users.argument("limit"), Some(&InputValue::Int(10)));
        assert_eq!(
            users.argument("where"),
            Some(&InputValue::Object(vec![(
                "age".to_string(),
                InputValue::Object(vec![("$gte".to_string(), InputValue::Int(18))])
            )]))
        );

        let spend = &users.selection[3];
        assert_eq!(spend.alias.as_deref(), Some("spend"));
        assert_eq!(spend.name, "total");

        let mutation = &doc.operations[1];
        assert_eq!(mutation.kind, OperationKind::Mutation);
        assert!(mutation.has_directive("singleTxn"));
        let added = &mutation.selection[0];
        assert_eq!(added.output_name(), "added");
        assert_eq!(added.name, "insert_users");
        assert_eq!(added.selection[0].name, "returning");
        assert_eq!(added.selection[1].name, "error");
    }

    #[test]
    fn test_shorthand_query_and_values() {
        let doc = parse_document(
            r#"{ t(where: {"a.b": 'x\'y', n: -1.5e2, ok: false, tags: [1, "two", null]}) { id } }"#,
        )
        .unwrap();
        let field = &doc.operations[0].selection[0];
        assert_eq!(
            field.argument("where"),
            Some(&InputValue::Object(vec![
                ("a.b".to_string(), InputValue::String("x'y".to_string())),
                ("n".to_string(), InputValue::Float(-150.0)),
                ("ok".to_string(), InputValue::Bool(false)),
                (
                    "tags".to_string(),
                    InputValue::List(vec![
                        InputValue::Int(1),
                        InputValue::String("two".to_string()),
                        InputValue::Null
                    ])
                ),
            ]))
        );
    }

    #[test]
    fn test_variable_definitions_and_references() {
        let doc = parse_document(
            "query adults($min: Int = 18) { users(where: {age: {$gte: $min}}) { id } }",
        )
        .unwrap();
        let op = &doc.operations[0];
        assert_eq!(op.variables.len(), 1);
        assert_eq!(op.variables[0].default, Some(InputValue::Int(18)));

        let users = &op.selection[0];
        assert_eq!(
            users.argument("where"),
            Some(&InputValue::Object(vec![(
                "age".to_string(),
                InputValue::Object(vec![(
                    "$gte".to_string(),
                    InputValue::Variable("min".to_string())
                )])
            )]))
        );
    }

    #[test]
    fn test_syntax_error_reports_location() {
        let err = parse_document("query { users( }").unwrap_err();
        match err {
            StrataError::Parse(message) => assert!(message.contains("line 1"), "{}", message),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_empty_document_rejected() {
        assert!(parse_document("   ").is_err());
    }
}
