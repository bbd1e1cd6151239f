//! Write statement text per dialect

use crate::dialect::{ReturningStyle, SqlDialect};

fn returning_list(returning: &[String], prefix: &str) -> String {
    if returning.is_empty() {
        return format!("{}*", prefix);
    }
    returning
        .iter()
        .map(|c| format!("{}{}", prefix, c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn suffix(dialect: &dyn SqlDialect, returning: &[String]) -> String {
    match dialect.returning_style() {
        ReturningStyle::Suffix => format!(" RETURNING {}", returning_list(returning, "")),
        _ => String::new(),
    }
}

fn output(dialect: &dyn SqlDialect, returning: &[String], side: &str) -> String {
    match dialect.returning_style() {
        ReturningStyle::Output => format!(
            " OUTPUT {}",
            returning_list(returning, &format!("{}.", side))
        ),
        _ => String::new(),
    }
}

pub fn insert_sql(
    dialect: &dyn SqlDialect,
    table: &str,
    columns: &[String],
    row_count: usize,
    returning: &[String],
) -> String {
    format!(
        "insert into {} ({}){} values {}{}",
        table,
        columns.join(", "),
        output(dialect, returning, "INSERTED"),
        dialect.placeholder_list(row_count, columns.len(), false),
        suffix(dialect, returning)
    )
}

pub fn update_sql(
    dialect: &dyn SqlDialect,
    table: &str,
    columns: &[String],
    filter: Option<&str>,
    returning: &[String],
) -> String {
    let assignments = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = {}", c, dialect.placeholder(i + 1)))
        .collect::<Vec<_>>()
        .join(", ");
    let mut sql = format!(
        "update {} set {}{}",
        table,
        assignments,
        output(dialect, returning, "INSERTED")
    );
    if let Some(filter) = filter {
        sql.push_str(" where ");
        sql.push_str(filter);
    }
    sql.push_str(&suffix(dialect, returning));
    sql
}

pub fn delete_sql(
    dialect: &dyn SqlDialect,
    table: &str,
    filter: Option<&str>,
    returning: &[String],
) -> String {
    let mut sql = format!(
        "delete from {}{}",
        table,
        output(dialect, returning, "DELETED")
    );
    if let Some(filter) = filter {
        sql.push_str(" where ");
        sql.push_str(filter);
    }
    sql.push_str(&suffix(dialect, returning));
    sql
}

/// `select` is used verbatim
pub fn insert_select_sql(
    dialect: &dyn SqlDialect,
    table: &str,
    columns: &[String],
    select: &str,
    returning: &[String],
) -> String {
    format!(
        "insert into {} ({}){} {}{}",
        table,
        columns.join(", "),
        output(dialect, returning, "INSERTED"),
        select,
        suffix(dialect, returning)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{MsSql, MySql, Postgres};

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_insert_per_dialect() {
        let columns = cols(&["name", "age"]);
        assert_eq!(
            insert_sql(&Postgres, "users", &columns, 2, &cols(&["id"])),
            "insert into users (name, age) values ($1, $2), ($3, $4) RETURNING id"
        );
        assert_eq!(
            insert_sql(&MsSql, "users", &columns, 1, &[]),
            "insert into users (name, age) OUTPUT INSERTED.* values (?, ?)"
        );
        assert_eq!(
            insert_sql(&MySql, "users", &columns, 1, &cols(&["id"])),
            "insert into users (name, age) values (?, ?)"
        );
    }

    #[test]
    fn test_update_and_delete() {
        assert_eq!(
            update_sql(&Postgres, "users", &cols(&["name", "age"]), Some("users.id = 1"), &[]),
            "update users set name = $1, age = $2 where users.id = 1 RETURNING *"
        );
        assert_eq!(
            delete_sql(&MsSql, "users", Some("users.id = 1"), &cols(&["id"])),
            "delete from users OUTPUT DELETED.id where users.id = 1"
        );
        assert_eq!(delete_sql(&MySql, "users", None, &[]), "delete from users");
    }

    #[test]
    fn test_insert_select() {
        assert_eq!(
            insert_select_sql(&Postgres, "archive", &cols(&["id"]), "SELECT users.id FROM users", &[]),
            "insert into archive (id) SELECT users.id FROM users RETURNING *"
        );
    }
}
