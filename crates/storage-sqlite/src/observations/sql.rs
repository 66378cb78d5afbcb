//! SQL text for family tables, whose names and columns are only known at
//! runtime.

use networth_core::constants::TIMESTAMP_COLUMN;

/// Columns per `json_object` call; SQLite caps function arguments.
const JSON_OBJECT_CHUNK: usize = 50;

/// Quotes an identifier for use as a table or column name.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quotes a string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn create_family_table(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({} TEXT NOT NULL PRIMARY KEY)",
        quote_ident(table),
        quote_ident(TIMESTAMP_COLUMN)
    )
}

pub fn add_column(table: &str, column: &str) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {} REAL",
        quote_ident(table),
        quote_ident(column)
    )
}

pub fn insert_row(table: &str, columns: &[&str]) -> String {
    let names: Vec<String> = std::iter::once(TIMESTAMP_COLUMN)
        .chain(columns.iter().copied())
        .map(quote_ident)
        .collect();
    let placeholders = vec!["?"; names.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        names.join(", "),
        placeholders
    )
}

/// Expression producing a JSON object of every column of a row. Nulls are
/// dropped by `json_patch`, which is fine: a missing key reads as null.
pub fn row_payload(columns: &[String]) -> String {
    let objects: Vec<String> = columns
        .chunks(JSON_OBJECT_CHUNK)
        .map(|chunk| {
            let args: Vec<String> = chunk
                .iter()
                .map(|c| format!("{}, {}", quote_literal(c), quote_ident(c)))
                .collect();
            format!("json_object({})", args.join(", "))
        })
        .collect();
    match objects.split_first() {
        None => "json_object()".to_string(),
        Some((first, rest)) => rest
            .iter()
            .fold(first.clone(), |acc, obj| format!("json_patch({}, {})", acc, obj)),
    }
}

/// Selects `date` and `payload` for rows matching `filter` (which may bind
/// parameters), newest first when `newest_first` is set.
pub fn select_rows(table: &str, columns: &[String], filter: &str, newest_first: bool, limit: Option<u32>) -> String {
    let mut sql = format!(
        "SELECT {ts} AS date, {payload} AS payload FROM {table}",
        ts = quote_ident(TIMESTAMP_COLUMN),
        payload = row_payload(columns),
        table = quote_ident(table)
    );
    if !filter.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(filter);
    }
    sql.push_str(&format!(
        " ORDER BY {} {}",
        quote_ident(TIMESTAMP_COLUMN),
        if newest_first { "DESC" } else { "ASC" }
    ));
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
    sql
}

pub fn latest_value(table: &str, column: &str) -> String {
    format!(
        "SELECT {ts} AS date, {col} AS value FROM {table} \
         WHERE {ts} <= ? AND {col} IS NOT NULL ORDER BY {ts} DESC LIMIT 1",
        ts = quote_ident(TIMESTAMP_COLUMN),
        col = quote_ident(column),
        table = quote_ident(table)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers_are_quoted() {
        assert_eq!(quote_ident("CHFUSD=X"), "\"CHFUSD=X\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(quote_literal("O'Hara"), "'O''Hara'");
    }

    #[test]
    fn test_insert_row() {
        assert_eq!(
            insert_row("forex", &["CHFUSD=X", "^SSMI"]),
            "INSERT INTO \"forex\" (\"date\", \"CHFUSD=X\", \"^SSMI\") VALUES (?, ?, ?)"
        );
    }

    #[test]
    fn test_payload_chunks_large_families() {
        assert_eq!(row_payload(&[]), "json_object()");
        assert_eq!(row_payload(&["a".to_string()]), "json_object('a', \"a\")");

        let columns: Vec<String> = (0..120).map(|i| format!("c{}", i)).collect();
        let payload = row_payload(&columns);
        assert_eq!(payload.matches("json_object(").count(), 3);
        assert_eq!(payload.matches("json_patch(").count(), 2);
    }
}
