//! SQL text builders. Everything here is a pure function of the static
//! declarations in [`crate::schema`]; values are always bound positionally.

use crate::schema::{ChildCollection, EntityKind};

/// Upper bound on bound parameters per statement in bundled SQLite.
pub const SQLITE_MAX_VARIABLES: usize = 32766;

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote(schema), quote(table))
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn column_list(kind: EntityKind) -> String {
    kind.columns()
        .iter()
        .map(|column| quote(column.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// How many records fit in one multi-row upsert for this kind.
pub fn rows_per_statement(kind: EntityKind) -> usize {
    (SQLITE_MAX_VARIABLES / kind.columns().len()).max(1)
}

pub fn create_table(schema: &str, kind: EntityKind) -> String {
    let columns = kind
        .columns()
        .iter()
        .map(|column| {
            if column.name == "id" {
                format!("    {} TEXT PRIMARY KEY NOT NULL", quote(column.name))
            } else {
                format!("    {} {}", quote(column.name), column.ty.sql_type())
            }
        })
        .collect::<Vec<_>>()
        .join(",\n");
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
        qualified(schema, kind.table()),
        columns
    )
}

pub fn create_parent_index(schema: &str, child: &ChildCollection) -> String {
    let index = format!("{}_{}_idx", child.kind.table(), child.parent_field);
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
        qualified(schema, &index),
        quote(child.kind.table()),
        quote(child.parent_field)
    )
}

/// Multi-row insert that fully replaces every non-id column on conflict.
pub fn upsert(schema: &str, kind: EntityKind, rows: usize) -> String {
    let columns = kind.columns();
    let row = format!("({})", placeholders(columns.len()));
    let values = vec![row.as_str(); rows.max(1)].join(", ");

    let assignments: Vec<String> = columns
        .iter()
        .filter(|column| column.name != "id")
        .map(|column| format!("{0} = excluded.{0}", quote(column.name)))
        .collect();
    let on_conflict = if assignments.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", assignments.join(", "))
    };

    format!(
        "INSERT INTO {} ({}) VALUES {} ON CONFLICT ({}) {} RETURNING {}",
        qualified(schema, kind.table()),
        column_list(kind),
        values,
        quote("id"),
        on_conflict,
        column_list(kind)
    )
}

pub fn exists(schema: &str, kind: EntityKind) -> String {
    format!(
        "SELECT 1 FROM {} WHERE {} = ? LIMIT 1",
        qualified(schema, kind.table()),
        quote("id")
    )
}

pub fn select_existing_ids(schema: &str, kind: EntityKind, count: usize) -> String {
    format!(
        "SELECT {0} FROM {1} WHERE {0} IN ({2})",
        quote("id"),
        qualified(schema, kind.table()),
        placeholders(count)
    )
}

pub fn select_by_id(schema: &str, kind: EntityKind) -> String {
    format!(
        "SELECT {} FROM {} WHERE {} = ?",
        column_list(kind),
        qualified(schema, kind.table()),
        quote("id")
    )
}

/// Marks active children of one parent deleted unless their id is kept.
/// Binds the parent id first, then each kept id.
pub fn mark_children_deleted(schema: &str, child: &ChildCollection, kept: usize) -> String {
    let mut sql = format!(
        "UPDATE {table} SET {deleted} = 1 WHERE {parent} = ? AND COALESCE({deleted}, 0) = 0",
        table = qualified(schema, child.kind.table()),
        deleted = quote(child.deleted_field),
        parent = quote(child.parent_field),
    );
    if kept > 0 {
        sql.push_str(&format!(" AND {} NOT IN ({})", quote("id"), placeholders(kept)));
    }
    sql
}
