use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, Row, params, params_from_iter};
use serde_json::Value as JsonValue;

use crate::config::SyncConfig;
use crate::errors::{Result, StorageError};
use crate::schema::{ChildCollection, Column, ColumnType, EntityKind, Record, record_id};
use crate::sql;

/// Storage operations the sync engine relies on. Every write goes through
/// the backend's native upsert-on-conflict; nothing here reads then writes.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn exists(&self, kind: EntityKind, id: &str) -> Result<bool>;

    /// Ids from `ids` with no local row, deduplicated, in first-seen order.
    async fn find_missing(&self, kind: EntityKind, ids: &[String]) -> Result<Vec<String>>;

    async fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Record>>;

    /// Writes `records` and returns the stored rows in input order.
    async fn upsert(&self, kind: EntityKind, records: &[Record]) -> Result<Vec<Record>>;

    /// Flags children of `parent_id` whose id is not in `kept_ids` as deleted.
    /// Returns how many rows changed.
    async fn mark_children_deleted(
        &self,
        child: &ChildCollection,
        parent_id: &str,
        kept_ids: &[String],
    ) -> Result<usize>;
}

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    schema: String,
}

impl SqliteStore {
    /// Opens the mirror. The database file (or a private in-memory database)
    /// is attached under the configured schema name so every table is
    /// addressed as `"schema"."table"`.
    pub fn open(config: &SyncConfig) -> Result<Self> {
        config.validate()?;
        let target = match &config.database_path {
            Some(path) => path
                .to_str()
                .ok_or_else(|| {
                    StorageError::Config(format!("database path {path:?} is not valid UTF-8"))
                })?
                .to_string(),
            None => ":memory:".to_string(),
        };

        let conn = Connection::open_in_memory()?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute(
            &format!("ATTACH DATABASE ?1 AS \"{}\"", config.schema),
            params![target],
        )?;
        log::debug!("attached '{}' as schema '{}'", target, config.schema);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            schema: config.schema.clone(),
        })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Creates one table per entity kind plus the child-to-parent indexes.
    pub fn initialize_schema(&self) -> Result<()> {
        let mut statements = vec!["BEGIN".to_string()];
        for kind in EntityKind::ALL {
            statements.push(sql::create_table(&self.schema, kind));
        }
        // child tables may be declared after their parent
        for kind in EntityKind::ALL {
            if let Some(child) = kind.child_collection() {
                statements.push(sql::create_parent_index(&self.schema, child));
            }
        }
        statements.push("COMMIT".to_string());

        let conn = self.conn()?;
        conn.execute_batch(&(statements.join(";\n") + ";"))?;
        log::info!("schema '{}' initialized", self.schema);
        Ok(())
    }
}

#[async_trait]
impl EntityStore for SqliteStore {
    async fn exists(&self, kind: EntityKind, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&sql::exists(&self.schema, kind))?;
        let found = stmt.exists(params![id])?;
        Ok(found)
    }

    async fn find_missing(&self, kind: EntityKind, ids: &[String]) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let unique: Vec<&String> = ids.iter().filter(|id| seen.insert(id.as_str())).collect();
        if unique.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn()?;
        let mut present: HashSet<String> = HashSet::with_capacity(unique.len());
        for chunk in unique.chunks(sql::SQLITE_MAX_VARIABLES) {
            let mut stmt = conn.prepare(&sql::select_existing_ids(&self.schema, kind, chunk.len()))?;
            let mut rows = stmt.query(params_from_iter(chunk.iter()))?;
            while let Some(row) = rows.next()? {
                present.insert(row.get(0)?);
            }
        }

        Ok(unique
            .into_iter()
            .filter(|id| !present.contains(id.as_str()))
            .cloned()
            .collect())
    }

    async fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Record>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&sql::select_by_id(&self.schema, kind))?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(decode_row(kind, row)?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, kind: EntityKind, records: &[Record]) -> Result<Vec<Record>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        // A later record for the same id supersedes an earlier one, exactly as
        // if they had been written one after another.
        let order: Vec<&str> = records
            .iter()
            .map(|record| record_id(kind, record))
            .collect::<Result<_>>()?;
        let mut latest: HashMap<&str, &Record> = HashMap::with_capacity(records.len());
        let mut distinct: Vec<&str> = Vec::with_capacity(records.len());
        for (id, record) in order.iter().copied().zip(records) {
            if latest.insert(id, record).is_none() {
                distinct.push(id);
            }
        }

        let columns = kind.columns();
        let mut encoded: Vec<SqlValue> = Vec::with_capacity(distinct.len() * columns.len());
        for id in &distinct {
            let record = latest[id];
            for column in columns {
                encoded.push(encode(kind, column, record.get(column.name))?);
            }
        }

        let mut stored: HashMap<String, Record> = HashMap::with_capacity(distinct.len());
        {
            let mut conn = self.conn()?;
            let tx = conn.transaction()?;
            let per_statement = sql::rows_per_statement(kind);
            for values in encoded.chunks(per_statement * columns.len()) {
                let rows_in_chunk = values.len() / columns.len();
                let mut stmt = tx.prepare(&sql::upsert(&self.schema, kind, rows_in_chunk))?;
                let mut rows = stmt.query(params_from_iter(values.iter()))?;
                while let Some(row) = rows.next()? {
                    let record = decode_row(kind, row)?;
                    let id = record_id(kind, &record)?.to_string();
                    stored.insert(id, record);
                }
            }
            tx.commit()?;
        }
        log::debug!("upserted {} {} rows", stored.len(), kind);

        order
            .into_iter()
            .map(|id| {
                stored.get(id).cloned().ok_or_else(|| StorageError::Decode {
                    kind,
                    column: "id",
                    reason: format!("no row returned for '{id}'"),
                })
            })
            .collect()
    }

    async fn mark_children_deleted(
        &self,
        child: &ChildCollection,
        parent_id: &str,
        kept_ids: &[String],
    ) -> Result<usize> {
        let conn = self.conn()?;
        let statement = sql::mark_children_deleted(&self.schema, child, kept_ids.len());
        let bound = std::iter::once(parent_id).chain(kept_ids.iter().map(String::as_str));
        let changed = conn.execute(&statement, params_from_iter(bound))?;
        if changed > 0 {
            log::info!(
                "marked {} {} of '{}' deleted",
                changed,
                child.kind,
                parent_id
            );
        }
        Ok(changed)
    }
}

fn encode_error(kind: EntityKind, column: &Column, reason: impl Into<String>) -> StorageError {
    StorageError::Encode {
        kind,
        column: column.name,
        reason: reason.into(),
    }
}

/// Converts one field into its column representation. Absent and `null`
/// fields both become SQL NULL.
pub(crate) fn encode(
    kind: EntityKind,
    column: &Column,
    value: Option<&JsonValue>,
) -> Result<SqlValue> {
    let value = match value {
        None | Some(JsonValue::Null) => return Ok(SqlValue::Null),
        Some(value) => value,
    };

    match column.ty {
        ColumnType::Json => Ok(SqlValue::Text(serde_json::to_string(value)?)),
        ColumnType::Text => match value {
            JsonValue::String(text) => Ok(SqlValue::Text(text.clone())),
            JsonValue::Number(number) => Ok(SqlValue::Text(number.to_string())),
            JsonValue::Bool(flag) => Ok(SqlValue::Text(flag.to_string())),
            // expanded reference
            JsonValue::Object(object) => object
                .get("id")
                .and_then(JsonValue::as_str)
                .map(|id| SqlValue::Text(id.to_string()))
                .ok_or_else(|| encode_error(kind, column, "object without an id")),
            _ => Err(encode_error(kind, column, "expected text")),
        },
        ColumnType::Integer => value
            .as_i64()
            .map(SqlValue::Integer)
            .ok_or_else(|| encode_error(kind, column, format!("expected integer, got {value}"))),
        ColumnType::Real => value
            .as_f64()
            .map(SqlValue::Real)
            .ok_or_else(|| encode_error(kind, column, format!("expected number, got {value}"))),
        ColumnType::Boolean => value
            .as_bool()
            .map(|flag| SqlValue::Integer(i64::from(flag)))
            .ok_or_else(|| encode_error(kind, column, format!("expected boolean, got {value}"))),
    }
}

pub(crate) fn decode(kind: EntityKind, column: &Column, value: ValueRef<'_>) -> Result<JsonValue> {
    let mismatch = |found: &str| StorageError::Decode {
        kind,
        column: column.name,
        reason: format!("unexpected {found} for {:?} column", column.ty),
    };

    match (column.ty, value) {
        (_, ValueRef::Null) => Ok(JsonValue::Null),
        (ColumnType::Text, ValueRef::Text(bytes)) => Ok(JsonValue::String(utf8(kind, column, bytes)?)),
        (ColumnType::Json, ValueRef::Text(bytes)) => {
            let text = utf8(kind, column, bytes)?;
            serde_json::from_str(&text).map_err(|err| StorageError::Decode {
                kind,
                column: column.name,
                reason: err.to_string(),
            })
        }
        (ColumnType::Integer, ValueRef::Integer(number)) => Ok(JsonValue::from(number)),
        (ColumnType::Real, ValueRef::Real(number)) => Ok(JsonValue::from(number)),
        (ColumnType::Real, ValueRef::Integer(number)) => Ok(JsonValue::from(number as f64)),
        (ColumnType::Boolean, ValueRef::Integer(flag)) => Ok(JsonValue::Bool(flag != 0)),
        (_, ValueRef::Text(_)) => Err(mismatch("text")),
        (_, ValueRef::Integer(_)) => Err(mismatch("integer")),
        (_, ValueRef::Real(_)) => Err(mismatch("real")),
        (_, ValueRef::Blob(_)) => Err(mismatch("blob")),
    }
}

fn utf8(kind: EntityKind, column: &Column, bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|err| StorageError::Decode {
        kind,
        column: column.name,
        reason: err.to_string(),
    })
}

fn decode_row(kind: EntityKind, row: &Row<'_>) -> Result<Record> {
    let mut record = Record::new();
    for (index, column) in kind.columns().iter().enumerate() {
        let value = decode(kind, column, row.get_ref(index)?)?;
        record.insert(column.name.to_string(), value);
    }
    Ok(record)
}
