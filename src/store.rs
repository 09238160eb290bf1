use chrono::Utc;
use rusqlite::types::{ToSqlOutput, Value};
use rusqlite::{params_from_iter, Connection, ErrorCode, OptionalExtension, Row, ToSql};
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

use crate::db;
use crate::model::{Record, ValidationError, Weight};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record conflicts with an existing one: {0}")]
    Conflict(String),
    #[error("database query failed: {0}")]
    Sqlite(rusqlite::Error),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Conflict(_) => "conflict",
            StoreError::Sqlite(_) => "store_unavailable",
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => StoreError::Conflict(e.to_string()),
            _ => StoreError::Sqlite(e),
        }
    }
}

/// A record kind persisted in its own table.
///
/// `COLUMNS` lists the entity's own columns; `id`, `created_at` and
/// `updated_at` are managed by the store. `to_values` must follow the same
/// order as `COLUMNS`.
pub trait Entity: Sized {
    const KIND: &'static str;
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];

    fn to_values(&self) -> rusqlite::Result<Vec<Value>>;
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
    fn validate(self) -> Result<Self, ValidationError>;
}

pub fn sql_value<T: ToSql + ?Sized>(v: &T) -> rusqlite::Result<Value> {
    match v.to_sql()? {
        ToSqlOutput::Borrowed(r) => Ok(r.into()),
        ToSqlOutput::Owned(v) => Ok(v),
        #[allow(unreachable_patterns)]
        _ => Err(rusqlite::Error::ToSqlConversionFailure(
            "unsupported sql output".into(),
        )),
    }
}

#[derive(Debug, Clone)]
enum Clause {
    Eq(&'static str, Value),
    IsNull(&'static str),
    ContainsAny(Vec<&'static str>, String),
}

/// Conjunction of column predicates. Column names come from code, never from
/// request input.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.clauses.push(Clause::Eq(column, value.into()));
        self
    }

    pub fn is_null(mut self, column: &'static str) -> Self {
        self.clauses.push(Clause::IsNull(column));
        self
    }

    /// Case-insensitive substring match against any of `columns`.
    pub fn contains_any(mut self, columns: &[&'static str], needle: &str) -> Self {
        self.clauses
            .push(Clause::ContainsAny(columns.to_vec(), needle.to_string()));
        self
    }

    fn to_sql(&self) -> (String, Vec<Value>) {
        if self.clauses.is_empty() {
            return (String::new(), Vec::new());
        }
        let mut parts: Vec<String> = Vec::with_capacity(self.clauses.len());
        let mut values: Vec<Value> = Vec::new();
        for c in &self.clauses {
            match c {
                Clause::Eq(col, v) => {
                    parts.push(format!("{} = ?", col));
                    values.push(v.clone());
                }
                Clause::IsNull(col) => parts.push(format!("{} IS NULL", col)),
                Clause::ContainsAny(cols, needle) => {
                    let pattern = format!("%{}%", escape_like(needle));
                    let ors = cols
                        .iter()
                        .map(|col| format!("{} LIKE ? ESCAPE '\\'", col))
                        .collect::<Vec<_>>()
                        .join(" OR ");
                    parts.push(format!("({})", ors));
                    for _ in cols {
                        values.push(Value::Text(pattern.clone()));
                    }
                }
            }
        }
        (format!(" WHERE {}", parts.join(" AND ")), values)
    }
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Persistence consumed by the grading core and the request handlers.
pub trait RecordStore {
    fn create<E: Entity>(&self, data: &E) -> Result<String, StoreError>;
    /// Records in insertion order. `usize::MAX` means no limit.
    fn find<E: Entity>(&self, filter: &Filter, limit: usize)
        -> Result<Vec<Record<E>>, StoreError>;
    fn get_by_id<E: Entity>(&self, id: &str) -> Result<Option<Record<E>>, StoreError>;
    fn update<E: Entity>(&self, id: &str, data: &E) -> Result<bool, StoreError>;
    fn delete<E: Entity>(&self, id: &str) -> Result<bool, StoreError>;
    /// Insert or overwrite the weight for its exact (subject, class) scope.
    fn upsert_weight(&self, data: &Weight) -> Result<Record<Weight>, StoreError>;

    fn find_one<E: Entity>(&self, filter: &Filter) -> Result<Option<Record<E>>, StoreError> {
        Ok(self.find::<E>(filter, 1)?.into_iter().next())
    }
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            conn: db::open_db(workspace)?,
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Ok(Self {
            conn: db::open_in_memory()?,
        })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

fn select_columns<E: Entity>() -> String {
    format!("id, {}, created_at, updated_at", E::COLUMNS.join(", "))
}

fn record_from_row<E: Entity>(row: &Row<'_>) -> rusqlite::Result<Record<E>> {
    Ok(Record {
        id: row.get("id")?,
        data: E::from_row(row)?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn insert_sql<E: Entity>() -> String {
    let placeholders = std::iter::repeat("?")
        .take(E::COLUMNS.len() + 3)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {}(id, {}, created_at, updated_at) VALUES({})",
        E::TABLE,
        E::COLUMNS.join(", "),
        placeholders
    )
}

fn insert_values<E: Entity>(id: &str, data: &E) -> rusqlite::Result<Vec<Value>> {
    let now = sql_value(&Utc::now())?;
    let mut values = Vec::with_capacity(E::COLUMNS.len() + 3);
    values.push(Value::Text(id.to_string()));
    values.extend(data.to_values()?);
    values.push(now.clone());
    values.push(now);
    Ok(values)
}

impl RecordStore for SqliteStore {
    fn create<E: Entity>(&self, data: &E) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.conn
            .execute(&insert_sql::<E>(), params_from_iter(insert_values(&id, data)?))?;
        Ok(id)
    }

    fn find<E: Entity>(
        &self,
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<Record<E>>, StoreError> {
        let (where_sql, mut values) = filter.to_sql();
        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY rowid LIMIT ?",
            select_columns::<E>(),
            E::TABLE,
            where_sql
        );
        // SQLite treats a negative LIMIT as unbounded.
        values.push(Value::Integer(i64::try_from(limit).unwrap_or(-1)));
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), record_from_row::<E>)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn get_by_id<E: Entity>(&self, id: &str) -> Result<Option<Record<E>>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?",
            select_columns::<E>(),
            E::TABLE
        );
        Ok(self
            .conn
            .query_row(&sql, [id], record_from_row::<E>)
            .optional()?)
    }

    fn update<E: Entity>(&self, id: &str, data: &E) -> Result<bool, StoreError> {
        let sets = E::COLUMNS
            .iter()
            .map(|c| format!("{} = ?", c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {}, updated_at = ? WHERE id = ?",
            E::TABLE,
            sets
        );
        let mut values = data.to_values()?;
        values.push(sql_value(&Utc::now())?);
        values.push(Value::Text(id.to_string()));
        let changed = self.conn.execute(&sql, params_from_iter(values))?;
        Ok(changed > 0)
    }

    fn delete<E: Entity>(&self, id: &str) -> Result<bool, StoreError> {
        let sql = format!("DELETE FROM {} WHERE id = ?", E::TABLE);
        let changed = self.conn.execute(&sql, [id])?;
        Ok(changed > 0)
    }

    fn upsert_weight(&self, data: &Weight) -> Result<Record<Weight>, StoreError> {
        // One statement against the (subject_id, class_scope) unique index.
        let updates = Weight::COLUMNS
            .iter()
            .filter(|c| !matches!(**c, "subject_id" | "class_scope"))
            .map(|c| format!("{c} = excluded.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "{} ON CONFLICT(subject_id, class_scope) DO UPDATE SET {}, updated_at = excluded.updated_at
             RETURNING {}",
            insert_sql::<Weight>(),
            updates,
            select_columns::<Weight>()
        );
        let id = Uuid::new_v4().to_string();
        let record = self.conn.query_row(
            &sql,
            params_from_iter(insert_values(&id, data)?),
            record_from_row::<Weight>,
        )?;
        tracing::info!(
            weight_id = %record.id,
            subject_id = %record.data.subject_id,
            class_name = record.data.class_name.as_deref().unwrap_or("*"),
            "weight upserted"
        );
        Ok(record)
    }
}
