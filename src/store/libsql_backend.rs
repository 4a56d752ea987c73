//! libSQL backend: async `MessageStore` implementation.
//!
//! Supports local file and in-memory databases. Filter chains compile to a
//! single parameterised `SELECT`. String tests use `instr()` over `lower()`,
//! which folds ASCII case like `LIKE` but takes `%`/`_` in rule values
//! literally.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::params::Params;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::rules::{DatePredicate, TextPredicate};
use crate::store::migrations;
use crate::store::query::{Filter, MessageQuery};
use crate::store::traits::{MessageStore, StoredMessage};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

const MESSAGE_COLUMNS: &str = "message_id, from_address, to_address, subject, body, received_at";

/// Map a libsql Row to a StoredMessage.
fn row_to_message(row: &libsql::Row) -> Result<StoredMessage, DatabaseError> {
    let read = |e: libsql::Error| DatabaseError::Query(format!("row parse: {e}"));
    let received_ms: i64 = row.get(5).map_err(read)?;
    let received_at = DateTime::<Utc>::from_timestamp_millis(received_ms).ok_or_else(|| {
        DatabaseError::Serialization(format!("received_at out of range: {received_ms}"))
    })?;

    Ok(StoredMessage {
        message_id: row.get(0).map_err(read)?,
        from_address: row.get(1).map_err(read)?,
        to_address: row.get(2).map_err(read)?,
        subject: row.get(3).map_err(read)?,
        body: row.get(4).map_err(read)?,
        received_at,
    })
}

fn comparison_operator(predicate: DatePredicate) -> &'static str {
    match predicate {
        DatePredicate::Gt => ">",
        DatePredicate::Gte => ">=",
        DatePredicate::Lt => "<",
        DatePredicate::Lte => "<=",
    }
}

/// Compile a filter chain into a `SELECT message_id` statement and its
/// positional parameters.
fn compile_query(query: &MessageQuery) -> (String, Vec<libsql::Value>) {
    let mut clauses = Vec::with_capacity(query.filters().len());
    let mut values = Vec::with_capacity(query.filters().len());

    for filter in query.filters() {
        let slot = values.len() + 1;
        match filter {
            Filter::Text {
                field,
                predicate,
                needle,
            } => {
                let test = match predicate {
                    TextPredicate::Contains => "> 0",
                    TextPredicate::DoesNotContain => "= 0",
                };
                clauses.push(format!(
                    "instr(lower({}), lower(?{slot})) {test}",
                    field.as_str()
                ));
                values.push(libsql::Value::Text(needle.clone()));
            }
            Filter::Received { predicate, at } => {
                clauses.push(format!(
                    "received_at {} ?{slot}",
                    comparison_operator(*predicate)
                ));
                values.push(libsql::Value::Integer(at.timestamp_millis()));
            }
        }
    }

    let mut sql = String::from("SELECT message_id FROM emails");
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY id ASC");
    (sql, values)
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl MessageStore for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn insert_message(&self, message: &StoredMessage) -> Result<bool, DatabaseError> {
        let inserted = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO emails (message_id, from_address, to_address, subject,
                    body, received_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message.message_id.as_str(),
                    message.from_address.as_str(),
                    message.to_address.as_str(),
                    message.subject.as_str(),
                    message.body.as_str(),
                    message.received_at.timestamp_millis(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_message: {e}")))?;

        if inserted == 0 {
            debug!(message_id = %message.message_id, "Message already stored, skipping");
            return Ok(false);
        }
        debug!(message_id = %message.message_id, "Message inserted into DB");
        Ok(true)
    }

    async fn get_message(&self, message_id: &str) -> Result<Option<StoredMessage>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {MESSAGE_COLUMNS} FROM emails WHERE message_id = ?1"),
                params![message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_message: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_message(&row).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_message: {e}"))),
        }
    }

    async fn count_messages(&self) -> Result<usize, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT COUNT(*) FROM emails", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("count_messages: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("count_messages: {e}")))?
            .ok_or_else(|| DatabaseError::Query("count_messages: no row returned".into()))?;
        let count: i64 = row
            .get(0)
            .map_err(|e| DatabaseError::Query(format!("count_messages: {e}")))?;
        Ok(count as usize)
    }

    async fn query_ids(&self, query: &MessageQuery) -> Result<Vec<String>, DatabaseError> {
        let (sql, values) = compile_query(query);
        let mut rows = self
            .conn()
            .query(&sql, Params::Positional(values))
            .await
            .map_err(|e| DatabaseError::Query(format!("query_ids: {e}")))?;

        let mut ids = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("query_ids: {e}")))?
        {
            let id: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("query_ids row parse: {e}")))?;
            ids.push(id);
        }

        debug!(filters = query.filters().len(), matched = ids.len(), "Query executed");
        Ok(ids)
    }
}
