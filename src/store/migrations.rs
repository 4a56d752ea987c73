//! Version-tracked database migrations for the libSQL backend.
//!
//! Steps are numbered; the `_migrations` ledger records which ones a
//! database has seen, and `run_migrations()` applies the rest in order.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS emails (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id TEXT NOT NULL UNIQUE,
                from_address TEXT NOT NULL DEFAULT '',
                to_address TEXT NOT NULL DEFAULT '',
                subject TEXT NOT NULL DEFAULT '',
                body TEXT NOT NULL DEFAULT '',
                received_at INTEGER NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_emails_received_at ON emails(received_at);
        "#,
    },
];

const CREATE_LEDGER: &str = "CREATE TABLE IF NOT EXISTS _migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
)";

/// Bring the schema up to the newest version in [`MIGRATIONS`].
///
/// Steps at or below the recorded version are skipped, so reopening an
/// existing database is a no-op.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(CREATE_LEDGER, ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("creating _migrations: {e}")))?;

    let applied = current_version(conn).await?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > applied).collect();
    if pending.is_empty() {
        tracing::debug!(version = applied, "Schema up to date");
        return Ok(());
    }

    for step in &pending {
        tracing::info!(version = step.version, name = step.name, "Applying migration");
        apply_step(conn, step).await?;
    }

    let version = current_version(conn).await?;
    tracing::info!(version, applied = pending.len(), "Database migrations complete");
    Ok(())
}

/// Run one step's SQL and record it in the ledger.
async fn apply_step(conn: &Connection, step: &Migration) -> Result<(), DatabaseError> {
    let failed = |what: &str, e: libsql::Error| {
        DatabaseError::Migration(format!("V{} {} {what}: {e}", step.version, step.name))
    };
    conn.execute_batch(step.sql)
        .await
        .map_err(|e| failed("failed", e))?;
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![step.version, step.name],
    )
    .await
    .map_err(|e| failed("not recorded", e))?;
    Ok(())
}

/// Highest recorded version; 0 for a fresh database.
async fn current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let read = |e: libsql::Error| DatabaseError::Migration(format!("reading schema version: {e}"));
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(read)?;
    match rows.next().await.map_err(read)? {
        Some(row) => row.get::<i64>(0).map_err(read),
        None => Ok(0),
    }
}
