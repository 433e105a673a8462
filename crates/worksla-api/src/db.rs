use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

/// SQLite connection pool type alias.
pub type DbPool = sqlx::SqlitePool;
pub type DbRow = sqlx::sqlite::SqliteRow;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS work_items (
    id INTEGER PRIMARY KEY,
    subject TEXT NOT NULL,
    status TEXT,
    priority TEXT,
    kind TEXT,
    assignee_id INTEGER,
    assignee_name TEXT,
    project_id INTEGER,
    project_name TEXT,
    start_date TEXT,
    due_date TEXT,
    created_at TEXT,
    updated_at TEXT,
    cached_at TEXT NOT NULL,
    raw TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_work_items_due_date ON work_items(due_date);
CREATE INDEX IF NOT EXISTS idx_work_items_assignee ON work_items(assignee_id);
CREATE INDEX IF NOT EXISTS idx_work_items_updated ON work_items(updated_at);

CREATE TABLE IF NOT EXISTS assignee_allowlist (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    upstream_user_id INTEGER NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    description TEXT
);
"#;

/// Create a SQLite connection pool from the given database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}

/// In-memory pool for tests. A single connection keeps the database alive
/// and visible to every query.
pub async fn create_memory_pool() -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    init_schema(&pool).await?;
    Ok(pool)
}

/// Apply the embedded schema. Idempotent.
pub async fn init_schema(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}
