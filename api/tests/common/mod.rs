use shortlink_api::services::db::{self, PoolConfig};
use shortlink_api::services::tx::TransactionRunner;
use sqlx::{Sqlite, SqlitePool};
use tempfile::TempDir;

pub const SCHEMA: &str = r#"
    CREATE TABLE notes (
        id INTEGER PRIMARY KEY,
        body TEXT NOT NULL
    );

    CREATE TABLE ShortUrls (
        Alias TEXT PRIMARY KEY NOT NULL,
        Origin TEXT NOT NULL,
        Hits INTEGER NOT NULL DEFAULT 0,
        CreatedAt TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        UpdatedAt TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
    CREATE INDEX IdxOrigin ON ShortUrls (Origin);
"#;

/// File-backed database so every pooled connection sees the same data.
/// Keep the returned `TempDir` alive for the duration of the test.
pub async fn test_runner(config: PoolConfig) -> (TransactionRunner<Sqlite>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("test.db").display());

    let pool = db::connect::<Sqlite>(&url, None, &config).await.unwrap();
    sqlx::raw_sql(SCHEMA).execute(&pool).await.unwrap();

    (TransactionRunner::new(pool), dir)
}

// Code is used by test modules, but not in this scope
#[allow(unused)]
pub async fn count_notes(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM notes")
        .fetch_one(pool)
        .await
        .unwrap()
}
