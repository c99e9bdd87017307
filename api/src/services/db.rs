//! Database connection factory and per-backend transaction plumbing
//!
//! Pools are built from a base URL and an optional authentication token. Two
//! backends are supported:
//!
//! - SQLite (`sqlite:` URLs), the engine the short-URL schema was written for
//! - Postgres (`postgres:` / `postgresql:` URLs), where the token becomes the password
//!
//! The [`Backend`] trait is the seam [`TransactionRunner`](super::tx::TransactionRunner)
//! uses to put a freshly begun transaction into read-only or read-write mode.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::pool::PoolOptions;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode};
use sqlx::{Database, Pool, Postgres, Sqlite};
use tracing::info;

use crate::constants::{
    DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_CONNECTIONS,
    DEFAULT_MIN_CONNECTIONS,
};

/// Access mode a transaction is begun with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadWrite,
    ReadOnly,
}

impl AccessMode {
    pub fn is_read_only(self) -> bool {
        matches!(self, AccessMode::ReadOnly)
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::ReadWrite => write!(f, "read-write"),
            AccessMode::ReadOnly => write!(f, "read-only"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("unsupported database URL scheme: {0}")]
    UnsupportedScheme(String),
    #[error("the {0} backend does not accept an auth token")]
    AuthTokenUnsupported(&'static str),
    #[error("invalid pool configuration: {0}")]
    InvalidPoolConfig(String),
    #[error("invalid connection options: {0}")]
    Options(#[source] sqlx::Error),
    #[error("failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),
}

/// Pool sizing policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Upper bound on open connections
    pub max_connections: u32,
    /// Connections kept open even when idle
    pub min_connections: u32,
    /// Idle connections above `min_connections` are closed after this long
    pub idle_timeout: Duration,
    /// How long `begin` waits for a free connection before failing
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), ConnectError> {
        if self.max_connections == 0 {
            return Err(ConnectError::InvalidPoolConfig(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(ConnectError::InvalidPoolConfig(format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        Ok(())
    }
}

/// Which backend a URL points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseKind {
    Sqlite,
    Postgres,
}

impl DatabaseKind {
    pub fn from_url(url: &str) -> Result<Self, ConnectError> {
        let scheme = url.split(':').next().unwrap_or_default();
        match scheme.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(DatabaseKind::Sqlite),
            "postgres" | "postgresql" => Ok(DatabaseKind::Postgres),
            _ => Err(ConnectError::UnsupportedScheme(scheme.to_string())),
        }
    }
}

/// Backend-specific hooks used by the connection factory and the transaction runner.
pub trait Backend: Database {
    /// Build connect options from a base URL and an optional auth token.
    fn connect_options(
        url: &str,
        auth_token: Option<&str>,
    ) -> Result<<Self::Connection as sqlx::Connection>::Options, ConnectError>;

    /// Statement that opens a transaction in `mode`. `None` uses the driver's `BEGIN`.
    fn begin_statement(mode: AccessMode) -> Option<&'static str> {
        let _ = mode;
        None
    }

    /// Called right after `BEGIN`, before the unit of work runs.
    fn enter_mode(
        conn: &mut Self::Connection,
        mode: AccessMode,
    ) -> BoxFuture<'_, Result<(), sqlx::Error>>;

    /// Called right before commit or rollback.
    fn leave_mode(
        conn: &mut Self::Connection,
        mode: AccessMode,
    ) -> BoxFuture<'_, Result<(), sqlx::Error>> {
        let _ = (conn, mode);
        Box::pin(async { Ok(()) })
    }
}

impl Backend for Postgres {
    fn connect_options(
        url: &str,
        auth_token: Option<&str>,
    ) -> Result<PgConnectOptions, ConnectError> {
        let options = PgConnectOptions::from_str(url).map_err(ConnectError::Options)?;
        Ok(match auth_token {
            Some(token) => options.password(token),
            None => options,
        })
    }

    // SET TRANSACTION is scoped to the current transaction, nothing to undo afterwards.
    fn enter_mode(
        conn: &mut PgConnection,
        mode: AccessMode,
    ) -> BoxFuture<'_, Result<(), sqlx::Error>> {
        Box::pin(async move {
            if mode.is_read_only() {
                sqlx::query("SET TRANSACTION READ ONLY")
                    .execute(&mut *conn)
                    .await?;
            }
            Ok(())
        })
    }
}

impl Backend for Sqlite {
    fn connect_options(
        url: &str,
        auth_token: Option<&str>,
    ) -> Result<SqliteConnectOptions, ConnectError> {
        if auth_token.is_some() {
            return Err(ConnectError::AuthTokenUnsupported(Sqlite::NAME));
        }
        let options = SqliteConnectOptions::from_str(url).map_err(ConnectError::Options)?;
        Ok(options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal))
    }

    // A deferred BEGIN cannot wait for the write lock once it has read, so read-write
    // transactions take the lock up front and queue on the busy timeout instead.
    fn begin_statement(mode: AccessMode) -> Option<&'static str> {
        (!mode.is_read_only()).then_some("BEGIN IMMEDIATE")
    }

    // query_only is connection-scoped, so it is set explicitly for every transaction
    // and cleared again before the connection goes back to the pool.
    fn enter_mode(
        conn: &mut SqliteConnection,
        mode: AccessMode,
    ) -> BoxFuture<'_, Result<(), sqlx::Error>> {
        Box::pin(async move {
            let pragma = if mode.is_read_only() {
                "PRAGMA query_only = ON"
            } else {
                "PRAGMA query_only = OFF"
            };
            sqlx::query(pragma).execute(&mut *conn).await?;
            Ok(())
        })
    }

    fn leave_mode(
        conn: &mut SqliteConnection,
        mode: AccessMode,
    ) -> BoxFuture<'_, Result<(), sqlx::Error>> {
        Box::pin(async move {
            if mode.is_read_only() {
                sqlx::query("PRAGMA query_only = OFF")
                    .execute(&mut *conn)
                    .await?;
            }
            Ok(())
        })
    }
}

/// Open a pool against `url`.
///
/// The URL is never logged since it may carry credentials.
pub async fn connect<DB: Backend>(
    url: &str,
    auth_token: Option<&str>,
    config: &PoolConfig,
) -> Result<Pool<DB>, ConnectError> {
    config.validate()?;
    let options = DB::connect_options(url, auth_token)?;

    let pool = PoolOptions::<DB>::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .idle_timeout(config.idle_timeout)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(options)
        .await
        .map_err(ConnectError::Connect)?;

    info!(
        backend = DB::NAME,
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        idle_timeout = ?config.idle_timeout,
        "database pool ready"
    );

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_kind_from_url() {
        assert_eq!(
            DatabaseKind::from_url("sqlite://data/links.db").unwrap(),
            DatabaseKind::Sqlite
        );
        assert_eq!(
            DatabaseKind::from_url("sqlite::memory:").unwrap(),
            DatabaseKind::Sqlite
        );
        assert_eq!(
            DatabaseKind::from_url("postgres://links@localhost/links").unwrap(),
            DatabaseKind::Postgres
        );
        assert_eq!(
            DatabaseKind::from_url("PostgreSQL://localhost/links").unwrap(),
            DatabaseKind::Postgres
        );
        assert!(matches!(
            DatabaseKind::from_url("libsql://links.turso.io"),
            Err(ConnectError::UnsupportedScheme(s)) if s == "libsql"
        ));
    }

    #[test]
    fn test_pool_config_validation() {
        assert!(PoolConfig::default().validate().is_ok());

        let zero = PoolConfig {
            max_connections: 0,
            ..PoolConfig::default()
        };
        assert!(matches!(
            zero.validate(),
            Err(ConnectError::InvalidPoolConfig(_))
        ));

        let inverted = PoolConfig {
            max_connections: 2,
            min_connections: 3,
            ..PoolConfig::default()
        };
        assert!(matches!(
            inverted.validate(),
            Err(ConnectError::InvalidPoolConfig(_))
        ));
    }

    #[test]
    fn test_sqlite_rejects_auth_token() {
        let result = <Sqlite as Backend>::connect_options("sqlite::memory:", Some("secret"));
        assert!(matches!(
            result,
            Err(ConnectError::AuthTokenUnsupported("SQLite"))
        ));
    }

    #[test]
    fn test_postgres_options_accept_token() {
        let options = <Postgres as Backend>::connect_options(
            "postgres://links@db.internal:5433/links",
            Some("secret"),
        )
        .unwrap();
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 5433);
        assert_eq!(options.get_username(), "links");
        assert_eq!(options.get_database(), Some("links"));
    }

    #[test]
    fn test_begin_statements() {
        assert_eq!(
            <Sqlite as Backend>::begin_statement(AccessMode::ReadWrite),
            Some("BEGIN IMMEDIATE")
        );
        assert_eq!(<Sqlite as Backend>::begin_statement(AccessMode::ReadOnly), None);
        assert_eq!(<Postgres as Backend>::begin_statement(AccessMode::ReadWrite), None);
        assert_eq!(<Postgres as Backend>::begin_statement(AccessMode::ReadOnly), None);
    }

    #[tokio::test]
    async fn test_connect_creates_sqlite_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.db");
        let url = format!("sqlite://{}", path.display());

        let pool = connect::<Sqlite>(&url, None, &PoolConfig::default())
            .await
            .unwrap();
        let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&pool).await.unwrap();

        assert_eq!(one, 1);
        assert!(path.exists());
        pool.close().await;
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_pool_config() {
        let config = PoolConfig {
            max_connections: 0,
            ..PoolConfig::default()
        };
        let result = connect::<Sqlite>("sqlite::memory:", None, &config).await;
        assert!(matches!(result, Err(ConnectError::InvalidPoolConfig(_))));
    }
}
