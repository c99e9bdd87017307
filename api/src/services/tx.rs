//! Transaction runner
//!
//! Executes a caller-supplied unit of work inside a database transaction and
//! guarantees the transaction is finalized exactly once:
//!
//! - work returns `Ok`: commit
//! - work returns `Err`: rollback, the error is handed back as [`TransactionError::Work`]
//! - work panics, when called or while its future runs: rollback, the panic is caught
//!   and reported as [`TransactionError::Panicked`]; it does not propagate past the runner
//!
//! Dropping the returned future (e.g. under `tokio::time::timeout`) cancels the work;
//! sqlx rolls the transaction back when it is dropped.
//!
//! # Usage Pattern
//!
//! ```ignore
//! let runner = TransactionRunner::new(pool);
//!
//! let committed = runner
//!     .read_write(|conn| {
//!         Box::pin(async move {
//!             sqlx::query("INSERT INTO notes (body) VALUES ($1)")
//!                 .bind("hello")
//!                 .execute(&mut *conn)
//!                 .await?;
//!             Ok::<_, sqlx::Error>(())
//!         })
//!     })
//!     .await?;
//!
//! println!("committed at {}", committed.committed_at);
//! ```
//!
//! The closure receives `&mut DB::Connection`, so domain functions written against
//! the generic `Executor` pattern can be called with `&mut *conn`.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use sqlx::{Pool, Transaction};
use tracing::{debug, error, warn};

use super::db::{AccessMode, Backend};

/// Result of a committed unit of work
#[derive(Debug, Clone, PartialEq)]
pub struct Committed<T> {
    pub value: T,
    /// Wall-clock time at which the commit returned
    pub committed_at: DateTime<Utc>,
}

impl<T> Committed<T> {
    pub fn into_inner(self) -> T {
        self.value
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransactionError<E> {
    #[error("failed to begin transaction: {0}")]
    Begin(#[source] sqlx::Error),
    #[error("failed to set {mode} access mode: {source}")]
    AccessMode {
        mode: AccessMode,
        #[source]
        source: sqlx::Error,
    },
    #[error("unit of work failed: {0}")]
    Work(E),
    #[error("unit of work panicked: {message}")]
    Panicked { message: String },
    #[error("failed to commit transaction: {0}")]
    Commit(#[source] sqlx::Error),
}

impl<E> TransactionError<E> {
    /// The error returned by the unit of work, if that is what failed.
    pub fn work_error(&self) -> Option<&E> {
        match self {
            TransactionError::Work(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, TransactionError::Panicked { .. })
    }
}

/// Runs units of work against a connection pool.
///
/// Cloning is cheap; clones share the underlying pool. The runner never closes it.
#[derive(Debug)]
pub struct TransactionRunner<DB: Backend> {
    pool: Pool<DB>,
}

impl<DB: Backend> Clone for TransactionRunner<DB> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

impl<DB: Backend> TransactionRunner<DB> {
    pub fn new(pool: Pool<DB>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<DB> {
        &self.pool
    }

    /// Run `work` in a read-write transaction.
    pub async fn read_write<F, T, E>(&self, work: F) -> Result<Committed<T>, TransactionError<E>>
    where
        F: for<'c> FnOnce(&'c mut DB::Connection) -> BoxFuture<'c, Result<T, E>>,
    {
        self.run(AccessMode::ReadWrite, work).await
    }

    /// Run `work` in a read-only transaction. Writes are rejected by the engine
    /// and come back as the work's own error.
    pub async fn read_only<F, T, E>(&self, work: F) -> Result<Committed<T>, TransactionError<E>>
    where
        F: for<'c> FnOnce(&'c mut DB::Connection) -> BoxFuture<'c, Result<T, E>>,
    {
        self.run(AccessMode::ReadOnly, work).await
    }

    /// Run `work` in a transaction begun with `mode`.
    pub async fn run<F, T, E>(
        &self,
        mode: AccessMode,
        work: F,
    ) -> Result<Committed<T>, TransactionError<E>>
    where
        F: for<'c> FnOnce(&'c mut DB::Connection) -> BoxFuture<'c, Result<T, E>>,
    {
        self.run_with_setup(mode, DB::enter_mode, work).await
    }

    async fn run_with_setup<S, F, T, E>(
        &self,
        mode: AccessMode,
        setup: S,
        work: F,
    ) -> Result<Committed<T>, TransactionError<E>>
    where
        S: for<'c> FnOnce(
            &'c mut DB::Connection,
            AccessMode,
        ) -> BoxFuture<'c, Result<(), sqlx::Error>>,
        F: for<'c> FnOnce(&'c mut DB::Connection) -> BoxFuture<'c, Result<T, E>>,
    {
        let begun = match DB::begin_statement(mode) {
            Some(statement) => self.pool.begin_with(statement).await,
            None => self.pool.begin().await,
        };
        let mut tx = begun.map_err(TransactionError::Begin)?;

        if let Err(source) = setup(&mut *tx, mode).await {
            rollback(tx, mode, "access mode setup failed").await;
            return Err(TransactionError::AccessMode { mode, source });
        }

        // Calling `work` can panic before it hands back a future, so the call sits
        // inside the unwind boundary too.
        let conn = &mut *tx;
        let outcome = AssertUnwindSafe(async move { work(conn).await })
            .catch_unwind()
            .await;

        if let Err(e) = DB::leave_mode(&mut *tx, mode).await {
            warn!(%mode, error = %e, "failed to reset transaction access mode");
        }

        match outcome {
            Ok(Ok(value)) => {
                tx.commit().await.map_err(TransactionError::Commit)?;
                let committed_at = Utc::now();
                debug!(%mode, %committed_at, "transaction committed");
                Ok(Committed {
                    value,
                    committed_at,
                })
            }
            Ok(Err(e)) => {
                rollback(tx, mode, "unit of work returned an error").await;
                Err(TransactionError::Work(e))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(%mode, panic = %message, "unit of work panicked, rolling back");
                rollback(tx, mode, "unit of work panicked").await;
                Err(TransactionError::Panicked { message })
            }
        }
    }
}

async fn rollback<DB: Backend>(tx: Transaction<'static, DB>, mode: AccessMode, reason: &str) {
    match tx.rollback().await {
        Ok(()) => debug!(%mode, reason, "transaction rolled back"),
        Err(e) => warn!(%mode, reason, error = %e, "rollback failed"),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
