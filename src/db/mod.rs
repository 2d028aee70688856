mod migrations;
mod models;
mod queries;

pub use migrations::{current_version, LATEST_VERSION};
pub use models::*;
pub use queries::*;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::query::{Query, QueryAs};
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::FromRow;
use thiserror::Error;
use tracing::info;

/// Errors raised by the storage layer.
#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("migration v{version} failed")]
    Migration {
        version: i64,
        #[source]
        source: Box<DbError>,
    },
    #[error("foreign key violation in {table} (rowid {rowid})")]
    ForeignKeyViolation { table: String, rowid: i64 },
}

/// A positional parameter bound to a `?` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Integer(i64),
    Text(String),
    Null,
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Result of a mutating statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOutcome {
    pub rows_affected: u64,
    /// Row id assigned by the last INSERT on this connection.
    pub inserted_id: i64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database file and bring its schema up to date.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or migrations fail.
    pub async fn new(path: &Path) -> Result<Self> {
        Self::with_max_connections(path, 5).await
    }

    /// Like [`Database::new`] with an explicit pool size.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or migrations fail.
    pub async fn with_max_connections(path: &Path, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        let db = Self { pool };
        db.initialize().await?;
        db.verify_writable(path).await?;

        Ok(db)
    }

    /// Apply every pending schema migration. A no-op on an up-to-date file.
    ///
    /// # Errors
    ///
    /// Returns an error if any migration fails; its transaction is rolled back.
    pub async fn initialize(&self) -> Result<()> {
        let applied = migrations::run(&self.pool)
            .await
            .context("Failed to migrate database schema")?;
        info!(applied, version = LATEST_VERSION, "Database migrations complete");
        Ok(())
    }

    async fn verify_writable(&self, path: &Path) -> Result<()> {
        // Starting a transaction requires write capability on SQLite.
        let tx = self.pool.begin().await.with_context(|| {
            format!(
                "SQLite database is not writable (path: {})",
                path.display()
            )
        })?;

        tx.commit()
            .await
            .context("Failed to commit SQLite writability check")?;
        Ok(())
    }

    /// Run a mutating statement.
    ///
    /// # Errors
    ///
    /// Returns an error on constraint violation or connection failure.
    pub async fn execute(&self, sql: &str, params: &[Param]) -> Result<ExecOutcome, DbError> {
        let result = bind_query(sqlx::query(sql), params)
            .execute(&self.pool)
            .await?;
        Ok(ExecOutcome {
            rows_affected: result.rows_affected(),
            inserted_id: result.last_insert_rowid(),
        })
    }

    /// Fetch at most one row; `None` when nothing matches.
    ///
    /// # Errors
    ///
    /// Returns an error on connection failure or if the row cannot be decoded.
    pub async fn fetch_one<T>(&self, sql: &str, params: &[Param]) -> Result<Option<T>, DbError>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        Ok(bind_query_as(sqlx::query_as(sql), params)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Fetch all rows in the order given by the statement.
    ///
    /// # Errors
    ///
    /// Returns an error on connection failure or if a row cannot be decoded.
    pub async fn fetch_many<T>(&self, sql: &str, params: &[Param]) -> Result<Vec<T>, DbError>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        Ok(bind_query_as(sqlx::query_as(sql), params)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn bind_query<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &'q [Param],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            Param::Integer(value) => query.bind(*value),
            Param::Text(value) => query.bind(value.as_str()),
            Param::Null => query.bind(None::<i64>),
        };
    }
    query
}

fn bind_query_as<'q, T>(
    mut query: QueryAs<'q, Sqlite, T, SqliteArguments<'q>>,
    params: &'q [Param],
) -> QueryAs<'q, Sqlite, T, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            Param::Integer(value) => query.bind(*value),
            Param::Text(value) => query.bind(value.as_str()),
            Param::Null => query.bind(None::<i64>),
        };
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_conversions() {
        assert_eq!(Param::from(7_i64), Param::Integer(7));
        assert_eq!(Param::from("hi"), Param::Text("hi".to_string()));
        assert_eq!(Param::from(None::<i64>), Param::Null);
        assert_eq!(Param::from(Some(3_i64)), Param::Integer(3));
    }

    #[test]
    fn test_migration_error_chain_reports_cause_once() {
        let cause = sqlx::Error::RowNotFound.to_string();
        let err = DbError::Migration {
            version: 2,
            source: Box::new(DbError::Sqlx(sqlx::Error::RowNotFound)),
        };
        assert_eq!(err.to_string(), "migration v2 failed");

        let chain = format!("{:#}", anyhow::Error::from(err));
        assert_eq!(chain.matches(cause.as_str()).count(), 1);
    }
}
