//! Wrapper around the native sqlite handle.
//!
//! [`DatabaseConnection`] owns one `rusqlite` connection and exposes the few
//! primitives the rest of the crate needs: statement execution with bound
//! parameters, cached prepared statements, raw query to positioned row
//! access and explicit transaction control.
//!
//! After a database has been opened the connection is owned exclusively by
//! the transaction dispatcher. No other component issues statements against
//! it directly, adapter calls reach it from within a dispatched unit of work.

use crate::error::{Error, Result};
use crate::value::Value;
use rusqlite::params_from_iter;
use std::path::Path;
use tracing::debug;

/// A row positioned by a running query.
///
/// Thin alias over the `rusqlite` row type, used by adapters to hydrate
/// model instances.
pub type SqlRow<'stmt> = rusqlite::Row<'stmt>;

/// Owns the underlying sqlite handle.
pub struct DatabaseConnection {
    conn: rusqlite::Connection,
}

impl DatabaseConnection {
    /// Open (or create) a database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened or the pragmas fail.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = rusqlite::Connection::open(path)?;
        let connection = Self { conn };
        connection.set_pragmas()?;
        Ok(connection)
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns error if the connection cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()?;
        let connection = Self { conn };
        connection.set_pragmas()?;
        Ok(connection)
    }

    fn set_pragmas(&self) -> Result<()> {
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        self.conn.pragma_update(None, "temp_store", "MEMORY")?;
        Ok(())
    }

    /// Execute a statement with bound parameters, returning the number of
    /// affected rows. The compiled statement is cached on the connection and
    /// reused on subsequent calls with the same SQL.
    ///
    /// # Errors
    ///
    /// Returns error if preparation or execution failed, including
    /// constraint violations, which are never swallowed.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        Ok(stmt.execute(params_from_iter(params.iter()))?)
    }

    /// Execute one or more statements without parameters.
    ///
    /// # Errors
    ///
    /// Returns error if any statement failed.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    /// Row id generated by the most recent successful INSERT.
    #[must_use]
    pub fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    /// Run a query and map every returned row through `f`.
    ///
    /// # Errors
    ///
    /// Returns error if the query failed or `f` returned an error for any
    /// row.
    pub fn query_rows<T>(
        &self,
        sql: &str,
        params: &[Value],
        mut f: impl FnMut(&SqlRow<'_>) -> Result<T>,
    ) -> Result<Vec<T>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(f(row)?);
        }
        Ok(out)
    }

    /// Run a query expected to return at most one row.
    ///
    /// # Errors
    ///
    /// Returns error if the query failed or `f` returned an error.
    pub fn query_optional<T>(
        &self,
        sql: &str,
        params: &[Value],
        f: impl FnOnce(&SqlRow<'_>) -> Result<T>,
    ) -> Result<Option<T>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        match rows.next()? {
            Some(row) => Ok(Some(f(row)?)),
            None => Ok(None),
        }
    }

    /// Read `PRAGMA user_version`, used to sequence migrations.
    ///
    /// # Errors
    ///
    /// Returns error if the pragma query failed.
    pub fn user_version(&self) -> Result<i64> {
        let version = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;
        Ok(version)
    }

    /// Set `PRAGMA user_version` after a migration has been applied.
    ///
    /// # Errors
    ///
    /// Returns error if the pragma update failed.
    pub fn set_user_version(&self, version: i64) -> Result<()> {
        self.conn.pragma_update(None, "user_version", version)?;
        Ok(())
    }

    /// Begin an immediate transaction, taking the write lock up front.
    ///
    /// # Errors
    ///
    /// Returns error if a transaction is already open on this connection.
    pub fn begin(&self) -> Result<()> {
        debug!("BEGIN IMMEDIATE");
        self.execute_batch("BEGIN IMMEDIATE")
    }

    /// Commit the open transaction.
    ///
    /// # Errors
    ///
    /// Returns error if the commit failed.
    pub fn commit(&self) -> Result<()> {
        debug!("COMMIT");
        self.execute_batch("COMMIT")
    }

    /// Roll back the open transaction.
    ///
    /// # Errors
    ///
    /// Returns error if the rollback failed.
    pub fn rollback(&self) -> Result<()> {
        debug!("ROLLBACK");
        self.execute_batch("ROLLBACK")
    }
}

impl std::fmt::Debug for DatabaseConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConnection").finish_non_exhaustive()
    }
}

// Keep the error conversion close to the place most hydration errors originate.
impl From<rusqlite::types::FromSqlError> for Error {
    fn from(err: rusqlite::types::FromSqlError) -> Self {
        Error::Sqlite(rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Null,
            Box::new(err),
        ))
    }
}
