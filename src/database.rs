//! SQLite access wrapper
//!
//! Every logical operation opens its own connection, runs inside a single
//! transaction and closes the connection afterwards. A closure returning
//! `Ok` commits; any error rolls the transaction back.

use rusqlite::{params, Connection, Transaction};
use std::path::{Path, PathBuf};
use tracing::debug;
use crate::Result;

#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `op` in a transaction on a fresh connection
    pub fn with_transaction<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = Connection::open(&self.path)?;
        let tx = conn.transaction()?;
        match op(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                debug!("Rolling back transaction on {}: {}", self.path.display(), e);
                let _ = tx.rollback();
                Err(e)
            }
        }
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        if !is_identifier(table) {
            return Ok(false);
        }
        self.with_transaction(|tx| {
            let found = tx
                .prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")?
                .exists(params![table])?;
            Ok(found)
        })
    }

    /// Column names of `table` in declaration order; empty if the table is missing
    pub fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        if !is_identifier(table) {
            return Ok(Vec::new());
        }
        self.with_transaction(|tx| {
            let mut stmt = tx.prepare(&format!("PRAGMA table_info({})", table))?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
            let columns = rows.collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(columns)
        })
    }

    pub fn column_exists(&self, table: &str, column: &str) -> Result<bool> {
        if !is_identifier(column) {
            return Ok(false);
        }
        Ok(self.table_columns(table)?.iter().any(|c| c == column))
    }
}

/// Identifiers interpolated into PRAGMA statements must be plain names
fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
