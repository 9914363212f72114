// src/db/mod.rs

//! SQLite access for the set table
//!
//! Every request opens its own connection; there is no shared in-process
//! state. Writers serialize on SQLite's database lock, and the busy timeout
//! lets a concurrent request wait for it instead of failing outright.

pub mod models;
pub mod schema;

use crate::error::{Error, Result};
use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// How long a connection waits for another writer to release the lock
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Create the database file and the set table for `dynamic_keys`
///
/// Fails if the file already exists.
pub fn init(db_path: &Path, dynamic_keys: &[String]) -> Result<Connection> {
    if db_path.exists() {
        return Err(Error::LocalIntegrity(format!(
            "{}: set table already exists",
            db_path.display()
        )));
    }

    let mut conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    schema::migrate(&mut conn, dynamic_keys)?;
    Ok(conn)
}

/// Open an existing database
///
/// Never creates the file, so checking an uninitialized install leaves no
/// trace behind.
pub fn open(db_path: &Path) -> Result<Connection> {
    debug!("Opening set table at {}", db_path.display());
    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

/// Run `f` inside one write transaction
///
/// The transaction takes the write lock up front (`BEGIN IMMEDIATE`) so a
/// read followed by a write inside `f` cannot be interleaved with another
/// writer. It commits when `f` returns `Ok` and rolls back otherwise.
pub fn transaction<T, F>(conn: &mut Connection, f: F) -> Result<T>
where
    F: FnOnce(&Transaction) -> Result<T>,
{
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}

/// Quote an identifier for use in SQL text
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_does_not_create() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("sets.db");

        assert!(matches!(open(&db_path), Err(Error::Storage(_))));
        assert!(!db_path.exists());
    }

    #[test]
    fn test_init_refuses_existing() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("sets.db");
        let keys = vec!["seed".to_string()];

        init(&db_path, &keys).unwrap();
        assert!(matches!(init(&db_path, &keys), Err(Error::LocalIntegrity(_))));
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("sets.db");
        let mut conn = init(&db_path, &["seed".to_string()]).unwrap();

        let result: Result<()> = transaction(&mut conn, |tx| {
            tx.execute(
                "INSERT INTO sets (id, batch, \"seed\") VALUES ('s1', 'b1', x'01')",
                [],
            )?;
            Err(Error::NotFound("forced".to_string()))
        });
        assert!(result.is_err());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM sets", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("wifi.cert"), "\"wifi.cert\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
