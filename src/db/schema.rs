// src/db/schema.rs

//! Set table schema
//!
//! The table has a fixed set of factory columns plus one BLOB column per
//! dynamic file key of the project configuration. Because the dynamic part
//! is only known once the first batch arrives, the schema is created by a
//! one-time migration run at first import and recorded in `schema_version`.

use crate::db::quote_ident;
use crate::error::{Error, Result};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Name of the set table
pub const SETS_TABLE: &str = "sets";

/// Factory columns and their definitions, in table order
pub const FACTORY_COLUMNS: &[(&str, &str)] = &[
    ("id", "TEXT PRIMARY KEY NOT NULL"),
    ("batch", "TEXT NOT NULL"),
    ("imported_dt", "TEXT DEFAULT CURRENT_TIMESTAMP"),
    ("downloaded_cnt", "INTEGER NOT NULL DEFAULT 0"),
    ("downloaded_dt", "TEXT"),
    ("dev_id", "TEXT UNIQUE"),
    ("prod_id", "TEXT"),
    ("fw_ver", "TEXT"),
    ("comment", "TEXT"),
];

/// Whether `name` is taken by a factory column (case-insensitive, like SQLite)
pub fn is_reserved(name: &str) -> bool {
    FACTORY_COLUMNS
        .iter()
        .any(|(col, _)| col.eq_ignore_ascii_case(name))
}

/// Check dynamic keys before any DDL runs
pub fn validate_dynamic_keys(keys: &[String]) -> Result<()> {
    if keys.is_empty() {
        return Err(Error::Schema(
            "configuration declares no dynamic files".to_string(),
        ));
    }

    for (i, key) in keys.iter().enumerate() {
        if key.trim().is_empty() {
            return Err(Error::Schema("empty dynamic file key".to_string()));
        }
        if is_reserved(key) {
            return Err(Error::Schema(format!(
                "dynamic file key '{key}' collides with a factory column"
            )));
        }
        if keys[..i].iter().any(|k| k.eq_ignore_ascii_case(key)) {
            return Err(Error::Schema(format!("dynamic file key '{key}' declared twice")));
        }
    }
    Ok(())
}

/// Get the current schema version, 0 when never migrated
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    let has_table: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    if has_table.is_none() {
        return Ok(0);
    }

    let version: Option<i32> = conn.query_row(
        "SELECT MAX(version) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version.unwrap_or(0))
}

/// Bring the database up to [`SCHEMA_VERSION`]
pub fn migrate(conn: &mut Connection, dynamic_keys: &[String]) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    info!("Current schema version: {}", current_version);

    if current_version >= SCHEMA_VERSION {
        info!("Schema is up to date");
        return Ok(());
    }

    validate_dynamic_keys(dynamic_keys)?;

    crate::db::transaction(conn, |tx| {
        tx.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;
        for version in (current_version + 1)..=SCHEMA_VERSION {
            info!("Applying migration to version {}", version);
            match version {
                1 => migrate_v1(tx, dynamic_keys)?,
                _ => return Err(Error::Schema(format!("unknown migration version {version}"))),
            }
            tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
        }
        Ok(())
    })?;

    info!("Schema migration complete. Now at version {}", SCHEMA_VERSION);
    Ok(())
}

/// Initial schema: the set table
fn migrate_v1(conn: &Connection, dynamic_keys: &[String]) -> Result<()> {
    let ddl = create_table_sql(dynamic_keys);
    debug!("Creating set table: {}", ddl);
    conn.execute_batch(&ddl)?;
    Ok(())
}

/// DDL for the set table
pub fn create_table_sql(dynamic_keys: &[String]) -> String {
    let columns: Vec<String> = FACTORY_COLUMNS
        .iter()
        .map(|(name, def)| format!("{} {}", quote_ident(name), def))
        .chain(
            dynamic_keys
                .iter()
                .map(|key| format!("{} BLOB UNIQUE NOT NULL", quote_ident(key))),
        )
        .collect();

    format!(
        "CREATE TABLE {} (\n    {}\n);\nCREATE INDEX idx_sets_batch ON {}(batch);",
        SETS_TABLE,
        columns.join(",\n    "),
        SETS_TABLE
    )
}

/// Column names of the set table, empty if it does not exist
pub fn table_columns(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let columns = stmt
        .query_map([SETS_TABLE], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(columns)
}
