// src/db/models/set.rs

//! Provisioning set rows
//!
//! A set is one device's worth of credentials. Besides the factory columns
//! it carries one payload per dynamic file key.
//!
//! # Download counter
//!
//! `downloaded_cnt` doubles as a crash-safe issuance marker. Handing a set to
//! a device flips it to `-(|n| + 1)`; the device confirming receipt flips it
//! back to `|n|`. A negative counter therefore means "issued, never
//! confirmed", and survives crashes between the two steps without any extra
//! log. Repeated requests before confirmation leave a negative counter alone,
//! so retries are not counted twice.

use crate::db::quote_ident;
use crate::db::schema::{FACTORY_COLUMNS, SETS_TABLE};
use crate::error::{Error, Result};
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};

/// Marks a set as issued: set the device, bump and negate a confirmed
/// counter. The target row is picked in the same statement: the row already
/// pinned to the device if any, else an unassigned one. SQLite sorts NULL
/// lowest, so `dev_id DESC` puts the pinned row first; `id` breaks ties.
const ALLOCATE_SQL: &str = "UPDATE sets SET
        dev_id = ?1,
        prod_id = ?2,
        fw_ver = ?3,
        downloaded_cnt = CASE WHEN downloaded_cnt >= 0
                              THEN -(abs(downloaded_cnt) + 1)
                              ELSE downloaded_cnt END,
        downloaded_dt = datetime('now')
    WHERE id = (
        SELECT id FROM sets
        WHERE dev_id = ?1 OR dev_id IS NULL
        ORDER BY dev_id DESC, id ASC
        LIMIT 1
    )";

/// A row of the set table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvSet {
    pub id: String,
    pub batch: String,
    pub imported_at: Option<String>,
    pub download_count: i64,
    pub downloaded_at: Option<String>,
    pub dev_id: Option<String>,
    pub prod_id: Option<String>,
    pub fw_ver: Option<String>,
    pub comment: Option<String>,
    /// Dynamic file payloads, in the order they were requested
    pub payloads: Vec<(String, Vec<u8>)>,
}

/// Pool statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetCounts {
    pub total: i64,
    /// No device assigned
    pub free: i64,
    /// Issued but not confirmed
    pub pending: i64,
}

impl ProvSet {
    /// Issued to a device that has not confirmed receipt
    pub fn is_pending(&self) -> bool {
        self.download_count < 0
    }

    /// Number of issuances, confirmed or not
    pub fn downloads(&self) -> i64 {
        self.download_count.abs()
    }

    /// Payload for a dynamic file key
    pub fn payload(&self, key: &str) -> Option<&[u8]> {
        self.payloads
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    fn select_sql(dynamic_keys: &[String], filter: &str) -> String {
        let columns: Vec<String> = FACTORY_COLUMNS
            .iter()
            .map(|(name, _)| quote_ident(name))
            .chain(dynamic_keys.iter().map(|k| quote_ident(k)))
            .collect();
        format!("SELECT {} FROM {} {}", columns.join(", "), SETS_TABLE, filter)
    }

    fn from_row(row: &Row, dynamic_keys: &[String]) -> rusqlite::Result<Self> {
        let offset = FACTORY_COLUMNS.len();
        let mut payloads = Vec::with_capacity(dynamic_keys.len());
        for (i, key) in dynamic_keys.iter().enumerate() {
            payloads.push((key.clone(), row.get::<_, Vec<u8>>(offset + i)?));
        }

        Ok(Self {
            id: row.get(0)?,
            batch: row.get(1)?,
            imported_at: row.get(2)?,
            download_count: row.get(3)?,
            downloaded_at: row.get(4)?,
            dev_id: row.get(5)?,
            prod_id: row.get(6)?,
            fw_ver: row.get(7)?,
            comment: row.get(8)?,
            payloads,
        })
    }

    /// Find a set by id, loading the given payload columns
    pub fn find_by_id(conn: &Connection, id: &str, dynamic_keys: &[String]) -> Result<Option<Self>> {
        let sql = Self::select_sql(dynamic_keys, "WHERE id = ?1");
        let set = conn
            .query_row(&sql, [id], |row| Self::from_row(row, dynamic_keys))
            .optional()?;
        Ok(set)
    }

    /// Find the set bound to a device
    pub fn find_by_device(
        conn: &Connection,
        dev_id: &str,
        dynamic_keys: &[String],
    ) -> Result<Option<Self>> {
        let sql = Self::select_sql(dynamic_keys, "WHERE dev_id = ?1 LIMIT 1");
        let set = conn
            .query_row(&sql, [dev_id], |row| Self::from_row(row, dynamic_keys))
            .optional()?;
        Ok(set)
    }

    /// All sets without payloads, grouped by batch
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let sql = Self::select_sql(&[], "ORDER BY batch, id");
        let mut stmt = conn.prepare(&sql)?;
        let sets = stmt
            .query_map([], |row| Self::from_row(row, &[]))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sets)
    }

    /// Names of all imported batches
    pub fn batches(conn: &Connection) -> Result<Vec<String>> {
        let mut stmt = conn.prepare("SELECT batch FROM sets GROUP BY batch ORDER BY batch")?;
        let batches = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(batches)
    }

    /// Whether any set references `batch`
    pub fn batch_exists(conn: &Connection, batch: &str) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM sets WHERE batch = ?1 LIMIT 1", [batch], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    }

    /// Pool statistics
    pub fn counts(conn: &Connection) -> Result<SetCounts> {
        let counts = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(dev_id IS NULL), 0),
                    COALESCE(SUM(downloaded_cnt < 0), 0)
             FROM sets",
            [],
            |row| {
                Ok(SetCounts {
                    total: row.get(0)?,
                    free: row.get(1)?,
                    pending: row.get(2)?,
                })
            },
        )?;
        Ok(counts)
    }

    /// Issue a set to a device
    ///
    /// Returns the set pinned to `dev_id` if there is one, otherwise binds a
    /// free set to it. Selection and update are one statement inside one
    /// write transaction, so two devices can never claim the same row.
    pub fn allocate(
        conn: &mut Connection,
        dev_id: &str,
        prod_id: &str,
        fw_ver: &str,
        dynamic_keys: &[String],
    ) -> Result<Self> {
        crate::db::transaction(conn, |tx| {
            let changed = tx.execute(ALLOCATE_SQL, params![dev_id, prod_id, fw_ver])?;
            debug!("allocate for {}: {} row(s) updated", dev_id, changed);

            match Self::find_by_device(tx, dev_id, dynamic_keys)? {
                Some(set) => {
                    info!(
                        "Issued set {} to device {} (counter {})",
                        set.id, dev_id, set.download_count
                    );
                    Ok(set)
                }
                None => Err(Error::NoFreeSets),
            }
        })
    }

    /// Confirm receipt by a device
    ///
    /// Idempotent; returns whether the device owns a set.
    pub fn complete(conn: &Connection, dev_id: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE sets SET downloaded_cnt = abs(downloaded_cnt) WHERE dev_id = ?1",
            [dev_id],
        )?;
        Ok(changed > 0)
    }

    /// Set or clear the free-text comment
    pub fn set_comment(conn: &Connection, id: &str, comment: Option<&str>) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE sets SET comment = ?1 WHERE id = ?2",
            params![comment, id],
        )?;
        Ok(changed > 0)
    }

    /// Release a set from its device
    pub fn unassign(conn: &Connection, id: &str) -> Result<bool> {
        let changed = conn.execute("UPDATE sets SET dev_id = NULL WHERE id = ?1", [id])?;
        Ok(changed > 0)
    }

    /// Pin a set to a device, only if the set is currently unassigned
    pub fn assign(conn: &Connection, id: &str, dev_id: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE sets SET dev_id = ?1 WHERE id = ?2 AND dev_id IS NULL",
            params![dev_id, id],
        )?;
        Ok(changed > 0)
    }
}

/// A set read from a batch, not yet stored
#[derive(Debug, Clone)]
pub struct NewSet {
    pub id: String,
    pub payloads: Vec<(String, Vec<u8>)>,
}

impl NewSet {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payloads: Vec::new(),
        }
    }

    /// Add a dynamic file payload
    pub fn with_payload(mut self, key: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.payloads.push((key.into(), content.into()));
        self
    }

    /// Insert this set as part of `batch`
    pub fn insert(&self, conn: &Connection, batch: &str) -> Result<()> {
        let mut columns: Vec<String> = self.payloads.iter().map(|(k, _)| quote_ident(k)).collect();
        columns.push("id".to_string());
        columns.push("batch".to_string());

        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            SETS_TABLE,
            columns.join(", "),
            placeholders.join(", ")
        );

        let mut values: Vec<&dyn ToSql> = self.payloads.iter().map(|(_, v)| v as &dyn ToSql).collect();
        values.push(&self.id);
        values.push(&batch);

        conn.execute(&sql, values.as_slice())?;
        Ok(())
    }
}

/// Insert all sets of a batch in one transaction
///
/// Either every set is stored or none is. A batch that already has rows is
/// refused inside the same transaction, so two importers of one batch
/// cannot both succeed.
pub fn bulk_insert(conn: &mut Connection, batch: &str, sets: &[NewSet]) -> Result<usize> {
    crate::db::transaction(conn, |tx| {
        if ProvSet::batch_exists(tx, batch)? {
            return Err(Error::IncomingIntegrity(format!(
                "{batch}: batch already imported"
            )));
        }
        for set in sets {
            set.insert(tx, batch)?;
        }
        Ok(sets.len())
    })
}
