//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use bytesync_core::now_millis;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
        tracing::debug!(from = current, to = CURRENT_VERSION, "schema migrated");
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: stacks, versions, blocks.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE stack_table (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL UNIQUE
        );

        CREATE TABLE version_table (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            stack_id INTEGER NOT NULL REFERENCES stack_table(id) ON DELETE CASCADE,
            version INTEGER NOT NULL CHECK (version >= 1),
            info BLOB NOT NULL,
            height INTEGER NOT NULL CHECK (height >= 1),
            hash BLOB NOT NULL CHECK (length(hash) = 32),
            created INTEGER NOT NULL,
            updated INTEGER NOT NULL,

            UNIQUE(stack_id, version)
        );

        CREATE TABLE block_table (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            version_id INTEGER NOT NULL REFERENCES version_table(id) ON DELETE CASCADE,
            "index" INTEGER NOT NULL CHECK ("index" >= 0),
            data BLOB NOT NULL,
            hash BLOB NOT NULL CHECK (length(hash) = 32),
            created INTEGER NOT NULL,

            UNIQUE(version_id, "index")
        );

        CREATE INDEX idx_version_stack ON version_table(stack_id, version);
        CREATE INDEX idx_block_version ON block_table(version_id, "index");
        "#,
    )?;

    Ok(())
}
