//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for bytesync. It uses rusqlite with
//! bundled SQLite, wrapped in async via tokio::spawn_blocking.
//!
//! Every mutation runs inside an `IMMEDIATE` transaction, so the check of a
//! claimed position and the write that depends on it cannot interleave with
//! another writer.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use bytesync_core::{
    first_version_hash, now_millis, Block, BlockSize, Sha256Hash, SizeEntry, Stack, StackId,
    VersionSize,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{AppendBlock, AppendVersion, Store};

const STACK_COLUMNS: &str = "st.uuid, ve.created, ve.updated, ve.version, ve.height, ve.hash";

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        tracing::info!(path = %path.as_ref().display(), "opened sqlite store");
        Self::init(conn)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| {
                StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {}", e)),
                ))
            })?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("spawn_blocking failed: {}", e)))?
    }
}

fn uuid_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<StackId> {
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn hash_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Sha256Hash> {
    let bytes: Vec<u8> = row.get(idx)?;
    Sha256Hash::try_from(bytes.as_slice())
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Blob, Box::new(e)))
}

// Columns in STACK_COLUMNS order.
fn row_to_stack(row: &rusqlite::Row<'_>) -> rusqlite::Result<Stack> {
    Ok(Stack {
        uuid: uuid_column(row, 0)?,
        created: row.get(1)?,
        updated: row.get(2)?,
        version: row.get::<_, i64>(3)? as u64,
        height: row.get::<_, i64>(4)? as u64,
        hash: hash_column(row, 5)?,
    })
}

fn row_to_block(row: &rusqlite::Row<'_>) -> rusqlite::Result<Block> {
    let data: Vec<u8> = row.get(2)?;
    Ok(Block {
        created: row.get(0)?,
        index: row.get::<_, i64>(1)? as u64,
        data: Bytes::from(data),
        hash: hash_column(row, 3)?,
    })
}

fn insert_block(
    conn: &Connection,
    version_id: i64,
    index: u64,
    data: &[u8],
    hash: &Sha256Hash,
    now: i64,
) -> Result<()> {
    conn.execute(
        r#"INSERT INTO block_table (version_id, "index", data, hash, created)
           VALUES (?1, ?2, ?3, ?4, ?5)"#,
        params![version_id, index as i64, data, hash.as_bytes().as_slice(), now],
    )
    .map_err(|e| constraint_to_conflict(e, || format!("block {} already exists", index)))?;
    Ok(())
}

fn stack_exists(conn: &Connection, uuid: &StackId) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM stack_table WHERE uuid = ?1)",
        params![uuid.to_string()],
        |row| row.get(0),
    )?)
}

/// Explain why a conditional write matched no row.
fn rejection(conn: &Connection, uuid: &StackId) -> Result<StoreError> {
    if stack_exists(conn, uuid)? {
        tracing::warn!(stack = %uuid.short(), "rejected stale conditional write");
        Ok(StoreError::Conflict(format!(
            "stack {} is not at the claimed position",
            uuid
        )))
    } else {
        Ok(StoreError::NotFound(format!("stack {}", uuid)))
    }
}

fn constraint_to_conflict(err: rusqlite::Error, message: impl FnOnce() -> String) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::Conflict(message())
        }
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn create(
        &self,
        uuid: &StackId,
        info: Bytes,
        data: Bytes,
        hash: Sha256Hash,
    ) -> Result<Stack> {
        let uuid = *uuid;

        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let now = now_millis();

            tx.execute(
                "INSERT INTO stack_table (uuid) VALUES (?1)",
                params![uuid.to_string()],
            )
            .map_err(|e| constraint_to_conflict(e, || format!("stack {} already exists", uuid)))?;
            let stack_id = tx.last_insert_rowid();

            let version_hash = first_version_hash(hash);
            tx.execute(
                "INSERT INTO version_table (stack_id, version, info, height, hash, created, updated)
                 VALUES (?1, 1, ?2, 1, ?3, ?4, ?4)",
                params![stack_id, &info[..], version_hash.as_bytes().as_slice(), now],
            )?;
            let version_id = tx.last_insert_rowid();

            insert_block(&tx, version_id, 0, &data, &hash, now)?;
            tx.commit()?;

            tracing::debug!(stack = %uuid.short(), "created stack");
            Ok(Stack {
                uuid,
                created: now,
                updated: now,
                version: 1,
                height: 1,
                hash: version_hash,
            })
        })
        .await
    }

    async fn append_block(&self, request: AppendBlock) -> Result<Stack> {
        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let current: Option<(i64, i64)> = tx
                .query_row(
                    "SELECT ve.id, ve.created
                     FROM stack_table AS st
                     INNER JOIN version_table AS ve ON ve.stack_id = st.id
                     WHERE st.uuid = ?1 AND ve.version = ?2 AND ve.height = ?3 AND ve.hash = ?4
                       AND ve.version = (SELECT MAX(v2.version) FROM version_table AS v2
                                         WHERE v2.stack_id = st.id)",
                    params![
                        request.uuid.to_string(),
                        request.version as i64,
                        request.height as i64,
                        request.expected_hash.as_bytes().as_slice(),
                    ],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let (version_id, created) = match current {
                Some(found) => found,
                None => return Err(rejection(&tx, &request.uuid)?),
            };

            let now = now_millis();
            tx.execute(
                "UPDATE version_table SET height = height + 1, hash = ?1, updated = ?2 WHERE id = ?3",
                params![request.next_hash.as_bytes().as_slice(), now, version_id],
            )?;
            insert_block(
                &tx,
                version_id,
                request.height,
                &request.data,
                &request.block_hash,
                now,
            )?;
            tx.commit()?;

            tracing::debug!(
                stack = %request.uuid.short(),
                version = request.version,
                height = request.height + 1,
                "appended block"
            );
            Ok(Stack {
                uuid: request.uuid,
                created,
                updated: now,
                version: request.version,
                height: request.height + 1,
                hash: request.next_hash,
            })
        })
        .await
    }

    async fn append_version(&self, request: AppendVersion) -> Result<Stack> {
        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let stack_id: Option<i64> = tx
                .query_row(
                    "SELECT st.id
                     FROM stack_table AS st
                     INNER JOIN version_table AS ve ON ve.stack_id = st.id
                     WHERE st.uuid = ?1 AND ve.version = ?2 AND ve.hash = ?3
                       AND ve.version = (SELECT MAX(v2.version) FROM version_table AS v2
                                         WHERE v2.stack_id = st.id)",
                    params![
                        request.uuid.to_string(),
                        request.version as i64,
                        request.expected_hash.as_bytes().as_slice(),
                    ],
                    |row| row.get(0),
                )
                .optional()?;

            let stack_id = match stack_id {
                Some(id) => id,
                None => return Err(rejection(&tx, &request.uuid)?),
            };

            let now = now_millis();
            let version = request.version + 1;
            let version_hash = first_version_hash(request.block_hash);
            tx.execute(
                "INSERT INTO version_table (stack_id, version, info, height, hash, created, updated)
                 VALUES (?1, ?2, ?3, 1, ?4, ?5, ?5)",
                params![
                    stack_id,
                    version as i64,
                    &request.info[..],
                    version_hash.as_bytes().as_slice(),
                    now
                ],
            )
            .map_err(|e| constraint_to_conflict(e, || format!("version {} already exists", version)))?;
            let version_id = tx.last_insert_rowid();

            insert_block(&tx, version_id, 0, &request.data, &request.block_hash, now)?;
            tx.commit()?;

            tracing::debug!(stack = %request.uuid.short(), version, "appended version");
            Ok(Stack {
                uuid: request.uuid,
                created: now,
                updated: now,
                version,
                height: 1,
                hash: version_hash,
            })
        })
        .await
    }

    async fn read_stack(&self, uuid: &StackId) -> Result<Stack> {
        let uuid = *uuid;

        self.blocking(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {STACK_COLUMNS}
                     FROM stack_table AS st
                     INNER JOIN version_table AS ve ON ve.stack_id = st.id
                     WHERE st.uuid = ?1
                     ORDER BY ve.version DESC LIMIT 1"
                ),
                params![uuid.to_string()],
                row_to_stack,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("stack {}", uuid)))
        })
        .await
    }

    async fn read_version(&self, uuid: &StackId, version: u64) -> Result<Stack> {
        let uuid = *uuid;

        self.blocking(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {STACK_COLUMNS}
                     FROM stack_table AS st
                     INNER JOIN version_table AS ve ON ve.stack_id = st.id
                     WHERE st.uuid = ?1 AND ve.version = ?2"
                ),
                params![uuid.to_string(), version as i64],
                row_to_stack,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("version {} of stack {}", version, uuid)))
        })
        .await
    }

    async fn read_info(&self, uuid: &StackId, version: u64) -> Result<Bytes> {
        let uuid = *uuid;

        self.blocking(move |conn| {
            let info: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT ve.info
                     FROM stack_table AS st
                     INNER JOIN version_table AS ve ON ve.stack_id = st.id
                     WHERE st.uuid = ?1 AND ve.version = ?2",
                    params![uuid.to_string(), version as i64],
                    |row| row.get(0),
                )
                .optional()?;

            info.map(Bytes::from).ok_or_else(|| {
                StoreError::NotFound(format!("version {} of stack {}", version, uuid))
            })
        })
        .await
    }

    async fn read_block(&self, uuid: &StackId, version: u64, index: u64) -> Result<Block> {
        let uuid = *uuid;

        self.blocking(move |conn| {
            conn.query_row(
                r#"SELECT bl.created, bl."index", bl.data, bl.hash
                   FROM stack_table AS st
                   INNER JOIN version_table AS ve ON ve.stack_id = st.id
                   INNER JOIN block_table AS bl ON bl.version_id = ve.id
                   WHERE st.uuid = ?1 AND ve.version = ?2 AND bl."index" = ?3"#,
                params![uuid.to_string(), version as i64, index as i64],
                row_to_block,
            )
            .optional()?
            .ok_or_else(|| {
                StoreError::NotFound(format!(
                    "block {} of version {} of stack {}",
                    index, version, uuid
                ))
            })
        })
        .await
    }

    async fn size(&self, uuid: Option<&StackId>) -> Result<Vec<SizeEntry>> {
        let uuid = uuid.copied();

        self.blocking(move |conn| match uuid {
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {STACK_COLUMNS}, SUM(LENGTH(bl.data)) AS size
                     FROM stack_table AS st
                     INNER JOIN version_table AS ve ON ve.stack_id = st.id
                     INNER JOIN block_table AS bl ON bl.version_id = ve.id
                     GROUP BY ve.id
                     ORDER BY st.uuid, ve.version"
                ))?;

                let entries = stmt
                    .query_map([], |row| {
                        let stack = row_to_stack(row)?;
                        Ok(SizeEntry::Version(VersionSize {
                            uuid: stack.uuid,
                            created: stack.created,
                            updated: stack.updated,
                            version: stack.version,
                            height: stack.height,
                            hash: stack.hash,
                            size: row.get::<_, i64>(6)? as u64,
                        }))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(entries)
            }
            Some(uuid) => {
                if !stack_exists(conn, &uuid)? {
                    return Err(StoreError::NotFound(format!("stack {}", uuid)));
                }

                let mut stmt = conn.prepare(
                    r#"SELECT ve.version, bl.created, bl."index", bl.hash, LENGTH(bl.data) AS size
                       FROM stack_table AS st
                       INNER JOIN version_table AS ve ON ve.stack_id = st.id
                       INNER JOIN block_table AS bl ON bl.version_id = ve.id
                       WHERE st.uuid = ?1
                       ORDER BY ve.version, bl."index""#,
                )?;

                let entries = stmt
                    .query_map(params![uuid.to_string()], |row| {
                        Ok(SizeEntry::Block(BlockSize {
                            version: row.get::<_, i64>(0)? as u64,
                            created: row.get(1)?,
                            index: row.get::<_, i64>(2)? as u64,
                            hash: hash_column(row, 3)?,
                            size: row.get::<_, i64>(4)? as u64,
                        }))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(entries)
            }
        })
        .await
    }

    async fn vacuum(&self) -> Result<usize> {
        self.blocking(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            {
                let mut stmt = tx.prepare(
                    "SELECT st.uuid, ve.version
                     FROM stack_table AS st
                     INNER JOIN version_table AS ve ON ve.stack_id = st.id
                     WHERE ve.version < (SELECT MAX(v2.version) FROM version_table AS v2
                                         WHERE v2.stack_id = st.id)",
                )?;
                let doomed = stmt
                    .query_map([], |row| Ok((uuid_column(row, 0)?, row.get::<_, i64>(1)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                for (uuid, version) in doomed {
                    tracing::debug!(stack = %uuid.short(), version, "vacuuming version");
                }
            }

            tx.execute(
                "DELETE FROM block_table WHERE version_id IN (
                     SELECT ve.id FROM version_table AS ve
                     WHERE ve.version < (SELECT MAX(v2.version) FROM version_table AS v2
                                         WHERE v2.stack_id = ve.stack_id))",
                [],
            )?;
            let removed = tx.execute(
                "DELETE FROM version_table
                 WHERE version < (SELECT MAX(v2.version) FROM version_table AS v2
                                  WHERE v2.stack_id = version_table.stack_id)",
                [],
            )?;
            tx.commit()?;

            conn.execute_batch("VACUUM")?;

            tracing::info!(removed, "vacuumed superseded versions");
            Ok(removed)
        })
        .await
    }
}
