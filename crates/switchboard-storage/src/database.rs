// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database handle: PRAGMA setup, migrations, and error mapping.
//!
//! Every statement issued through one [`Database`] runs on tokio-rusqlite's
//! single background thread. Separate handles (or separate processes) may open
//! the same file; cross-handle races are settled by SQLite locking, which is
//! why busy/locked errors are classified as transient.

use std::path::Path;

use rusqlite::ErrorCode;
use switchboard_core::SwitchboardError;
use tracing::debug;

use crate::migrations;

/// Milliseconds SQLite waits on a locked database before returning `SQLITE_BUSY`.
const BUSY_TIMEOUT_MS: u64 = 5_000;

/// A migrated SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
    path: String,
}

impl Database {
    /// Open (creating if needed) the database at `path` in WAL mode.
    pub async fn open(path: &str) -> Result<Self, SwitchboardError> {
        Self::open_with(path, true).await
    }

    /// Open the database, choosing the journal mode.
    pub async fn open_with(path: &str, wal_mode: bool) -> Result<Self, SwitchboardError> {
        if path != ":memory:"
            && let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| SwitchboardError::Storage {
                source: Box::new(e),
            })?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| SwitchboardError::Storage {
                source: Box::new(e),
            })?;

        conn.call(move |conn| -> Result<(), SwitchboardError> {
            let journal = if wal_mode { "WAL" } else { "DELETE" };
            conn.execute_batch(&format!(
                "PRAGMA journal_mode = {journal};
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = {BUSY_TIMEOUT_MS};"
            ))
            .map_err(classify)?;
            migrations::run_migrations(conn)
        })
        .await
        .map_err(flatten_call_err)?;

        debug!(path, wal_mode, "database opened");
        Ok(Self {
            conn,
            path: path.to_string(),
        })
    }

    /// The underlying async connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Fold the WAL back into the main file.
    pub async fn checkpoint(&self) -> Result<(), SwitchboardError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            })
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoint and close the connection.
    pub async fn close(self) -> Result<(), SwitchboardError> {
        self.checkpoint().await?;
        self.conn.close().await.map_err(|e| SwitchboardError::Storage {
            source: Box::new(e),
        })?;
        debug!(path = %self.path, "database closed");
        Ok(())
    }
}

/// Busy/locked errors are transient, everything else is permanent.
pub fn classify(e: rusqlite::Error) -> SwitchboardError {
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            SwitchboardError::TransientStorage {
                source: Box::new(e),
            }
        }
        _ => SwitchboardError::Storage {
            source: Box::new(e),
        },
    }
}

/// Convert a tokio-rusqlite error, keeping the busy/locked classification.
///
/// A closed connection counts as transient: the caller may be racing a
/// reopen and retrying costs little.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> SwitchboardError {
    match e {
        tokio_rusqlite::Error::Error(inner) => classify(inner),
        tokio_rusqlite::Error::ConnectionClosed => SwitchboardError::TransientStorage {
            source: "database connection closed".into(),
        },
        other => SwitchboardError::Storage {
            source: other.to_string().into(),
        },
    }
}

/// Like [`map_tr_err`] for closures that already produce a [`SwitchboardError`].
pub(crate) fn flatten_call_err(e: tokio_rusqlite::Error<SwitchboardError>) -> SwitchboardError {
    match e {
        tokio_rusqlite::Error::Error(inner) => inner,
        tokio_rusqlite::Error::ConnectionClosed => SwitchboardError::TransientStorage {
            source: "database connection closed".into(),
        },
        other => SwitchboardError::Storage {
            source: other.to_string().into(),
        },
    }
}
