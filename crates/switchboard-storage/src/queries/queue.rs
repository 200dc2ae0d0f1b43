// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue table operations.
//!
//! These are single attempts; [`QueueStore`](crate::QueueStore) adds the
//! transient-error retry around them.

use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row, TransactionBehavior, params};
use switchboard_core::{ItemId, QueueItem, QueueStats, QueueStatus, SwitchboardError};

use crate::database::{Database, map_tr_err};

const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";
const COLUMNS: &str = "id, user_id, message_id, status, attempts, updated_at";

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<QueueItem> {
    let status: String = row.get(3)?;
    let status = QueueStatus::from_str(&status)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    Ok(QueueItem {
        id: row.get(0)?,
        user_id: row.get(1)?,
        message_id: row.get(2)?,
        status,
        attempts: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

/// Insert a new `pending` item.
pub async fn enqueue(db: &Database, user_id: i64, message_id: i64) -> Result<ItemId, SwitchboardError> {
    db.connection()
        .call(move |conn| -> Result<ItemId, rusqlite::Error> {
            conn.execute(
                "INSERT INTO queue (user_id, message_id) VALUES (?1, ?2)",
                params![user_id, message_id],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Claim the oldest `pending` item.
///
/// The select and the conditional update share an `IMMEDIATE` transaction, so
/// a second handle on the same file blocks until this one commits and then
/// sees the item as `processing`. If the update matches no row the claim was
/// lost and `None` is returned.
pub async fn claim_next(db: &Database) -> Result<Option<QueueItem>, SwitchboardError> {
    db.connection()
        .call(|conn| -> Result<Option<QueueItem>, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let candidate: Option<ItemId> = tx
                .query_row(
                    "SELECT id FROM queue WHERE status = 'pending'
                     ORDER BY updated_at ASC, id ASC LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;

            let claimed = match candidate {
                Some(id) => tx
                    .query_row(
                        &format!(
                            "UPDATE queue SET status = 'processing', updated_at = {NOW}
                             WHERE id = ?1 AND status = 'pending'
                             RETURNING {COLUMNS}"
                        ),
                        params![id],
                        item_from_row,
                    )
                    .optional()?,
                None => None,
            };
            tx.commit()?;
            Ok(claimed)
        })
        .await
        .map_err(map_tr_err)
}

/// Write a terminal status. Non-terminal statuses are rejected.
pub async fn complete(db: &Database, id: ItemId, status: QueueStatus) -> Result<(), SwitchboardError> {
    if !status.is_terminal() {
        return Err(SwitchboardError::Internal(format!(
            "complete() requires a terminal status, got `{status}`"
        )));
    }
    let status_str = status.to_string();
    let changed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                &format!("UPDATE queue SET status = ?1, updated_at = {NOW} WHERE id = ?2"),
                params![status_str, id],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        return Err(SwitchboardError::not_found("queue item", id));
    }
    Ok(())
}

/// Count one more attempt and decide: back to `pending` (returns `true`) while
/// the attempts since the last manual retry are under `max_attempts`,
/// otherwise `failed` (returns `false`).
pub async fn requeue_or_fail(
    db: &Database,
    id: ItemId,
    max_attempts: u32,
) -> Result<bool, SwitchboardError> {
    let status: Option<String> = db
        .connection()
        .call(move |conn| -> Result<Option<String>, rusqlite::Error> {
            conn.query_row(
                &format!(
                    "UPDATE queue SET attempts = attempts + 1,
                     status = CASE WHEN attempts + 1 - attempts_base < ?2
                         THEN 'pending' ELSE 'failed' END,
                     updated_at = {NOW}
                     WHERE id = ?1
                     RETURNING status"
                ),
                params![id, max_attempts],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)?;
    match status.as_deref() {
        Some("pending") => Ok(true),
        Some(_) => Ok(false),
        None => Err(SwitchboardError::not_found("queue item", id)),
    }
}

/// Put a `processing` item back to `pending` without counting an attempt.
pub async fn release(db: &Database, id: ItemId) -> Result<bool, SwitchboardError> {
    let changed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                &format!(
                    "UPDATE queue SET status = 'pending', updated_at = {NOW}
                     WHERE id = ?1 AND status = 'processing'"
                ),
                params![id],
            )
        })
        .await
        .map_err(map_tr_err)?;
    Ok(changed > 0)
}

/// Revert every `processing` item to `pending`. Returns how many moved.
pub async fn recover_stale_processing(db: &Database) -> Result<usize, SwitchboardError> {
    db.connection()
        .call(|conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                &format!(
                    "UPDATE queue SET status = 'pending', updated_at = {NOW}
                     WHERE status = 'processing'"
                ),
                [],
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Move every `pending` item to `flushed`. Returns how many moved.
pub async fn flush_pending(db: &Database) -> Result<usize, SwitchboardError> {
    db.connection()
        .call(|conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                &format!(
                    "UPDATE queue SET status = 'flushed', updated_at = {NOW}
                     WHERE status = 'pending'"
                ),
                [],
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Return a `failed` item to `pending` with a fresh attempt budget.
///
/// `attempts` keeps its value; the budget restarts from it.
pub async fn retry_failed(db: &Database, id: ItemId) -> Result<bool, SwitchboardError> {
    let changed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                &format!(
                    "UPDATE queue SET status = 'pending', attempts_base = attempts, updated_at = {NOW}
                     WHERE id = ?1 AND status = 'failed'"
                ),
                params![id],
            )
        })
        .await
        .map_err(map_tr_err)?;
    Ok(changed > 0)
}

pub async fn get(db: &Database, id: ItemId) -> Result<Option<QueueItem>, SwitchboardError> {
    db.connection()
        .call(move |conn| -> Result<Option<QueueItem>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM queue WHERE id = ?1"),
                params![id],
                item_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Items in `status`, oldest first.
pub async fn list_by_status(
    db: &Database,
    status: QueueStatus,
    limit: u32,
) -> Result<Vec<QueueItem>, SwitchboardError> {
    let status = status.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<QueueItem>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM queue WHERE status = ?1
                 ORDER BY updated_at ASC, id ASC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![status, limit], item_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn stats(db: &Database) -> Result<QueueStats, SwitchboardError> {
    let counts: Vec<(String, i64)> = db
        .connection()
        .call(|conn| -> Result<Vec<(String, i64)>, rusqlite::Error> {
            let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM queue GROUP BY status")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)?;

    let mut stats = QueueStats::default();
    for (status, count) in counts {
        let count = count.max(0) as u64;
        match QueueStatus::from_str(&status) {
            Ok(QueueStatus::Pending) => stats.pending = count,
            Ok(QueueStatus::Processing) => stats.processing = count,
            Ok(QueueStatus::Completed) => stats.completed = count,
            Ok(QueueStatus::Failed) => stats.failed = count,
            Ok(QueueStatus::Flushed) => stats.flushed = count,
            Err(_) => tracing::warn!(status, "unknown queue status in database"),
        }
    }
    Ok(stats)
}
