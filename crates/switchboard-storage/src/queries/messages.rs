// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound messages and their responses.

use rusqlite::{OptionalExtension, params};
use switchboard_core::{ItemId, MessageText, SwitchboardError};

use crate::database::{Database, map_tr_err};

/// Insert a message. Returns the message id.
pub async fn insert_message(
    db: &Database,
    user_id: i64,
    role: &str,
    content: &str,
) -> Result<i64, SwitchboardError> {
    let role = role.to_string();
    let content = content.to_string();
    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            conn.execute(
                "INSERT INTO messages (user_id, role, content) VALUES (?1, ?2, ?3)",
                params![user_id, role, content],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Insert a `user` message and enqueue it in one transaction.
///
/// Returns `(message_id, queue_item_id)`.
pub async fn ingest(
    db: &Database,
    user_id: i64,
    content: &str,
) -> Result<(i64, ItemId), SwitchboardError> {
    let content = content.to_string();
    db.connection()
        .call(move |conn| -> Result<(i64, ItemId), rusqlite::Error> {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO messages (user_id, role, content) VALUES (?1, 'user', ?2)",
                params![user_id, content],
            )?;
            let message_id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO queue (user_id, message_id) VALUES (?1, ?2)",
                params![user_id, message_id],
            )?;
            let item_id = tx.last_insert_rowid();
            tx.commit()?;
            Ok((message_id, item_id))
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_message_text(
    db: &Database,
    message_id: i64,
) -> Result<Option<MessageText>, SwitchboardError> {
    db.connection()
        .call(move |conn| -> Result<Option<MessageText>, rusqlite::Error> {
            conn.query_row(
                "SELECT role, content FROM messages WHERE id = ?1",
                params![message_id],
                |row| {
                    Ok(MessageText {
                        role: row.get(0)?,
                        text: row.get(1)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Store the response for a message, overwriting any earlier one.
pub async fn write_response(
    db: &Database,
    message_id: i64,
    text: &str,
) -> Result<(), SwitchboardError> {
    let text = text.to_string();
    let changed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "UPDATE messages SET response = ?1,
                 responded_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2",
                params![text, message_id],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        return Err(SwitchboardError::not_found("message", message_id));
    }
    Ok(())
}

/// The stored response for a message, if any.
pub async fn get_response(db: &Database, message_id: i64) -> Result<Option<String>, SwitchboardError> {
    db.connection()
        .call(move |conn| -> Result<Option<String>, rusqlite::Error> {
            conn.query_row(
                "SELECT response FROM messages WHERE id = ?1",
                params![message_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()
            .map(Option::flatten)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::{queue, users};
    use switchboard_core::QueueStatus;
    use tempfile::tempdir;

    async fn setup() -> (Database, tempfile::TempDir, i64) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("m.db").to_str().unwrap())
            .await
            .unwrap();
        let user = users::create_user(&db, "Carol", None).await.unwrap();
        (db, dir, user)
    }

    #[tokio::test]
    async fn message_text_and_response() {
        let (db, _dir, user) = setup().await;
        let id = insert_message(&db, user, "user", "hello there").await.unwrap();

        let text = get_message_text(&db, id).await.unwrap().unwrap();
        assert_eq!(text.role, "user");
        assert_eq!(text.text, "hello there");

        assert!(get_response(&db, id).await.unwrap().is_none());
        write_response(&db, id, "general kenobi").await.unwrap();
        assert_eq!(get_response(&db, id).await.unwrap().as_deref(), Some("general kenobi"));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn response_for_missing_message_is_not_found() {
        let (db, _dir, _) = setup().await;
        assert!(write_response(&db, 77, "x").await.unwrap_err().is_not_found());
        assert!(get_message_text(&db, 77).await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn ingest_enqueues_the_message() {
        let (db, _dir, user) = setup().await;
        let (message_id, item_id) = ingest(&db, user, "queued text").await.unwrap();

        let item = queue::get(&db, item_id).await.unwrap().unwrap();
        assert_eq!(item.message_id, message_id);
        assert_eq!(item.user_id, user);
        assert_eq!(item.status, QueueStatus::Pending);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn messages_require_an_existing_user() {
        let (db, _dir, _) = setup().await;
        assert!(insert_message(&db, 12345, "user", "orphan").await.is_err());
        db.close().await.unwrap();
    }
}
