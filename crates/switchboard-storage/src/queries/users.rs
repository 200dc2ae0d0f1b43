// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Users and their platform profiles.

use rusqlite::{OptionalExtension, params};
use switchboard_core::{PlatformProfileRef, SwitchboardError, UserDisplayInfo};

use crate::database::{Database, map_tr_err};

/// Insert a user. Returns the new user id.
pub async fn create_user(
    db: &Database,
    display_name: &str,
    username: Option<&str>,
) -> Result<i64, SwitchboardError> {
    let display_name = display_name.to_string();
    let username = username.map(str::to_string);
    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            conn.execute(
                "INSERT INTO users (display_name, username) VALUES (?1, ?2)",
                params![display_name, username],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_user_display_info(
    db: &Database,
    user_id: i64,
) -> Result<Option<UserDisplayInfo>, SwitchboardError> {
    db.connection()
        .call(move |conn| -> Result<Option<UserDisplayInfo>, rusqlite::Error> {
            conn.query_row(
                "SELECT display_name, username FROM users WHERE id = ?1",
                params![user_id],
                |row| {
                    Ok(UserDisplayInfo {
                        display_name: row.get(0)?,
                        username: row.get(1)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Link a user to a platform identity. Returns the profile id.
pub async fn create_platform_profile(
    db: &Database,
    user_id: i64,
    platform: &str,
    platform_user_id: &str,
) -> Result<i64, SwitchboardError> {
    let platform = platform.to_string();
    let platform_user_id = platform_user_id.to_string();
    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            conn.execute(
                "INSERT INTO platform_profiles (user_id, platform, platform_user_id)
                 VALUES (?1, ?2, ?3)",
                params![user_id, platform, platform_user_id],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// The user's most recently linked platform profile.
pub async fn get_platform_profile_ref(
    db: &Database,
    user_id: i64,
) -> Result<Option<PlatformProfileRef>, SwitchboardError> {
    db.connection()
        .call(move |conn| -> Result<Option<PlatformProfileRef>, rusqlite::Error> {
            conn.query_row(
                "SELECT id, platform_user_id, platform FROM platform_profiles
                 WHERE user_id = ?1 ORDER BY id DESC LIMIT 1",
                params![user_id],
                |row| {
                    Ok(PlatformProfileRef {
                        profile_id: row.get(0)?,
                        platform_user_id: row.get(1)?,
                        platform: row.get(2)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}
