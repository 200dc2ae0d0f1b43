// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue administration commands: `status`, `flush` and `retry`.
//!
//! These open the database directly, so they work whether or not a
//! `switchboard serve` process is running against the same file.

use std::fmt::Write as _;

use serde::Serialize;
use switchboard_config::model::SwitchboardConfig;
use switchboard_core::{QueueItem, QueueStats, QueueStatus, SwitchboardError};
use switchboard_storage::{QueueStore, retry_config};

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub database: String,
    pub mode: String,
    pub queue: QueueStats,
    pub total: u64,
    /// Oldest failed items, filled by `status --failed`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_items: Vec<QueueItem>,
}

/// Most failed items `status --failed` lists.
const FAILED_LIST_LIMIT: u32 = 50;

async fn open_queue(config: &SwitchboardConfig) -> Result<QueueStore, SwitchboardError> {
    QueueStore::open(&config.storage, retry_config(&config.retry)).await
}

async fn collect_status(
    config: &SwitchboardConfig,
    list_failed: bool,
) -> Result<StatusResponse, SwitchboardError> {
    let queue = open_queue(config).await?;
    let stats = queue.stats().await?;
    let failed_items = if list_failed {
        queue.list_by_status(QueueStatus::Failed, FAILED_LIST_LIMIT).await?
    } else {
        Vec::new()
    };

    Ok(StatusResponse {
        database: config.storage.database_path.clone(),
        mode: config.agent.mode.to_string(),
        queue: stats,
        total: stats.total(),
        failed_items,
    })
}

/// Run the `switchboard status` command.
pub async fn run_status(
    config: &SwitchboardConfig,
    json: bool,
    list_failed: bool,
) -> Result<(), SwitchboardError> {
    let response = collect_status(config, list_failed).await?;

    if json {
        let out = serde_json::to_string_pretty(&response)
            .map_err(|e| SwitchboardError::Internal(format!("failed to encode status: {e}")))?;
        println!("{out}");
    } else {
        print!("{}", format_status(&response));
    }
    Ok(())
}

/// Run the `switchboard flush` command.
pub async fn run_flush(config: &SwitchboardConfig) -> Result<(), SwitchboardError> {
    let flushed = open_queue(config).await?.flush_pending().await?;
    println!("flushed {flushed} pending item(s)");
    Ok(())
}

/// Run the `switchboard retry <id>` command.
pub async fn run_retry(config: &SwitchboardConfig, id: i64) -> Result<(), SwitchboardError> {
    if open_queue(config).await?.retry_failed(id).await? {
        println!("item {id} requeued");
        Ok(())
    } else {
        Err(SwitchboardError::not_found("failed queue item", id))
    }
}

fn format_status(status: &StatusResponse) -> String {
    let rows = [
        ("pending", status.queue.pending),
        ("processing", status.queue.processing),
        ("completed", status.queue.completed),
        ("failed", status.queue.failed),
        ("flushed", status.queue.flushed),
    ];

    let mut out = String::new();
    let _ = writeln!(out, "Switchboard queue");
    let _ = writeln!(out, "{}", "-".repeat(35));
    let _ = writeln!(out, "  {:<14}{}", "database", status.database);
    let _ = writeln!(out, "  {:<14}{}", "mode", status.mode);
    let _ = writeln!(out, "{}", "-".repeat(35));
    for (label, count) in rows {
        let _ = writeln!(out, "  {label:<14}{count:>8}");
    }
    let _ = writeln!(out, "  {:<14}{:>8}", "total", status.total);

    if !status.failed_items.is_empty() {
        let _ = writeln!(out, "{}", "-".repeat(35));
        let _ = writeln!(out, "  failed items");
        for item in &status.failed_items {
            let _ = writeln!(
                out,
                "  #{:<6} user {:<6} message {:<6} attempts {:<3} {}",
                item.id, item.user_id, item.message_id, item.attempts, item.updated_at
            );
        }
    }
    out
}
