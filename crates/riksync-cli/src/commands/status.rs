//! Status command - Display per-resource sync progress
//!
//! Provides the `riksync status` CLI command which:
//! 1. Shows every cursor (offset, totals, completion, last sync)
//! 2. Shows the number of stored records per resource type
//! 3. Flags cursors carrying a last error
//! 4. Warns about running attempts that look crashed

use anyhow::{Context, Result};
use clap::Args;
use riksync_sync::ResourceStatus;
use tracing::info;

use super::CliContext;
use crate::output::{emit_json, get_formatter, plural, OutputFormat, OutputFormatter};

#[derive(Debug, Args)]
pub struct StatusCommand {}

impl StatusCommand {
    pub async fn execute(&self, ctx: &CliContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let repo = ctx.open_repository().await?;
        let orchestrator = ctx.orchestrator(repo)?;

        let statuses = orchestrator.status().await.context("Failed to read sync status")?;
        let stale = orchestrator
            .audit()
            .stale_running(ctx.config.audit.stale_after())
            .await
            .context("Failed to query stale attempts")?;

        info!(resources = statuses.len(), stale = stale.len(), "Loaded sync status");

        if format.is_json() {
            let resources: Vec<serde_json::Value> = statuses.iter().map(status_json).collect();
            return emit_json(
                &*formatter,
                &serde_json::json!({
                    "database": ctx.config.database.path.display().to_string(),
                    "resources": resources,
                    "stale_attempts": stale,
                }),
            );
        }

        formatter.success(&format!(
            "riksync status ({})",
            ctx.config.database.path.display()
        ));
        formatter.info("");
        formatter.info("Resource   Offset    Fetched   Stored    Complete  Last sync");
        formatter.info("---------  --------  --------  --------  --------  -------------------");
        for status in &statuses {
            print_row(&*formatter, status);
        }

        for status in statuses.iter().filter(|s| s.cursor.last_error().is_some()) {
            formatter.warn(&format!(
                "{} failed {} in a row: {}",
                status.cursor.resource_type(),
                plural(u64::from(status.cursor.retry_count()), "time"),
                status.cursor.last_error().unwrap_or_default()
            ));
        }

        if !stale.is_empty() {
            formatter.warn(&format!(
                "{} still marked running; see 'riksync audit --stale'",
                plural(stale.len() as u64, "attempt")
            ));
        }

        Ok(())
    }
}

fn print_row(formatter: &dyn OutputFormatter, status: &ResourceStatus) {
    let cursor = &status.cursor;
    let last_sync = cursor
        .last_sync_timestamp()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());
    formatter.info(&format!(
        "{:<9}  {:>8}  {:>8}  {:>8}  {:<8}  {}",
        cursor.resource_type().as_str(),
        cursor.offset(),
        cursor.total_fetched(),
        status.record_count,
        if cursor.is_complete() { "yes" } else { "no" },
        last_sync
    ));
}

fn status_json(status: &ResourceStatus) -> serde_json::Value {
    let cursor = &status.cursor;
    serde_json::json!({
        "resource_type": cursor.resource_type(),
        "offset": cursor.offset(),
        "total_fetched": cursor.total_fetched(),
        "is_complete": cursor.is_complete(),
        "last_sync_timestamp": cursor.last_sync_timestamp().map(|t| t.to_rfc3339()),
        "last_error": cursor.last_error(),
        "retry_count": cursor.retry_count(),
        "stored_records": status.record_count,
    })
}
