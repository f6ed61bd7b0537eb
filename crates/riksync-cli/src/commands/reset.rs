//! Reset command - Rewind sync cursors
//!
//! A complete cursor is never fetched again on its own; `riksync reset`
//! rewinds it to offset zero so the next cycle starts from the first page.
//! The lifetime `total_fetched` counter is kept.

use anyhow::Result;
use clap::Args;
use riksync_sync::ResourceSelector;
use tracing::info;

use super::CliContext;
use crate::output::{emit_json, get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct ResetCommand {
    /// Resource type to reset, or "all"
    pub target: ResourceSelector,
}

impl ResetCommand {
    pub async fn execute(&self, ctx: &CliContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let repo = ctx.open_repository().await?;
        let orchestrator = ctx.orchestrator(repo)?;

        let targets = match self.target {
            ResourceSelector::All => ctx.config.resources.in_priority_order(),
            ResourceSelector::One(r) => vec![r],
        };

        let mut reset = Vec::with_capacity(targets.len());
        for resource_type in targets {
            let cursor = orchestrator.reset(resource_type).await?;
            info!(resource = %resource_type, "Cursor reset from CLI");
            reset.push(cursor);
        }

        if format.is_json() {
            return emit_json(&*formatter, &serde_json::json!({ "reset": reset }));
        }

        for cursor in &reset {
            formatter.success(&format!(
                "Reset {} (lifetime total {} kept)",
                cursor.resource_type(),
                cursor.total_fetched()
            ));
        }
        Ok(())
    }
}
