//! Sync command - Run a sync cycle or the strategic plan
//!
//! Provides the `riksync sync` CLI command which:
//! 1. Builds a `SyncRequest` from flags (or takes one verbatim via `--request`)
//! 2. Wires the HTTP client and the SQLite store into the orchestrator
//! 3. Cancels the in-flight cycle cleanly on Ctrl-C
//! 4. Prints the `SyncResponse`

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use clap::Args;
use riksync_sync::{PhaseOutcome, ResourceSelector, SyncRequest, SyncResponse};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::CliContext;
use crate::output::{emit_json, get_formatter, plural, OutputFormat, OutputFormatter};

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Resource type to sync (members, speeches, documents, votes) or "all"
    #[arg(default_value = "all")]
    pub resource: ResourceSelector,

    /// Pin the batch size instead of sizing adaptively
    #[arg(long)]
    pub batch_size: Option<u32>,

    /// Extra query filter, repeatable (e.g. --filter parti=S)
    #[arg(long = "filter", value_name = "KEY=VALUE", value_parser = parse_filter)]
    pub filters: Vec<(String, String)>,

    /// Build the request URLs without fetching anything
    #[arg(long)]
    pub preview: bool,

    /// Run the multi-phase strategic plan
    #[arg(long)]
    pub plan: bool,

    /// Raw JSON request; overrides every other flag
    #[arg(long, value_name = "JSON")]
    pub request: Option<String>,
}

impl SyncCommand {
    pub async fn execute(&self, ctx: &CliContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let request = self.build_request()?;

        info!(
            target_resource = %request.resource_type,
            preview = request.preview,
            strategic_plan = request.strategic_plan,
            "Handling sync request"
        );

        let repo = ctx.open_repository().await?;
        let orchestrator = ctx.orchestrator(repo)?;

        let cancel = CancellationToken::new();
        let ctrl_c = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, cancelling sync");
                    cancel.cancel();
                }
            })
        };

        if !request.preview {
            formatter.info(&format!("Syncing {}...", request.resource_type));
        }
        let response = orchestrator.handle(request, &cancel).await;
        ctrl_c.abort();

        if format.is_json() {
            emit_json(&*formatter, &response)
        } else {
            print_human(&*formatter, &response);
            Ok(())
        }
    }

    /// Turns the flags into a request; `--request` wins over the flags
    pub fn build_request(&self) -> Result<SyncRequest> {
        if let Some(raw) = &self.request {
            return SyncRequest::from_json(raw).context("Invalid --request JSON");
        }

        let filters: BTreeMap<String, String> = self.filters.iter().cloned().collect();
        Ok(SyncRequest {
            resource_type: self.resource,
            batch_size: self.batch_size,
            filters,
            preview: self.preview,
            strategic_plan: self.plan,
        })
    }
}

/// Parses `KEY=VALUE`; the value may be empty, the key may not
pub fn parse_filter(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

fn print_human(formatter: &dyn OutputFormatter, response: &SyncResponse) {
    if let Some(previews) = &response.preview {
        formatter.success("Preview (nothing fetched)");
        for preview in previews {
            let state = if preview.is_complete { " [complete]" } else { "" };
            formatter.info(&format!(
                "{:<10} offset {:<8} batch {:<5}{}",
                preview.resource_type.as_str(),
                preview.offset,
                preview.batch_size,
                state
            ));
            formatter.info(&format!("  {}", preview.url));
        }
        return;
    }

    if let Some(phases) = &response.phases {
        for phase in phases {
            let line = match &phase.outcome {
                PhaseOutcome::Skipped => "skipped (complete)".to_string(),
                PhaseOutcome::Completed {
                    records_processed,
                    is_complete,
                } => format!(
                    "{}{}",
                    plural(*records_processed, "record"),
                    if *is_complete { ", now complete" } else { "" }
                ),
                PhaseOutcome::Failed { error } => format!("failed: {}", error),
            };
            formatter.info(&format!("{:<10} {}", phase.resource_type.as_str(), line));
        }
    }

    let processed = response.records_processed.unwrap_or(0);
    if response.success {
        formatter.success(&format!("Sync finished: {}", plural(processed, "record")));
        if let Some(total) = response.total_fetched {
            formatter.info(&format!("Total fetched: {}", total));
        }
        if response.is_complete == Some(true) {
            formatter.info("Resource is complete; run 'riksync reset' to fetch it again");
        }
    } else {
        formatter.error(response.error.as_deref().unwrap_or("sync failed"));
    }
}
