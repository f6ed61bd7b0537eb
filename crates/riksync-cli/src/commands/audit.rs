//! Audit command - View the sync attempt log
//!
//! Provides the `riksync audit` CLI command which:
//! 1. Lists the most recent attempts, optionally for one resource type
//! 2. With `--stale`, lists running attempts old enough to have crashed

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use riksync_audit::AuditLogger;
use riksync_core::domain::{ResourceType, SyncAttempt};
use riksync_core::ports::IStateRepository;
use tracing::info;

use super::CliContext;
use crate::output::{emit_json, get_formatter, OutputFormat, OutputFormatter};

#[derive(Debug, Args)]
pub struct AuditCommand {
    /// Only attempts of this resource type
    #[arg(long)]
    pub resource: Option<ResourceType>,

    /// Maximum number of attempts to show
    #[arg(long, default_value = "20")]
    pub limit: u32,

    /// Show running attempts older than this (e.g. "30m", "2h"); defaults
    /// to audit.stale_after_minutes
    #[arg(long, value_name = "AGE", num_args = 0..=1, default_missing_value = "")]
    pub stale: Option<String>,
}

impl AuditCommand {
    pub async fn execute(&self, ctx: &CliContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let repo = ctx.open_repository().await?;
        let audit = AuditLogger::new(repo as Arc<dyn IStateRepository>);

        let (title, attempts) = match &self.stale {
            Some(age) => {
                let bound = if age.is_empty() {
                    ctx.config.audit.stale_after()
                } else {
                    parse_relative_duration(age)
                        .with_context(|| format!("Invalid --stale value: '{}'. Expected e.g. 30m, 2h, 1d", age))?
                };
                let attempts = audit
                    .stale_running(bound)
                    .await
                    .context("Failed to query stale attempts")?;
                (
                    format!("Stale running attempts (older than {}m)", bound.num_minutes()),
                    attempts,
                )
            }
            None => {
                let attempts = audit
                    .recent(self.resource, self.limit)
                    .await
                    .context("Failed to query attempt log")?;
                ("Recent sync attempts".to_string(), attempts)
            }
        };

        info!(count = attempts.len(), "Retrieved sync attempts");

        if format.is_json() {
            return emit_json(
                &*formatter,
                &serde_json::json!({
                    "count": attempts.len(),
                    "attempts": attempts,
                }),
            );
        }

        if attempts.is_empty() {
            formatter.info("No sync attempts found.");
            return Ok(());
        }

        formatter.success(&format!("{} ({})", title, attempts.len()));
        print_table(&*formatter, &attempts);
        Ok(())
    }
}

fn print_table(formatter: &dyn OutputFormatter, attempts: &[SyncAttempt]) {
    formatter.info("");
    formatter.info("Started              Resource   Status     Records  Duration  Error");
    formatter.info("-------------------  ---------  ---------  -------  --------  -----");
    for attempt in attempts {
        let duration = attempt
            .duration()
            .map(|d| format_duration_ms(d.num_milliseconds()))
            .unwrap_or_else(|| "-".to_string());
        formatter.info(&format!(
            "{}  {:<9}  {:<9}  {:>7}  {:>8}  {}",
            attempt.started_at().format("%Y-%m-%d %H:%M:%S"),
            attempt.resource_type().as_str(),
            attempt.status().as_str(),
            attempt.records_processed(),
            duration,
            truncate(attempt.error_message().unwrap_or(""), 50),
        ));
    }
}

/// Parses `"30m"`, `"2h"`, `"1d"` or `"1w"`
fn parse_relative_duration(input: &str) -> Option<chrono::Duration> {
    let input = input.trim();
    let unit = input.chars().last()?;
    let amount: i64 = input[..input.len() - unit.len_utf8()].parse().ok()?;
    if amount < 0 {
        return None;
    }

    match unit {
        'm' => Some(chrono::Duration::minutes(amount)),
        'h' => Some(chrono::Duration::hours(amount)),
        'd' => Some(chrono::Duration::days(amount)),
        'w' => Some(chrono::Duration::weeks(amount)),
        _ => None,
    }
}

fn format_duration_ms(ms: i64) -> String {
    if ms >= 1_000 {
        format!("{:.1}s", ms as f64 / 1_000.0)
    } else {
        format!("{}ms", ms)
    }
}

/// Truncates on a character boundary
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_relative_duration() {
        assert_eq!(parse_relative_duration("30m"), Some(chrono::Duration::minutes(30)));
        assert_eq!(parse_relative_duration("2h"), Some(chrono::Duration::hours(2)));
        assert_eq!(parse_relative_duration("1d"), Some(chrono::Duration::days(1)));
        assert_eq!(parse_relative_duration("1w"), Some(chrono::Duration::weeks(1)));
    }

    #[test]
    fn test_parse_relative_duration_invalid() {
        assert!(parse_relative_duration("").is_none());
        assert!(parse_relative_duration("m").is_none());
        assert!(parse_relative_duration("5x").is_none());
        assert!(parse_relative_duration("-5m").is_none());
        assert!(parse_relative_duration("fem minuter").is_none());
    }

    #[test]
    fn test_format_duration_ms() {
        assert_eq!(format_duration_ms(250), "250ms");
        assert_eq!(format_duration_ms(1_500), "1.5s");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("kort", 10), "kort");
        let long = "Förfrågan misslyckades: servern svarade med ett fel";
        let cut = truncate(long, 20);
        assert_eq!(cut.chars().count(), 20);
        assert!(cut.ends_with("..."));
    }
}
