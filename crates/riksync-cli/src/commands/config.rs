//! Config command - View and manage riksync configuration
//!
//! Provides the `riksync config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Writes a default configuration file
//! 3. Sets individual values via dot-notation keys
//! 4. Validates the configuration file and reports errors

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Subcommand;
use riksync_core::config::Config;
use riksync_core::domain::ResourceType;
use tracing::info;

use super::CliContext;
use crate::output::{emit_json, get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Set a configuration value
    Set {
        /// Configuration key (e.g. "retry.max_retries", "resources.votes.priority")
        key: String,
        /// New value
        value: String,
    },
    /// Validate the configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &CliContext, format: OutputFormat) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(ctx, format),
            ConfigCommand::Init { force } => execute_init(&ctx.config_path, *force, format),
            ConfigCommand::Set { key, value } => execute_set(ctx, key, value, format),
            ConfigCommand::Validate => execute_validate(&ctx.config_path, format),
        }
    }
}

fn execute_show(ctx: &CliContext, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    info!(config_path = %ctx.config_path.display(), "Showing configuration");

    if format.is_json() {
        return emit_json(&*formatter, &ctx.config);
    }

    formatter.success(&format!("Configuration ({})", ctx.config_path.display()));
    formatter.info("");
    for line in ctx.config.to_yaml()?.lines() {
        formatter.info(line);
    }
    Ok(())
}

fn execute_init(path: &Path, force: bool, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let written = write_default_config(path, force)?;

    if format.is_json() {
        return emit_json(
            &*formatter,
            &serde_json::json!({
                "written": written,
                "config_path": path.display().to_string(),
            }),
        );
    }

    if written {
        formatter.success(&format!("Wrote default configuration to {}", path.display()));
    } else {
        formatter.warn(&format!(
            "{} already exists; use --force to overwrite",
            path.display()
        ));
    }
    Ok(())
}

/// Writes the default configuration; returns `false` when the file exists
/// and `force` is not set.
fn write_default_config(path: &Path, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    save_config(path, &Config::default())?;
    Ok(true)
}

fn save_config(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create configuration directory")?;
    }
    std::fs::write(path, config.to_yaml()?).context("Failed to write configuration file")?;
    Ok(())
}

fn execute_set(ctx: &CliContext, key: &str, value: &str, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let mut config = ctx.config.clone();

    info!(key = %key, value = %value, "Setting configuration value");

    let errors: Vec<String> = match apply_config_value(&mut config, key, value) {
        Ok(()) => config.validate().iter().map(|e| e.to_string()).collect(),
        Err(e) => vec![e.to_string()],
    };

    if errors.is_empty() {
        save_config(&ctx.config_path, &config)?;
    }

    if format.is_json() {
        return emit_json(
            &*formatter,
            &serde_json::json!({
                "success": errors.is_empty(),
                "key": key,
                "value": value,
                "errors": errors,
                "config_path": ctx.config_path.display().to_string(),
            }),
        );
    }

    if errors.is_empty() {
        formatter.success(&format!("Set {} = {}", key, value));
        formatter.info(&format!("Saved to {}", ctx.config_path.display()));
    } else {
        formatter.error(&format!("Invalid value for '{}': {}", key, errors.join("; ")));
    }
    Ok(())
}

fn execute_validate(path: &Path, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);

    let errors: Vec<String> = if !path.exists() {
        vec!["Configuration file not found; built-in defaults are in use".to_string()]
    } else {
        match Config::load(path) {
            Ok(config) => config.validate().iter().map(|e| e.to_string()).collect(),
            Err(e) => vec![format!("Failed to parse configuration: {}", e)],
        }
    };

    info!(config_path = %path.display(), errors = errors.len(), "Validated configuration");

    if format.is_json() {
        return emit_json(
            &*formatter,
            &serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": path.display().to_string(),
                "errors": errors,
            }),
        );
    }

    if errors.is_empty() {
        formatter.success("Configuration is valid");
        formatter.info(&format!("File: {}", path.display()));
    } else {
        formatter.error(&format!(
            "Configuration has {} problem{}:",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" }
        ));
        formatter.info(&format!("File: {}", path.display()));
        for error in &errors {
            formatter.info(&format!("  {}", error));
        }
    }
    Ok(())
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid value for {}: {}", key, e))
}

/// Applies one dot-notation assignment to `config`.
///
/// Per-resource keys take the form `resources.<type>.<field>`.
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    if let Some(rest) = key.strip_prefix("resources.") {
        let (type_name, field) = rest
            .split_once('.')
            .with_context(|| format!("expected resources.<type>.<field>, got '{}'", key))?;
        let resource_type: ResourceType = type_name.parse()?;
        let resource = config
            .resources
            .0
            .get_mut(&resource_type)
            .with_context(|| format!("resource {} is not configured", resource_type))?;
        match field {
            "priority" => resource.priority = parse(key, value)?,
            "default_batch_size" => resource.default_batch_size = parse(key, value)?,
            "min_batch_size" => resource.min_batch_size = parse(key, value)?,
            "max_batch_size" => resource.max_batch_size = parse(key, value)?,
            "endpoint" => resource.endpoint = value.to_string(),
            _ => anyhow::bail!("unknown key: {}", key),
        }
        return Ok(());
    }

    match key {
        "api.base_url" => config.api.base_url = value.to_string(),
        "api.request_timeout_secs" => config.api.request_timeout_secs = parse(key, value)?,
        "api.user_agent" => config.api.user_agent = value.to_string(),
        "rate_limiting.requests_per_second" => {
            config.rate_limiting.requests_per_second = parse(key, value)?
        }
        "retry.max_retries" => config.retry.max_retries = parse(key, value)?,
        "retry.base_delay_ms" => config.retry.base_delay_ms = parse(key, value)?,
        "retry.max_delay_ms" => config.retry.max_delay_ms = parse(key, value)?,
        "retry.jitter" => config.retry.jitter = parse(key, value)?,
        "retry.max_attempts" => config.retry.max_attempts = parse(key, value)?,
        "circuit_breaker.failure_threshold" => {
            config.circuit_breaker.failure_threshold = parse(key, value)?
        }
        "circuit_breaker.recovery_timeout_ms" => {
            config.circuit_breaker.recovery_timeout_ms = parse(key, value)?
        }
        "health_check.enabled" => config.health_check.enabled = parse(key, value)?,
        "plan.inter_phase_delay_ms" => config.plan.inter_phase_delay_ms = parse(key, value)?,
        "database.path" => config.database.path = value.into(),
        "daemon.interval_secs" => config.daemon.interval_secs = parse(key, value)?,
        "logging.level" => config.logging.level = value.to_string(),
        "logging.format" => config.logging.format = value.to_string(),
        _ => anyhow::bail!("unknown key: {}", key),
    }
    Ok(())
}
