//! CloudEvent transform CLI entry point.
//!
//! Reads a message as JSON, transforms it and prints the output message.

use anyhow::{Context, Result};
use clap::Parser;
use cloudevent_transform::{Message, PipelineConfig, ToCloudEventTransformer};
use std::io::Read;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "cloudevent-transform")]
#[command(author, version, about = "Transform messages into CloudEvents")]
struct Args {
    /// Configuration file path (YAML or JSON)
    #[arg(short, long, env = "CLOUDEVENT_TRANSFORM_CONFIG")]
    config: Option<PathBuf>,

    /// Message file path (JSON); reads stdin when absent
    #[arg(short, long)]
    message: Option<PathBuf>,

    /// Media type of the output format (defaults to the configured default)
    #[arg(short, long)]
    format: Option<String>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Print example configuration and exit.
    #[arg(long)]
    example_config: bool,

    /// Validate configuration and exit.
    #[arg(long)]
    validate: bool,
}

fn print_example_config() {
    let example = r#"# CloudEvent Transform Configuration Example
version: "1"

attributes:
  # Mandatory attributes need a pattern, a default, or both
  id:
    pattern: "test_i*"
  source:
    pattern: "test_s*"
    default: "/spring/app"
  type:
    pattern: "test_t*"
    default: "spring.message"
  # Optional attributes
  time:
    pattern: "ce_time"
  datacontenttype:
    pattern: "contentType"
  subject:
    pattern: "subject"

# First matching token wins; "!" excludes the header entirely
extensions:
  - "trace-id"
  - "!secret-*"

encoding:
  formats:
    - "application/cloudevents+json"
    - "application/cloudevents+xml"
    - "application/cloudevents+avrocompact"
  default_format: "application/cloudevents+json"
  # Or, instead of formats, binary content mode:
  # converter:
  #   binary:
  #     prefix: "ce-"
"#;
    println!("{}", example);
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries the output message
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    if args.example_config {
        print_example_config();
        return Ok(());
    }

    let config = if let Some(config_path) = &args.config {
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
        if config_path
            .extension()
            .is_some_and(|e| e == "yaml" || e == "yml")
        {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        }
    } else {
        PipelineConfig::default()
    };

    let transformer =
        ToCloudEventTransformer::new(config).context("Invalid transformer configuration")?;

    if args.validate {
        info!("Configuration is valid");
        return Ok(());
    }

    let input = match &args.message {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read message file: {}", path.display()))?,
        None => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("Failed to read message from stdin")?;
            input
        }
    };

    let json: serde_json::Value =
        serde_json::from_str(&input).context("Message is not valid JSON")?;
    let message = Message::from_json(json).context("Invalid message")?;

    let output = match &args.format {
        Some(media_type) => transformer.transform_as(&message, media_type),
        None => transformer.transform(&message),
    }
    .context("Transform failed")?;

    println!("{}", serde_json::to_string_pretty(&output.to_json())?);

    Ok(())
}
