//! `ec2-emu` answers EC2 instance API requests against a local store.
//!
//! ## Usage
//!
//! ```sh
//! # Create a state file seeded with the configured groups and subnets
//! ec2-emu init -o state.json
//!
//! # Launch an instance (form-encoded request body on stdin)
//! echo 'Action=RunInstances&ImageId=ami-1234abcd&MinCount=1&MaxCount=1' \
//!     | ec2-emu request --state state.json
//!
//! # Describe running instances as JSON
//! ec2-emu request --state state.json --format json \
//!     -i describe.txt
//!
//! # Show how a request body decodes, without touching any state
//! ec2-emu decode -i modify.txt
//! ```
//!
//! Log verbosity follows `RUST_LOG`; logs go to stderr.

mod config;
mod state;

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ec2_emu_core::decoder::{
    extract_block_device_overrides, extract_filters, extract_instance_ids,
    extract_scalar_attribute, RunInstancesRequest,
};
use ec2_emu_core::{
    handle_request, render_error, render_response, Action, Ec2Error, EmulatorConfig,
    InMemoryStore, RawParameters, Response,
};
use serde_json::{json, Map, Value};
use tracing::info;

#[derive(Parser)]
#[command(name = "ec2-emu", version, about = "EC2 instance API emulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Handle one form-encoded request and print the response
    Request {
        /// Request body file (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Output file (writes to stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// State file to load before and save after the request
        #[arg(long)]
        state: Option<PathBuf>,
        /// Emulator configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Response format
        #[arg(long, value_enum, default_value_t = Format::Xml)]
        format: Format,
    },
    /// Print the decoded structures of a request body as JSON
    Decode {
        /// Request body file (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Output file (writes to stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Emulator configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Write an empty state file seeded from the configuration
    Init {
        /// Output file (writes to stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Emulator configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Xml,
    Json,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Request {
            input,
            output,
            state,
            config,
            format,
        } => {
            let config = config::load(config.as_deref())?;
            let store = state::open(state.as_deref(), &config)?;
            let body = read_input(input.as_deref())?;

            let result = body
                .trim()
                .parse::<RawParameters>()
                .and_then(|raw| handle_request(&store, &config, &raw));

            match result {
                Ok(response) => {
                    if let Some(path) = &state {
                        state::save(path, &store)?;
                    }
                    write_output(output.as_deref(), &render(&response, format)?)?;
                }
                Err(err) => {
                    let request_id = &config.placeholders.request_id;
                    write_output(output.as_deref(), &render_failure(&err, request_id, format)?)?;
                    eprintln!("{}: {}", err.code(), err);
                    process::exit(if err.is_client_error() { 1 } else { 2 });
                }
            }
        }
        Commands::Decode {
            input,
            output,
            config,
        } => {
            let config = config::load(config.as_deref())?;
            let body = read_input(input.as_deref())?;
            let raw: RawParameters = body.trim().parse().context("Failed to parse request body")?;
            let summary = decode_summary(&raw, &config).context("Failed to decode request")?;
            let pretty = serde_json::to_string_pretty(&summary)?;
            write_output(output.as_deref(), &pretty)?;
        }
        Commands::Init { output, config } => {
            let config = config::load(config.as_deref())?;
            let store = InMemoryStore::new(config);
            match &output {
                Some(path) => {
                    state::save(path, &store)?;
                    info!(path = %path.display(), "initialized state");
                }
                None => write_output(None, &state::to_json(&store)?)?,
            }
        }
    }

    Ok(())
}

fn render(response: &Response, format: Format) -> Result<String> {
    match format {
        Format::Xml => Ok(render_response(response)),
        Format::Json => {
            serde_json::to_string_pretty(response).context("Failed to serialize response")
        }
    }
}

fn render_failure(err: &Ec2Error, request_id: &str, format: Format) -> Result<String> {
    match format {
        Format::Xml => Ok(render_error(err, request_id)),
        Format::Json => {
            let doc = json!({
                "errors": [{ "code": err.code(), "message": err.to_string() }],
                "request_id": request_id,
            });
            serde_json::to_string_pretty(&doc).context("Failed to serialize error")
        }
    }
}

/// Everything the decoder extracts from `raw` for its action.
fn decode_summary(raw: &RawParameters, config: &EmulatorConfig) -> Result<Value> {
    let action: Option<Action> = raw.first("Action").map(str::parse).transpose()?;

    let filters: Map<String, Value> = extract_filters(raw)
        .iter()
        .map(|(name, values)| (name.to_string(), json!(values)))
        .collect();

    let mut summary = json!({
        "action": action.map(|a| a.as_str()),
        "instance_ids": extract_instance_ids(raw),
        "filters": filters,
    });

    match action {
        Some(Action::RunInstances) => {
            let request = RunInstancesRequest::from_params(raw, &config.default_instance_type)?;
            summary["run_instances"] = serde_json::to_value(request)?;
        }
        Some(Action::ModifyInstanceAttribute) => {
            summary["scalar_attribute"] = serde_json::to_value(extract_scalar_attribute(raw)?)?;
            summary["block_device_overrides"] =
                serde_json::to_value(extract_block_device_overrides(raw)?)?;
        }
        _ => {}
    }
    Ok(summary)
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read file: {}", path.display())),
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}

fn write_output(path: Option<&Path>, content: &str) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write file: {}", path.display()))?;
        }
        None => {
            print!("{}", content);
            if !content.ends_with('\n') {
                println!();
            }
        }
    }
    Ok(())
}
