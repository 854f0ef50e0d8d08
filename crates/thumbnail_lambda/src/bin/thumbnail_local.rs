use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use serde_json::{json, Value};
use thumbnail_lambda::adapters::budget::NoDeadline;
use thumbnail_lambda::adapters::fs_store::LocalStorageGateway;
use thumbnail_lambda::config::PipelineConfig;
use thumbnail_lambda::handlers::invocation::{handle_invocation, InvocationError};
use thumbnail_lambda::logging::init_tracing;
use tracing::error;

/// Runs the thumbnail pipeline against a directory tree laid out as
/// `<root>/<container>/<key>`. Configuration comes from the same
/// environment variables as the Lambda.
#[derive(Parser)]
#[command(name = "thumbnail_local", about = "Render thumbnail variants from a local directory")]
struct Args {
    /// Directory whose subdirectories act as containers
    #[arg(long, env = "THUMBNAIL_LOCAL_ROOT")]
    root: PathBuf,
    /// Container holding the uploads
    #[arg(long, default_value = "local")]
    container: String,
    /// Invocation event JSON file to replay instead of listing keys
    #[arg(long, conflicts_with = "keys")]
    event: Option<PathBuf>,
    /// Object keys to process, encoded like storage notifications
    #[arg(required_unless_present = "event")]
    keys: Vec<String>,
}

fn build_event(args: &Args) -> Result<Value, Box<dyn Error>> {
    if let Some(path) = &args.event {
        let raw = fs::read_to_string(path)
            .map_err(|error| format!("failed to read '{}': {error}", path.display()))?;
        return Ok(serde_json::from_str(&raw)?);
    }

    let records: Vec<Value> = args
        .keys
        .iter()
        .map(|key| json!({"container": args.container, "key": key}))
        .collect();
    Ok(json!({ "records": records }))
}

fn run(args: Args) -> Result<ExitCode, Box<dyn Error>> {
    let config = PipelineConfig::from_env()?;
    let event = build_event(&args)?;
    let gateway = LocalStorageGateway::new(args.root.clone());

    match handle_invocation(event, &config, &gateway, &NoDeadline) {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(InvocationError::BatchFailed { response, .. }) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(ExitCode::FAILURE)
        }
        Err(other) => Err(other.into()),
    }
}

fn main() -> ExitCode {
    init_tracing();
    match run(Args::parse()) {
        Ok(code) => code,
        Err(error) => {
            error!(event = "local_run_failed", details = %error);
            ExitCode::FAILURE
        }
    }
}
