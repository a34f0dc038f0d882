use std::env;

use anyhow::{bail, Context, Result};
use clap::Parser;
use kiln_contracts::task::TaskRequest;
use kiln_engine::{CancelToken, HttpTaskClient, Orchestrator};
use serde_json::{Map, Value};

#[derive(Debug, Parser)]
#[command(
    name = "kiln",
    version,
    about = "Submit a remote generation task and wait for its result"
)]
struct Cli {
    /// Job kind, e.g. image, video, music, model3d.
    #[arg(long)]
    kind: String,

    /// Task sub-type within the kind.
    #[arg(long, default_value = "generate")]
    operation: String,

    /// JSON object forwarded verbatim as the provider input payload.
    #[arg(long)]
    input: String,

    /// Processing step count; clamped into the kind's profile bounds.
    #[arg(long)]
    steps: Option<u32>,

    /// Override the provider API base URL.
    #[arg(long)]
    base_url: Option<String>,
}

fn main() {
    match run() {
        Ok(()) => {}
        Err(err) => {
            eprintln!("kiln error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let api_key = non_empty_env("KILN_API_KEY").context("KILN_API_KEY not set")?;

    let input = parse_input_object(&cli.input)?;

    let client = match cli.base_url {
        Some(base) => HttpTaskClient::with_base(base),
        None => HttpTaskClient::new(),
    };
    let orchestrator = Orchestrator::with_api(client);
    let request = TaskRequest::new(cli.kind, cli.operation, input);

    let outcome = orchestrator.run(&request, cli.steps, &api_key, &CancelToken::new())?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn parse_input_object(raw: &str) -> Result<Map<String, Value>> {
    let input: Value = serde_json::from_str(raw).context("--input is not valid JSON")?;
    let Value::Object(input) = input else {
        bail!("--input must be a JSON object");
    };
    Ok(input)
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
