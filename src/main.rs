//! Metric Service CLI
//!
//! - `metricsvc query --request req.json` runs a live query against OpenTSDB
//! - `metricsvc process --request req.json --input stream.jsonl` replays a
//!   saved response stream through the processor, no network
//! - `metricsvc init-config` prints the default configuration file

use anyhow::Context;
use clap::{Parser, Subcommand};
use metricsvc::api::dto::QueryResponse;
use metricsvc::config::{generate_default_config, Config};
use metricsvc::model::QueryRequest;
use metricsvc::service::{process_stream, MetricService};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "metricsvc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Query, bucket and combine OpenTSDB metrics")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a query against OpenTSDB
    Query {
        /// Query request (JSON)
        #[arg(short, long)]
        request: PathBuf,
    },

    /// Bucket a saved response stream without contacting OpenTSDB
    Process {
        /// Query request (JSON) describing the series and expressions
        #[arg(short, long)]
        request: PathBuf,
        /// Newline-delimited result records
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Print the default configuration file
    InitConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (request_path, input) = match cli.command {
        Commands::InitConfig => {
            print!("{}", generate_default_config());
            return Ok(());
        }
        Commands::Query { request } => (request, None),
        Commands::Process { request, input } => (request, Some(input)),
    };

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    config.logging.init_tracing();

    let request = read_request(&request_path)?;
    let outcome = match input {
        Some(input) => {
            let file = File::open(&input)
                .with_context(|| format!("Failed to open input {}", input.display()))?;
            process_stream(&request, BufReader::new(file), config.query.bucket_size_secs)?
        }
        None => {
            let service = MetricService::from_config(&config)?;
            service.query(&request).await?
        }
    };

    let response = QueryResponse::from(outcome);
    let output = if cli.pretty {
        serde_json::to_string_pretty(&response)?
    } else {
        serde_json::to_string(&response)?
    };
    println!("{}", output);

    Ok(())
}

fn read_request(path: &Path) -> anyhow::Result<QueryRequest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read request {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid query request in {}", path.display()))
}
