use clap::{Parser, Subcommand, ValueEnum};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use url::Url;

use gateway_config_sync::config::DeploymentMode;
use gateway_config_sync::resolver;
use gateway_config_sync::store::ModelType;

#[derive(Parser)]
#[command(name = "sync-cli")]
#[command(about = "Management CLI for the gateway config sync daemon", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, default_value = "")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon status and the active snapshot
    Status,
    /// List tracked snapshots and their refcounts
    Snapshots,
    /// Look up one record in the active snapshot
    Lookup {
        /// catalog | product | api | subscription
        model: String,
        key: String,
    },
    /// Resolve a fragment directory offline and print the records
    Resolve {
        dir: PathBuf,
        #[arg(short, long, value_enum, default_value_t = ModeArg::Managed)]
        mode: ModeArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Managed,
    Local,
}

impl From<ModeArg> for DeploymentMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Managed => DeploymentMode::Managed,
            ModeArg::Local => DeploymentMode::LocalAuthoring,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let segments: Vec<String> = match cli.command {
        Commands::Resolve { dir, mode } => return resolve_offline(dir, mode.into()),
        Commands::Status => vec!["admin".into(), "status".into()],
        Commands::Snapshots => vec!["admin".into(), "snapshots".into()],
        Commands::Lookup { model, key } => {
            let model: ModelType = model.parse()?;
            vec!["admin".into(), "records".into(), model.name().into(), key]
        }
    };

    // keys may contain '#' or '/', so they go in as encoded segments
    let mut url = Url::parse(&cli.url)?;
    url.path_segments_mut()
        .map_err(|_| format!("{} cannot be used as a base URL", cli.url))?
        .pop_if_empty()
        .extend(&segments);

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let client = reqwest::Client::new();
    let res = client
        .get(url)
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

fn resolve_offline(dir: PathBuf, mode: DeploymentMode) -> Result<(), Box<dyn std::error::Error>> {
    let mut resolution = resolver::resolve(&dir, mode)?;

    let mut records = Map::new();
    for model in ModelType::ALL {
        let entries: Vec<Value> = resolution
            .take(model)
            .into_iter()
            .map(|r| json!({ "key": r.key, "document": r.document }))
            .collect();
        records.insert(model.name().to_string(), Value::Array(entries));
    }
    let errors: Vec<String> = resolution.errors.iter().map(|e| e.to_string()).collect();

    let report = json!({
        "mode": mode.to_string(),
        "files_ignored": resolution.files_ignored,
        "records": records,
        "errors": errors,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(format!("{} fragment error(s); snapshot would not be promoted", errors.len()).into())
    }
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Details: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
