//! proctorctl - operator CLI for the Proctor admission queues

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9531";

#[derive(Parser)]
#[command(name = "proctorctl")]
#[command(about = "Inspect and tune the Proctor admission queues", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "PROCTOR_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Read or change queue settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Show live queue stats
    Stats,
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Show current settings
    Show,

    /// Change one or more settings (values below the minimum are raised to it)
    Set {
        /// Concurrent answer writes per process (min 1)
        #[arg(long)]
        answer_concurrency: Option<usize>,

        /// Concurrent submissions per process (min 1)
        #[arg(long)]
        submit_concurrency: Option<usize>,

        /// Max waiting tasks per queue (min 10)
        #[arg(long)]
        max_queue: Option<usize>,
    },
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: u64,
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Deserialize, Tabled)]
struct SettingsRow {
    answer_concurrency: usize,
    submit_concurrency: usize,
    max_queue: usize,
}

#[derive(Deserialize)]
struct Counters {
    queued: u64,
    active: u64,
}

#[derive(Deserialize)]
struct QueueStats {
    name: String,
    pending: usize,
    active: usize,
    concurrency: usize,
    distributed: Option<Counters>,
}

#[derive(Deserialize)]
struct StatsResult {
    queues: Vec<QueueStats>,
    uptime_seconds: i64,
}

#[derive(Tabled)]
struct QueueRow {
    queue: String,
    pending: usize,
    active: usize,
    concurrency: usize,
    global_queued: String,
    global_active: String,
}

impl From<QueueStats> for QueueRow {
    fn from(stats: QueueStats) -> Self {
        let (global_queued, global_active) = match stats.distributed {
            Some(c) => (c.queued.to_string(), c.active.to_string()),
            None => ("-".to_string(), "-".to_string()),
        };
        Self {
            queue: stats.name,
            pending: stats.pending,
            active: stats.active,
            concurrency: stats.concurrency,
            global_queued,
            global_active,
        }
    }
}

async fn call_rpc(url: &str, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

/// Params for a partial settings update; omitted flags are left out
fn update_params(
    answer_concurrency: Option<usize>,
    submit_concurrency: Option<usize>,
    max_queue: Option<usize>,
) -> Option<serde_json::Value> {
    let mut params = serde_json::Map::new();
    if let Some(n) = answer_concurrency {
        params.insert("answer_concurrency".to_string(), json!(n));
    }
    if let Some(n) = submit_concurrency {
        params.insert("submit_concurrency".to_string(), json!(n));
    }
    if let Some(n) = max_queue {
        params.insert("max_queue".to_string(), json!(n));
    }
    (!params.is_empty()).then(|| serde_json::Value::Object(params))
}

fn print_settings(result: serde_json::Value) -> Result<()> {
    let settings: SettingsRow = serde_json::from_value(result)?;
    println!("{}", Table::new(vec![settings]));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Settings {
            action: SettingsAction::Show,
        } => {
            let result = call_rpc(&cli.rpc_url, "admin.queue_settings.get.v1", json!({})).await?;
            println!("{}", "Queue Settings".cyan().bold());
            print_settings(result)?;
        }

        Commands::Settings {
            action:
                SettingsAction::Set {
                    answer_concurrency,
                    submit_concurrency,
                    max_queue,
                },
        } => {
            let params = update_params(answer_concurrency, submit_concurrency, max_queue)
                .context(
                    "Nothing to change: pass --answer-concurrency, --submit-concurrency or --max-queue",
                )?;

            let result =
                call_rpc(&cli.rpc_url, "admin.queue_settings.update.v1", params).await?;
            println!("{}", "✓ Queue settings updated".green().bold());
            println!();
            print_settings(result)?;
        }

        Commands::Stats => {
            println!("{}", "Queue Stats".cyan().bold());
            println!();

            match call_rpc(&cli.rpc_url, "admin.queue_stats.v1", json!({})).await {
                Ok(result) => {
                    let stats: StatsResult = serde_json::from_value(result)?;
                    println!("  {} {}", "RPC URL:".bold(), cli.rpc_url);
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!("  {} {} seconds", "Uptime:".bold(), stats.uptime_seconds);
                    println!();

                    let rows: Vec<QueueRow> = stats.queues.into_iter().map(QueueRow::from).collect();
                    println!("{}", Table::new(rows));
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }
    }

    Ok(())
}
