//! Rowcast CLI - Command-line interface for the Rowcast export daemon

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9541";

#[derive(Parser)]
#[command(name = "rowcast")]
#[command(about = "Rowcast export pipeline CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "ROWCAST_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an export job from a filter snapshot
    Create {
        /// Only products in this category
        #[arg(short, long)]
        category: Option<String>,

        /// Only products with this status (active, inactive, discontinued)
        #[arg(short, long)]
        status: Option<String>,

        /// Free-text search over name and SKU
        #[arg(long)]
        search: Option<String>,
    },

    /// Start (or resume) an export run writing to a CSV file
    Run {
        /// Job ID
        job_id: String,

        /// Output file path on the daemon host
        #[arg(short, long)]
        output: String,
    },

    /// Show one export job
    Status {
        /// Job ID
        job_id: String,
    },

    /// Poll an export until it reaches a terminal state
    Watch {
        /// Job ID
        job_id: String,

        /// Poll interval in seconds
        #[arg(short, long, default_value = "1")]
        interval: u64,
    },

    /// Cancel a running export (the job stays resumable)
    Cancel {
        /// Job ID
        job_id: String,
    },

    /// List export jobs
    List {
        /// Only jobs with this status (pending, processing, done, failed)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show daemon statistics
    Stats,
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
struct CreateResult {
    job_id: String,
    status: String,
    total_rows: i64,
}

/// Job fields the CLI renders (extra response fields are ignored)
#[derive(Deserialize)]
struct JobSummary {
    job_id: String,
    status: String,
    cursor: i64,
    rows_exported: i64,
    total_rows: i64,
}

#[derive(Tabled)]
struct JobRow {
    job_id: String,
    status: String,
    progress: String,
    percent: String,
}

impl From<JobSummary> for JobRow {
    fn from(job: JobSummary) -> Self {
        Self {
            progress: format!("{}/{}", job.rows_exported, job.total_rows),
            percent: percent(job.rows_exported, job.total_rows),
            job_id: job.job_id,
            status: job.status,
        }
    }
}

fn percent(rows_exported: i64, total_rows: i64) -> String {
    if total_rows <= 0 {
        return "-".to_string();
    }
    format!(
        "{:.1}%",
        (rows_exported as f64 / total_rows as f64) * 100.0
    )
}

fn colorize_status(status: &str) -> colored::ColoredString {
    match status {
        "DONE" => status.green(),
        "FAILED" => status.red(),
        "PROCESSING" => status.cyan(),
        _ => status.yellow(),
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

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Create {
            category,
            status,
            search,
        } => {
            let params = json!({
                "category": category,
                "status": status.map(|s| s.to_lowercase()),
                "search": search,
            });

            let result = call_rpc(&cli.rpc_url, "export.create.v1", params).await?;
            let create_result: CreateResult = serde_json::from_value(result)?;

            println!("{}", "✓ Export job created".green().bold());
            println!();

            let table = Table::new(vec![create_result]).to_string();
            println!("{}", table);
        }

        Commands::Run { job_id, output } => {
            let params = json!({
                "job_id": job_id,
                "output_path": output,
            });

            let result = call_rpc(&cli.rpc_url, "export.run.v1", params).await?;

            println!("{}", format!("✓ Export {} running", job_id).green().bold());
            if let Some(path) = result.get("output_path").and_then(|v| v.as_str()) {
                println!("  {} {}", "Output:".bold(), path);
            }
            println!(
                "  {} rowcast watch {}",
                "Follow progress with:".bold(),
                job_id
            );
        }

        Commands::Status { job_id } => {
            let params = json!({ "job_id": job_id });
            let result = call_rpc(&cli.rpc_url, "export.status.v1", params).await?;
            let job: JobSummary = serde_json::from_value(result.clone())?;

            println!("{}", format!("Export job {}", job.job_id).cyan().bold());
            println!();
            println!("  {} {}", "Status:".bold(), colorize_status(&job.status));
            println!(
                "  {} {}/{} ({})",
                "Progress:".bold(),
                job.rows_exported,
                job.total_rows,
                percent(job.rows_exported, job.total_rows)
            );
            println!("  {} {}", "Cursor:".bold(), job.cursor);
            if let Some(filters) = result.get("filters") {
                if filters.as_object().map(|f| !f.is_empty()).unwrap_or(false) {
                    println!("  {} {}", "Filters:".bold(), filters);
                }
            }
        }

        Commands::Watch { job_id, interval } => {
            println!(
                "{}",
                format!("Watching export {}...", job_id).cyan().bold()
            );

            loop {
                let params = json!({ "job_id": job_id });
                let result = call_rpc(&cli.rpc_url, "export.status.v1", params).await?;
                let job: JobSummary = serde_json::from_value(result)?;

                match job.status.as_str() {
                    "DONE" => {
                        println!(
                            "{}",
                            format!("✓ Export complete: {} rows", job.rows_exported)
                                .green()
                                .bold()
                        );
                        break;
                    }
                    "FAILED" => {
                        println!(
                            "{}",
                            format!(
                                "✗ Export failed at {}/{} rows (resumable)",
                                job.rows_exported, job.total_rows
                            )
                            .red()
                            .bold()
                        );
                        break;
                    }
                    status => {
                        println!(
                            "  {} {}/{} ({})",
                            colorize_status(status),
                            job.rows_exported,
                            job.total_rows,
                            percent(job.rows_exported, job.total_rows)
                        );
                    }
                }

                tokio::time::sleep(std::time::Duration::from_secs(interval)).await;
            }
        }

        Commands::Cancel { job_id } => {
            let params = json!({ "job_id": job_id });

            call_rpc(&cli.rpc_url, "export.cancel.v1", params).await?;

            println!(
                "{}",
                format!("✓ Export {} cancelled (resumable)", job_id)
                    .green()
                    .bold()
            );
        }

        Commands::List { status } => {
            let params = json!({
                "status": status.map(|s| s.to_uppercase()),
            });

            let result = call_rpc(&cli.rpc_url, "export.list.v1", params).await?;
            let jobs: Vec<JobSummary> =
                serde_json::from_value(result["jobs"].clone()).unwrap_or_default();

            if jobs.is_empty() {
                println!("{}", "No export jobs found".yellow());
            } else {
                let rows: Vec<JobRow> = jobs.into_iter().map(JobRow::from).collect();
                let table = Table::new(rows).to_string();
                println!("{}", table);
            }
        }

        Commands::Stats => {
            println!("{}", "Daemon Status".cyan().bold());
            println!();

            match call_rpc(&cli.rpc_url, "export.stats.v1", json!({})).await {
                Ok(stats) => {
                    println!("  {} {}", "RPC URL:".bold(), cli.rpc_url);
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!();
                    println!("  {} {}", "Total Jobs:".bold(), stats["total_jobs"]);
                    println!("  {} {}", "Pending:".bold(), stats["pending_jobs"]);
                    println!("  {} {}", "Processing:".bold(), stats["processing_jobs"]);
                    println!("  {} {}", "Done:".bold(), stats["done_jobs"]);
                    println!("  {} {}", "Failed:".bold(), stats["failed_jobs"]);
                    println!();
                    println!(
                        "  {} {}",
                        "Active Exports:".bold(),
                        stats["active_exports"]
                    );
                    println!("  {} {} seconds", "Uptime:".bold(), stats["uptime_seconds"]);
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
