use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "argus", about = "Argus surveillance daemon CLI")]
struct Cli {
    /// Base URL of the running daemon.
    #[arg(long, default_value = "http://127.0.0.1:5000")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a gallery image or a PDF dossier of faces
    Upload {
        /// File to upload (.jpg/.jpeg/.png/.pdf)
        path: PathBuf,
    },
    /// Start the camera feed loop
    Start,
    /// Print the event log
    Logs {
        /// Show only rows with role CRIMINAL
        #[arg(long)]
        criminal: bool,
        /// Poll and re-print every N seconds
        #[arg(long, value_name = "SECS")]
        watch: Option<u64>,
    },
    /// Show daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Upload { path } => {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let filename = path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("upload")
                .to_string();

            let form = reqwest::multipart::Form::new()
                .part("file", reqwest::multipart::Part::bytes(bytes).file_name(filename));

            let body: serde_json::Value = client
                .post(format!("{}/upload_file", cli.server))
                .multipart(form)
                .send()
                .await
                .context("daemon unreachable")?
                .json()
                .await?;
            println!("{}", body["message"].as_str().unwrap_or("uploaded"));
        }
        Commands::Start => {
            let body: serde_json::Value = client
                .get(format!("{}/start_feed", cli.server))
                .send()
                .await
                .context("daemon unreachable")?
                .json()
                .await?;
            println!("{}", body["message"].as_str().unwrap_or("started"));
        }
        Commands::Logs { criminal, watch } => loop {
            let rows: Vec<serde_json::Value> = client
                .get(format!("{}/get_logs", cli.server))
                .send()
                .await
                .context("daemon unreachable")?
                .json()
                .await?;

            print_rows(&rows, criminal);

            match watch {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => break,
            }
        },
        Commands::Status => {
            let body: serde_json::Value = client
                .get(format!("{}/healthz", cli.server))
                .send()
                .await
                .context("daemon unreachable")?
                .json()
                .await?;
            let running = body["feed_running"].as_bool().unwrap_or(false);
            println!(
                "daemon: {}  feed: {}",
                body["status"].as_str().unwrap_or("unknown"),
                if running { "running" } else { "idle" }
            );
        }
    }

    Ok(())
}

fn print_rows(rows: &[serde_json::Value], criminal_only: bool) {
    let mut shown = 0usize;
    for row in rows {
        let role = row["role"].as_str().unwrap_or("");
        if criminal_only && role != "CRIMINAL" {
            continue;
        }
        println!(
            "{}  {:<24} {:<9} {}",
            row["timestamp"].as_str().unwrap_or(""),
            row["identity"].as_str().unwrap_or(""),
            role,
            row["activity"].as_str().unwrap_or(""),
        );
        shown += 1;
    }
    if shown == 0 {
        println!("(no events)");
    }
}
