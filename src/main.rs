use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use flowtrack::{
    init_telemetry, RemoteWorkflowClient, StartOptions, TrackerConfig,
};

#[derive(Parser)]
#[command(name = "flowtrack")]
#[command(about = "Track remote workflow runs from the command line")]
#[command(long_about = "Flowtrack starts workflow runs on a remote orchestration service and \
                       tracks them to completion. Configure the API endpoint via flowtrack.toml \
                       or FLOWTRACK_-prefixed environment variables.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a workflow run and print its remote-assigned id
    Start {
        /// Name of the workflow to run
        workflow_name: String,
        /// Workflow input as a JSON document
        #[arg(long, default_value = "{}", help = "JSON input passed to the run")]
        input: String,
        /// Remote task queue to start the run on
        #[arg(long, help = "Override the configured task queue")]
        task_queue: Option<String>,
    },
    /// Fetch the current status snapshot of a run
    Status { workflow_id: String },
    /// Fetch the terminal input/output payload of a run
    Result { workflow_id: String },
    /// Request cancellation of a run (idempotent)
    Cancel { workflow_id: String },
    /// Block until a run completes and print its output
    Wait {
        workflow_id: String,
        /// Seconds between status polls
        #[arg(long, help = "Override the configured poll interval")]
        poll_interval: Option<u64>,
        /// Overall wait budget in seconds
        #[arg(long, help = "Override the configured timeout")]
        timeout: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_telemetry()?;

    let cli = Cli::parse();
    let config = TrackerConfig::load().context("failed to load configuration")?;
    let client = RemoteWorkflowClient::new(&config)?;

    match cli.command {
        Commands::Start {
            workflow_name,
            input,
            task_queue,
        } => {
            let input: serde_json::Value =
                serde_json::from_str(&input).context("--input must be valid JSON")?;
            let options = StartOptions { task_queue };
            let workflow_id = client.start_workflow(&workflow_name, input, &options).await?;
            println!("{workflow_id}");
        }
        Commands::Status { workflow_id } => match client.workflow_status(&workflow_id).await? {
            Some(snapshot) => {
                println!("{}: {}", snapshot.workflow_id, snapshot.status.as_str());
            }
            None => {
                println!("{workflow_id}: not found");
            }
        },
        Commands::Result { workflow_id } => {
            let result = client.workflow_result(&workflow_id).await?;
            let output = result.output.unwrap_or(serde_json::Value::Null);
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Cancel { workflow_id } => {
            if client.cancel_workflow(&workflow_id).await? {
                println!("{workflow_id}: cancelled");
            } else {
                println!("{workflow_id}: already stopped");
            }
        }
        Commands::Wait {
            workflow_id,
            poll_interval,
            timeout,
        } => {
            let poll_interval =
                Duration::from_secs(poll_interval.unwrap_or(config.default_poll_interval_secs));
            let timeout = Duration::from_secs(timeout.unwrap_or(config.default_timeout_secs));
            let result = client
                .wait_for_completion(&workflow_id, poll_interval, timeout)
                .await?;
            let output = result.output.unwrap_or(serde_json::Value::Null);
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
