//! powerctl - command-line client for powerwardd
//!
//! Talks to the daemon over its Unix socket.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use powerward_api::{Command, EventPayload, ResponsePayload};
use powerward_ipc::IpcClient;
use powerward_util::default_socket_path;
use std::path::PathBuf;

mod output;

/// powerctl - Inspect and drive the powerward daemon
#[derive(Debug, Parser)]
#[command(name = "powerctl")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Daemon socket (or set POWERWARD_SOCKET env var)
    #[arg(short, long, global = true, env = "POWERWARD_SOCKET", default_value_os_t = default_socket_path())]
    socket: PathBuf,

    /// Print raw JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show believed and desired power state
    Status,

    /// Start the power-on procedure now
    On,

    /// Start the power-off procedure now
    Off,

    /// Probe the host; exits 1 when unreachable
    Reachable,

    /// Show daemon health
    Health,

    /// Stream transition events until interrupted
    Watch,
}

impl Cli {
    async fn run(self) -> Result<()> {
        let mut client = IpcClient::connect(&self.socket)
            .await
            .with_context(|| format!("Cannot connect to powerwardd at {:?}", self.socket))?;

        let command = match self.command {
            Commands::Status => Command::GetState,
            Commands::On => Command::PowerOn,
            Commands::Off => Command::PowerOff,
            Commands::Reachable => Command::QueryReachable,
            Commands::Health => Command::GetHealth,
            Commands::Watch => return watch(client, self.json).await,
        };

        let payload = client.call(command).await.context("Request failed")?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&payload)?);
        } else {
            println!("{}", output::render_payload(&payload, powerward_util::now()));
        }

        if let ResponsePayload::Reachable { reachable: false } = payload {
            std::process::exit(1);
        }
        Ok(())
    }
}

async fn watch(client: IpcClient, json: bool) -> Result<()> {
    let mut events = client.subscribe().await.context("Subscribe failed")?;

    loop {
        let event = events.next().await.context("Event stream ended")?;
        if json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            println!("{}", output::render_event(&event));
        }
        if matches!(event.payload, EventPayload::Shutdown) {
            return Ok(());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = cli.run().await {
        eprintln!("powerctl: {:#}", e);
        std::process::exit(2);
    }

    Ok(())
}
