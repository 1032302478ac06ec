use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, INTERNAL};
use crate::output::OutputFormat;

pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a WebSocket echo server.
    Serve(ServeArgs),
    /// Send a single frame.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Runtime for the async commands.
pub(crate) fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("failed to start runtime: {err}")))
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on, e.g. 127.0.0.1:9000.
    pub addr: SocketAddr,
    /// JSON settings file.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Outbound queue capacity per connection.
    #[arg(long, value_name = "N")]
    pub queue_capacity: Option<usize>,
    /// Idle time after which a connection is closed (e.g. 60s, 500ms).
    #[arg(long, value_name = "DURATION")]
    pub heartbeat: Option<String>,
    /// Dispatcher workers. 0 handles each message on its own task.
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,
    /// Maximum live connections. 0 means unlimited.
    #[arg(long, value_name = "N")]
    pub max_connections: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// WebSocket URL to connect to, e.g. ws://127.0.0.1:9000.
    pub url: String,
    /// Protocol id written into the frame header.
    #[arg(long, short = 'p')]
    pub protocol_id: u32,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Wait for one response frame and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the response when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
