use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;

pub mod echo_worker;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the reference worker that echoes every record back to the host.
    EchoWorker(EchoWorkerArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command) -> CliResult<i32> {
    match command {
        Command::EchoWorker(args) => echo_worker::run(args),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct EchoWorkerArgs {
    /// Buffer the host writes input chunks to.
    #[arg(long, value_name = "FILE")]
    pub input: PathBuf,
    /// Buffer the host reads results from.
    #[arg(long, value_name = "FILE")]
    pub output: PathBuf,
    /// Pull group 0 to completion, then group 1, instead of a single input.
    #[arg(long)]
    pub groups: bool,
    /// Report an error to the host after echoing N records.
    #[arg(long, value_name = "N")]
    pub fail_after: Option<usize>,
    /// Receive timeout in milliseconds.
    #[arg(long, value_name = "MS", default_value_t = 300_000)]
    pub timeout_ms: u64,
    /// Control port of the host, appended by the launcher.
    pub host_port: u16,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
    /// Print as a single JSON object.
    #[arg(long)]
    pub json: bool,
}
