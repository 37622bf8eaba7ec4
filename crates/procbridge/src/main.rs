mod cmd;
mod exit;
mod logging;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel, LogOptions};

#[derive(Parser, Debug)]
#[command(name = "procbridge", version, about = "procbridge streaming protocol tools")]
struct Cli {
    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        env = "PROCBRIDGE_LOG_LEVEL",
        global = true
    )]
    log_level: LogLevel,

    /// Prefix log lines with timestamps.
    #[arg(long, global = true)]
    log_timestamps: bool,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(LogOptions {
        format: cli.log_format,
        level: cli.log_level,
        timestamps: cli.log_timestamps,
    });

    match cmd::run(cli.command) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
