//! wirelesshex CLI - upload Intel-HEX firmware images over a gateway node.
//!
//! The gateway node sits on a serial port and relays the image over its
//! radio to the target node. This tool speaks the serial side of the FLX
//! protocol: handshake, one acknowledged line per HEX record, then the
//! end-of-transfer handshake.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::debug;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

mod commands;

use commands::{check, ports, upload};

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Check if progress animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// CLI-level failures with dedicated exit codes.
#[derive(Debug, Error)]
enum CliError {
    /// The gateway or target rejected the transfer.
    #[error("{0}")]
    Transfer(String),
    /// Interrupted by the user (Ctrl-C).
    #[error("interrupted")]
    Cancelled,
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            Self::Transfer(_) => 1,
            Self::Cancelled => 130,
        }
    }
}

/// wirelesshex - upload firmware images to remote nodes over the air.
///
/// Environment variables:
///   WIRELESSHEX_PORT   - Default serial port of the gateway node
///   WIRELESSHEX_BAUD   - Default baud rate (default: 115200)
#[derive(Parser)]
#[command(name = "wirelesshex")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Serial port of the gateway node.
    #[arg(short, long, global = true, env = "WIRELESSHEX_PORT")]
    port: Option<String>,

    /// Baud rate of the gateway serial link.
    #[arg(
        short,
        long,
        global = true,
        default_value = "115200",
        env = "WIRELESSHEX_BAUD"
    )]
    baud: u32,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Upload an Intel-HEX image through the gateway to a target node.
    Upload {
        /// Path to the Intel-HEX image file.
        file: PathBuf,

        /// Overall handshake/session timeout in milliseconds.
        #[arg(long, default_value = "3000")]
        timeout_ms: u64,

        /// Per-record acknowledgement timeout in milliseconds.
        #[arg(long, default_value = "1000")]
        ack_timeout_ms: u64,

        /// Retries per record before giving up.
        #[arg(long, default_value = "10")]
        retries: u32,
    },

    /// Validate an Intel-HEX image file without touching any hardware.
    Check {
        /// Path to the Intel-HEX image file.
        file: PathBuf,
    },

    /// List available serial ports.
    ListPorts,
}

fn main() {
    match run() {
        Ok(()) => {},
        Err(e) => {
            eprintln!("{} {e:#}", console::style("Error:").red().bold());
            let code = e
                .downcast_ref::<CliError>()
                .map_or(1, CliError::exit_code);
            std::process::exit(code);
        },
    }
}

fn run() -> Result<()> {
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "wirelesshex v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    // Ctrl-C flips a flag that the transfer loops poll between records.
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&interrupted);
        let checker = Arc::clone(&interrupted);
        wirelesshex::set_interrupt_checker(move || checker.load(Ordering::Relaxed));
        ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
            .context("failed to install Ctrl-C handler")?;
    }

    match &cli.command {
        Commands::Upload {
            file,
            timeout_ms,
            ack_timeout_ms,
            retries,
        } => {
            let options = upload::UploadOptions {
                timeout: std::time::Duration::from_millis(*timeout_ms),
                ack_timeout: std::time::Duration::from_millis(*ack_timeout_ms),
                retries: *retries,
            };
            upload::cmd_upload(&cli, file, &options, &interrupted)
        },
        Commands::Check { file } => check::cmd_check(&cli, file),
        Commands::ListPorts => {
            ports::cmd_list_ports();
            Ok(())
        },
    }
}

/// Get the gateway serial port from CLI args or fail with a hint.
fn get_port(cli: &Cli) -> Result<String> {
    cli.port.clone().context(
        "no serial port specified; use --port or WIRELESSHEX_PORT \
         (see `wirelesshex list-ports`)",
    )
}
