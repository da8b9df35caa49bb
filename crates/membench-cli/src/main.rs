//! membench CLI - Host/device memory bandwidth profiler.
//!
//! # Commands
//!
//! - `membench [run]` - Run the five-phase bandwidth suite (default)
//! - `membench devices` - List devices the suite can run on
//! - `membench config` - Print or write the effective configuration
//! - `membench completions <shell>` - Generate shell completions
//!
//! # Examples
//!
//! ```bash
//! # Default suite: 16 MiB buffers on device 0
//! membench
//!
//! # 64 MiB buffers on the second GPU, JSON output
//! membench --device 1 --size-mb 64 --format json
//!
//! # Capture a timeline with NVTX ranges
//! nsys profile membench --ranges nvtx
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod commands;
mod error;

use commands::{config, devices, run, RunArgs};
use error::CliResult;

/// membench - pageable, pinned and device-to-device memcpy bandwidth
#[derive(Parser)]
#[command(name = "membench")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors and the report
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(flatten)]
    run: RunArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bandwidth suite (default when no command is given)
    Run(RunArgs),

    /// List devices the suite can run on
    Devices,

    /// Print or write the effective configuration as TOML
    Config {
        #[command(flatten)]
        run: RunArgs,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing output file
        #[arg(long)]
        force: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn setup_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn print_banner() {
    eprintln!(
        "{}",
        r#"
                           _                     _
  _ __ ___   ___ _ __ ___ | |__   ___ _ __   ___| |__
 | '_ ` _ \ / _ \ '_ ` _ \| '_ \ / _ \ '_ \ / __| '_ \
 | | | | | |  __/ | | | | | |_) |  __/ | | | (__| | | |
 |_| |_| |_|\___|_| |_| |_|_.__/ \___|_| |_|\___|_| |_|
"#
        .bright_cyan()
    );
    eprintln!(
        "  {} {}\n",
        "Host/Device Memory Bandwidth Profiler".bright_white(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}

fn dispatch(cli: Cli) -> CliResult<()> {
    match cli.command {
        None => run::execute(&cli.run, cli.quiet),

        Some(Commands::Run(args)) => run::execute(&args, cli.quiet),

        Some(Commands::Devices) => devices::execute(),

        Some(Commands::Config { run, output, force }) => {
            config::execute(&run, output.as_deref(), force)
        }

        Some(Commands::Completions { shell }) => {
            use clap::CommandFactory;
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "membench",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let show_banner = !cli.quiet
        && matches!(cli.command, None | Some(Commands::Run(_)) | Some(Commands::Devices));
    if show_banner {
        print_banner();
    }

    match dispatch(cli).map_err(|e| e.with_feature_hint()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
