//! `membench run` command - Run the bandwidth suite.

use colored::Colorize;
use membench::{BenchConfig, FailureKind, SuiteReport};
use tracing::debug;

use crate::error::CliResult;

use super::{OutputFormat, RunArgs};

/// Execute the `run` command.
///
/// The report is the only thing written to stdout. Status and the failure
/// summary go to stderr.
pub fn execute(args: &RunArgs, quiet: bool) -> CliResult<()> {
    let config = args.resolve_config()?;
    let backend = args.backend()?;
    let ranges = args.ranges()?;
    let format = args.format()?;
    debug!(?config, "resolved configuration");

    if !quiet {
        print_plan(&config, backend.label(), args);
    }

    let report = membench::run_suite(backend, &config, ranges)?;

    match format {
        OutputFormat::Text => print!("{}", report.render_text()),
        OutputFormat::Json => println!("{}", report.to_json()?),
    }

    if !quiet {
        print_summary(&report);
    }

    Ok(())
}

fn print_plan(config: &BenchConfig, backend: &str, args: &RunArgs) {
    eprintln!("{} Running bandwidth suite", "→".bright_cyan());
    eprintln!("  {} Backend: {}", "•".dimmed(), backend.bright_yellow());
    eprintln!(
        "  {} Device: {}",
        "•".dimmed(),
        config.device_index.to_string().bright_yellow()
    );
    eprintln!(
        "  {} Buffer size: {} bytes",
        "•".dimmed(),
        config.transfer_bytes.to_string().bright_yellow()
    );
    eprintln!(
        "  {} Iterations: {} timed, {} transfer",
        "•".dimmed(),
        config.timed_iterations.to_string().bright_yellow(),
        config.transfer_iterations.to_string().bright_yellow()
    );
    eprintln!(
        "  {} Error policy: {}",
        "•".dimmed(),
        config.error_policy.label().bright_yellow()
    );
    if let Some(path) = &args.config {
        eprintln!("  {} Config file: {}", "•".dimmed(), path.display());
    }
}

fn print_summary(report: &SuiteReport) {
    if report.failures.is_empty() {
        eprintln!(
            "{} All {} phases verified",
            "✓".bright_green().bold(),
            report.blocks.len()
        );
        return;
    }

    eprintln!(
        "{} {} failure(s) recorded:",
        "✗".bright_red().bold(),
        report.failures.len()
    );
    for failure in &report.failures {
        let marker = match failure.kind {
            FailureKind::Mismatch => "✗".bright_red(),
            _ => "⚠".yellow(),
        };
        eprintln!(
            "    {} [{}] {}: {}",
            marker,
            failure.kind.label(),
            failure.phase.header().bright_white(),
            failure.message
        );
    }
}
