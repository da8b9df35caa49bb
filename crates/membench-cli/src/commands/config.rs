//! `membench config` command - Print or write the effective configuration.

use std::fs;
use std::path::Path;

use colored::Colorize;

use crate::error::{CliError, CliResult};

use super::RunArgs;

/// Execute the `config` command.
///
/// Resolves the configuration exactly as `run` would and prints it as TOML,
/// or writes it to `output`.
pub fn execute(args: &RunArgs, output: Option<&Path>, force: bool) -> CliResult<()> {
    let config = args.resolve_config()?;
    let toml = toml::to_string_pretty(&config)?;

    match output {
        None => print!("{}", toml),
        Some(path) => {
            if path.exists() && !force {
                return Err(CliError::Config(format!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                )));
            }
            fs::write(path, &toml)?;
            eprintln!(
                "{} Wrote configuration to {}",
                "✓".bright_green(),
                path.display().to_string().bright_white()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use membench::BenchConfig;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: RunArgs,
    }

    fn args(argv: &[&str]) -> RunArgs {
        let mut full = vec!["membench"];
        full.extend_from_slice(argv);
        TestCli::try_parse_from(full).unwrap().args
    }

    #[test]
    fn test_written_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("membench.toml");

        execute(&args(&["--size-mb", "2", "-n", "9"]), Some(&path), false).unwrap();

        let loaded = BenchConfig::load(&path).unwrap();
        assert_eq!(loaded.transfer_bytes, 2 * 1024 * 1024);
        assert_eq!(loaded.timed_iterations, 9);
    }

    #[test]
    fn test_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("membench.toml");
        fs::write(&path, "timed_iterations = 1\n").unwrap();

        let result = execute(&args(&[]), Some(&path), false);
        assert!(matches!(result, Err(CliError::Config(_))));
        assert_eq!(fs::read_to_string(&path).unwrap(), "timed_iterations = 1\n");

        execute(&args(&[]), Some(&path), true).unwrap();
        assert!(BenchConfig::load(&path).is_ok());
    }
}
