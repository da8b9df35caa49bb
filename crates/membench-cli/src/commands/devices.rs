//! `membench devices` command - List devices the suite can run on.

use colored::Colorize;
use membench::{cuda_device_count, is_cuda_available, CopyEngine, CpuEngine, CudaEngine};

use crate::error::CliResult;

/// Execute the `devices` command.
pub fn execute() -> CliResult<()> {
    println!("{}:", "Devices".bright_white().underline());
    println!();

    if is_cuda_available() {
        for ordinal in 0..cuda_device_count() {
            match CudaEngine::new(ordinal) {
                Ok(engine) => {
                    let (major, minor) = engine.compute_capability();
                    println!(
                        "  {} {} {} (sm_{}{})",
                        "✓".bright_green(),
                        format!("cuda:{}", ordinal).bright_white(),
                        engine.device_name(),
                        major,
                        minor
                    );
                    engine.reset()?;
                }
                Err(e) => {
                    println!(
                        "  {} {} {}",
                        "✗".bright_red(),
                        format!("cuda:{}", ordinal).bright_white(),
                        e
                    );
                }
            }
        }
    } else if cfg!(feature = "cuda") {
        println!("  {} cuda: no device found", "✗".bright_red());
    } else {
        println!(
            "  {} cuda: not compiled in (enable with --features cuda)",
            "⚠".yellow()
        );
    }

    let cpu = CpuEngine::new(0)?;
    println!(
        "  {} {} {}",
        "✓".bright_green(),
        "cpu:0".bright_white(),
        cpu.device_name()
    );
    cpu.reset()?;

    Ok(())
}
