//! CLI entrypoint for the tinypool harness.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tinypool_core::ValidationMode;
use tinypool_harness::structured_log::LogEmitter;
use tinypool_harness::{SCENARIOS, StressConfig, TraceFile, replay, run_scenario, run_stress};

/// Verification tooling for the tinypool allocator.
#[derive(Debug, Parser)]
#[command(name = "tinypool-harness")]
#[command(about = "Trace replay, stress and scenario checks for tinypool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay a JSON operation trace and print lifecycle records as JSONL.
    Replay {
        /// Trace JSON path.
        #[arg(long)]
        trace: PathBuf,
        /// Write lifecycle JSONL here instead of stdout.
        #[arg(long)]
        log: Option<PathBuf>,
        /// Write the step report JSON here.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Run a deterministic randomized workload and print a JSON summary.
    Stress {
        #[arg(long, default_value_t = 10_000)]
        ops: usize,
        #[arg(long, default_value_t = 0x5eed)]
        seed: u64,
        /// Largest request size.
        #[arg(long, default_value_t = 256)]
        max_size: usize,
        /// Validation mode (strict or hardened).
        #[arg(long, default_value = "strict")]
        mode: String,
        /// Refuse one system request every N steps (0 disables).
        #[arg(long, default_value_t = 0)]
        fail_every: usize,
    },
    /// Run a named scenario, or `all`.
    Scenario {
        name: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Replay { trace, log, report } => {
            let trace = TraceFile::from_file(&trace)?;
            let result = replay(&trace)?;
            let mut emitter = match log {
                Some(path) => LogEmitter::to_file(&path)?,
                None => LogEmitter::to_stdout(),
            };
            emitter.emit_all(&result.logs)?;
            emitter.flush()?;
            if let Some(path) = report {
                std::fs::write(&path, serde_json::to_string_pretty(&result)?)?;
                eprintln!("Wrote replay report to {}", path.display());
            }
            eprintln!(
                "Replayed {} steps ({} allocator errors), heap_size={}",
                result.steps.len(),
                result.errors(),
                result.summary.heap_size
            );
        }
        Command::Stress {
            ops,
            seed,
            max_size,
            mode,
            fail_every,
        } => {
            let config = StressConfig {
                ops,
                seed,
                max_size,
                validation: ValidationMode::from_str_loose(&mode),
                fail_every,
            };
            let summary = run_stress(&config)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Scenario { name } => {
            let names: Vec<&str> = if name == "all" {
                SCENARIOS.to_vec()
            } else {
                vec![name.as_str()]
            };
            let mut failed = Vec::new();
            for scenario in names {
                let report = run_scenario(scenario)?;
                println!("{}", serde_json::to_string(&report)?);
                if !report.passed {
                    failed.push(report.name);
                }
            }
            if !failed.is_empty() {
                return Err(format!("scenarios failed: {}", failed.join(", ")).into());
            }
        }
    }

    Ok(())
}
