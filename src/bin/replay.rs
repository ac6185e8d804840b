//! Replay a single trace outside a fuzzing engine.

use anyhow::Context;
use clap::Parser;
use hangover::MAX_INPUT_LEN;
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;

/// Replay one hangover trace against the system allocator.
#[derive(Parser)]
#[command(name = "hangover-replay", version, about)]
struct Cli {
    /// Trace file to read instead of standard input.
    input: Option<PathBuf>,
}

fn read_trace(input: Option<&PathBuf>) -> anyhow::Result<Vec<u8>> {
    let mut data = Vec::with_capacity(MAX_INPUT_LEN);
    let limit = MAX_INPUT_LEN as u64;
    match input {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("opening {}", path.display()))?;
            file.take(limit)
                .read_to_end(&mut data)
                .with_context(|| format!("reading {}", path.display()))?;
        }
        None => {
            io::stdin()
                .lock()
                .take(limit)
                .read_to_end(&mut data)
                .context("reading trace from standard input")?;
        }
    }
    Ok(data)
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
fn main() -> anyhow::Result<()> {
    let _ = env_logger::try_init();
    let cli = Cli::parse();
    let data = read_trace(cli.input.as_ref())?;
    let status = hangover::fuzz_one_input(&data);
    if status < 0 {
        println!("trace rejected (status {}), no finding", status);
    } else {
        println!("trace replayed cleanly");
    }
    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _ = read_trace(cli.input.as_ref())?;
    anyhow::bail!("no system malloc adapter for this platform")
}
