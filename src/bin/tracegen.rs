//! Emit a random trace for a seed corpus.

use anyhow::Context;
use clap::Parser;
use hangover::tracegen::{self, GeneratorOptions};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

/// Generate a random hangover trace.
#[derive(Parser)]
#[command(name = "hangover-tracegen", version, about)]
struct Cli {
    /// Number of operation codes after the seed.
    #[arg(long, short = 'n', default_value_t = 65536)]
    ops: usize,

    /// Generator seed; drawn from the OS when omitted.
    #[arg(long, short = 's')]
    seed: Option<u64>,

    /// Include memalign (`A`) operations.
    #[arg(long, short = 'a')]
    aligned: bool,

    /// Never free or realloc unless an allocation is certainly live.
    #[arg(long, short = 'w')]
    well_formed: bool,

    /// Write to this file instead of standard output.
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let _ = env_logger::try_init();
    let cli = Cli::parse();
    let options = GeneratorOptions {
        ops: cli.ops,
        aligned: cli.aligned,
        well_formed: cli.well_formed,
    };
    let seed = cli.seed.unwrap_or_else(rand::random);
    log::info!("generating {} ops from generator seed {}", options.ops, seed);
    let trace = tracegen::generate_seeded(seed, &options);

    match cli.output {
        Some(path) => File::create(&path)
            .and_then(|mut file| file.write_all(&trace))
            .with_context(|| format!("writing {}", path.display()))?,
        None => io::stdout()
            .lock()
            .write_all(&trace)
            .context("writing trace to standard output")?,
    }
    Ok(())
}
