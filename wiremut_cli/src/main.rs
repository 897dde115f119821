use wiremut_core::codec;
use wiremut_core::config::WiremutConfig;
use wiremut_core::diagnostics::{self, hexdump};
use wiremut_core::engine::WireMutator;
use wiremut_core::validator;

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(short, long, value_parser)]
    config_file: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Wrap a raw payload in a length prefix.
    Encode {
        input: PathBuf,
        #[clap(short, long)]
        output: PathBuf,
    },
    /// Strip the length prefix from a wire file.
    Decode {
        input: PathBuf,
        #[clap(short, long)]
        output: PathBuf,
    },
    /// Check that a file is a well-formed wire buffer.
    Validate { input: PathBuf },
    /// Print a hexdump of any file.
    Dump { input: PathBuf },
    /// Run the fuzz phase on a wire file, feeding each result into the next round.
    Mutate {
        input: PathBuf,
        #[clap(short, long, default_value_t = 0)]
        seed: u32,
        #[clap(short, long, default_value_t = 1)]
        rounds: u32,
        #[clap(short, long, default_value_t = 1 << 20)]
        max_size: usize,
        #[clap(short, long)]
        output: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> Result<WiremutConfig, anyhow::Error> {
    match path {
        Some(config_path) => {
            println!("Loading configuration from specified path: {config_path:?}");
            WiremutConfig::load_from_file(config_path)
        }
        None => WiremutConfig::from_env(),
    }
}

fn read_input(path: &Path) -> Result<Vec<u8>, anyhow::Error> {
    std::fs::read(path).with_context(|| format!("Failed to read input file {path:?}"))
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<(), anyhow::Error> {
    std::fs::write(path, bytes).with_context(|| format!("Failed to write output file {path:?}"))
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    let config = load_config(cli.config_file.as_deref())?;
    diagnostics::init_logging(LevelFilter::from(config.diagnostics.level));

    match cli.command {
        Command::Encode { input, output } => {
            let payload = read_input(&input)?;
            if payload.len() + codec::HEADER_SIZE > validator::MAX_WIRE_SIZE {
                anyhow::bail!(
                    "Payload of {} bytes is too large to encode",
                    payload.len()
                );
            }
            let mut wire = Vec::new();
            let written = codec::encode(&payload, &mut wire);
            write_output(&output, &wire)?;
            println!("Encoded {} payload bytes into {written} wire bytes", payload.len());
        }
        Command::Decode { input, output } => {
            let wire = read_input(&input)?;
            validator::validate(&wire).with_context(|| format!("{input:?} is not a valid wire buffer"))?;
            let payload = codec::payload(&wire);
            write_output(&output, payload)?;
            println!("Decoded {} payload bytes", payload.len());
        }
        Command::Validate { input } => {
            let wire = read_input(&input)?;
            let declared = validator::validate(&wire)
                .with_context(|| format!("{input:?} is not a valid wire buffer"))?;
            println!("{input:?}: valid, payload of {declared} bytes");
        }
        Command::Dump { input } => {
            let bytes = read_input(&input)?;
            print!("{}", hexdump(&bytes));
        }
        Command::Mutate {
            input,
            seed,
            rounds,
            max_size,
            output,
        } => {
            let mut wire = read_input(&input)?;
            let mut engine = WireMutator::new(seed, &config)?;
            for round in 0..rounds {
                let mutated = engine
                    .try_fuzz(&wire, max_size)
                    .with_context(|| format!("Round {round} produced no output"))?;
                wire = mutated.to_vec();
                println!(
                    "Round {round}: {} ({} bytes)",
                    engine.describe().unwrap_or_default(),
                    wire.len()
                );
                print!("{}", hexdump(&wire));
            }
            if let Some(path) = output {
                write_output(&path, &wire)?;
            }
        }
    }

    Ok(())
}
