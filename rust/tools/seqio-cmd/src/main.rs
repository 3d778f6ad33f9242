use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod logger;
mod utils;

use commands::WriterArgs;

#[derive(Parser)]
#[command(name = "seqio-cmd")]
#[command(about = "Command-line utility for unbuffered sequential file I/O")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a file of pseudo-random bytes and report throughput and checksum
    Write {
        /// Output file (created or truncated)
        path: PathBuf,

        /// Number of bytes to write
        #[arg(long)]
        size: u64,

        /// Seed of the generated data
        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Length of each write call
        #[arg(long, default_value_t = 1024 * 1024)]
        block_size: usize,

        #[command(flatten)]
        writer: WriterArgs,
    },

    /// Copy a file through the cached reader and the direct writer
    Copy {
        /// Source file
        source: PathBuf,

        /// Destination file (created or truncated)
        destination: PathBuf,

        /// Read cache size
        #[arg(long, default_value_t = 4 * 1024 * 1024)]
        read_cache_size: usize,

        #[command(flatten)]
        writer: WriterArgs,
    },

    /// Print the size and xxh3-64 checksum of a file
    Checksum {
        /// File to scan
        path: PathBuf,

        /// Read cache size
        #[arg(long, default_value_t = 4 * 1024 * 1024)]
        cache_size: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::initialize_logger(cli.verbose);

    match cli.command {
        Commands::Write {
            path,
            size,
            seed,
            block_size,
            writer,
        } => commands::write::run(path, size, seed, block_size, &writer),
        Commands::Copy {
            source,
            destination,
            read_cache_size,
            writer,
        } => commands::copy::run(source, destination, read_cache_size, &writer),
        Commands::Checksum { path, cache_size } => commands::checksum::run(path, cache_size),
    }
}
