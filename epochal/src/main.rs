use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;

mod commands;
mod pool;
mod response;
mod store;

use commands::{
    build_index::build_index,
    get_block::get_block,
    get_transaction::get_transaction,
    migrate_magic::migrate_magic,
    stats::{print_archive_report, stats_archive},
    verify_index::verify_index,
};

#[derive(Parser)]
#[command(name = "epochal")]
#[command(about = "Epoch archive indexer and point-lookup tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Read-ahead chunk size in MiB (0 selects the default)
    #[arg(long, default_value_t = 0)]
    chunk_mib: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the signature and slot indexes for an epoch archive
    BuildIndex {
        /// Epoch archive (.car)
        #[arg(short, long)]
        input: PathBuf,
        /// Directory for the sealed index files (defaults to the archive's directory)
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Epoch number recorded in the index headers
        #[arg(long)]
        epoch: u64,
    },

    /// Re-derive every key from the archive and check it against a sealed index
    VerifyIndex {
        /// Epoch archive (.car)
        #[arg(short, long)]
        input: PathBuf,
        /// Index file to verify
        #[arg(long)]
        index: PathBuf,
    },

    /// Rewrite a legacy index format tag in place
    MigrateMagic {
        /// Index file to migrate
        #[arg(long)]
        index: PathBuf,
        /// Report what would change without touching the file
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /// Look up a transaction by signature and print it as JSON
    GetTransaction {
        /// Epoch archive (.car)
        #[arg(short, long)]
        input: PathBuf,
        /// Directory holding the epoch's index files (defaults to the archive's directory)
        #[arg(long)]
        index_dir: Option<PathBuf>,
        /// Epoch number of the archive
        #[arg(long)]
        epoch: u64,
        /// Base58 transaction signature
        signature: String,
    },

    /// Look up a block by slot and print it as JSON
    GetBlock {
        /// Epoch archive (.car)
        #[arg(short, long)]
        input: PathBuf,
        /// Directory holding the epoch's index files (defaults to the archive's directory)
        #[arg(long)]
        index_dir: Option<PathBuf>,
        /// Epoch number of the archive
        #[arg(long)]
        epoch: u64,
        /// Slot number
        slot: u64,
    },

    /// Count sections and bytes per node kind in an archive (.car or .zst)
    Stats {
        /// Epoch archive (.car or .zst)
        #[arg(short, long)]
        input: PathBuf,
        /// Log progress every N sections (0 disables)
        #[arg(long, default_value_t = 1_000_000)]
        progress_every: u64,
    },
}

fn parent_dir(path: &std::path::Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let cli = Cli::parse();
    let chunk_size = cli.chunk_mib << 20;

    match cli.command {
        Commands::BuildIndex {
            input,
            out_dir,
            epoch,
        } => {
            let out_dir = out_dir.unwrap_or_else(|| parent_dir(&input));
            build_index(&input, &out_dir, epoch, chunk_size)
        }
        Commands::VerifyIndex { input, index } => verify_index(&input, &index, chunk_size),
        Commands::MigrateMagic { index, dry_run } => migrate_magic(&index, dry_run),
        Commands::GetTransaction {
            input,
            index_dir,
            epoch,
            signature,
        } => {
            let index_dir = index_dir.unwrap_or_else(|| parent_dir(&input));
            get_transaction(&input, &index_dir, epoch, &signature, chunk_size)
        }
        Commands::GetBlock {
            input,
            index_dir,
            epoch,
            slot,
        } => {
            let index_dir = index_dir.unwrap_or_else(|| parent_dir(&input));
            get_block(&input, &index_dir, epoch, slot, chunk_size)
        }
        Commands::Stats {
            input,
            progress_every,
        } => stats_archive(&input, chunk_size, progress_every).map(|r| print_archive_report(&r)),
    }
}
