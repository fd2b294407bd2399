use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run remote BLAST searches for every protein in a FASTA file
    Search {
        /// Input FASTA file (may be gzip/bzip2/xz compressed)
        fasta_file: PathBuf,

        /// Directory for progress, logs and results
        #[arg(short = 'o', long = "output-dir", default_value = "web_blast_results")]
        output_dir: PathBuf,

        /// First sequence index to process (0-based)
        #[arg(long, default_value = "0")]
        start: usize,

        /// Maximum number of sequences to process
        #[arg(long)]
        max: Option<usize>,

        /// Concurrent remote searches (1-8, default from config: 6)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Seconds between the first submissions
        #[arg(long)]
        stagger: Option<f64>,

        /// Stop the run after this many hours (0 disables)
        #[arg(long = "timeout-hours")]
        timeout_hours: Option<f64>,

        /// Only process the first 5 sequences
        #[arg(long)]
        test: bool,

        /// Ignore saved progress and start over
        #[arg(long)]
        fresh: bool,

        /// Config file to use instead of the per-user one
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Download a protein dataset from NCBI as FASTA
    Download {
        /// Output FASTA file
        #[arg(short = 'o', long = "output", default_value = "data/syn3A_proteins.fasta")]
        output: PathBuf,

        /// Entrez search term
        #[arg(long, default_value = crate::commands::download::DEFAULT_TERM)]
        term: String,

        /// Maximum number of proteins to fetch
        #[arg(long, default_value_t = crate::commands::download::DEFAULT_RETMAX)]
        retmax: usize,
    },

    /// Write a config file with all defaults
    InitConfig {
        /// Where to write it (default: the per-user config path)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
