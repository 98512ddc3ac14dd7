use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "geolimes",
    about = "Geospatial link discovery between SPARQL datasets",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress all log output
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output (also respects NO_COLOR env var)
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Directory holding cache/, logs/ and output/
    #[arg(long, global = true, env = "GEOLIMES_WORKDIR", default_value = ".")]
    pub workdir: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Materialise both datasets and write the discovered links
    Run {
        /// Path to the JSON link configuration
        #[arg(long, short = 'c')]
        config: PathBuf,

        /// Cache in this SQLite database instead of per-dataset CSV files
        #[arg(long, short = 'd')]
        database: Option<PathBuf>,

        /// Source records per matching work unit
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Matching worker threads (default: available CPUs, at least 2)
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Serve link runs over HTTP (POST /limes)
    Serve {
        /// Cache in this SQLite database instead of per-dataset CSV files
        #[arg(long, short = 'd')]
        database: Option<PathBuf>,

        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8888")]
        listen: SocketAddr,

        /// Matching worker threads (default: available CPUs, at least 2)
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Print the cache fingerprints of both datasets
    Fingerprint {
        /// Path to the JSON link configuration
        #[arg(long, short = 'c')]
        config: PathBuf,
    },
}
