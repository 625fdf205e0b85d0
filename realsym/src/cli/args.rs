//! CLI argument definitions

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "realsym",
    version,
    about = "Resolve ELF symbols from loaded objects without dlsym",
    after_help = "\
EXAMPLES:
    realsym objects '*libc*'                 List loaded objects matching a glob
    realsym resolve getpid -p '*libc.so*'    Resolve a symbol in one object
    realsym bootstrap                        Find the real dlsym (exit 69 on failure)

ENVIRONMENT:
    REALSYM_CANDIDATES   Colon-separated globs replacing the default candidates
    RUST_LOG             Log filter (e.g. RUST_LOG=realsym=debug)"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List shared objects loaded into this process
    Objects {
        /// Only list objects whose path matches this glob
        #[arg(value_name = "PATTERN")]
        pattern: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Resolve a symbol through an ordered list of candidate objects
    Resolve {
        /// Exact symbol name
        #[arg(value_name = "SYMBOL")]
        symbol: String,

        /// Candidate object glob, tried in the order given (default: the dlsym candidates)
        #[arg(short, long = "pattern", value_name = "PATTERN")]
        patterns: Vec<String>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Find the real dlsym, exiting with status 69 if no candidate exports it
    Bootstrap {
        /// Candidate object glob, tried in the order given (default: the dlsym candidates)
        #[arg(short, long = "pattern", value_name = "PATTERN")]
        patterns: Vec<String>,
    },
}
