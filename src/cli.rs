use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the recommendation service.
    Daemon {},

    /// Print recommendations for a user as json
    Recommend {
        /// User id
        #[clap(short, long)]
        user: String,

        /// Number of books, defaults to `recommend.default_count`
        #[clap(short = 'n', long)]
        count: Option<usize>,

        /// Comma separated genres, e.g. "fantasy,sci-fi"
        #[clap(short, long)]
        genres: Option<String>,
    },

    /// Record that a user liked a book
    Like {
        #[clap(short, long)]
        user: String,

        #[clap(short, long)]
        book: u64,
    },

    /// Record that a user passed on a book
    Pass {
        #[clap(short, long)]
        user: String,

        #[clap(short, long)]
        book: u64,
    },

    /// Print a user's likes and passes
    History {
        #[clap(short, long)]
        user: String,
    },

    /// Embed the catalog and write the vector file.
    BuildIndex {
        /// Catalog csv, defaults to the configured catalog
        #[clap(short, long)]
        catalog: Option<PathBuf>,

        /// Output file, defaults to the configured vectors file
        #[clap(short, long)]
        output: Option<PathBuf>,
    },
}
