//! Command-line surface (spec §6): one `clap` derive tree covering every
//! subcommand the CLI supports. Argument parsing only — behavior lives in
//! `commands`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Local, privacy-preserving file organizer and semantic search index.
#[derive(Parser)]
#[command(name = "file-assistant", version, about, long_about = None)]
pub struct Cli {
    /// Path to a config file (YAML). Defaults to the platform config dir.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Initialize persistence and write a default config if none exists.
    Init {
        /// Override the relational database path for this run.
        #[arg(long)]
        db_path: Option<PathBuf>,
    },

    /// Print file counts by status and the active configuration.
    Status,

    /// Inspect or edit the active configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Watch inbox folders and stream detected files until interrupted.
    Watch {
        /// Folder to watch; repeatable. Defaults to `inbox_folders` from config.
        #[arg(long = "folder")]
        folders: Vec<PathBuf>,
    },

    /// Extract and print metadata (and optionally content) for one file.
    Analyze {
        path: PathBuf,

        /// Print the full extracted content instead of just a preview.
        #[arg(long)]
        show_content: bool,

        /// Preview length in characters (default matches the analyzer's own).
        #[arg(long)]
        preview_length: Option<usize>,
    },

    /// Render the folder tree rooted at `path`.
    Scan {
        path: PathBuf,

        /// Descend into subdirectories rather than listing one level.
        #[arg(long)]
        recursive: bool,
    },

    /// Run a single file through the full pipeline: analyze, classify, decide.
    Process { path: PathBuf },

    /// Run the watcher and processor together until interrupted.
    Run {
        /// Folder to watch; repeatable. Defaults to `inbox_folders` from config.
        #[arg(long = "folder")]
        folders: Vec<PathBuf>,
    },

    /// Bulk-index a directory tree into the vector store.
    Index {
        path: PathBuf,

        /// Descend into subdirectories. Default: on.
        #[arg(long)]
        recursive: bool,

        /// Index only the top-level directory.
        #[arg(long)]
        no_recursive: bool,

        /// Re-embed even if the content hash already matches what's indexed.
        #[arg(long)]
        force: bool,

        /// Report what would be indexed without writing to the vector store.
        #[arg(long)]
        dry_run: bool,

        /// Skip files larger than this many megabytes.
        #[arg(long)]
        max_size: Option<u64>,
    },

    /// Semantic search over the indexed corpus.
    Search {
        /// Query text; multiple words are joined with spaces.
        #[arg(required = true)]
        query: Vec<String>,

        /// Restrict to these extensions (comma-separated, e.g. "pdf,md").
        #[arg(long = "type", value_delimiter = ',')]
        file_type: Vec<String>,

        /// Only files modified on/after this date (YYYY-MM-DD).
        #[arg(long)]
        after: Option<String>,

        /// Only files modified on/before this date (YYYY-MM-DD).
        #[arg(long)]
        before: Option<String>,

        /// Restrict to files carrying this tag; repeatable.
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Maximum number of results.
        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Emit results as a JSON array.
        #[arg(long)]
        json: bool,

        /// Emit one compact line per result instead of the full listing.
        #[arg(long)]
        compact: bool,
    },

    /// List recent reversible actions.
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Reverse a previously recorded move.
    Undo { action_id: i64 },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the active configuration as YAML.
    Show,
    /// Open the config file in `$EDITOR` (or print its path if unset).
    Edit,
}
