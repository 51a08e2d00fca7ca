use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dreamlog", version, about = "Dream journal with hierarchical tags and sync")]
pub struct Cli {
    /// Journal directory (defaults to the nearest .dreamlog, then the user data dir)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
    /// Shared directory acting as the remote document store
    #[arg(long, global = true)]
    pub remote_dir: Option<PathBuf>,
    /// Account the remote documents belong to
    #[arg(long, global = true)]
    pub owner: Option<String>,
    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a journal in the current directory
    Init,
    /// List entries in the current order
    List {
        /// Only entries carrying this tag or a tag beneath it
        #[arg(long)]
        tag: Option<String>,
        /// Only favorites
        #[arg(long)]
        favorites: bool,
    },
    /// Record a dream
    Add {
        /// Title of the entry
        title: String,
        /// What happened
        #[arg(long)]
        description: Option<String>,
        /// Tag path such as People/Joe (repeatable)
        #[arg(long = "tag", short = 't')]
        tags: Vec<String>,
        /// Mark as favorite
        #[arg(long)]
        favorite: bool,
        /// When it was dreamt, YYYY.MM.DD@hh:mm
        #[arg(long)]
        at: Option<String>,
    },
    /// Edit an entry (by list position, id or id prefix)
    Edit {
        entry: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Replace tags (repeatable)
        #[arg(long = "tag", short = 't')]
        tags: Vec<String>,
        /// Remove every tag
        #[arg(long)]
        clear_tags: bool,
    },
    /// Toggle the favorite flag
    Fav { entry: String },
    /// Delete an entry
    Rm { entry: String },
    /// Show the tag tree with entry counts
    Tags,
    /// Rename a tag and everything beneath it
    RenameTag { old: String, new: String },
    /// Remove a tag and everything beneath it from all entries
    DropTag { path: String },
    /// Move the entry at one list position to another (1-based)
    Move { from: usize, to: usize },
    /// Cycle manual -> newest -> oldest, or set a mode directly
    Sort { mode: Option<String> },
    /// Show only entries under a tag; no argument clears the filter
    Filter { tag: Option<String> },
    /// Reconcile with the remote store now
    Sync,
}
