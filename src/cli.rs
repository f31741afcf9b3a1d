use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "orgsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Project directory (defaults to the project containing the current directory)
    #[arg(long = "project", global = true, value_name = "PATH")]
    pub project: Option<PathBuf>,

    /// Tool configuration file (defaults to ~/.orgsync.toml)
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show project settings and subscription
    Info,

    /// List local store entries
    Store {
        /// Only show files changed since the last sync
        #[arg(long = "changed")]
        changed: bool,

        /// Output as JSON
        #[arg(long = "json")]
        json: bool,
    },

    /// Show the org metadata index with the current selections
    Index {
        /// Only show nodes matching this keyword (and their ancestors)
        #[arg(long = "keyword")]
        keyword: Option<String>,

        /// Only show selected nodes
        #[arg(long = "selected")]
        selected: bool,
    },

    /// Subscribe to a metadata type, or to some of its members
    Subscribe {
        #[arg(value_name = "TYPE")]
        type_name: String,

        /// Members to add; none subscribes to every member
        #[arg(value_name = "MEMBERS")]
        members: Vec<String>,
    },

    /// Drop a metadata type, or some of its members, from the subscription
    Unsubscribe {
        #[arg(value_name = "TYPE")]
        type_name: String,

        /// Members to remove; none drops the whole type
        #[arg(value_name = "MEMBERS")]
        members: Vec<String>,
    },

    /// View the synchronization history
    History {
        /// Show only the last N entries
        #[arg(long = "last")]
        last: Option<usize>,

        /// Filter by operation (retrieve, refresh, compile, ...)
        #[arg(long = "operation")]
        operation: Option<String>,

        /// Output as JSON
        #[arg(long = "json")]
        json: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
