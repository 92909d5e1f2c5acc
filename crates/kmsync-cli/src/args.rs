use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "kmsync")]
#[command(about = "Content-addressed checkpoint store and download integrity engine for KOTOR mod installs")]
#[command(version)]
pub struct Cli {
    /// Verbose output (debug-level logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// ManagedRoot directory (default: current directory)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage checkpoint sessions over this ManagedRoot
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Create, list, restore, and validate checkpoints within a session
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },

    /// Reclaim CAS/delta objects unreachable from any live checkpoint
    Gc,

    /// Get or set an engine config key (e.g. checkpoint.anchor_interval)
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Compute or inspect download content identities
    ContentId {
        #[command(subcommand)]
        action: ContentIdAction,
    },

    /// Order mod components for installation from their dependency graph
    Plan {
        /// Path to a JSON file describing components (see `kmsync plan --help`)
        #[arg(long)]
        components: PathBuf,
    },

    /// Generate shell completion script
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum SessionAction {
    /// Start a new session: scans the ManagedRoot and seals the baseline checkpoint
    Start,

    /// List every session for this ManagedRoot
    List,

    /// Mark a session complete, keeping or discarding its checkpoint history
    Complete {
        session_id: String,

        /// Discard the session's checkpoint history instead of keeping it
        #[arg(long)]
        discard: bool,
    },

    /// Remove a completed session and all of its manifests
    Delete { session_id: String },

    /// Validate every checkpoint of a session
    Validate { session_id: String },
}

#[derive(Subcommand)]
pub enum CheckpointAction {
    /// Scan, diff against the session tip, and seal a new checkpoint
    Create {
        /// Human-readable label for the mod/operation this checkpoint records
        component_name: String,

        /// Stable identifier for the mod/operation (defaults to component_name)
        #[arg(long)]
        component_id: Option<String>,
    },

    /// List every checkpoint of a session
    List { session_id: String },

    /// Restore the ManagedRoot to the state recorded at a checkpoint
    Restore { checkpoint_id: String },

    /// Validate a single checkpoint's CAS/delta references and content hashes
    Validate { checkpoint_id: String },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print every config key and its current value
    List,

    /// Print the value of a single config key
    Get { key: String },

    /// Set a config key's value
    Set { key: String, value: String },

    /// Write the default, richly-commented config template if none exists
    Init,
}

#[derive(Subcommand)]
pub enum ContentIdAction {
    /// Compute a content id from a JSON metadata object and a URL
    Compute {
        /// JSON object, e.g. '{"provider":"ds","filePageId":"1313"}'
        metadata_json: String,
        url: String,
    },

    /// Normalize a URL the way content-id computation does, without hashing
    NormalizeUrl { url: String },
}
