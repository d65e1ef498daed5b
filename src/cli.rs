use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "argus")]
#[command(about = "A static taint analyzer with a cached security-knowledge librarian")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a file or project for taint flows
    Scan {
        /// Path to scan (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,

        /// JSON findings file from an external pattern scanner
        #[arg(long)]
        findings: Option<String>,

        /// Directory of library-profile JSON files (overrides config)
        #[arg(long)]
        profiles_dir: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "")]
        format: String,

        /// Write the JSON report to this path
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Inspect loaded library security profiles
    Profiles {
        #[command(subcommand)]
        action: ProfilesAction,
    },

    /// Manage the librarian decision cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
pub enum ProfilesAction {
    /// List registered libraries
    List {
        /// Show per-version function counts
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show one library's functions and labels
    Show {
        /// Library name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Show cache size and location
    Stats,

    /// Drop all cached decisions
    Clear,
}
