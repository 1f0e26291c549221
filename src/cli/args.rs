use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Sidekick CLI - push commits through the GitHub API and apply AI-proposed patches
#[derive(Parser)]
#[command(name = "sidekick")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory holding config.json and session.json. Defaults to ~/.sidekick
    #[arg(long, global = true, env = "SIDEKICK_CONFIG_DIR")]
    pub config_dir: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Store a GitHub access token
    Login {
        /// Token to store (prompted for if absent)
        #[arg(long)]
        token: Option<String>,

        /// Do not open the token page in a browser
        #[arg(long)]
        no_browser: bool,
    },
    /// Remove the stored token
    Logout,
    /// Show where the active token comes from
    Status,
    /// Push a local branch to GitHub through the Git Data API
    Push {
        /// Remote whose URL names the GitHub repository
        remote: Option<String>,

        /// Branch to push (defaults to the checked-out branch)
        branch: Option<String>,

        /// Allow rewriting the remote branch
        #[arg(short, long)]
        force: bool,

        /// Repository directory (auto-detects git root if absent)
        #[arg(short = 'C', long)]
        repo: Option<String>,
    },
    /// Apply the edits proposed in an AI response to the working tree
    Apply {
        /// File holding the response; reads stdin if absent or "-"
        response: Option<PathBuf>,

        /// Workspace root (auto-detects git root if absent)
        #[arg(short = 'w', long)]
        workspace_root: Option<String>,

        /// Report what would change without writing files
        #[arg(long)]
        dry_run: bool,
    },
    /// Check an AI response for malformed edit markers
    Validate {
        /// File holding the response; reads stdin if absent or "-"
        response: Option<PathBuf>,
    },
}
