pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "rythm")]
#[command(about = "Shared checklist backend with thumb ratings", long_about = None)]
pub struct Cli {
    /// Path to the config file (default: ~/.config/rythm/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server
    Serve {
        /// Address to listen on, overrides the config file
        #[arg(short, long)]
        bind: Option<String>,

        /// SQLite database file, overrides the config file
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Manage user accounts
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Manage todos
    Todo {
        #[command(subcommand)]
        action: TodoAction,
    },
    /// Report todos whose thumb counters disagree with user reactions
    Audit,
}

#[derive(Subcommand)]
pub enum UserAction {
    /// Create an active local account
    Add {
        #[arg(long)]
        email: String,

        #[arg(long)]
        username: String,

        #[arg(long)]
        password: String,

        #[arg(long, default_value = "user")]
        role: String,
    },
}

#[derive(Subcommand)]
pub enum TodoAction {
    /// Import todos from a JSON file for an existing user
    Import {
        /// user_id of the owner
        #[arg(long)]
        owner: String,

        /// JSON file holding an array of todos or `{"todos": [...]}`
        path: PathBuf,
    },
}
