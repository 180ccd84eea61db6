pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "estuary")]
#[command(about = "A multi-user RSS/Atom aggregation service", long_about = None)]
pub struct Cli {
    /// Configuration file (default: ~/.config/estuary/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the service: periodic sync and the admin socket
    Serve,
    /// Manage users through the admin socket of a running service
    Admin {
        /// Admin socket path (default: admin.socketPath from the config)
        #[arg(short, long)]
        socket: Option<PathBuf>,

        #[command(subcommand)]
        action: AdminAction,
    },
    /// Import or export a user's subscriptions as OPML
    Opml {
        #[command(subcommand)]
        action: OpmlAction,
    },
    /// Print an annotated configuration file
    ConfigTemplate,
}

#[derive(Subcommand)]
pub enum AdminAction {
    /// Create a user
    NewUser { username: String, password: String },
    /// Delete a user and everything it owns
    DeleteUser { user_id: String },
    /// List users
    Users {
        #[arg(short, long, default_value_t = 100)]
        limit: usize,
    },
    /// Change a user's name
    RenameUser { user_id: String, new_name: String },
    /// Change a user's password
    SetPassword { user_id: String, password: String },
    /// Look up a user's id by name
    UserId { username: String },
}

#[derive(Subcommand)]
pub enum OpmlAction {
    /// Write a user's subscriptions as OPML
    Export {
        /// Username
        #[arg(short, long)]
        user: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Subscribe a user to the feeds of an OPML file
    Import {
        /// Username
        #[arg(short, long)]
        user: String,

        /// Path to the OPML file
        path: PathBuf,
    },
}
