//! Command-line interface definition for ragchat
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for authentication, document management, and chat.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ragchat - chat with your documents
///
/// Upload a PDF, TXT, or MD file to a RAG backend and ask questions
/// about it from the terminal.
#[derive(Parser, Debug, Clone)]
#[command(name = "ragchat")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Backend base URL (overrides config and RAGCHAT_API_URL)
    #[arg(long)]
    pub api_url: Option<String>,

    /// Session database path (overrides config and RAGCHAT_STORAGE_PATH)
    #[arg(long)]
    pub storage_path: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for ragchat
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Sign in with email and password
    Login {
        /// Account email
        #[arg(short, long)]
        email: String,

        /// Account password (prompted when omitted)
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Create an account and sign in
    Signup {
        /// Account email
        #[arg(short, long)]
        email: String,

        /// Full name
        #[arg(short, long)]
        name: String,

        /// Account password (prompted when omitted)
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Sign in with Google
    ///
    /// Without `--code` the authorization page is opened in the browser.
    /// Pass the code from the callback URL to finish signing in.
    GoogleLogin {
        /// Authorization code from the callback URL
        #[arg(long)]
        code: Option<String>,
    },

    /// Sign out and forget the stored token
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Manage uploaded documents
    Documents {
        /// Document subcommand
        #[command(subcommand)]
        command: DocumentCommand,
    },

    /// Upload a document and show a preview
    Upload {
        /// File to upload (.pdf, .txt, .md)
        path: PathBuf,
    },

    /// Ask a single question about an uploaded document
    Ask {
        /// Id of the document to ask about
        #[arg(short, long)]
        document_id: i64,

        /// Question text
        question: String,
    },

    /// Start an interactive chat session
    Chat {
        /// Upload this file before the first question
        #[arg(short, long)]
        document: Option<PathBuf>,
    },
}

/// Document management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum DocumentCommand {
    /// List uploaded documents
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Delete a document
    Delete {
        /// Document id
        id: i64,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            json_logs: false,
            api_url: None,
            storage_path: None,
            command: Commands::Whoami,
        }
    }
}
