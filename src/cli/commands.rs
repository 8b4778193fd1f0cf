use crate::config::StorageBackend;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "taxmate")]
#[command(author, version, about = "Tax assistant chat with durable local history", long_about = None)]
pub struct Cli {
    /// Storage backend, overriding configuration
    #[arg(long, global = true, value_enum)]
    pub backend: Option<StorageBackend>,

    /// Storage location, overriding configuration
    #[arg(long, global = true)]
    pub path: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send a single chat message
    Chat { prompt: String },

    /// Start an interactive chat session
    Interactive,

    /// Show the saved chat history
    History {
        /// Only show the most recent N messages
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Delete the saved chat history
    Clear,

    /// Ask the coordinator whether storage is reachable
    CheckStorage,

    /// Store the API key and model
    Configure {
        #[arg(long)]
        api_key: String,

        #[arg(long, default_value = "gpt-4o")]
        model: String,
    },

    /// Check the stored API key against the service
    VerifyKey,
}
