use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod chat;
pub mod extract;
pub mod history;
pub mod init;
mod render;
pub mod serve;

use crate::ai::chat::TranscriptStore;
use crate::core::{AppConfig, db::async_db};

/// Opens the session store, creating the db if needed.
async fn open_store(db_path: &str) -> Result<TranscriptStore> {
    let db = async_db(db_path).await?;
    let store = TranscriptStore::new(&db);
    store.initialize().await?;
    Ok(store)
}

#[derive(Subcommand)]
enum Command {
    /// Initialize the db
    Init {
        #[arg(long, action, default_value = "false")]
        db: bool,
    },
    /// Run the API server
    Serve {
        /// Set the server host address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Set the server port
        #[arg(long, default_value = "4000")]
        port: String,
    },
    /// Extract the recipe on a web page into a new session
    Extract {
        #[arg(long)]
        url: String,
        /// What to put in the annotation fields, e.g. "convert to metric"
        #[arg(long, default_value = "")]
        annotations: String,
    },
    /// Continue a recipe session interactively
    Chat {
        #[arg(long)]
        session_id: String,
    },
    /// Print the conversation in a session
    History {
        #[arg(long)]
        session_id: String,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();
    let config = AppConfig::default();

    // Handle each sub command
    match args.command {
        Some(Command::Init { db }) => {
            init::run(db, &config.db_path).await?;
        }
        Some(Command::Serve { host, port }) => {
            serve::run(host, port, config).await;
        }
        Some(Command::Extract { url, annotations }) => {
            extract::run(&url, &annotations, &config).await?;
        }
        Some(Command::Chat { session_id }) => {
            chat::run(&session_id, &config).await?;
        }
        Some(Command::History { session_id }) => {
            history::run(&session_id, &config).await?;
        }
        None => {}
    }

    Ok(())
}
