use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{error, info};

use mailfetch::commands::{self, AttachmentsReply, QueryArgs};
use mailfetch::{load_config, telemetry, MailEngine, MailfetchError};

#[derive(Parser)]
#[command(name = "mailfetch", version, about = "Search a mailbox and fetch attachments")]
struct Cli {
    /// JSON config file
    #[arg(short, long, env = "MAILFETCH_CONFIG", default_value = "mailfetch.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search messages whose subject or body contains any keyword
    Query {
        /// Comma-separated keywords
        keywords: String,
        /// IMAP search criteria (e.g. UNSEEN, ALL)
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        folder: Option<String>,
    },
    /// Save the attachments of one message
    Attachments {
        id: Option<String>,
        #[arg(long)]
        folder: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("mailfetch: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), MailfetchError> {
    let config = load_config(&cli.config)?;
    telemetry::init_logging(&config.log_level)?;
    info!("Starting mailfetch v{}", env!("CARGO_PKG_VERSION"));

    let engine = MailEngine::new(&config)?;

    match cli.command {
        Commands::Query {
            keywords,
            status,
            folder,
        } => {
            let args = QueryArgs {
                keywords,
                status,
                folder,
            };
            println!("{}", commands::query(&engine, &args).await);
        }
        Commands::Attachments { id, folder } => {
            let reply = commands::fetch_attachments(&engine, id.as_deref(), folder.as_deref()).await;
            println!("{}", reply.text());
            if let AttachmentsReply::Delivered { items, .. } = &reply {
                for item in items {
                    for file in &item.files {
                        println!("  {}", file.display());
                    }
                }
            }
        }
    }

    if let Err(e) = engine.shutdown().await {
        error!("Failed to shut down mail session: {}", e);
    }
    Ok(())
}
