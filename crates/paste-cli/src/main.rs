//! paste - operator command line for the paste document store
//!
//! Loads configuration, opens the configured backend through the core
//! library, and runs document and maintenance commands against it.

mod config;

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use paste_core::reaper::spawn_reaper;
use paste_core::{storage, EncryptionKey, KeyGenerator, PasteService, TextCodec, VERSION};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

const NOT_FOUND: &str = "No document found";
const DELETE_REFUSED: &str = "You entered the wrong secret or the document does not exist";

/// paste - store, fetch and expire text documents
#[derive(Parser)]
#[command(name = "paste")]
#[command(author, version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, env = "PASTE_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Storage backend (file, document, relational, cache)
    #[arg(long, global = true, env = "PASTE_STORAGE", value_name = "KIND")]
    storage: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set up the configured backend and report success
    Prepare,

    /// Store a new document and print its key and delete secret
    Create {
        /// Document text (read from stdin when omitted)
        #[arg(long)]
        body: Option<String>,

        /// Store a static document that never expires
        #[arg(long = "static", requires = "key")]
        pinned: bool,

        /// Key for a static document
        #[arg(long)]
        key: Option<String>,
    },

    /// Print a document
    Get {
        #[arg(value_name = "KEY")]
        key: String,
    },

    /// Delete a document with its delete secret
    Delete {
        #[arg(value_name = "KEY")]
        key: String,

        #[arg(value_name = "SECRET")]
        secret: String,
    },

    /// Delete a document without a secret
    Remove {
        #[arg(value_name = "KEY")]
        key: String,
    },

    /// Remove expired documents once, or keep sweeping until Ctrl-C
    Sweep {
        /// Sweep interval in seconds
        #[arg(long, value_name = "SECONDS")]
        every: Option<u64>,
    },

    /// Print a fresh encryption key
    Keygen,

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Serialize)]
struct CreatedOutput<'a> {
    key: &'a str,
    secret: &'a str,
}

#[derive(Serialize)]
struct DocumentOutput<'a> {
    key: &'a str,
    text: &'a str,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match &cli.command {
        Commands::Keygen => {
            let key = EncryptionKey::generate().to_hex();
            if cli.json {
                println!("{}", serde_json::json!({ "key": key }));
            } else {
                println!("{}", key);
            }
            return Ok(());
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(*shell, &mut cmd, "paste", &mut io::stdout());
            return Ok(());
        }
        _ => {}
    }

    let mut config = config::load_config(cli.config.as_deref())?;
    if let Some(kind) = cli.storage.as_deref() {
        config.storage.kind = config::parse_kind(kind)?;
    }

    let codec = TextCodec::from_config(&config.encryption)
        .map_err(|e| anyhow::anyhow!("Failed to set up encryption: {}", e))?;
    let keys = KeyGenerator::from_config(&config.keys)
        .map_err(|e| anyhow::anyhow!("Invalid key settings: {}", e))?;
    let storage = storage::open(&config.storage, codec)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open storage: {}", e))?;
    let storage = Arc::new(storage);
    let service = PasteService::new(storage.clone(), keys, config.document.max_length);

    let result = run(&cli, &service, config.storage.sweep_interval()).await;

    if let Err(e) = storage.close().await {
        tracing::warn!(error = %e, "Failed to close storage");
    }
    result
}

async fn run(cli: &Cli, service: &PasteService, default_every: Duration) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Prepare => {
            let kind = service.storage().kind();
            if cli.json {
                println!("{}", serde_json::json!({ "storage": kind.as_str(), "ready": true }));
            } else if !cli.quiet {
                println!("Storage ready ({})", kind);
            }
        }
        Commands::Create { body, pinned, key } => {
            if key.is_some() && !pinned {
                return Err(anyhow::anyhow!("--key is only valid together with --static"));
            }
            let text = read_body(body.clone())?;
            let created = match key {
                Some(key) => service.create_static(key, &text).await,
                None => service.create(&text).await,
            }
            .map_err(|e| anyhow::anyhow!("{}", e))?;

            if cli.json {
                let output = CreatedOutput {
                    key: &created.key,
                    secret: created.delete_secret.expose(),
                };
                println!("{}", serde_json::to_string(&output)?);
            } else if cli.quiet {
                println!("{}", created.key);
                println!("{}", created.delete_secret.expose());
            } else {
                println!("Key:    {}", created.key);
                println!("Secret: {}", created.delete_secret.expose());
            }
        }
        Commands::Get { key } => {
            let text = service
                .fetch(key)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to read document: {}", e))?
                .ok_or_else(|| anyhow::anyhow!(NOT_FOUND))?;

            if cli.json {
                let output = DocumentOutput { key, text: &text };
                println!("{}", serde_json::to_string(&output)?);
            } else if text.ends_with('\n') {
                print!("{}", text);
            } else {
                println!("{}", text);
            }
        }
        Commands::Delete { key, secret } => {
            let deleted = service.delete(key, secret).await;
            if cli.json {
                println!("{}", serde_json::json!({ "key": key, "deleted": deleted }));
            }
            if !deleted {
                return Err(anyhow::anyhow!(DELETE_REFUSED));
            }
            if !cli.json && !cli.quiet {
                println!("Deleted {}", key);
            }
        }
        Commands::Remove { key } => {
            let removed = service.remove(key).await;
            if cli.json {
                println!("{}", serde_json::json!({ "key": key, "deleted": removed }));
            }
            if !removed {
                return Err(anyhow::anyhow!(NOT_FOUND));
            }
            if !cli.json && !cli.quiet {
                println!("Removed {}", key);
            }
        }
        Commands::Sweep { every } => match every {
            None => {
                let removed = service
                    .storage()
                    .sweep_expired()
                    .await
                    .map_err(|e| anyhow::anyhow!("Sweep failed: {}", e))?;
                if cli.json {
                    println!("{}", serde_json::json!({ "removed": removed }));
                } else if !cli.quiet {
                    println!("Removed {} expired document(s)", removed);
                }
            }
            Some(secs) => {
                let every = if *secs == 0 {
                    default_every
                } else {
                    Duration::from_secs(*secs)
                };
                let cancel = spawn_reaper(service.storage().clone(), every);
                info!(interval_secs = every.as_secs(), "Sweeping until interrupted");
                tokio::signal::ctrl_c()
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to listen for Ctrl-C: {}", e))?;
                cancel.cancel();
            }
        },
        Commands::Keygen | Commands::Completions { .. } => {}
    }
    Ok(())
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn read_body(body: Option<String>) -> anyhow::Result<String> {
    if let Some(body) = body {
        return Ok(body);
    }
    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        return Err(anyhow::anyhow!(
            "No document text given; pass --body or pipe text on stdin"
        ));
    }
    let mut buffer = String::new();
    stdin
        .read_to_string(&mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to read stdin: {}", e))?;
    Ok(buffer)
}
