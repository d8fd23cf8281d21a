//! dbwatch CLI
//!
//! Command-line client for the `databases.resource.donald.com` resource.
//!
//! # Commands
//!
//! - `list` - List databases
//! - `get` - Show one database
//! - `create` - Create a database
//! - `delete` - Delete a database
//! - `watch` - Run an informer and print the local store as it changes

mod commands;

use clap::{Parser, Subcommand};
use commands::Format;
use dbwatch_client::{ClientConfig, DatabaseClient, HttpTransport};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Kubeconfig file looked up in the working directory when none is given.
const DEFAULT_KUBECONFIG: &str = "vke.yaml";

/// Client and informer for the databases custom resource.
#[derive(Parser, Debug)]
#[command(name = "dbwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the kubeconfig file [default: ./vke.yaml]; empty for in-cluster
    #[arg(global = true, long)]
    kubeconfig: Option<PathBuf>,

    /// Namespace to operate in (cluster scope if omitted)
    #[arg(global = true, short, long)]
    namespace: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List databases
    List {
        /// Label selector, e.g. `tier=gold,env!=dev`
        #[arg(short = 'l', long)]
        selector: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Show one database
    Get {
        /// Database name
        name: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Create a database
    Create {
        /// Object name
        #[arg(long)]
        name: String,

        /// Database type (e.g. SQL, noSQL)
        #[arg(long)]
        db_type: String,

        /// Total capacity
        #[arg(long)]
        total: i64,

        /// Available capacity
        #[arg(long)]
        available: i64,

        /// Database name inside the engine (defaults to the object name)
        #[arg(long)]
        db_name: Option<String>,

        /// Description
        #[arg(long)]
        description: Option<String>,

        /// Free-form tags
        #[arg(long)]
        tags: Option<String>,

        /// Labels as key=value, repeatable
        #[arg(long = "label")]
        labels: Vec<String>,
    },

    /// Delete a database
    Delete {
        /// Database name
        name: String,
    },

    /// Run an informer and print the local store as it changes
    Watch {
        /// Seconds between full relists
        #[arg(long, default_value = "60")]
        resync: u64,

        /// Label selector, e.g. `tier=gold`
        #[arg(short = 'l', long)]
        selector: Option<String>,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Version = cli.command {
        println!("dbwatch v{}", env!("CARGO_PKG_VERSION"));
        println!("API {}", dbwatch_api::api_version());
        return Ok(());
    }

    // Configuration problems end the process before any call is made.
    let (path, explicit) = match cli.kubeconfig {
        Some(path) => (path, true),
        None => (std::env::current_dir()?.join(DEFAULT_KUBECONFIG), false),
    };
    let config = ClientConfig::infer(&path, explicit)?;
    let transport = HttpTransport::new(&config)?;
    let mut client = DatabaseClient::new(config, transport);
    if let Some(namespace) = cli.namespace {
        client = client.namespaced(namespace);
    }

    let mut out = std::io::stdout();
    match cli.command {
        Commands::List { selector, format } => {
            commands::list::run(&client, selector, format, &mut out).await?;
        }
        Commands::Get { name, format } => {
            commands::get::run(&client, &name, format, &mut out).await?;
        }
        Commands::Create {
            name,
            db_type,
            total,
            available,
            db_name,
            description,
            tags,
            labels,
        } => {
            let request = commands::create::CreateRequest {
                db_name: db_name.unwrap_or_else(|| name.clone()),
                name,
                db_type,
                total,
                available,
                description: description.unwrap_or_default(),
                tags: tags.unwrap_or_default(),
                labels,
            };
            commands::create::run(&client, request, &mut out).await?;
        }
        Commands::Delete { name } => {
            commands::delete::run(&client, &name, &mut out).await?;
        }
        Commands::Watch { resync, selector } => {
            commands::watch::run(client, resync, selector).await?;
        }
        Commands::Version => {}
    }

    Ok(())
}
