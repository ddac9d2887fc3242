//! # kb-discovery CLI (`kbd`)
//!
//! ```bash
//! kbd --config ./config/kbd.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kbd init` | Create the SQLite database and schema |
//! | `kbd node add --type note --text "..."` | Store a node and discover its connections |
//! | `kbd node list` | List stored nodes |
//! | `kbd analyze <id>` | Analyze one node now |
//! | `kbd analyze --all` | Analyze every node, skipping failures |
//! | `kbd connections <id>` | Stored connections for a node |
//! | `kbd strong` | All connections with confidence > 0.7 |
//! | `kbd confidence <a> <b>` | Fused confidence for one pair |
//! | `kbd clusters` | Temporal clusters of the corpus |
//! | `kbd status` | Worker status as JSON |
//!
//! Logs go to stderr; set `RUST_LOG` or `[logging].filter` to adjust.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use kb_discovery::commands;
use kb_discovery::config;

/// kb-discovery CLI: connection discovery for a personal knowledge base.
#[derive(Parser)]
#[command(
    name = "kbd",
    about = "kb-discovery: find and score relationships between knowledge-base nodes",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/kbd.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Manage knowledge nodes.
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },

    /// Discover connections for one node, or for every node with `--all`.
    Analyze {
        /// Node id.
        id: Option<String>,

        /// Analyze all nodes sequentially; failures are logged and skipped.
        #[arg(long)]
        all: bool,

        #[arg(long)]
        json: bool,
    },

    /// List stored connections for a node.
    Connections {
        id: String,

        /// Only connections with confidence > 0.7.
        #[arg(long)]
        strong: bool,

        #[arg(long)]
        json: bool,
    },

    /// List every strong connection.
    Strong {
        #[arg(long)]
        json: bool,
    },

    /// Print the fused confidence between two nodes.
    Confidence { a: String, b: String },

    /// Group nodes into temporal clusters.
    Clusters {
        #[arg(long)]
        json: bool,
    },

    /// Print worker status (queue, cache) as JSON.
    Status,
}

#[derive(Subcommand)]
enum NodeAction {
    /// Store a node and analyze it at ingest priority.
    ///
    /// Re-adding an existing id updates it and forces re-analysis.
    Add {
        /// `note`, `image`, or `webpage`.
        #[arg(long = "type", default_value = "note")]
        node_type: String,

        /// Searchable text for lexical analysis.
        #[arg(long)]
        text: String,

        /// Node id; a UUID is generated if omitted.
        #[arg(long)]
        id: Option<String>,

        /// Creation time (RFC 3339); defaults to now.
        #[arg(long)]
        created: Option<String>,
    },

    /// List stored nodes.
    List {
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.logging.filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => commands::run_init(&cfg).await?,
        Commands::Node { action } => match action {
            NodeAction::Add {
                node_type,
                text,
                id,
                created,
            } => commands::run_node_add(&cfg, &node_type, &text, id, created).await?,
            NodeAction::List { json } => commands::run_node_list(&cfg, json).await?,
        },
        Commands::Analyze { id, all, json } => commands::run_analyze(&cfg, id, all, json).await?,
        Commands::Connections { id, strong, json } => {
            commands::run_connections(&cfg, &id, strong, json).await?
        }
        Commands::Strong { json } => commands::run_strong(&cfg, json).await?,
        Commands::Confidence { a, b } => commands::run_confidence(&cfg, &a, &b).await?,
        Commands::Clusters { json } => commands::run_clusters(&cfg, json).await?,
        Commands::Status => commands::run_status(&cfg).await?,
    }

    Ok(())
}
