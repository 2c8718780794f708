use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use shopfloor::config::ShopConfig;

mod cmd;

#[derive(Parser)]
#[command(name = "shopfloor")]
#[command(version, about = "Workshop management back end for bicycle repair shops")]
pub struct Cli {
    /// Path to shopfloor.toml (defaults to ./shopfloor.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP + WebSocket server
    Serve {
        #[arg(short, long)]
        port: Option<u16>,

        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Permissive CORS and bind on all interfaces
        #[arg(long)]
        dev: bool,

        /// Open the dashboard in a browser once the server is up
        #[arg(long)]
        open: bool,
    },
    /// Create the database and optionally a first workshop
    Init {
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Name of a workshop to create, seeded with default templates
        #[arg(short, long)]
        workshop: Option<String>,
    },
    /// View, validate or create shopfloor.toml
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Render a printable work order
    PrintOrder {
        #[arg(long)]
        workshop: i64,

        #[arg(long)]
        order: i64,

        /// Write the HTML here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Open the document in a browser to print it
        #[arg(long)]
        open: bool,
    },
    /// Render a printable build sheet
    PrintBuild {
        #[arg(long)]
        workshop: i64,

        #[arg(long)]
        build: i64,

        #[arg(short, long)]
        out: Option<PathBuf>,

        #[arg(long)]
        open: bool,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    Show,
    Validate,
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config_path = ShopConfig::resolve_path(cli.config.as_deref());
    if let Commands::Config { command } = &cli.command {
        return cmd::cmd_config(&config_path, command.clone());
    }

    let mut config = ShopConfig::load_or_default(&config_path)?;
    config.apply_env()?;
    let _log_guard = shopfloor::telemetry::init(&config.logging, cli.verbose)?;
    tracing::debug!(config = %config_path.display(), "Configuration loaded");

    match cli.command {
        Commands::Serve {
            port,
            host,
            db_path,
            dev,
            open,
        } => {
            cmd::cmd_serve(
                &config,
                cmd::ServeOverrides {
                    port,
                    host,
                    db_path,
                    dev,
                },
                open,
            )
            .await?;
        }
        Commands::Init { db_path, workshop } => {
            let db_path = db_path.unwrap_or_else(|| config.database.path.clone());
            cmd::cmd_init(&db_path, workshop.as_deref())?;
        }
        Commands::Config { .. } => {}
        Commands::PrintOrder {
            workshop,
            order,
            out,
            open,
        } => {
            cmd::cmd_print(
                &config.database.path,
                cmd::PrintTarget::Order {
                    workshop_id: workshop,
                    order_id: order,
                },
                out.as_deref(),
                open,
            )?;
        }
        Commands::PrintBuild {
            workshop,
            build,
            out,
            open,
        } => {
            cmd::cmd_print(
                &config.database.path,
                cmd::PrintTarget::Build {
                    workshop_id: workshop,
                    build_id: build,
                },
                out.as_deref(),
                open,
            )?;
        }
    }

    Ok(())
}
