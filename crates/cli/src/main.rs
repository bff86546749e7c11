use anyhow::Context;
use clap::{Parser, Subcommand};
use realty::config::{self, Config};
use realty::staging::Staging;
use realty::store::MemoryStore;
use realty::triage::Triage;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "realty")]
#[command(about = "Realty WhatsApp router CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Write a default config file if none exists.
    Init {
        /// Config file path (default: REALTY_CONFIG_PATH or ~/.realty/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the webhook and admin HTTP server.
    Serve {
        /// Config file path (default: REALTY_CONFIG_PATH or ~/.realty/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default from config or 15151)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Triage one message with the configured backend and print the verdict as JSON.
    Triage {
        /// Config file path (default: REALTY_CONFIG_PATH or ~/.realty/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Message text
        text: String,
    },

    /// Delete pending leads past their expiry from the store snapshot.
    PurgeExpired {
        /// Config file path (default: REALTY_CONFIG_PATH or ~/.realty/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("realty {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("serve failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Triage { config, text }) => {
            if let Err(e) = run_triage(config, &text).await {
                log::error!("triage failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::PurgeExpired { config }) => {
            if let Err(e) = run_purge_expired(config).await {
                log::error!("purge-expired failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(config::default_config_path);
    if config::init_config(&path)? {
        println!("wrote default config to {}", path.display());
    } else {
        println!("config already exists at {}", path.display());
    }
    Ok(())
}

async fn run_serve(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, path) = config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting gateway on {}:{} (config {}, {} tenant(s))",
        config.gateway.bind,
        config.gateway.port,
        path.display(),
        config.tenants.len()
    );
    realty::gateway::run_gateway(config).await
}

async fn run_triage(config_path: Option<PathBuf>, text: &str) -> anyhow::Result<()> {
    let (config, _) = config::load_config(config_path)?;
    let generator = realty::llm::generator_from_config(&config);
    match generator.as_ref() {
        Some(g) => log::info!("triaging with {}", g.name()),
        None => log::info!("no triage backend configured, using keywords only"),
    }
    let triage = Triage::new(
        generator,
        Duration::from_secs(config.triage.timeout_secs.max(1)),
    );
    let verdict = triage.triage(text).await;
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}

async fn run_purge_expired(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, _) = config::load_config(config_path)?;
    let store = open_snapshot(&config).await?;
    let staging = Staging::new(Arc::new(store), config.staging.ttl_days);
    let removed = staging.purge_expired(chrono::Utc::now()).await?;
    println!("removed {} expired pending lead(s)", removed);
    Ok(())
}

async fn open_snapshot(config: &Config) -> anyhow::Result<MemoryStore> {
    let path = config
        .store
        .path
        .as_ref()
        .context("store.path is not set; nothing to purge")?;
    MemoryStore::load(path)
        .await
        .with_context(|| format!("loading store snapshot {}", path.display()))
}
