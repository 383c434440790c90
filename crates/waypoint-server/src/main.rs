mod auth;
mod config;
mod serve;

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use waypoint_core::cache::CacheCascade;
use waypoint_core::fetch::HttpContentFetcher;
use waypoint_core::orchestrator::Orchestrator;
use waypoint_core::provider::{
    ChainConfig, GeminiProvider, ModelPool, OpenRouterPool, Provider, ProviderChain,
};
use waypoint_core::quota::QuotaLedger;
use waypoint_store::{pool, PgDocumentStore};

use config::WaypointConfig;

#[derive(Parser)]
#[command(name = "waypoint", about = "AI travel itinerary generation service")]
struct Cli {
    /// Database URL (overrides WAYPOINT_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a waypoint config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/waypoint")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Initialize the waypoint database (requires config file or env vars)
    DbInit,
    /// Run the HTTP API server
    Serve {
        /// Bind address
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Listen port
        #[arg(long, default_value_t = 8787)]
        port: u16,
    },
    /// Mint a signed bearer token for a user
    Token {
        /// User identifier to embed in the token
        user_id: String,
        /// Optional email hint (enables the VIP allow-list comparison)
        #[arg(long)]
        email: Option<String>,
    },
}

/// Execute the `waypoint init` command: write the config file.
fn cmd_init(db_url: &str, force: bool) -> Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let token_secret = config::generate_token_secret();

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        auth: config::AuthSection {
            token_secret: token_secret.clone(),
        },
        providers: config::ProvidersSection::default(),
        quota: config::QuotaSection::default(),
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!(
        "  auth.token_secret = {}...{}",
        &token_secret[..8],
        &token_secret[56..]
    );
    println!();
    println!("Set GEMINI_API_KEY / OPENROUTER_API_KEY (or fill [providers]) before serving.");
    println!("Next: run `waypoint db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `waypoint db-init` command: create database and run
/// migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> Result<()> {
    let resolved = WaypointConfig::resolve(cli_db_url)?;

    println!("Initializing waypoint database...");

    pool::ensure_database_exists(&resolved.store_config).await?;
    let db_pool = pool::create_pool(&resolved.store_config).await?;
    pool::run_migrations(&db_pool).await?;
    db_pool.close().await;

    println!("waypoint db-init complete.");
    Ok(())
}

/// Execute the `waypoint serve` command: wire the collaborators and run the
/// HTTP server.
async fn cmd_serve(cli_db_url: Option<&str>, bind: &str, port: u16) -> Result<()> {
    let resolved = WaypointConfig::resolve(cli_db_url)?;

    let db_pool = pool::create_pool(&resolved.store_config).await?;
    let store = Arc::new(PgDocumentStore::new(db_pool.clone()));

    // One HTTP client handle for every outbound call, built once here.
    let http = reqwest::Client::new();

    let primary: Option<Arc<dyn Provider>> = match &resolved.gemini_api_key {
        Some(key) => Some(Arc::new(GeminiProvider::new(http.clone(), key.clone()))),
        None => {
            tracing::warn!("GEMINI_API_KEY not configured, primary provider disabled");
            None
        }
    };
    let fallback: Option<Arc<dyn ModelPool>> = match &resolved.openrouter_api_key {
        Some(key) => Some(Arc::new(OpenRouterPool::new(http.clone(), key.clone()))),
        None => {
            tracing::warn!("OPENROUTER_API_KEY not configured, fallback pool disabled");
            None
        }
    };
    let chain = ProviderChain::new(primary, fallback, ChainConfig::default());

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(auth::SignedTokenVerifier::new(resolved.token_config)),
        CacheCascade::new(store.clone()),
        QuotaLedger::new(store, resolved.vip_sha256),
        chain,
        Arc::new(HttpContentFetcher::new(http)),
        resolved.quota_policy,
    ));

    let result = serve::run_serve(orchestrator, bind, port).await;
    db_pool.close().await;
    result
}

/// Execute the `waypoint token` command: mint a signed bearer token.
fn cmd_token(cli_db_url: Option<&str>, user_id: &str, email: Option<&str>) -> Result<()> {
    let resolved = WaypointConfig::resolve(cli_db_url)?;
    let token = auth::generate_token(&resolved.token_config, user_id, email);
    println!("{token}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Serve { bind, port } => {
            cmd_serve(cli.database_url.as_deref(), &bind, port).await?;
        }
        Commands::Token { user_id, email } => {
            cmd_token(cli.database_url.as_deref(), &user_id, email.as_deref())?;
        }
    }

    Ok(())
}
