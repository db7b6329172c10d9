//! gemgate - OpenAI-compatible gateway for Gemini Business
//!
//! A proxy that accepts OpenAI-style chat completions, forwards them to
//! the Gemini Business endpoint with a pooled short-lived credential, and
//! rotates that credential in the background before it expires.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gemgate::config::Config;
use gemgate::rotation::{CommandDeployer, Rotator};
use gemgate::store::{AccountStore, BearerToken, SharedStore};

#[derive(Parser)]
#[command(name = "gemgate")]
#[command(about = "OpenAI-compatible gateway for Gemini Business")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve,

    /// Validate the environment configuration
    Check,

    /// Show the account pool
    Accounts,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gemgate=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => serve().await,

        Commands::Check => {
            let config = Config::from_env()?;
            tracing::info!(listen = %config.listen, "Configuration is valid");
            tracing::info!(upstream = %config.upstream_url, "Upstream endpoint");
            tracing::info!(accounts = %config.accounts_file.display(), "Account pool path");
            tracing::info!(
                rotation_interval_secs = config.rotation.interval.as_secs(),
                token_max_age_secs = config.rotation.token_max_age.as_secs(),
                deploy_command = config.rotation.deploy_command.is_some(),
                "Rotation settings"
            );
            Ok(())
        }

        Commands::Accounts => {
            let config = Config::from_env()?;
            let store = AccountStore::load_or_seed(&config.accounts_file)?;
            for account in store.accounts() {
                tracing::info!(
                    email = %account.email,
                    active = account.is_active,
                    has_token = !account.bearer_token.is_empty(),
                    usage_count = account.usage_count,
                    last_used = account.last_used,
                    "Account"
                );
            }
            Ok(())
        }
    }
}

async fn serve() -> anyhow::Result<()> {
    let config = Arc::new(Config::from_env()?);

    let store = SharedStore::new(AccountStore::load_or_seed(&config.accounts_file)?);

    // A credential in the environment is recorded onto the pool before
    // anything else, so single-account deployments need no harvester.
    if let Some(seed) = &config.seed {
        tracing::info!(email = %seed.email, "Recording credential from environment");
        store.ensure_account(&seed.email).await?;
        store
            .record_use(
                &seed.email,
                BearerToken::from(seed.bearer_token.clone()),
                &seed.config_id,
            )
            .await?;
    }

    if config.require_credential && store.active_credential().await.is_none() {
        anyhow::bail!(
            "no usable credential in the pool; set BEARER_TOKEN/CONFIG_ID, \
             populate the account pool, or set REQUIRE_CREDENTIAL=false"
        );
    }

    match &config.rotation.deploy_command {
        Some(command) => {
            let rotator = Rotator::new(
                store.clone(),
                CommandDeployer::new(command.clone()),
                &config.rotation,
            );
            tokio::spawn(rotator.run());
            tracing::info!("Rotation loop started");
        }
        None => {
            tracing::info!("DEPLOY_COMMAND not set, rotation loop disabled");
        }
    }

    gemgate::gateway::run_server(config, store).await
}
