mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tl_auth::config::{CLIENT_ID_KEY, PROVIDER};
use tl_auth::{
    AuthClient, CredentialManager, FileFallbackStore, FileTokenStore, StaticSettings, TieredStore,
};
use tl_session::DeviceSession;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{AppConfig, FALLBACK_FILE};

/// Keep a playback credential fresh and report the device connection status
#[derive(Parser, Debug)]
#[command(name = "tunelink", version, about)]
struct Args {
    /// Path to tunelink.toml (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Redirect fragment carrying the token, e.g. '#token=BQD...'
    #[arg(short, long)]
    fragment: Option<String>,

    /// Forget the stored credential and exit
    #[arg(long, conflicts_with = "fragment")]
    logout: bool,

    /// Check the credential against the provider once and exit
    #[arg(long)]
    probe: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref()).await?;

    let storage_dir = config.storage_dir()?;
    let durable = FileTokenStore::new(&storage_dir)
        .await
        .with_context(|| format!("Failed to open token store at {}", storage_dir.display()))?;
    let fallback = FileFallbackStore::open(storage_dir.join(FALLBACK_FILE));
    let store = TieredStore::new(Arc::new(durable), Arc::new(fallback), PROVIDER);

    let mut settings = StaticSettings::new();
    if let Some(client_id) = &config.auth.client_id {
        settings = settings.with(PROVIDER, CLIENT_ID_KEY, client_id.clone());
    } else {
        warn!("No auth.client_id configured; tokens cannot be refreshed");
    }

    let client = AuthClient::new(config.auth_config()?).context("Failed to build HTTP client")?;
    let manager = Arc::new(CredentialManager::new(client, store, Arc::new(settings)));

    if args.logout {
        manager.logout().await;
        return Ok(());
    }

    let session = DeviceSession::new(config.session_config(), manager.clone(), None);

    let credential = match args.fragment.as_deref() {
        Some(fragment) => manager.acquire_from_fragment(fragment).await,
        None => manager.acquire_from_storage().await,
    };
    if credential.is_none() {
        warn!("No credential available; pass --fragment '#token=<access token>'");
    }

    if args.probe {
        let connectivity = manager.check_remote_connectivity().await;
        info!("Connectivity: {:?}", connectivity);
        info!("{}", session.snapshot().label());
        return Ok(());
    }

    // Without a device the loop still has to run to keep the token fresh.
    session.start_status_loop();
    let mut updates = session.subscribe();
    info!("{}", updates.borrow_and_update().label());

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                info!("{}", snapshot.label());
            }
            result = &mut shutdown => {
                result.context("Failed to listen for ctrl-c")?;
                info!("Shutting down");
                break;
            }
        }
    }

    session.disconnect().await;
    Ok(())
}
