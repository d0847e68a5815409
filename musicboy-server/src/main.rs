use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

use musicboy_common::traits::repository_traits::{CredentialsRepository, PendingAuthRepository};
use musicboy_core::Database;
use musicboy_core::auth::callback_server::start_callback_server;
use musicboy_core::auth::oauth::SpotifyOAuthClient;
use musicboy_core::auth::session::SpotifySessionManager;
use musicboy_core::eventbus::EventBus;
use musicboy_core::platforms::discord::DiscordPlatform;
use musicboy_core::repositories::{SqliteCredentialsRepository, SqlitePendingAuthRepository};
use musicboy_core::tasks::credential_refresh::spawn_credential_refresh_task;
use musicboy_core::tasks::track_monitor::{DEFAULT_MAX_MONITORS, PlaybackSource, TrackMonitor};

#[derive(Parser, Debug, Clone)]
#[command(name = "musicboy")]
#[command(author, version, about = "musicboy - Discord \u{2194} Spotify bridge bot")]
struct Args {
    /// SQLite database URL (DATABASE_URL env var takes precedence).
    #[arg(long, default_value = "sqlite://musicboy.db")]
    db_url: String,

    /// Port for the OAuth redirect callback listener.
    #[arg(long, default_value_t = 8888)]
    callback_port: u16,

    /// Poll interval for track monitors, in seconds.
    #[arg(long, default_value_t = 10)]
    poll_interval: u64,

    /// How often the credential refresh sweep runs, in minutes.
    #[arg(long, default_value_t = 60)]
    sweep_period: u64,
}

fn env_var(name: &str) -> anyhow::Result<String> {
    std::env::var(name).map_err(|_| anyhow::anyhow!("Missing environment variable: {name}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let args = Args::parse();

    let discord_token = env_var("DISCORD_BOT_TOKEN")?;
    let client_id = env_var("SPOTIFY_CLIENT_ID")?;
    let client_secret = env_var("SPOTIFY_CLIENT_SECRET")?;
    let redirect_uri = std::env::var("SPOTIFY_REDIRECT_URI")
        .unwrap_or_else(|_| "http://localhost:8888/callback".to_string());
    let db_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| args.db_url.clone());

    info!("Starting musicboy...");

    let db = Database::new(&db_url).await?;
    db.migrate().await?;

    let creds_repo: Arc<dyn CredentialsRepository> =
        Arc::new(SqliteCredentialsRepository::new(db.pool().clone()));
    let pending_repo: Arc<dyn PendingAuthRepository> =
        Arc::new(SqlitePendingAuthRepository::new(db.pool().clone()));

    let event_bus = Arc::new(EventBus::new());
    let authenticator = Arc::new(SpotifyOAuthClient::new(client_id, client_secret, redirect_uri));
    let sessions = Arc::new(SpotifySessionManager::new(
        Arc::clone(&creds_repo),
        Arc::clone(&pending_repo),
        authenticator,
        Arc::clone(&event_bus),
    ));

    let playback: Arc<dyn PlaybackSource> = sessions.clone();
    let monitor = Arc::new(TrackMonitor::with_settings(
        playback,
        Arc::clone(&event_bus),
        Duration::from_secs(args.poll_interval),
        DEFAULT_MAX_MONITORS,
    ));

    let _callback_shutdown =
        start_callback_server(args.callback_port, Arc::clone(&pending_repo)).await?;

    let sweep = spawn_credential_refresh_task(
        Arc::clone(&creds_repo),
        Arc::clone(&sessions),
        Duration::from_secs(args.sweep_period * 60),
        60,
    );

    let setup_channel = std::env::var("SETUP_CHANNEL_ID")
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok());

    let discord = DiscordPlatform::new(
        discord_token,
        Arc::clone(&sessions),
        Arc::clone(&monitor),
        Arc::clone(&event_bus),
        setup_channel,
    );
    let discord_handle = tokio::spawn(async move {
        if let Err(e) = discord.run().await {
            error!("Discord runtime ended with error: {e:?}");
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received; shutting down.");

    event_bus.shutdown();
    monitor.stop_all();
    sweep.abort();
    let _ = tokio::time::timeout(Duration::from_secs(5), discord_handle).await;

    info!("Goodbye.");
    Ok(())
}
