use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use twilight_gateway::{Event, EventTypeFlags, Intents, Shard, ShardId, StreamExt};
use twilight_http::Client as HttpClient;
use twilight_http::client::ClientBuilder;
use twilight_model::channel::message::{Component, Embed};
use twilight_model::id::Id;

use musicboy_common::models::UserId;
use crate::auth::session::SpotifySessionManager;
use crate::eventbus::{BotEvent, EventBus};
use crate::services::discord::commands::{
    CommandContext, handle_interaction_create, register_global_commands,
};
use crate::services::discord::embeds;
use crate::tasks::track_monitor::TrackMonitor;
use crate::Error;

/// The Discord side of the bot: one gateway shard for interactions, plus a
/// notifier task that turns bus events into DMs.
pub struct DiscordPlatform {
    token: String,
    sessions: Arc<SpotifySessionManager>,
    monitor: Arc<TrackMonitor>,
    event_bus: Arc<EventBus>,

    /// Channel that gets the standing "Connect Spotify" message, if any.
    setup_channel: Option<u64>,
}

impl DiscordPlatform {
    pub fn new(
        token: String,
        sessions: Arc<SpotifySessionManager>,
        monitor: Arc<TrackMonitor>,
        event_bus: Arc<EventBus>,
        setup_channel: Option<u64>,
    ) -> Self {
        Self {
            token,
            sessions,
            monitor,
            event_bus,
            setup_channel,
        }
    }

    /// Connect the gateway and run until the event bus signals shutdown.
    pub async fn run(self) -> Result<(), Error> {
        let http = Arc::new(
            ClientBuilder::new()
                .token(self.token.clone())
                .timeout(Duration::from_secs(30))
                .build(),
        );

        let notifier = spawn_notifier(
            Arc::clone(&http),
            Arc::clone(&self.event_bus),
            Arc::clone(&self.monitor),
        );

        let mut shard = Shard::new(
            ShardId::ONE,
            self.token.clone(),
            Intents::GUILDS | Intents::DIRECT_MESSAGES,
        );

        let mut ctx: Option<CommandContext> = None;
        let mut shutdown_rx = self.event_bus.shutdown_rx.clone();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if self.event_bus.is_shutdown() {
                        info!("(Discord) Shutdown requested; closing gateway.");
                        break;
                    }
                }
                item = shard.next_event(EventTypeFlags::all()) => {
                    let Some(item) = item else { break };
                    match item {
                        Ok(Event::Ready(ready)) => {
                            info!(
                                "(Discord) Ready as {} (application {})",
                                ready.user.name, ready.application.id
                            );
                            // Re-registering on every resume would be wasted
                            // round-trips; once per process is enough.
                            if ctx.is_none() {
                                register_global_commands(&http, ready.application.id).await?;
                                if let Some(channel_id) = self.setup_channel {
                                    post_setup_message(&http, channel_id).await;
                                }
                            }
                            ctx = Some(CommandContext {
                                http: Arc::clone(&http),
                                application_id: ready.application.id,
                                sessions: Arc::clone(&self.sessions),
                                monitor: Arc::clone(&self.monitor),
                            });
                        }
                        Ok(Event::InteractionCreate(event)) => {
                            let Some(ctx) = ctx.clone() else {
                                warn!("(Discord) Interaction before READY; dropping.");
                                continue;
                            };
                            tokio::spawn(async move {
                                if let Err(e) = handle_interaction_create(&ctx, &event).await {
                                    error!("(Discord) Interaction handling failed: {e:?}");
                                }
                            });
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!("(Discord) Error receiving event: {e:?}");
                        }
                    }
                }
            }
        }

        notifier.abort();
        Ok(())
    }
}

/// Consumes bus events and delivers them as DMs: track changes become
/// now-playing embeds with controls, a completed link gets a confirmation
/// and starts that user's monitor (the original opt-in moment).
fn spawn_notifier(
    http: Arc<HttpClient>,
    event_bus: Arc<EventBus>,
    monitor: Arc<TrackMonitor>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut rx = event_bus.subscribe(None).await;
        while let Some(event) = rx.recv().await {
            match event {
                BotEvent::TrackChanged { user_id, playing, .. } => {
                    let Some(embed) = embeds::now_playing_embed(&playing) else {
                        continue;
                    };
                    let controls = embeds::playback_controls(user_id);
                    if let Err(e) = send_dm(&http, user_id, embed, controls).await {
                        warn!("Failed to DM now-playing update to user {user_id}: {e}");
                    }
                }
                BotEvent::SpotifyLinked { user_id } => {
                    if let Err(e) = monitor.start(user_id) {
                        warn!("Could not start track monitor for user {user_id}: {e}");
                    }
                    if let Err(e) = send_dm(&http, user_id, embeds::linked_embed(), vec![]).await {
                        warn!("Failed to DM link confirmation to user {user_id}: {e}");
                    }
                }
                _ => {}
            }
            if event_bus.is_shutdown() {
                break;
            }
        }
    })
}

async fn post_setup_message(http: &HttpClient, channel_id: u64) {
    let setup_embeds = [embeds::setup_embed()];
    let components = embeds::setup_button();
    if let Err(e) = http
        .create_message(Id::new(channel_id))
        .embeds(&setup_embeds)
        .components(&components)
        .await
    {
        warn!("(Discord) Could not post setup message to channel {channel_id}: {e}");
    }
}

async fn send_dm(
    http: &HttpClient,
    user_id: UserId,
    embed: Embed,
    components: Vec<Component>,
) -> Result<(), Error> {
    let channel = http
        .create_private_channel(Id::new(user_id.get()))
        .await
        .map_err(|e| Error::Platform(format!("Error opening DM channel: {e}")))?
        .model()
        .await
        .map_err(|e| Error::Platform(format!("Error parsing DM channel: {e}")))?;

    let embeds = [embed];
    let mut request = http.create_message(channel.id).embeds(&embeds);
    if !components.is_empty() {
        request = request.components(&components);
    }
    request
        .await
        .map_err(|e| Error::Platform(format!("Error sending DM: {e}")))?;

    Ok(())
}
