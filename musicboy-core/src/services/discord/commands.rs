// File: musicboy-core/src/services/discord/commands.rs
//
// Slash-command registration and interaction dispatch. Authentication
// failures render the authorize URL; every other error becomes a generic
// retry message, never internal detail.

use std::sync::Arc;

use tracing::error;
use twilight_http::Client as HttpClient;
use twilight_model::application::command::{Command, CommandType};
use twilight_model::application::interaction::application_command::{
    CommandData, CommandOptionValue,
};
use twilight_model::application::interaction::message_component::MessageComponentInteractionData;
use twilight_model::application::interaction::{Interaction, InteractionData};
use twilight_model::channel::message::{Component, Embed, MessageFlags};
use twilight_model::gateway::payload::incoming::InteractionCreate;
use twilight_model::http::interaction::{
    InteractionResponse, InteractionResponseData, InteractionResponseType,
};
use twilight_model::id::Id;
use twilight_model::id::marker::ApplicationMarker;
use twilight_util::builder::command::{CommandBuilder, IntegerBuilder, StringBuilder};

use musicboy_common::models::{TimeRange, UserId};
use crate::auth::session::SpotifySessionManager;
use crate::services::discord::embeds;
use crate::tasks::track_monitor::TrackMonitor;
use crate::Error;

#[derive(Clone)]
pub struct CommandContext {
    pub http: Arc<HttpClient>,
    pub application_id: Id<ApplicationMarker>,
    pub sessions: Arc<SpotifySessionManager>,
    pub monitor: Arc<TrackMonitor>,
}

pub fn build_commands() -> Vec<Command> {
    vec![
        CommandBuilder::new("auth", "Link your Spotify account", CommandType::ChatInput)
            .dm_permission(true)
            .build(),
        CommandBuilder::new(
            "nowplaying",
            "Show your currently playing track with controls",
            CommandType::ChatInput,
        )
        .dm_permission(true)
        .build(),
        CommandBuilder::new("stats", "Show your listening statistics", CommandType::ChatInput)
            .dm_permission(true)
            .build(),
        CommandBuilder::new(
            "recommendations",
            "Get personalized music recommendations",
            CommandType::ChatInput,
        )
        .dm_permission(true)
        .build(),
        CommandBuilder::new(
            "playlist",
            "Create a playlist from your top tracks",
            CommandType::ChatInput,
        )
        .dm_permission(true)
        .option(StringBuilder::new("name", "Name for the new playlist").required(true))
        .option(
            IntegerBuilder::new("track_count", "How many top tracks to include (default 20)")
                .min_value(1)
                .max_value(50),
        )
        .build(),
        CommandBuilder::new(
            "toggle_monitor",
            "Toggle track change notifications",
            CommandType::ChatInput,
        )
        .dm_permission(true)
        .build(),
    ]
}

pub async fn register_global_commands(
    http: &Arc<HttpClient>,
    application_id: Id<ApplicationMarker>,
) -> Result<(), Error> {
    let commands = build_commands();
    http.interaction(application_id)
        .set_global_commands(&commands)
        .await
        .map_err(|e| Error::Platform(format!("Failed to register global slash commands: {e}")))?;
    Ok(())
}

/// Dispatch slash commands and button presses from an `InteractionCreate`.
pub async fn handle_interaction_create(
    ctx: &CommandContext,
    event: &InteractionCreate,
) -> Result<(), Error> {
    let interaction = &event.0;
    let Some(user_id) = interaction_user_id(interaction) else {
        return Ok(());
    };

    match &interaction.data {
        Some(InteractionData::ApplicationCommand(data)) => {
            let reply = match run_command(ctx, user_id, data).await {
                Ok(reply) => reply,
                Err(e) => reply_for_error(&e),
            };
            send_reply(ctx, interaction, reply).await
        }
        Some(InteractionData::MessageComponent(data)) => {
            let reply = match run_component(ctx, user_id, data).await {
                Ok(reply) => reply,
                Err(e) => reply_for_error(&e),
            };
            send_reply(ctx, interaction, reply).await
        }
        _ => Ok(()),
    }
}

fn interaction_user_id(interaction: &Interaction) -> Option<UserId> {
    interaction.author_id().map(|id| UserId(id.get()))
}

/// Everything the bot says back is ephemeral; playback state is personal.
pub struct CommandReply {
    content: Option<String>,
    embeds: Vec<Embed>,
    components: Vec<Component>,
}

impl CommandReply {
    fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            embeds: Vec::new(),
            components: Vec::new(),
        }
    }

    fn embed(embed: Embed) -> Self {
        Self {
            content: None,
            embeds: vec![embed],
            components: Vec::new(),
        }
    }

    fn with_components(mut self, components: Vec<Component>) -> Self {
        self.components = components;
        self
    }
}

async fn send_reply(
    ctx: &CommandContext,
    interaction: &Interaction,
    reply: CommandReply,
) -> Result<(), Error> {
    let data = InteractionResponseData {
        content: reply.content,
        embeds: if reply.embeds.is_empty() {
            None
        } else {
            Some(reply.embeds)
        },
        components: if reply.components.is_empty() {
            None
        } else {
            Some(reply.components)
        },
        flags: Some(MessageFlags::EPHEMERAL),
        ..Default::default()
    };

    ctx.http
        .interaction(ctx.application_id)
        .create_response(
            interaction.id,
            &interaction.token,
            &InteractionResponse {
                kind: InteractionResponseType::ChannelMessageWithSource,
                data: Some(data),
            },
        )
        .await
        .map_err(|e| Error::Platform(format!("Error responding to interaction: {e}")))?;

    Ok(())
}

fn reply_for_error(e: &Error) -> CommandReply {
    match e {
        Error::NotAuthenticated { authorize_url } => CommandReply::text(format!(
            "You haven't linked Spotify yet. [Authorize here]({authorize_url})"
        )),
        Error::ReauthenticationRequired { authorize_url } => CommandReply::text(format!(
            "Your Spotify session expired. [Re-authorize here]({authorize_url})"
        )),
        Error::InvalidGrant => CommandReply::text(
            "That authorization link was already used. Run /auth for a fresh one.",
        ),
        Error::MonitorLimit => CommandReply::text(
            "I'm watching as many listeners as I can right now. Try again later.",
        ),
        other => {
            error!("Command failed: {other:?}");
            CommandReply::text("Something went wrong talking to Spotify. Please try again later.")
        }
    }
}

async fn run_command(
    ctx: &CommandContext,
    user_id: UserId,
    data: &CommandData,
) -> Result<CommandReply, Error> {
    match data.name.as_str() {
        "auth" => auth_command(ctx, user_id).await,
        "nowplaying" => nowplaying_command(ctx, user_id).await,
        "stats" => stats_command(ctx, user_id).await,
        "recommendations" => recommendations_command(ctx, user_id).await,
        "playlist" => playlist_command(ctx, user_id, data).await,
        "toggle_monitor" => toggle_monitor_command(ctx, user_id),
        other => Ok(CommandReply::text(format!("Unrecognized command: {other}"))),
    }
}

async fn auth_command(ctx: &CommandContext, user_id: UserId) -> Result<CommandReply, Error> {
    let url = ctx.sessions.authorize_url(user_id);
    Ok(CommandReply::embed(embeds::auth_embed(&url))
        .with_components(embeds::auth_link_button(&url)))
}

async fn nowplaying_command(ctx: &CommandContext, user_id: UserId) -> Result<CommandReply, Error> {
    let client = ctx.sessions.get_client(user_id).await?;
    let playing = client.currently_playing().await?;

    match playing.as_ref().and_then(embeds::now_playing_embed) {
        Some(embed) => {
            Ok(CommandReply::embed(embed).with_components(embeds::playback_controls(user_id)))
        }
        None => Ok(CommandReply::text("No track currently playing!")),
    }
}

async fn stats_command(ctx: &CommandContext, user_id: UserId) -> Result<CommandReply, Error> {
    let client = ctx.sessions.get_client(user_id).await?;
    let top_tracks = client.top_tracks(5, TimeRange::ShortTerm).await?;
    let top_artists = client.top_artists(5, TimeRange::ShortTerm).await?;
    Ok(CommandReply::embed(embeds::stats_embed(&top_tracks, &top_artists)))
}

async fn recommendations_command(
    ctx: &CommandContext,
    user_id: UserId,
) -> Result<CommandReply, Error> {
    let client = ctx.sessions.get_client(user_id).await?;

    let seed_tracks: Vec<String> = client
        .top_tracks(2, TimeRange::ShortTerm)
        .await?
        .into_iter()
        .map(|track| track.id)
        .collect();
    let seed_artists: Vec<String> = client
        .top_artists(2, TimeRange::ShortTerm)
        .await?
        .into_iter()
        .map(|artist| artist.id)
        .collect();

    if seed_tracks.is_empty() && seed_artists.is_empty() {
        return Ok(CommandReply::text(
            "Not enough listening history yet. Play some music first!",
        ));
    }

    let tracks = client.recommendations(&seed_tracks, &seed_artists, 5).await?;
    Ok(CommandReply::embed(embeds::recommendations_embed(&tracks)))
}

async fn playlist_command(
    ctx: &CommandContext,
    user_id: UserId,
    data: &CommandData,
) -> Result<CommandReply, Error> {
    let name = string_option(data, "name")
        .ok_or_else(|| Error::Parse("playlist command missing 'name' option".to_string()))?;
    let track_count = integer_option(data, "track_count")
        .unwrap_or(20)
        .clamp(1, 50) as u8;

    let client = ctx.sessions.get_client(user_id).await?;
    let top_tracks = client.top_tracks(track_count, TimeRange::ShortTerm).await?;
    if top_tracks.is_empty() {
        return Ok(CommandReply::text(
            "Not enough listening history yet. Play some music first!",
        ));
    }

    let profile = client.me().await?;
    let playlist = client
        .create_playlist(&profile.id, &name, "Top tracks picked by musicboy")
        .await?;

    let uris: Vec<String> = top_tracks.iter().map(|track| track.uri.clone()).collect();
    client.add_playlist_tracks(&playlist.id, &uris).await?;

    Ok(CommandReply::embed(embeds::playlist_embed(
        &name,
        uris.len(),
        playlist.external_urls.spotify.as_deref(),
    )))
}

fn toggle_monitor_command(ctx: &CommandContext, user_id: UserId) -> Result<CommandReply, Error> {
    let enabled = ctx.monitor.toggle(user_id)?;
    Ok(CommandReply::text(if enabled {
        "Track notifications enabled. I'll DM you when your music changes."
    } else {
        "Track notifications disabled."
    }))
}

async fn run_component(
    ctx: &CommandContext,
    user_id: UserId,
    data: &MessageComponentInteractionData,
) -> Result<CommandReply, Error> {
    let mut parts = data.custom_id.splitn(3, ':');
    let (Some("sp"), Some(action), Some(owner)) = (parts.next(), parts.next(), parts.next())
    else {
        return Ok(CommandReply::text(format!(
            "Unknown control: {}",
            data.custom_id
        )));
    };

    // The setup button has no owner; it hands the clicking user their own
    // authorize link.
    if action == "setup" {
        let url = ctx.sessions.authorize_url(user_id);
        return Ok(CommandReply::embed(embeds::auth_embed(&url))
            .with_components(embeds::auth_link_button(&url)));
    }

    let owner: UserId = owner.parse().map_err(Error::Parse)?;
    if owner != user_id {
        return Ok(CommandReply::text(
            "You can't control someone else's playback!",
        ));
    }

    let client = ctx.sessions.get_client(user_id).await?;
    match action {
        "prev" => {
            client.previous_track().await?;
            Ok(CommandReply::text("Previous track"))
        }
        "skip" => {
            client.next_track().await?;
            Ok(CommandReply::text("Next track"))
        }
        "playpause" => match client.playback_state().await? {
            Some(state) if state.is_playing => {
                client.pause().await?;
                Ok(CommandReply::text("Playback paused"))
            }
            _ => {
                client.play().await?;
                Ok(CommandReply::text("Playback resumed"))
            }
        },
        "volup" | "voldown" => {
            let Some(state) = client.playback_state().await? else {
                return Ok(CommandReply::text("Nothing is playing right now."));
            };
            let Some(current) = state.device.and_then(|device| device.volume_percent) else {
                return Ok(CommandReply::text(
                    "This device doesn't support volume control.",
                ));
            };
            let new_volume = if action == "volup" {
                current.saturating_add(10).min(100)
            } else {
                current.saturating_sub(10)
            };
            client.set_volume(new_volume).await?;
            Ok(CommandReply::text(format!("Volume set to {new_volume}%")))
        }
        other => Ok(CommandReply::text(format!("Unknown control: {other}"))),
    }
}

fn string_option(data: &CommandData, name: &str) -> Option<String> {
    data.options.iter().find(|o| o.name == name).and_then(|o| match &o.value {
        CommandOptionValue::String(s) => Some(s.clone()),
        _ => None,
    })
}

fn integer_option(data: &CommandData, name: &str) -> Option<i64> {
    data.options.iter().find(|o| o.name == name).and_then(|o| match &o.value {
        CommandOptionValue::Integer(i) => Some(*i),
        _ => None,
    })
}
