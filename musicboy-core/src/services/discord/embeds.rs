// File: musicboy-core/src/services/discord/embeds.rs
//
// All embed and button rendering for the Discord surface lives here, so the
// command handlers and the DM notifier share one look.

use twilight_model::channel::message::component::{ActionRow, Button, ButtonStyle};
use twilight_model::channel::message::{Component, Embed};
use twilight_util::builder::embed::{
    EmbedBuilder, EmbedFieldBuilder, EmbedFooterBuilder, ImageSource,
};

use musicboy_common::models::{CurrentlyPlaying, TopArtist, TopTrack, UserId};

const SPOTIFY_GREEN: u32 = 0x1DB954;

const PROGRESS_BAR_SLOTS: usize = 20;

fn format_timestamp(ms: u64) -> String {
    format!("{}:{:02}", ms / 60_000, ms / 1_000 % 60)
}

/// `▓▓▓░░…` 1:23/4:05 style progress line.
pub fn progress_bar(progress_ms: u64, duration_ms: u64) -> String {
    let fraction = if duration_ms > 0 {
        progress_ms as f64 / duration_ms as f64
    } else {
        0.0
    };
    let filled = ((fraction * PROGRESS_BAR_SLOTS as f64) as usize).min(PROGRESS_BAR_SLOTS);
    let bar = "▓".repeat(filled) + &"░".repeat(PROGRESS_BAR_SLOTS - filled);
    format!(
        "`{bar}` {}/{}",
        format_timestamp(progress_ms),
        format_timestamp(duration_ms)
    )
}

/// The now-playing embed shared by `/nowplaying` and the DM notifier.
/// `None` when nothing (or an item without metadata) is playing.
pub fn now_playing_embed(playing: &CurrentlyPlaying) -> Option<Embed> {
    let track = playing.item.as_ref()?;

    let mut builder = EmbedBuilder::new()
        .title("Now Playing")
        .color(SPOTIFY_GREEN)
        .field(EmbedFieldBuilder::new("Track", format!("**{}**", track.name)))
        .field(EmbedFieldBuilder::new("Artist", track.primary_artist().to_string()).inline())
        .field(EmbedFieldBuilder::new("Album", track.album.name.clone()).inline());

    if let Some(progress) = playing.progress_ms {
        builder = builder.field(EmbedFieldBuilder::new(
            "Progress",
            progress_bar(progress, track.duration_ms),
        ));
    }

    if let Some(image) = track.album.images.first() {
        if let Ok(thumbnail) = ImageSource::url(image.url.clone()) {
            builder = builder.thumbnail(thumbnail);
        }
    }

    Some(builder.build())
}

pub fn auth_embed(authorize_url: &str) -> Embed {
    EmbedBuilder::new()
        .title("Connect Your Spotify Account")
        .color(SPOTIFY_GREEN)
        .description(
            "Click the button below, log in to Spotify and authorize the bot. \
             You'll get a DM here once the connection is live.",
        )
        .field(EmbedFieldBuilder::new(
            "Authentication Link",
            format!("[Click here to connect Spotify]({authorize_url})"),
        ))
        .build()
}

/// DM sent right after a successful code exchange.
pub fn linked_embed() -> Embed {
    EmbedBuilder::new()
        .title("Spotify Connected!")
        .color(SPOTIFY_GREEN)
        .description(
            "Your Spotify account has been connected. \
             I'll now send you updates when your music changes.\n\n\
             **Available Commands:**\n\
             `/nowplaying` - Show current track with controls\n\
             `/stats` - View your listening statistics\n\
             `/recommendations` - Get music recommendations\n\
             `/playlist` - Create a playlist from your top tracks\n\
             `/toggle_monitor` - Turn track notifications on/off",
        )
        .footer(EmbedFooterBuilder::new(
            "Your Spotify session is refreshed automatically when needed",
        ))
        .build()
}

pub fn stats_embed(top_tracks: &[TopTrack], top_artists: &[TopArtist]) -> Embed {
    let tracks_text = if top_tracks.is_empty() {
        "No tracks found".to_string()
    } else {
        top_tracks
            .iter()
            .enumerate()
            .map(|(i, track)| format!("{}. {} by {}", i + 1, track.name, track.primary_artist()))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let artists_text = if top_artists.is_empty() {
        "No artists found".to_string()
    } else {
        top_artists
            .iter()
            .enumerate()
            .map(|(i, artist)| format!("{}. {}", i + 1, artist.name))
            .collect::<Vec<_>>()
            .join("\n")
    };

    EmbedBuilder::new()
        .title("Your Spotify Statistics")
        .color(SPOTIFY_GREEN)
        .field(EmbedFieldBuilder::new(
            "Your Top Tracks (Last 4 Weeks)",
            tracks_text,
        ))
        .field(EmbedFieldBuilder::new(
            "Your Top Artists (Last 4 Weeks)",
            artists_text,
        ))
        .build()
}

pub fn recommendations_embed(tracks: &[TopTrack]) -> Embed {
    let mut builder = EmbedBuilder::new()
        .title("Recommended Tracks")
        .description("Based on your listening history")
        .color(SPOTIFY_GREEN);

    for (i, track) in tracks.iter().enumerate() {
        builder = builder.field(EmbedFieldBuilder::new(
            format!("{}. {}", i + 1, track.name),
            format!("By {}", track.primary_artist()),
        ));
    }

    builder.build()
}

pub fn playlist_embed(name: &str, track_count: usize, playlist_url: Option<&str>) -> Embed {
    let mut builder = EmbedBuilder::new()
        .title("Playlist Created!")
        .color(SPOTIFY_GREEN)
        .description(format!(
            "Created playlist '{name}' with your top {track_count} tracks"
        ));

    if let Some(url) = playlist_url {
        builder = builder.field(EmbedFieldBuilder::new(
            "Playlist Link",
            format!("[Click here to open in Spotify]({url})"),
        ));
    }

    builder.build()
}

fn control_button(custom_id: String, label: &str, style: ButtonStyle) -> Component {
    Component::Button(Button {
        custom_id: Some(custom_id),
        disabled: false,
        emoji: None,
        label: Some(label.to_string()),
        style,
        url: None,
        sku_id: None,
    })
}

/// Two rows of playback controls. The owning user id is baked into every
/// custom id so a click by anyone else can be rejected.
pub fn playback_controls(user_id: UserId) -> Vec<Component> {
    let transport = ActionRow {
        components: vec![
            control_button(
                format!("sp:prev:{user_id}"),
                "Previous",
                ButtonStyle::Secondary,
            ),
            control_button(
                format!("sp:playpause:{user_id}"),
                "Play/Pause",
                ButtonStyle::Primary,
            ),
            control_button(format!("sp:skip:{user_id}"), "Skip", ButtonStyle::Secondary),
        ],
    };
    let volume = ActionRow {
        components: vec![
            control_button(
                format!("sp:voldown:{user_id}"),
                "Volume Down",
                ButtonStyle::Secondary,
            ),
            control_button(
                format!("sp:volup:{user_id}"),
                "Volume Up",
                ButtonStyle::Secondary,
            ),
        ],
    };
    vec![Component::ActionRow(transport), Component::ActionRow(volume)]
}

/// The standing invitation posted to the setup channel.
pub fn setup_embed() -> Embed {
    EmbedBuilder::new()
        .title("Spotify Bot Setup")
        .color(SPOTIFY_GREEN)
        .description("Welcome! Click the button below to connect your Spotify account.")
        .field(EmbedFieldBuilder::new(
            "Features",
            "Real-time track updates in DMs\n\
             Playback controls with buttons\n\
             Listening statistics and recommendations\n\
             Custom playlists from your top tracks",
        ))
        .field(EmbedFieldBuilder::new(
            "How to Connect",
            "1. Click 'Connect Spotify' below\n\
             2. Log in and authorize the bot\n\
             3. Wait for the confirmation DM\n\
             4. Use the slash commands in our DM chat",
        ))
        .build()
}

/// The button under the setup embed. No owner in the custom id; whoever
/// clicks gets their own authorize link.
pub fn setup_button() -> Vec<Component> {
    let row = ActionRow {
        components: vec![control_button(
            "sp:setup:0".to_string(),
            "Connect Spotify",
            ButtonStyle::Success,
        )],
    };
    vec![Component::ActionRow(row)]
}

/// A single link button for the authorize URL.
pub fn auth_link_button(authorize_url: &str) -> Vec<Component> {
    let row = ActionRow {
        components: vec![Component::Button(Button {
            custom_id: None,
            disabled: false,
            emoji: None,
            label: Some("Authenticate with Spotify".to_string()),
            style: ButtonStyle::Link,
            url: Some(authorize_url.to_string()),
            sku_id: None,
        })],
    };
    vec![Component::ActionRow(row)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use musicboy_common::models::{PlayingTrack, TrackAlbum, TrackArtist};

    #[test]
    fn progress_bar_formats_timestamps() {
        let bar = progress_bar(61_000, 180_000);
        assert!(bar.contains("1:01/3:00"), "got: {bar}");
    }

    #[test]
    fn progress_bar_handles_zero_duration() {
        let bar = progress_bar(0, 0);
        assert!(bar.contains("0:00/0:00"), "got: {bar}");
    }

    #[test]
    fn now_playing_embed_requires_an_item() {
        let empty = CurrentlyPlaying {
            item: None,
            is_playing: false,
            progress_ms: None,
        };
        assert!(now_playing_embed(&empty).is_none());

        let playing = CurrentlyPlaying {
            item: Some(PlayingTrack {
                id: Some("t1".to_string()),
                name: "Song".to_string(),
                artists: vec![TrackArtist {
                    name: "Artist".to_string(),
                }],
                album: TrackAlbum {
                    name: "Album".to_string(),
                    images: vec![],
                },
                duration_ms: 200_000,
                external_urls: Default::default(),
            }),
            is_playing: true,
            progress_ms: Some(10_000),
        };
        let embed = now_playing_embed(&playing).expect("embed");
        assert_eq!(embed.title.as_deref(), Some("Now Playing"));
        assert_eq!(embed.fields.len(), 4);
    }

    #[test]
    fn controls_are_tagged_with_the_owner() {
        let components = playback_controls(UserId(42));
        assert_eq!(components.len(), 2);
        let Component::ActionRow(row) = &components[0] else {
            panic!("expected action row");
        };
        let Component::Button(button) = &row.components[1] else {
            panic!("expected button");
        };
        assert_eq!(button.custom_id.as_deref(), Some("sp:playpause:42"));
    }
}
