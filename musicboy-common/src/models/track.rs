// File: musicboy-common/src/models/track.rs
//
// Wire shapes for the slice of the Spotify Web API the bot consumes. Only
// the fields the bot actually reads are modeled; serde ignores the rest.

use std::fmt;
use serde::{Deserialize, Serialize};

/// Time windows Spotify accepts for top-tracks / top-artists statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    ShortTerm,
    MediumTerm,
    LongTerm,
}

impl TimeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::ShortTerm => "short_term",
            TimeRange::MediumTerm => "medium_term",
            TimeRange::LongTerm => "long_term",
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `GET /v1/me/player/currently-playing`. A 204 from the API maps to `None`
/// one level up; a playing episode can still have `item: null` here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentlyPlaying {
    pub item: Option<PlayingTrack>,
    pub is_playing: bool,
    pub progress_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayingTrack {
    /// Absent for local files; change detection skips those.
    pub id: Option<String>,
    pub name: String,
    pub artists: Vec<TrackArtist>,
    pub album: TrackAlbum,
    pub duration_ms: u64,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}

impl PlayingTrack {
    pub fn primary_artist(&self) -> &str {
        self.artists
            .first()
            .map(|a| a.name.as_str())
            .unwrap_or("Unknown artist")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackArtist {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackAlbum {
    pub name: String,
    #[serde(default)]
    pub images: Vec<AlbumImage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumImage {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExternalUrls {
    #[serde(default)]
    pub spotify: Option<String>,
}

/// `GET /v1/me/player`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackState {
    pub is_playing: bool,
    #[serde(default)]
    pub device: Option<PlaybackDevice>,
    #[serde(default)]
    pub item: Option<PlayingTrack>,
    pub progress_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackDevice {
    pub id: Option<String>,
    pub name: String,
    pub volume_percent: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopTrack {
    pub id: String,
    pub name: String,
    pub uri: String,
    pub artists: Vec<TrackArtist>,
}

impl TopTrack {
    pub fn primary_artist(&self) -> &str {
        self.artists
            .first()
            .map(|a| a.name.as_str())
            .unwrap_or("Unknown artist")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopArtist {
    pub id: String,
    pub name: String,
}

/// Spotify's paging envelope; the bot only ever reads the current page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paging<T> {
    pub items: Vec<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendations {
    pub tracks: Vec<TopTrack>,
}

/// `GET /v1/me`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// The slice of a playlist object returned by playlist creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}
