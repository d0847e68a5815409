// File: musicboy-common/src/models/mod.rs
pub mod credential;
pub mod track;
pub mod user;

pub use credential::{SpotifyCredential, TokenGrant};
pub use track::{
    AlbumImage, CurrentlyPlaying, ExternalUrls, Paging, PlaybackDevice, PlaybackState,
    PlayingTrack, PlaylistRef, Recommendations, SpotifyProfile, TimeRange, TopArtist, TopTrack,
    TrackAlbum, TrackArtist,
};
pub use user::UserId;
