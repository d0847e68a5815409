// =============================================================================
// musicboy-core/src/auth/mod.rs
// =============================================================================

pub mod callback_server;
pub mod oauth;
pub mod session;

pub use oauth::{SpotifyAuthenticator, SpotifyOAuthClient, SPOTIFY_SCOPES};
pub use session::SpotifySessionManager;
