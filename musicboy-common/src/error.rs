// musicboy-common/src/error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// No Spotify credential on file. The caller must surface the URL to the
    /// user; it is structured data, never to be fished back out of a message.
    #[error("not authenticated with Spotify")]
    NotAuthenticated { authorize_url: String },

    /// Refresh failed (revoked grant or similar); only a fresh authorization
    /// by the user can recover.
    #[error("Spotify session expired; re-authorization required")]
    ReauthenticationRequired { authorize_url: String },

    /// Authorization code already consumed or expired on the server side.
    #[error("authorization code already used or expired")]
    InvalidGrant,

    /// Transient Spotify API failure (network, rate limit, 5xx). Safe to
    /// retry on the next poll or command.
    #[error("Spotify API error: {0}")]
    SpotifyApi(String),

    #[error("track monitor limit reached")]
    MonitorLimit,

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Parse(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Parse(s.to_string())
    }
}

impl Error {
    /// True for the variants a user can fix by (re)authorizing.
    pub fn needs_authorization(&self) -> bool {
        matches!(
            self,
            Error::NotAuthenticated { .. } | Error::ReauthenticationRequired { .. }
        )
    }

    /// The authorize URL carried by an authentication error, if any.
    pub fn authorize_url(&self) -> Option<&str> {
        match self {
            Error::NotAuthenticated { authorize_url }
            | Error::ReauthenticationRequired { authorize_url } => Some(authorize_url),
            _ => None,
        }
    }
}
