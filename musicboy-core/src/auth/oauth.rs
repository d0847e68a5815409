use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Duration;
use rand::Rng;
use reqwest::Client as ReqwestClient;
use serde::Deserialize;

use musicboy_common::models::{SpotifyCredential, TokenGrant, UserId};
use crate::Error;

/// Scopes requested on every authorization.
pub const SPOTIFY_SCOPES: &[&str] = &[
    "user-read-currently-playing",
    "user-top-read",
    "user-read-recently-played",
    "playlist-modify-public",
    "playlist-modify-private",
    "user-read-playback-state",
    "user-modify-playback-state",
];

const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Treat tokens this close to expiry as already expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Matches Spotify's JSON from the token endpoint.
#[derive(Deserialize)]
struct SpotifyTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: i64,
    scope: Option<String>,
}

/// Error body from the token endpoint, e.g. {"error": "invalid_grant", ...}
#[derive(Deserialize)]
struct SpotifyTokenError {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Client for the Spotify authorization server. The session manager only
/// sees this trait, so tests can substitute a scripted implementation.
#[async_trait]
pub trait SpotifyAuthenticator: Send + Sync {
    /// Pure URL construction; no network call, no lock.
    fn authorize_url(&self, user_id: UserId) -> String;

    /// Exchange an authorization code for a token grant. Replaying an
    /// already-consumed code fails with `Error::InvalidGrant`.
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, Error>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, Error>;

    fn is_expired(&self, cred: &SpotifyCredential) -> bool {
        cred.is_expired(Duration::seconds(EXPIRY_SKEW_SECS))
    }
}

/// Recover the user id from the OAuth `state` parameter (`<id>:<nonce>`).
pub fn user_id_from_state(state: &str) -> Option<UserId> {
    let (id, _nonce) = state.split_once(':')?;
    id.parse().ok()
}

/// Authorization-code flow with client secret against accounts.spotify.com.
pub struct SpotifyOAuthClient {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    http: ReqwestClient,
}

impl SpotifyOAuthClient {
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_uri,
            http: ReqwestClient::new(),
        }
    }

    fn basic_auth(&self) -> String {
        BASE64.encode(format!("{}:{}", self.client_id, self.client_secret))
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenGrant, Error> {
        let resp = self
            .http
            .post(TOKEN_URL)
            .header("Authorization", format!("Basic {}", self.basic_auth()))
            .form(params)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            if let Ok(err) = serde_json::from_str::<SpotifyTokenError>(&body) {
                if err.error == "invalid_grant" {
                    return Err(Error::InvalidGrant);
                }
                return Err(Error::SpotifyApi(format!(
                    "token endpoint {}: {} {}",
                    status,
                    err.error,
                    err.error_description.unwrap_or_default()
                )));
            }
            return Err(Error::SpotifyApi(format!("token endpoint {status}: {body}")));
        }

        let tok = resp
            .json::<SpotifyTokenResponse>()
            .await
            .map_err(|e| Error::Parse(format!("token response: {e}")))?;

        Ok(TokenGrant {
            access_token: tok.access_token,
            refresh_token: tok.refresh_token,
            scopes: tok
                .scope
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            expires_in: tok.expires_in,
        })
    }
}

#[async_trait]
impl SpotifyAuthenticator for SpotifyOAuthClient {
    fn authorize_url(&self, user_id: UserId) -> String {
        // The state carries the user id so the callback can route the code
        // back to the right user; the nonce keeps repeated URLs distinct.
        let nonce: u32 = rand::rng().random();
        let state = format!("{user_id}:{nonce:08x}");
        let scope_str = SPOTIFY_SCOPES.join(" ");

        format!(
            "{AUTHORIZE_URL}?response_type=code&client_id={cid}\
             &redirect_uri={redir}&scope={scope}&state={st}",
            cid = urlencoding::encode(&self.client_id),
            redir = urlencoding::encode(&self.redirect_uri),
            scope = urlencoding::encode(&scope_str),
            st = urlencoding::encode(&state),
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, Error> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &self.redirect_uri),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, Error> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorize_url_is_user_tagged_and_encoded() {
        let client = SpotifyOAuthClient::new(
            "client id".to_string(),
            "secret".to_string(),
            "http://localhost:8888/callback".to_string(),
        );
        let url = client.authorize_url(UserId(42));

        assert!(url.starts_with("https://accounts.spotify.com/authorize?"));
        assert!(url.contains("client%20id"));
        assert!(url.contains("state=42%3A"));
        assert!(url.contains("user-read-currently-playing"));
    }

    #[test]
    fn state_round_trips_user_id() {
        assert_eq!(user_id_from_state("42:deadbeef"), Some(UserId(42)));
        assert_eq!(user_id_from_state("not-a-state"), None);
        assert_eq!(user_id_from_state("abc:nonce"), None);
    }
}
