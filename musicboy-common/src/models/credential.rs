// File: musicboy-common/src/models/credential.rs

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::models::user::UserId;

/// One persisted Spotify OAuth credential per user.
///
/// A record whose `expires_at` lies in the past must never be used to
/// authorize a request; it has to be refreshed first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyCredential {
    pub user_id: UserId,
    pub access_token: String,
    pub refresh_token: String,
    pub scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What the token endpoint returned for one exchange or refresh call.
/// Spotify omits `refresh_token` on most refresh responses; folding a grant
/// into a credential keeps the old one in that case.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub scopes: Vec<String>,
    pub expires_in: i64,
}

impl SpotifyCredential {
    /// Build a fresh credential from an authorization-code exchange.
    /// The code exchange always carries a refresh token; its absence means
    /// the response was not a valid code grant.
    pub fn from_grant(user_id: UserId, grant: TokenGrant) -> Result<Self, Error> {
        let refresh_token = grant
            .refresh_token
            .ok_or_else(|| Error::Parse("token response missing refresh_token".to_string()))?;
        let now = Utc::now();
        Ok(Self {
            user_id,
            access_token: grant.access_token,
            refresh_token,
            scopes: grant.scopes,
            expires_at: now + Duration::seconds(grant.expires_in),
            created_at: now,
            updated_at: now,
        })
    }

    /// Fold a refresh response into this record: new access token and
    /// expiry, rotated refresh token only when the server sent one.
    pub fn apply_refresh(&mut self, grant: TokenGrant) {
        let now = Utc::now();
        self.access_token = grant.access_token;
        if let Some(rotated) = grant.refresh_token {
            self.refresh_token = rotated;
        }
        if !grant.scopes.is_empty() {
            self.scopes = grant.scopes;
        }
        self.expires_at = now + Duration::seconds(grant.expires_in);
        self.updated_at = now;
    }

    /// Whether the access token is expired, or will be within `skew`.
    pub fn is_expired(&self, skew: Duration) -> bool {
        self.expires_at <= Utc::now() + skew
    }
}
