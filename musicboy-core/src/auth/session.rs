// musicboy-core/src/auth/session.rs
//
// The per-user Spotify session registry: persisted credentials, transient
// pending codes, and one token lock per user. Everything that mutates a
// user's token goes through that user's lock.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{info, warn};

use musicboy_common::models::{SpotifyCredential, UserId};
use musicboy_common::traits::repository_traits::{CredentialsRepository, PendingAuthRepository};

use crate::auth::oauth::SpotifyAuthenticator;
use crate::eventbus::{BotEvent, EventBus};
use crate::platforms::spotify::SpotifyClient;
use crate::Error;

pub struct SpotifySessionManager {
    credentials_repo: Arc<dyn CredentialsRepository>,
    pending_repo: Arc<dyn PendingAuthRepository>,
    authenticator: Arc<dyn SpotifyAuthenticator>,
    event_bus: Arc<EventBus>,

    /// One lock per user, created lazily, never evicted. The lock is held
    /// across the whole consume-code / load / refresh sequence: two callers
    /// must never both observe an expired token and race to refresh it,
    /// because the loser's refresh token would already be rotated.
    token_locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl SpotifySessionManager {
    pub fn new(
        credentials_repo: Arc<dyn CredentialsRepository>,
        pending_repo: Arc<dyn PendingAuthRepository>,
        authenticator: Arc<dyn SpotifyAuthenticator>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            credentials_repo,
            pending_repo,
            authenticator,
            event_bus,
            token_locks: DashMap::new(),
        }
    }

    fn user_lock(&self, user_id: UserId) -> Arc<Mutex<()>> {
        self.token_locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// The authorize URL to send a user to; pure construction.
    pub fn authorize_url(&self, user_id: UserId) -> String {
        self.authenticator.authorize_url(user_id)
    }

    /// Produce an API client bound to a current access token for this user.
    ///
    /// Under the user's lock: consume a pending authorization code if one
    /// arrived, otherwise load the stored record; no record means
    /// `NotAuthenticated` (with the URL to fix it), an expired record is
    /// refreshed and persisted before the client is handed out, and a failed
    /// refresh leaves the stored record untouched.
    pub async fn get_client(&self, user_id: UserId) -> Result<SpotifyClient, Error> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        if let Some(code) = self.pending_repo.take_code(user_id).await? {
            let cred = self.exchange_locked(user_id, &code).await?;
            return Ok(SpotifyClient::new(cred.access_token));
        }

        let Some(mut cred) = self.credentials_repo.get_credential(user_id).await? else {
            return Err(Error::NotAuthenticated {
                authorize_url: self.authenticator.authorize_url(user_id),
            });
        };

        if self.authenticator.is_expired(&cred) {
            let grant = match self.authenticator.refresh(&cred.refresh_token).await {
                Ok(grant) => grant,
                Err(e) => {
                    warn!("Token refresh failed for user {user_id}: {e}");
                    return Err(Error::ReauthenticationRequired {
                        authorize_url: self.authenticator.authorize_url(user_id),
                    });
                }
            };
            cred.apply_refresh(grant);
            self.credentials_repo.store_credential(&cred).await?;
            info!(
                "Refreshed Spotify token for user {user_id}; new expiry {}",
                cred.expires_at
            );
        }

        Ok(SpotifyClient::new(cred.access_token))
    }

    /// One-shot authorization-code exchange for callers that hold the code
    /// directly. A replayed code surfaces `InvalidGrant`; it is never
    /// retried here.
    pub async fn exchange_code(
        &self,
        user_id: UserId,
        code: &str,
    ) -> Result<SpotifyCredential, Error> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;
        self.exchange_locked(user_id, code).await
    }

    async fn exchange_locked(
        &self,
        user_id: UserId,
        code: &str,
    ) -> Result<SpotifyCredential, Error> {
        let grant = self.authenticator.exchange_code(code).await?;
        let cred = SpotifyCredential::from_grant(user_id, grant)?;
        self.credentials_repo.store_credential(&cred).await?;
        info!("Linked Spotify account for user {user_id}");
        self.event_bus
            .publish(BotEvent::SpotifyLinked { user_id })
            .await;
        Ok(cred)
    }

    /// Unconditional refresh, used by the expiry sweep. `get_client` only
    /// refreshes records that are already about to expire; the sweep renews
    /// anything it is pointed at.
    pub async fn refresh_user(&self, user_id: UserId) -> Result<SpotifyCredential, Error> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let Some(mut cred) = self.credentials_repo.get_credential(user_id).await? else {
            return Err(Error::NotAuthenticated {
                authorize_url: self.authenticator.authorize_url(user_id),
            });
        };

        let grant = match self.authenticator.refresh(&cred.refresh_token).await {
            Ok(grant) => grant,
            Err(Error::InvalidGrant) => {
                return Err(Error::ReauthenticationRequired {
                    authorize_url: self.authenticator.authorize_url(user_id),
                });
            }
            Err(other) => return Err(other),
        };

        cred.apply_refresh(grant);
        self.credentials_repo.store_credential(&cred).await?;
        Ok(cred)
    }

    /// Forget a user's credential entirely. Recovery requires a fresh
    /// authorization.
    pub async fn disconnect(&self, user_id: UserId) -> Result<(), Error> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;
        self.credentials_repo.delete_credential(user_id).await
    }
}
