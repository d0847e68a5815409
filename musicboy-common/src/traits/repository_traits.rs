// File: musicboy-common/src/traits/repository_traits.rs

use async_trait::async_trait;
use chrono::Duration;

use crate::error::Error;
use crate::models::credential::SpotifyCredential;
use crate::models::user::UserId;

/// Durable per-user token storage. `get` returning `None` is the normal
/// "never authenticated" outcome, not an error.
#[async_trait]
pub trait CredentialsRepository: Send + Sync {
    /// Upsert: create on first store, overwrite on refresh.
    async fn store_credential(&self, cred: &SpotifyCredential) -> Result<(), Error>;

    async fn get_credential(&self, user_id: UserId) -> Result<Option<SpotifyCredential>, Error>;

    async fn delete_credential(&self, user_id: UserId) -> Result<(), Error>;

    /// All credentials whose `expires_at` falls within `within` from now,
    /// for the periodic refresh sweep.
    async fn get_expiring_credentials(
        &self,
        within: Duration,
    ) -> Result<Vec<SpotifyCredential>, Error>;

    async fn all_user_ids(&self) -> Result<Vec<UserId>, Error>;
}

/// The transient authorization codes handed over by the OAuth redirect
/// callback, keyed per user so concurrent authorizations cannot consume
/// each other's codes.
#[async_trait]
pub trait PendingAuthRepository: Send + Sync {
    /// Store (or replace) the pending code for this user.
    async fn store_code(&self, user_id: UserId, code: &str) -> Result<(), Error>;

    /// Read and delete in one step; a code can be consumed at most once.
    async fn take_code(&self, user_id: UserId) -> Result<Option<String>, Error>;
}
