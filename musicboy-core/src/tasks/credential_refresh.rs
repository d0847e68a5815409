use std::sync::Arc;

use chrono::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

use musicboy_common::traits::repository_traits::CredentialsRepository;
use crate::auth::session::SpotifySessionManager;
use crate::Error;

/// Checks for credentials that will expire within `within_minutes` from now.
/// For each such credential, calls `SpotifySessionManager::refresh_user`,
/// which serializes against live commands on the same user's lock.
///
/// Returns Ok(()) even if some credentials fail to refresh (logs errors).
pub async fn refresh_expiring_tokens(
    creds_repo: &Arc<dyn CredentialsRepository>,
    sessions: &SpotifySessionManager,
    within_minutes: i64,
) -> Result<(), Error> {
    let duration = Duration::minutes(within_minutes);
    let expiring = creds_repo.get_expiring_credentials(duration).await?;

    if expiring.is_empty() {
        info!("No credentials expiring in the next {} minutes.", within_minutes);
        return Ok(());
    }

    info!(
        "Found {} credential(s) expiring soon; attempting to refresh...",
        expiring.len()
    );

    for cred in expiring {
        let user_id = cred.user_id;
        match sessions.refresh_user(user_id).await {
            Ok(updated) => {
                info!(
                    "Successfully refreshed credential for user_id={}. New expires_at={}",
                    updated.user_id, updated.expires_at
                );
            }
            Err(e) => {
                error!("Failed to refresh credential for user_id={}: {:?}", user_id, e);
            }
        }
    }

    Ok(())
}

/// Spawns the periodic refresh sweep. The first run fires immediately so a
/// restart picks up stale tokens right away.
pub fn spawn_credential_refresh_task(
    creds_repo: Arc<dyn CredentialsRepository>,
    sessions: Arc<SpotifySessionManager>,
    period: std::time::Duration,
    within_minutes: i64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            if let Err(e) = refresh_expiring_tokens(&creds_repo, &sessions, within_minutes).await {
                error!("Credential refresh sweep failed: {:?}", e);
            }
        }
    })
}
