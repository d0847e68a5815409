//! src/repositories/sqlite/credentials.rs
use std::str::FromStr;

use chrono::{Duration, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

use musicboy_common::models::{SpotifyCredential, UserId};
use musicboy_common::traits::repository_traits::CredentialsRepository;
use crate::Error;

#[derive(Clone)]
pub struct SqliteCredentialsRepository {
    pool: Pool<Sqlite>,
}

impl SqliteCredentialsRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    fn row_to_credential(r: &SqliteRow) -> Result<SpotifyCredential, Error> {
        let user_id =
            UserId::from_str(&r.try_get::<String, _>("user_id")?).map_err(Error::Parse)?;
        let scopes_str: String = r.try_get("scopes")?;
        let scopes = if scopes_str.is_empty() {
            Vec::new()
        } else {
            scopes_str.split(' ').map(str::to_string).collect()
        };

        Ok(SpotifyCredential {
            user_id,
            access_token: r.try_get("access_token")?,
            refresh_token: r.try_get("refresh_token")?,
            scopes,
            expires_at: r.try_get("expires_at")?,
            created_at: r.try_get("created_at")?,
            updated_at: r.try_get("updated_at")?,
        })
    }
}

#[async_trait::async_trait]
impl CredentialsRepository for SqliteCredentialsRepository {
    async fn store_credential(&self, cred: &SpotifyCredential) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO spotify_credentials
               (user_id, access_token, refresh_token, scopes, expires_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                scopes = excluded.scopes,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(cred.user_id.to_string())
        .bind(&cred.access_token)
        .bind(&cred.refresh_token)
        .bind(cred.scopes.join(" "))
        .bind(cred.expires_at)
        .bind(cred.created_at)
        .bind(cred.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_credential(&self, user_id: UserId) -> Result<Option<SpotifyCredential>, Error> {
        let row = sqlx::query(
            r#"
            SELECT user_id, access_token, refresh_token, scopes,
                   expires_at, created_at, updated_at
            FROM spotify_credentials
            WHERE user_id = ?
            "#,
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(Self::row_to_credential(&r)?)),
            None => Ok(None),
        }
    }

    async fn delete_credential(&self, user_id: UserId) -> Result<(), Error> {
        sqlx::query("DELETE FROM spotify_credentials WHERE user_id = ?")
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Returns all credentials with an `expires_at` within the specified
    /// duration from "now". For example, `Duration::minutes(60)` => all
    /// tokens expiring in the next hour (including already-expired ones).
    async fn get_expiring_credentials(
        &self,
        within: Duration,
    ) -> Result<Vec<SpotifyCredential>, Error> {
        let cutoff = Utc::now() + within;

        let rows = sqlx::query(
            r#"
            SELECT user_id, access_token, refresh_token, scopes,
                   expires_at, created_at, updated_at
            FROM spotify_credentials
            WHERE expires_at <= ?
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut results = Vec::new();
        for r in rows {
            results.push(Self::row_to_credential(&r)?);
        }
        Ok(results)
    }

    async fn all_user_ids(&self) -> Result<Vec<UserId>, Error> {
        let rows = sqlx::query("SELECT user_id FROM spotify_credentials")
            .fetch_all(&self.pool)
            .await?;

        let mut ids = Vec::new();
        for r in rows {
            ids.push(UserId::from_str(&r.try_get::<String, _>("user_id")?).map_err(Error::Parse)?);
        }
        Ok(ids)
    }
}
