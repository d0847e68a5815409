//! src/repositories/sqlite/pending_auth.rs
//!
//! Authorization codes arriving on the OAuth callback are parked here,
//! keyed per user, until the session manager consumes them. Keying per user
//! (instead of one "latest code" slot) keeps two users who authorize at the
//! same time from consuming each other's codes.

use chrono::Utc;
use sqlx::{Pool, Row, Sqlite};

use musicboy_common::models::UserId;
use musicboy_common::traits::repository_traits::PendingAuthRepository;
use crate::Error;

#[derive(Clone)]
pub struct SqlitePendingAuthRepository {
    pool: Pool<Sqlite>,
}

impl SqlitePendingAuthRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PendingAuthRepository for SqlitePendingAuthRepository {
    async fn store_code(&self, user_id: UserId, code: &str) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO pending_auth_codes (user_id, code, received_at)
            VALUES (?, ?, ?)
            ON CONFLICT (user_id) DO UPDATE SET
                code = excluded.code,
                received_at = excluded.received_at
            "#,
        )
        .bind(user_id.to_string())
        .bind(code)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn take_code(&self, user_id: UserId) -> Result<Option<String>, Error> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT code FROM pending_auth_codes WHERE user_id = ?")
            .bind(user_id.to_string())
            .fetch_optional(&mut *tx)
            .await?;

        let code = match row {
            Some(r) => {
                sqlx::query("DELETE FROM pending_auth_codes WHERE user_id = ?")
                    .bind(user_id.to_string())
                    .execute(&mut *tx)
                    .await?;
                Some(r.try_get::<String, _>("code")?)
            }
            None => None,
        };

        tx.commit().await?;
        Ok(code)
    }
}
