// musicboy-core/tests/repository_tests.rs
//
// Round-trip and upsert behavior of the SQLite repositories against a
// file-backed temporary database (a pooled :memory: database would hand
// each connection its own empty schema).

use chrono::{Duration, Utc};

use musicboy_common::models::{SpotifyCredential, UserId};
use musicboy_common::traits::repository_traits::{CredentialsRepository, PendingAuthRepository};
use musicboy_core::Database;
use musicboy_core::repositories::{SqliteCredentialsRepository, SqlitePendingAuthRepository};

async fn test_db() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("musicboy-test.db").display());
    let db = Database::new(&url).await.expect("open db");
    db.migrate().await.expect("migrate");
    (dir, db)
}

fn credential(user_id: UserId, expires_in_minutes: i64) -> SpotifyCredential {
    let now = Utc::now();
    SpotifyCredential {
        user_id,
        access_token: format!("access-{user_id}"),
        refresh_token: format!("refresh-{user_id}"),
        scopes: vec![
            "user-read-currently-playing".to_string(),
            "user-top-read".to_string(),
        ],
        expires_at: now + Duration::minutes(expires_in_minutes),
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn store_and_get_round_trip() {
    let (_dir, db) = test_db().await;
    let repo = SqliteCredentialsRepository::new(db.pool().clone());

    let cred = credential(UserId(100), 60);
    repo.store_credential(&cred).await.unwrap();

    let loaded = repo
        .get_credential(UserId(100))
        .await
        .unwrap()
        .expect("credential should exist");

    assert_eq!(loaded.user_id, cred.user_id);
    assert_eq!(loaded.access_token, cred.access_token);
    assert_eq!(loaded.refresh_token, cred.refresh_token);
    assert_eq!(loaded.scopes, cred.scopes);
    assert_eq!(
        loaded.expires_at.timestamp_millis(),
        cred.expires_at.timestamp_millis()
    );
}

#[tokio::test]
async fn absent_credential_is_none_not_error() {
    let (_dir, db) = test_db().await;
    let repo = SqliteCredentialsRepository::new(db.pool().clone());

    assert!(repo.get_credential(UserId(101)).await.unwrap().is_none());
}

#[tokio::test]
async fn store_is_an_upsert() {
    let (_dir, db) = test_db().await;
    let repo = SqliteCredentialsRepository::new(db.pool().clone());

    let first = credential(UserId(102), 5);
    repo.store_credential(&first).await.unwrap();

    let mut second = credential(UserId(102), 60);
    second.access_token = "rotated-access".to_string();
    repo.store_credential(&second).await.unwrap();

    let loaded = repo.get_credential(UserId(102)).await.unwrap().unwrap();
    assert_eq!(loaded.access_token, "rotated-access");
    // created_at sticks with the original row; only the mutable fields move.
    assert_eq!(
        loaded.created_at.timestamp_millis(),
        first.created_at.timestamp_millis()
    );
    assert_eq!(
        loaded.expires_at.timestamp_millis(),
        second.expires_at.timestamp_millis()
    );
}

#[tokio::test]
async fn expiring_window_selects_only_near_expiry() {
    let (_dir, db) = test_db().await;
    let repo = SqliteCredentialsRepository::new(db.pool().clone());

    repo.store_credential(&credential(UserId(103), -10)).await.unwrap(); // already expired
    repo.store_credential(&credential(UserId(104), 30)).await.unwrap(); // inside window
    repo.store_credential(&credential(UserId(105), 180)).await.unwrap(); // far out

    let expiring = repo
        .get_expiring_credentials(Duration::minutes(60))
        .await
        .unwrap();
    let mut ids: Vec<u64> = expiring.iter().map(|c| c.user_id.get()).collect();
    ids.sort_unstable();

    assert_eq!(ids, vec![103, 104]);
}

#[tokio::test]
async fn delete_removes_the_row() {
    let (_dir, db) = test_db().await;
    let repo = SqliteCredentialsRepository::new(db.pool().clone());

    repo.store_credential(&credential(UserId(106), 60)).await.unwrap();
    repo.delete_credential(UserId(106)).await.unwrap();

    assert!(repo.get_credential(UserId(106)).await.unwrap().is_none());
    // Deleting again is harmless.
    repo.delete_credential(UserId(106)).await.unwrap();
}

#[tokio::test]
async fn all_user_ids_lists_every_stored_user() {
    let (_dir, db) = test_db().await;
    let repo = SqliteCredentialsRepository::new(db.pool().clone());

    repo.store_credential(&credential(UserId(107), 60)).await.unwrap();
    repo.store_credential(&credential(UserId(108), 60)).await.unwrap();

    let mut ids: Vec<u64> = repo
        .all_user_ids()
        .await
        .unwrap()
        .iter()
        .map(|id| id.get())
        .collect();
    ids.sort_unstable();

    assert_eq!(ids, vec![107, 108]);
}

#[tokio::test]
async fn pending_code_take_is_at_most_once() {
    let (_dir, db) = test_db().await;
    let repo = SqlitePendingAuthRepository::new(db.pool().clone());

    repo.store_code(UserId(200), "abc123").await.unwrap();

    assert_eq!(
        repo.take_code(UserId(200)).await.unwrap().as_deref(),
        Some("abc123")
    );
    assert!(repo.take_code(UserId(200)).await.unwrap().is_none());
}

#[tokio::test]
async fn pending_codes_are_keyed_per_user() {
    let (_dir, db) = test_db().await;
    let repo = SqlitePendingAuthRepository::new(db.pool().clone());

    repo.store_code(UserId(201), "code-for-201").await.unwrap();
    repo.store_code(UserId(202), "code-for-202").await.unwrap();

    assert_eq!(
        repo.take_code(UserId(202)).await.unwrap().as_deref(),
        Some("code-for-202")
    );
    assert_eq!(
        repo.take_code(UserId(201)).await.unwrap().as_deref(),
        Some("code-for-201")
    );
}

#[tokio::test]
async fn storing_a_new_code_replaces_the_old_one() {
    let (_dir, db) = test_db().await;
    let repo = SqlitePendingAuthRepository::new(db.pool().clone());

    repo.store_code(UserId(203), "first-attempt").await.unwrap();
    repo.store_code(UserId(203), "second-attempt").await.unwrap();

    assert_eq!(
        repo.take_code(UserId(203)).await.unwrap().as_deref(),
        Some("second-attempt")
    );
}
