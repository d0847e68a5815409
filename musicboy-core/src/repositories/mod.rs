// File: musicboy-core/src/repositories/mod.rs

pub mod sqlite;

pub use musicboy_common::traits::repository_traits::{CredentialsRepository, PendingAuthRepository};
pub use sqlite::credentials::SqliteCredentialsRepository;
pub use sqlite::pending_auth::SqlitePendingAuthRepository;
