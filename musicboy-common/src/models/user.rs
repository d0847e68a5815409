// File: musicboy-common/src/models/user.rs

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

/// Discord snowflake of an end user; the primary key for all per-user state
/// (credentials, pending codes, locks, monitors).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl UserId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>()
            .map(UserId)
            .map_err(|e| format!("Invalid user id '{s}': {e}"))
    }
}

impl From<u64> for UserId {
    fn from(raw: u64) -> Self {
        UserId(raw)
    }
}
