//! Account holders and their sessions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an account
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub Uuid);

impl AccountId {
    /// Generate a new random account ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID string
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Account role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// A human operator who can own devices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Unique, lowercased
    pub username: String,
    /// Argon2 PHC string
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// A logged-in session, keyed in storage by the hash of its bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub account_id: AccountId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Public view of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub username: String,
    pub role: Role,
}

impl From<&Account> for UserInfo {
    fn from(account: &Account) -> Self {
        Self {
            username: account.username.clone(),
            role: account.role,
        }
    }
}

/// Normalize a username the way storage keys it
pub fn normalize_username(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_account_id_roundtrip() {
        let id = AccountId::new();
        assert_eq!(AccountId::parse(&id.to_string()).unwrap(), id);
        assert!(AccountId::parse("nope").is_err());
    }

    #[test]
    fn test_session_expiry() {
        let now = Utc::now();
        let session = Session {
            account_id: AccountId::new(),
            created_at: now,
            expires_at: now + Duration::seconds(10),
        };
        assert!(!session.is_expired(now));
        assert!(session.is_expired(now + Duration::seconds(10)));
    }

    #[test]
    fn test_normalize_username() {
        assert_eq!(normalize_username("  Alice "), "alice");
    }
}
