//! Minimal account and session service
//!
//! Account lifecycle is not part of the pairing protocol; this is just enough
//! to give operators an authenticated identity to open pairing windows with.

use crate::account::{normalize_username, Account, AccountId, Role, Session, UserInfo};
use crate::error::{AuthError, AuthResult};
use crate::secret::{generate_token, hash_token};
use crate::storage::CredentialStore;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Duration;
use kiosklink_core::Clock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Username and password pair for signup and login
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A freshly issued session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionGrant {
    /// Bearer token for the `Authorization` header
    pub token: String,
    pub user: UserInfo,
}

/// Issues and validates account sessions
pub struct AccountService {
    storage: Arc<CredentialStore>,
    clock: Arc<dyn Clock>,
    session_ttl: Duration,
}

impl AccountService {
    pub fn new(storage: Arc<CredentialStore>, clock: Arc<dyn Clock>, session_ttl: Duration) -> Self {
        Self {
            storage,
            clock,
            session_ttl,
        }
    }

    /// Create a user account and log it in
    pub async fn signup(&self, username: &str, password: &str) -> AuthResult<SessionGrant> {
        let account = self.create_account(username, password, Role::User).await?;
        self.issue_session(&account).await
    }

    /// Check credentials and open a session
    pub async fn login(&self, username: &str, password: &str) -> AuthResult<SessionGrant> {
        let username = normalize_username(username);
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::invalid_input("username and password are required"));
        }

        let account = self
            .storage
            .read(|data| data.account_by_username(&username).cloned())
            .await
            .ok_or(AuthError::Unauthorized)?;

        if !verify_password(&account.password_hash, password).await? {
            warn!("Failed login for {}", username);
            return Err(AuthError::Unauthorized);
        }

        self.issue_session(&account).await
    }

    /// Resolve a bearer session token to its account
    pub async fn authenticate(&self, token: &str) -> AuthResult<Account> {
        let token_hash = hash_token(token);
        let now = self.clock.now();
        self.storage
            .read(|data| {
                let session = data.session(&token_hash)?;
                if session.is_expired(now) {
                    return None;
                }
                data.account(&session.account_id).cloned()
            })
            .await
            .ok_or(AuthError::Unauthorized)
    }

    /// End a session; unknown tokens are ignored
    pub async fn logout(&self, token: &str) -> AuthResult<()> {
        let token_hash = hash_token(token);
        self.storage
            .transact_accounts(|data| {
                data.sessions.remove(&token_hash);
                Ok::<_, AuthError>(())
            })
            .await
    }

    /// Create the bootstrap admin account if no account has that name yet
    pub async fn ensure_admin(&self, username: &str, password: &str) -> AuthResult<bool> {
        match self.create_account(username, password, Role::Admin).await {
            Ok(account) => {
                info!("Created bootstrap admin account {}", account.username);
                Ok(true)
            }
            Err(AuthError::Conflict(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Drop expired sessions
    pub async fn purge_expired_sessions(&self) -> AuthResult<usize> {
        let now = self.clock.now();
        let purged = self
            .storage
            .transact_accounts(|data| {
                let before = data.sessions.len();
                data.sessions.retain(|_, s| !s.is_expired(now));
                Ok::<_, AuthError>(before - data.sessions.len())
            })
            .await?;
        if purged > 0 {
            debug!("Purged {} expired sessions", purged);
        }
        Ok(purged)
    }

    async fn create_account(&self, username: &str, password: &str, role: Role) -> AuthResult<Account> {
        let username = normalize_username(username);
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::invalid_input("username and password are required"));
        }

        let password_hash = hash_password(password).await?;
        let account = Account {
            id: AccountId::new(),
            username,
            password_hash,
            role,
            created_at: self.clock.now(),
        };

        self.storage
            .transact_accounts(|data| {
                if data.account_by_username(&account.username).is_some() {
                    return Err(AuthError::Conflict(format!(
                        "username {} already exists",
                        account.username
                    )));
                }
                data.accounts
                    .insert(account.id.to_string(), account.clone());
                Ok(())
            })
            .await?;

        info!("Created account {} ({:?})", account.username, account.role);
        Ok(account)
    }

    async fn issue_session(&self, account: &Account) -> AuthResult<SessionGrant> {
        let token = generate_token();
        let now = self.clock.now();
        let session = Session {
            account_id: account.id.clone(),
            created_at: now,
            expires_at: now + self.session_ttl,
        };
        let token_hash = hash_token(&token);

        self.storage
            .transact_accounts(|data| {
                data.sessions.insert(token_hash, session);
                Ok::<_, AuthError>(())
            })
            .await?;

        debug!("Issued session for {}", account.username);
        Ok(SessionGrant {
            token,
            user: UserInfo::from(account),
        })
    }
}

/// Argon2 runs on the blocking pool
async fn hash_password(password: &str) -> AuthResult<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::PasswordHash(e.to_string()))
    })
    .await
    .map_err(|e| AuthError::Internal(format!("password hashing task failed: {}", e)))?
}

async fn verify_password(hash: &str, password: &str) -> AuthResult<bool> {
    let hash = hash.to_string();
    let password = password.to_string();
    tokio::task::spawn_blocking(move || {
        let parsed =
            PasswordHash::new(&hash).map_err(|e| AuthError::PasswordHash(e.to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .map_err(|e| AuthError::Internal(format!("password verification task failed: {}", e)))?
}
