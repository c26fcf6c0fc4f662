//! Dashboard accounts.
//!
//! Passwords are hashed with Argon2id. Accounts can be suspended from the web
//! dashboard for a while; owners can be neither deleted nor suspended.

use crate::Data;
use crate::duration;
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 30;

/// Dashboard role, owner > co-owner > admin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccountRole {
    Owner,
    CoOwner,
    Admin,
}

impl AccountRole {
    pub const ALL: [Self; 3] = [Self::Owner, Self::CoOwner, Self::Admin];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::CoOwner => "co-owner",
            Self::Admin => "admin",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.as_str() == raw.trim())
    }

    #[must_use]
    pub const fn allows_punishments(self) -> bool {
        matches!(self, Self::Owner | Self::CoOwner | Self::Admin)
    }

    #[must_use]
    pub const fn allows_embed_settings(self) -> bool {
        matches!(self, Self::Owner | Self::CoOwner)
    }

    #[must_use]
    pub const fn is_owner(self) -> bool {
        matches!(self, Self::Owner)
    }
}

impl fmt::Display for AccountRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: AccountRole,
    #[serde(default)]
    pub web_timeout_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Remaining suspension in milliseconds, if suspended
    #[must_use]
    pub fn timeout_remaining_ms(&self, now: DateTime<Utc>) -> Option<u64> {
        self.web_timeout_until
            .map(|until| (until - now).num_milliseconds())
            .filter(|ms| *ms > 0)
            .and_then(|ms| u64::try_from(ms).ok())
    }

    #[must_use]
    pub fn view(&self) -> AccountView {
        let remaining = self.timeout_remaining_ms(Utc::now());
        AccountView {
            id: self.id,
            username: self.username.clone(),
            role: self.role,
            web_timeout_until: remaining.and(self.web_timeout_until),
            timeout_remaining_ms: remaining.unwrap_or(0),
            timeout_remaining: remaining.map(duration::format_compact),
            created_at: self.created_at,
        }
    }
}

/// Account as shown by the API, without the password hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub id: Uuid,
    pub username: String,
    pub role: AccountRole,
    pub web_timeout_until: Option<DateTime<Utc>>,
    pub timeout_remaining_ms: u64,
    pub timeout_remaining: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("username, password, and role are required")]
    MissingFields,

    #[error("role must be one of: owner, co-owner, admin")]
    InvalidRole,

    #[error("username must be between 3 and 30 characters")]
    InvalidUsername,

    #[error("username already exists")]
    UsernameTaken,

    #[error("account not found")]
    NotFound,

    #[error("owner accounts cannot be deleted")]
    OwnerNotDeletable,

    #[error("owner accounts cannot be timed out")]
    OwnerNotSuspendable,

    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("failed to save accounts: {0}")]
    Storage(String),
}

pub type AccountResult<T> = Result<T, AccountError>;

fn hash_password(password: &str) -> AccountResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AccountError::Hash(e.to_string()))
}

fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

impl Data {
    async fn persist_accounts(&self) -> AccountResult<()> {
        self.save()
            .await
            .map_err(|e| AccountError::Storage(e.to_string()))
    }

    /// Create a dashboard account
    ///
    /// # Errors
    /// Fails on missing or invalid input, a duplicate username, or a storage error.
    pub async fn create_account(
        &self,
        username: &str,
        password: &str,
        role: &str,
    ) -> AccountResult<AccountView> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() || role.trim().is_empty() {
            return Err(AccountError::MissingFields);
        }
        let role = AccountRole::parse(role).ok_or(AccountError::InvalidRole)?;
        let length = username.chars().count();
        if !(USERNAME_MIN..=USERNAME_MAX).contains(&length) {
            return Err(AccountError::InvalidUsername);
        }
        if self.account_by_username(username).is_some() {
            return Err(AccountError::UsernameTaken);
        }

        let account = Account {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: hash_password(password)?,
            role,
            web_timeout_until: None,
            created_at: Utc::now(),
        };
        let view = account.view();
        self.accounts.insert(account.id, account);
        self.persist_accounts().await?;
        info!("Created {role} account {username}");
        Ok(view)
    }

    /// All accounts, sorted by username
    #[must_use]
    pub fn list_accounts(&self) -> Vec<AccountView> {
        let mut accounts: Vec<AccountView> =
            self.accounts.iter().map(|entry| entry.value().view()).collect();
        accounts.sort_by(|a, b| a.username.cmp(&b.username));
        accounts
    }

    #[must_use]
    pub fn account(&self, id: Uuid) -> Option<Account> {
        self.accounts.get(&id).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn account_by_username(&self, username: &str) -> Option<Account> {
        self.accounts
            .iter()
            .find(|entry| entry.username == username)
            .map(|entry| entry.value().clone())
    }

    /// Delete an account
    ///
    /// # Errors
    /// Fails when the account is unknown or an owner.
    pub async fn delete_account(&self, id: Uuid) -> AccountResult<()> {
        let role = self
            .accounts
            .get(&id)
            .map(|entry| entry.role)
            .ok_or(AccountError::NotFound)?;
        if role.is_owner() {
            return Err(AccountError::OwnerNotDeletable);
        }
        self.accounts.remove(&id);
        self.persist_accounts().await
    }

    /// Check a username / password pair
    #[must_use]
    pub fn verify_credentials(&self, username: &str, password: &str) -> Option<Account> {
        self.account_by_username(username.trim())
            .filter(|account| verify_password(password, &account.password_hash))
    }

    /// Suspend dashboard access for a duration such as `30m` or a number of
    /// milliseconds. A zero duration lifts the suspension.
    ///
    /// # Errors
    /// Fails for unknown accounts, owners, and unparseable durations.
    pub async fn set_web_timeout(&self, id: Uuid, raw_duration: &str) -> AccountResult<AccountView> {
        let millis = duration::parse_millis(raw_duration)
            .ok_or_else(|| AccountError::InvalidDuration(raw_duration.to_string()))?;
        let view = {
            let mut account = self.accounts.get_mut(&id).ok_or(AccountError::NotFound)?;
            if account.role.is_owner() {
                return Err(AccountError::OwnerNotSuspendable);
            }
            account.web_timeout_until = if millis == 0 {
                None
            } else {
                let millis = i64::try_from(millis)
                    .map_err(|_| AccountError::InvalidDuration(raw_duration.to_string()))?;
                Some(Utc::now() + chrono::Duration::milliseconds(millis))
            };
            account.view()
        };
        self.persist_accounts().await?;
        Ok(view)
    }

    /// Remaining suspension for an account in milliseconds
    #[must_use]
    pub fn web_timeout_remaining(&self, id: Uuid) -> Option<u64> {
        self.accounts
            .get(&id)
            .and_then(|account| account.timeout_remaining_ms(Utc::now()))
    }

    /// Accounts currently suspended
    #[must_use]
    pub fn suspended_accounts(&self) -> Vec<AccountView> {
        self.list_accounts()
            .into_iter()
            .filter(|account| account.timeout_remaining_ms > 0)
            .collect()
    }

    /// Create the first owner account when no account exists yet
    ///
    /// # Errors
    /// Fails when the account cannot be created.
    pub async fn seed_owner(&self, username: &str, password: &str) -> AccountResult<bool> {
        if !self.accounts.is_empty() {
            return Ok(false);
        }
        self.create_account(username, password, AccountRole::Owner.as_str())
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing_and_rights() {
        assert_eq!(AccountRole::parse("co-owner"), Some(AccountRole::CoOwner));
        assert_eq!(AccountRole::parse("moderator"), None);
        assert!(AccountRole::Admin.allows_punishments());
        assert!(!AccountRole::Admin.allows_embed_settings());
        assert!(AccountRole::CoOwner.allows_embed_settings());
        assert_eq!(AccountRole::CoOwner.to_string(), "co-owner");
        assert_eq!(
            serde_json::to_string(&AccountRole::CoOwner).unwrap(),
            "\"co-owner\""
        );
    }

    #[tokio::test]
    async fn test_create_and_verify() {
        let data = Data::new();
        let view = data.create_account("alice", "hunter22", "admin").await.unwrap();
        assert_eq!(view.role, AccountRole::Admin);

        assert!(data.verify_credentials("alice", "hunter22").is_some());
        assert!(data.verify_credentials("alice", "wrong").is_none());
        assert!(data.verify_credentials("nobody", "hunter22").is_none());

        // Stored hash is not the password
        let account = data.account(view.id).unwrap();
        assert_ne!(account.password_hash, "hunter22");
    }

    #[tokio::test]
    async fn test_create_validation() {
        let data = Data::new();
        assert!(matches!(
            data.create_account("", "pw", "admin").await,
            Err(AccountError::MissingFields)
        ));
        assert!(matches!(
            data.create_account("bob", "pw", "boss").await,
            Err(AccountError::InvalidRole)
        ));
        assert!(matches!(
            data.create_account("ab", "pw", "admin").await,
            Err(AccountError::InvalidUsername)
        ));
        data.create_account("bob", "pw", "admin").await.unwrap();
        assert!(matches!(
            data.create_account("bob", "pw2", "admin").await,
            Err(AccountError::UsernameTaken)
        ));
    }

    #[tokio::test]
    async fn test_owner_protection() {
        let data = Data::new();
        let owner = data.create_account("root", "pw", "owner").await.unwrap();
        assert!(matches!(
            data.delete_account(owner.id).await,
            Err(AccountError::OwnerNotDeletable)
        ));
        assert!(matches!(
            data.set_web_timeout(owner.id, "30m").await,
            Err(AccountError::OwnerNotSuspendable)
        ));

        let admin = data.create_account("helper", "pw", "admin").await.unwrap();
        data.delete_account(admin.id).await.unwrap();
        assert!(data.account(admin.id).is_none());
        assert!(matches!(
            data.delete_account(admin.id).await,
            Err(AccountError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_web_timeout() {
        let data = Data::new();
        let admin = data.create_account("helper", "pw", "admin").await.unwrap();

        let view = data.set_web_timeout(admin.id, "30m").await.unwrap();
        assert!(view.timeout_remaining_ms > 29 * 60 * 1000);
        assert!(data.web_timeout_remaining(admin.id).is_some());
        assert_eq!(data.suspended_accounts().len(), 1);

        // Zero lifts the suspension
        data.set_web_timeout(admin.id, "0").await.unwrap();
        assert!(data.web_timeout_remaining(admin.id).is_none());

        assert!(matches!(
            data.set_web_timeout(admin.id, "later").await,
            Err(AccountError::InvalidDuration(_))
        ));
    }

    #[tokio::test]
    async fn test_seed_owner_only_once() {
        let data = Data::new();
        assert!(data.seed_owner("root", "pw").await.unwrap());
        assert!(!data.seed_owner("other", "pw").await.unwrap());
        assert_eq!(data.list_accounts().len(), 1);
        assert_eq!(data.list_accounts()[0].role, AccountRole::Owner);
    }
}
