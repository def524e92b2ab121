/// User Accounts
///
/// Signup and credential checks. Users live in their own store, apart from
/// session records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::PasswordHasher;
use crate::error::{AccountError, AppError, AuthError, ValidationError};

mod memory;
mod postgres;

pub use memory::InMemoryUserStore;
pub use postgres::PgUserStore;

const MAX_USERNAME_LENGTH: usize = 64;
const MAX_PHONE_LENGTH: usize = 32;
/// bcrypt ignores everything past 72 bytes
const MAX_PASSWORD_LENGTH: usize = 72;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub user_id: String,
    pub username: String,
    pub password_hash: String,
    pub phone: String,
    pub created_at: DateTime<Utc>,
}

/// Signup input as received from the client
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub phone: String,
}

/// Persistence for user accounts.
///
/// `insert` must enforce uniqueness of both `username` and `phone`, reporting
/// `AccountError::UsernameTaken` / `AccountError::PhoneTaken`.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: User) -> Result<(), AppError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError>;
}

fn check_field(name: &str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField(name.to_string()));
    }
    if value.len() > max {
        return Err(ValidationError::TooLong(name.to_string(), max));
    }
    Ok(())
}

impl NewUser {
    fn validate(&self) -> Result<(), ValidationError> {
        check_field("username", &self.username, MAX_USERNAME_LENGTH)?;
        check_field("password", &self.password, MAX_PASSWORD_LENGTH)?;
        check_field("phone", &self.phone, MAX_PHONE_LENGTH)?;
        if !self.phone.chars().all(|c| c.is_ascii_digit() || c == '+' || c == '-') {
            return Err(ValidationError::InvalidFormat("phone".to_string()));
        }
        Ok(())
    }
}

/// Create a user account and return it.
///
/// A username lookup runs before the slow hash so obvious duplicates fail
/// fast; the store's uniqueness check on insert is what actually decides.
pub async fn signup(
    store: &dyn UserStore,
    hasher: PasswordHasher,
    new_user: NewUser,
) -> Result<User, AppError> {
    new_user.validate()?;

    if store.find_by_username(&new_user.username).await?.is_some() {
        return Err(AccountError::UsernameTaken.into());
    }

    let password = new_user.password;
    let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&password)).await??;

    let user = User {
        user_id: Uuid::new_v4().to_string(),
        username: new_user.username,
        password_hash,
        phone: new_user.phone,
        created_at: Utc::now(),
    };
    store.insert(user.clone()).await?;

    tracing::info!(user_id = %user.user_id, username = %user.username, "User signed up");
    Ok(user)
}

/// Check a username/password pair.
///
/// Unknown user and wrong password are indistinguishable to the caller.
pub async fn verify_credentials(
    store: &dyn UserStore,
    hasher: PasswordHasher,
    username: &str,
    password: &str,
) -> Result<User, AppError> {
    if username.is_empty() || password.is_empty() {
        return Err(AuthError::InvalidCredentials.into());
    }

    let user = match store.find_by_username(username).await? {
        Some(user) => user,
        None => {
            tracing::debug!(username = %username, "Login for unknown username");
            return Err(AuthError::InvalidCredentials.into());
        }
    };

    let password = password.to_string();
    let stored = user.password_hash.clone();
    let matches =
        tokio::task::spawn_blocking(move || hasher.verify(&password, &stored)).await??;
    if !matches {
        return Err(AuthError::InvalidCredentials.into());
    }
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MIN_COST;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(MIN_COST)
    }

    fn new_user(username: &str, phone: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            password: "hunter2".to_string(),
            phone: phone.to_string(),
        }
    }

    #[tokio::test]
    async fn test_signup_then_login() {
        let store = InMemoryUserStore::new();
        let user = signup(&store, hasher(), new_user("alice", "010-1234-5678"))
            .await
            .expect("Failed to sign up");

        assert_ne!(user.password_hash, "hunter2");

        let logged_in = verify_credentials(&store, hasher(), "alice", "hunter2")
            .await
            .expect("Failed to verify credentials");
        assert_eq!(logged_in.user_id, user.user_id);
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_user_look_alike() {
        let store = InMemoryUserStore::new();
        signup(&store, hasher(), new_user("alice", "0101")).await.unwrap();

        let wrong = verify_credentials(&store, hasher(), "alice", "hunter3").await;
        let unknown = verify_credentials(&store, hasher(), "bob", "hunter2").await;

        assert!(matches!(wrong, Err(AppError::Auth(AuthError::InvalidCredentials))));
        assert!(matches!(unknown, Err(AppError::Auth(AuthError::InvalidCredentials))));
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let store = InMemoryUserStore::new();
        signup(&store, hasher(), new_user("alice", "0101")).await.unwrap();

        let result = signup(&store, hasher(), new_user("alice", "0202")).await;
        assert!(matches!(result, Err(AppError::Account(AccountError::UsernameTaken))));
    }

    #[tokio::test]
    async fn test_duplicate_phone_rejected_without_write() {
        let store = InMemoryUserStore::new();
        signup(&store, hasher(), new_user("alice", "0101")).await.unwrap();

        let result = signup(&store, hasher(), new_user("bob", "0101")).await;
        assert!(matches!(result, Err(AppError::Account(AccountError::PhoneTaken))));
        assert!(store.find_by_username("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_fields_rejected() {
        let store = InMemoryUserStore::new();
        let cases = [
            new_user("", "0101"),
            new_user("alice", ""),
            NewUser {
                username: "alice".to_string(),
                password: "   ".to_string(),
                phone: "0101".to_string(),
            },
        ];

        for case in cases {
            let result = signup(&store, hasher(), case).await;
            assert!(matches!(
                result,
                Err(AppError::Validation(ValidationError::EmptyField(_)))
            ));
        }
    }

    #[tokio::test]
    async fn test_overlong_password_rejected() {
        let store = InMemoryUserStore::new();
        let mut user = new_user("alice", "0101");
        user.password = "a".repeat(MAX_PASSWORD_LENGTH + 1);

        let result = signup(&store, hasher(), user).await;
        assert!(matches!(
            result,
            Err(AppError::Validation(ValidationError::TooLong(_, MAX_PASSWORD_LENGTH)))
        ));
    }

    #[tokio::test]
    async fn test_malformed_phone_rejected() {
        let store = InMemoryUserStore::new();
        let result = signup(&store, hasher(), new_user("alice", "call me")).await;
        assert!(matches!(
            result,
            Err(AppError::Validation(ValidationError::InvalidFormat(_)))
        ));
    }
}
