use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{User, UserStore};
use crate::error::{AccountError, AppError, StoreError};
use crate::session::store_error;

/// User store backed by the `users` table. The unique constraints on
/// `username` and `phone` decide duplicates.
#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgUserStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

fn insert_error(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &err {
        match db.constraint() {
            Some("users_username_key") => return AccountError::UsernameTaken.into(),
            Some("users_phone_key") => return AccountError::PhoneTaken.into(),
            _ => {}
        }
    }
    store_error(err).into()
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: User) -> Result<(), AppError> {
        let query = sqlx::query(
            r#"
            INSERT INTO users (user_id, username, password_hash, phone, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&user.user_id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.phone)
        .bind(user.created_at)
        .execute(&self.pool);

        match tokio::time::timeout(self.timeout, query).await {
            Ok(result) => result.map(|_| ()).map_err(insert_error),
            Err(_) => {
                tracing::error!(operation = "insert_user", "User store call timed out");
                Err(StoreError::Timeout.into())
            }
        }
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let query = sqlx::query_as::<_, (String, String, String, String, DateTime<Utc>)>(
            r#"
            SELECT user_id, username, password_hash, phone, created_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool);

        let row = match tokio::time::timeout(self.timeout, query).await {
            Ok(result) => result.map_err(store_error)?,
            Err(_) => {
                tracing::error!(operation = "find_user", "User store call timed out");
                return Err(StoreError::Timeout.into());
            }
        };

        Ok(row.map(|(user_id, username, password_hash, phone, created_at)| User {
            user_id,
            username,
            password_hash,
            phone,
            created_at,
        }))
    }
}
