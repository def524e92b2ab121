use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{User, UserStore};
use crate::error::{AccountError, AppError, StoreError};

/// User store kept in process memory, keyed by username.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserStore {
    users: Arc<Mutex<HashMap<String, User>>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> AppError {
    StoreError::Unavailable("user map lock poisoned".to_string()).into()
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn insert(&self, user: User) -> Result<(), AppError> {
        let mut users = self.users.lock().map_err(poisoned)?;
        if users.contains_key(&user.username) {
            return Err(AccountError::UsernameTaken.into());
        }
        if users.values().any(|existing| existing.phone == user.phone) {
            return Err(AccountError::PhoneTaken.into());
        }
        users.insert(user.username.clone(), user);
        Ok(())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let users = self.users.lock().map_err(poisoned)?;
        Ok(users.get(username).cloned())
    }
}
