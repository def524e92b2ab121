/// Session Records
///
/// One record per live refresh token. The raw refresh token is never stored,
/// only its fingerprint.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;

mod memory;
mod postgres;
pub mod sweeper;

pub use memory::InMemorySessionStore;
pub use postgres::PgSessionStore;
pub(crate) use postgres::store_error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: String,
    pub refresh_fingerprint: String,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Persistence for session records.
///
/// Implementations must make `rotate` indivisible per `session_id`: of two
/// concurrent rotations of the same id exactly one succeeds, and a sweep never
/// deletes a record mid-rotation. Operations are never retried internally.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Point lookup; `StoreError::NotFound` when absent.
    async fn lookup(&self, session_id: &str) -> Result<SessionRecord, StoreError>;

    /// Insert; `StoreError::Conflict` if the id is already present.
    async fn create(&self, record: SessionRecord) -> Result<(), StoreError>;

    /// Replace the record for `session_id` with `new_record` in one step.
    ///
    /// `NotFound` if `session_id` is gone (already rotated, deleted, swept),
    /// `Conflict` if `new_record`'s id is taken; the old record then survives.
    async fn rotate(&self, session_id: &str, new_record: SessionRecord) -> Result<(), StoreError>;

    /// Idempotent removal.
    async fn delete(&self, session_id: &str) -> Result<(), StoreError>;

    /// Delete every record with `expires_at <= now`, returning how many went.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}
