use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{SessionRecord, SessionStore};
use crate::error::StoreError;

/// Session store kept in process memory.
///
/// A single lock guards the map, so every operation is atomic with respect to
/// every other. Suitable for tests and single-node development.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionStore {
    records: Arc<Mutex<HashMap<String, SessionRecord>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn records(&self) -> Result<MutexGuard<'_, HashMap<String, SessionRecord>>, StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Unavailable("session map lock poisoned".to_string()))
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn lookup(&self, session_id: &str) -> Result<SessionRecord, StoreError> {
        self.records()?
            .get(session_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn create(&self, record: SessionRecord) -> Result<(), StoreError> {
        let mut records = self.records()?;
        if records.contains_key(&record.session_id) {
            return Err(StoreError::Conflict);
        }
        records.insert(record.session_id.clone(), record);
        Ok(())
    }

    async fn rotate(&self, session_id: &str, new_record: SessionRecord) -> Result<(), StoreError> {
        let mut records = self.records()?;
        if !records.contains_key(session_id) {
            return Err(StoreError::NotFound);
        }
        if new_record.session_id != session_id && records.contains_key(&new_record.session_id) {
            return Err(StoreError::Conflict);
        }
        records.remove(session_id);
        records.insert(new_record.session_id.clone(), new_record);
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        self.records()?.remove(session_id);
        Ok(())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut records = self.records()?;
        let before = records.len();
        records.retain(|_, record| !record.is_expired_at(now));
        Ok((before - records.len()) as u64)
    }
}
