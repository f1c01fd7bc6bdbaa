//! Persisted token record
//!
//! The durable form of the session. Only the session manager reads or writes
//! it.

use common::{AppError, KeyValueStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Token record stored as `{"token": "...", "expiry": <epoch millis>}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedTokenRecord {
    pub token: String,
    pub expiry: i64,
}

impl PersistedTokenRecord {
    /// Record for a token that lives `expires_in` seconds from `now_millis`
    pub fn from_lifetime(token: String, now_millis: i64, expires_in: u64) -> Self {
        let lifetime_ms = i64::try_from(expires_in)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000);
        Self {
            token,
            expiry: now_millis.saturating_add(lifetime_ms),
        }
    }

    pub fn is_expired(&self, now_millis: i64) -> bool {
        self.expiry <= now_millis
    }
}

/// Reads and writes the token record under its storage key
#[derive(Clone)]
pub struct TokenStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl TokenStore {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the record.
    ///
    /// Returns `Ok(None)` when nothing is stored and
    /// [`AppError::MalformedRecord`] when the stored JSON is unusable.
    pub async fn load(&self) -> Result<Option<PersistedTokenRecord>, AppError> {
        let Some(raw) = self.store.get(&self.key).await? else {
            return Ok(None);
        };

        let record: PersistedTokenRecord =
            serde_json::from_str(&raw).map_err(|e| AppError::MalformedRecord {
                key: self.key.clone(),
                reason: e.to_string(),
            })?;

        if record.token.is_empty() {
            return Err(AppError::MalformedRecord {
                key: self.key.clone(),
                reason: "empty token".to_string(),
            });
        }

        Ok(Some(record))
    }

    pub async fn save(&self, record: &PersistedTokenRecord) -> Result<(), AppError> {
        let json = serde_json::to_string(record).map_err(|e| AppError::Storage(e.to_string()))?;
        self.store.set(&self.key, &json).await?;
        debug!("Persisted token record, expiry {}", record.expiry);
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), AppError> {
        self.store.delete(&self.key).await?;
        Ok(())
    }
}
