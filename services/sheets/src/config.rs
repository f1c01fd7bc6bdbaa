//! User-editable spreadsheet settings
//!
//! Unlike [`common::AppConfig`], which is fixed at deploy time, these values
//! are changed by the user and persisted under the `<app>-config` key.

use common::{AppError, KeyValueStore};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_RANGE: &str = "Sheet1!A1:E10";
pub const DEFAULT_SHEET_NAME: &str = "Sheet1";

/// Spreadsheet target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    pub default_range: String,
    pub sheet_name: String,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            default_range: DEFAULT_RANGE.to_string(),
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
        }
    }
}

impl SheetsConfig {
    /// Whether a spreadsheet has been chosen
    pub fn is_configured(&self) -> bool {
        !self.spreadsheet_id.trim().is_empty()
    }
}

/// Partial update; `None` fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetsConfigUpdate {
    pub spreadsheet_id: Option<String>,
    pub default_range: Option<String>,
    pub sheet_name: Option<String>,
}

impl SheetsConfigUpdate {
    fn apply(self, config: &mut SheetsConfig) {
        if let Some(id) = self.spreadsheet_id {
            config.spreadsheet_id = id;
        }
        if let Some(range) = self.default_range {
            config.default_range = range;
        }
        if let Some(name) = self.sheet_name {
            config.sheet_name = name;
        }
    }
}

/// Persisted handle on the spreadsheet settings
#[derive(Clone)]
pub struct SheetsConfigStore {
    config: Arc<RwLock<SheetsConfig>>,
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl SheetsConfigStore {
    /// Open the store, falling back to defaults when nothing usable is stored
    pub async fn open(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        let config = match store.get(&key).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Discarding malformed config record '{}': {}", key, e);
                SheetsConfig::default()
            }),
            Ok(None) => SheetsConfig::default(),
            Err(e) => {
                warn!("Failed to read config record '{}': {}", key, e);
                SheetsConfig::default()
            }
        };

        Self {
            config: Arc::new(RwLock::new(config)),
            store,
            key,
        }
    }

    pub fn get(&self) -> SheetsConfig {
        self.config.read().clone()
    }

    pub async fn update(&self, update: SheetsConfigUpdate) -> Result<SheetsConfig, AppError> {
        let config = {
            let mut config = self.config.write();
            update.apply(&mut config);
            config.clone()
        };
        self.persist(&config).await?;
        info!("Sheets config updated (spreadsheet '{}')", config.spreadsheet_id);
        Ok(config)
    }

    pub async fn reset(&self) -> Result<(), AppError> {
        let config = SheetsConfig::default();
        *self.config.write() = config.clone();
        self.persist(&config).await
    }

    async fn persist(&self, config: &SheetsConfig) -> Result<(), AppError> {
        let json = serde_json::to_string(config).map_err(|e| AppError::Storage(e.to_string()))?;
        self.store.set(&self.key, &json).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::MemoryStore;

    #[tokio::test]
    async fn test_defaults_when_nothing_stored() {
        let store = SheetsConfigStore::open(Arc::new(MemoryStore::new()), "app-config").await;
        let config = store.get();
        assert_eq!(config.spreadsheet_id, "");
        assert_eq!(config.default_range, "Sheet1!A1:E10");
        assert_eq!(config.sheet_name, "Sheet1");
        assert!(!config.is_configured());
    }

    #[tokio::test]
    async fn test_partial_update_persists() {
        let memory = MemoryStore::new();
        let store = SheetsConfigStore::open(Arc::new(memory.clone()), "app-config").await;

        store
            .update(SheetsConfigUpdate {
                spreadsheet_id: Some("abc123".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let raw = memory.get("app-config").await.unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["spreadsheetId"], "abc123");
        assert_eq!(json["defaultRange"], "Sheet1!A1:E10");

        let reopened = SheetsConfigStore::open(Arc::new(memory), "app-config").await;
        assert_eq!(reopened.get().spreadsheet_id, "abc123");
        assert!(reopened.get().is_configured());
    }

    #[tokio::test]
    async fn test_reset_restores_defaults() {
        let memory = MemoryStore::new();
        let store = SheetsConfigStore::open(Arc::new(memory.clone()), "app-config").await;
        store
            .update(SheetsConfigUpdate {
                sheet_name: Some("Bonuses".to_string()),
                default_range: Some("Bonuses!A1:F50".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        store.reset().await.unwrap();
        assert_eq!(store.get(), SheetsConfig::default());
    }

    #[tokio::test]
    async fn test_missing_fields_take_defaults() {
        let memory = MemoryStore::new();
        memory
            .set("app-config", r#"{"spreadsheetId":"xyz"}"#)
            .await
            .unwrap();

        let store = SheetsConfigStore::open(Arc::new(memory), "app-config").await;
        let config = store.get();
        assert_eq!(config.spreadsheet_id, "xyz");
        assert_eq!(config.sheet_name, "Sheet1");
    }

    #[tokio::test]
    async fn test_malformed_record_falls_back_to_defaults() {
        let memory = MemoryStore::new();
        memory.set("app-config", "not json").await.unwrap();

        let store = SheetsConfigStore::open(Arc::new(memory), "app-config").await;
        assert_eq!(store.get(), SheetsConfig::default());
    }
}
