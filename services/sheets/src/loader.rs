//! Google SDK loader
//!
//! Builds the OAuth2 token client and initialises the Sheets REST client.
//! Both are created once; later loads return the same clients.

use async_trait::async_trait;
use auth::{
    ConsentHandler, GoogleOAuthConfig, GoogleTokenClient, IdentityProvider, SdkLoader, TokenSink,
};
use common::{AppConfig, AppError, KeyValueStore, StorageKeys};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

use crate::client::GoogleSheetsClient;

pub struct GoogleSdkLoader {
    oauth: GoogleOAuthConfig,
    consent: Arc<dyn ConsentHandler>,
    store: Arc<dyn KeyValueStore>,
    refresh_key: String,
    identity: OnceCell<Arc<GoogleTokenClient>>,
    sheets: Arc<GoogleSheetsClient>,
}

impl GoogleSdkLoader {
    /// Create a loader for the configured Google project
    pub fn new(
        config: &AppConfig,
        consent: Arc<dyn ConsentHandler>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, AppError> {
        let sheets = GoogleSheetsClient::new(config.api_key.clone()).map_err(|e| {
            AppError::SdkLoad {
                sdk: "spreadsheet client".to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self::with_sheets_client(config, consent, store, Arc::new(sheets)))
    }

    /// Create a loader around an existing spreadsheet client
    pub fn with_sheets_client(
        config: &AppConfig,
        consent: Arc<dyn ConsentHandler>,
        store: Arc<dyn KeyValueStore>,
        sheets: Arc<GoogleSheetsClient>,
    ) -> Self {
        let oauth = GoogleOAuthConfig::new(config.client_id.clone(), config.redirect_url.clone())
            .with_client_secret(config.client_secret.clone());

        Self {
            oauth,
            consent,
            store,
            refresh_key: StorageKeys::new(&config.app_name).refresh_token,
            identity: OnceCell::new(),
            sheets,
        }
    }

    /// The spreadsheet client the session manager activates tokens on
    pub fn sheets_client(&self) -> Arc<GoogleSheetsClient> {
        self.sheets.clone()
    }
}

#[async_trait]
impl SdkLoader for GoogleSdkLoader {
    async fn load_identity(&self) -> Result<Arc<dyn IdentityProvider>, AppError> {
        let client = self
            .identity
            .get_or_try_init(|| async {
                let client = GoogleTokenClient::new(
                    self.oauth.clone(),
                    self.consent.clone(),
                    self.store.clone(),
                    self.refresh_key.clone(),
                )?;
                info!("Google token client created for '{}'", self.oauth.client_id);
                Ok::<_, AppError>(Arc::new(client))
            })
            .await?;

        Ok(client.clone())
    }

    async fn load_sheets(&self) -> Result<Arc<dyn TokenSink>, AppError> {
        self.sheets.init().await.map_err(|e| AppError::SdkLoad {
            sdk: "spreadsheet client".to_string(),
            reason: e.to_string(),
        })?;

        Ok(self.sheets.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auth::ConsentResponse;
    use common::{IdentityError, MemoryStore, StorageBackend};

    struct NoConsent;

    #[async_trait]
    impl ConsentHandler for NoConsent {
        async fn authorize(&self, _url: &str) -> Result<ConsentResponse, IdentityError> {
            Err(IdentityError::Cancelled)
        }
    }

    fn config(client_id: &str) -> AppConfig {
        AppConfig {
            app_name: "test".to_string(),
            api_key: "key".to_string(),
            client_id: client_id.to_string(),
            client_secret: None,
            redirect_url: "http://127.0.0.1:8085/callback".to_string(),
            storage: StorageBackend::Memory,
            data_dir: None,
            redis_url: "redis://localhost:6379".to_string(),
        }
    }

    #[tokio::test]
    async fn test_identity_loads_once() {
        let loader = GoogleSdkLoader::new(
            &config("client"),
            Arc::new(NoConsent),
            Arc::new(MemoryStore::new()),
        )
        .unwrap();

        let first = loader.load_identity().await.unwrap();
        let second = loader.load_identity().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.refresh_key, "test_google_refresh_token");
    }

    #[tokio::test]
    async fn test_missing_client_id_fails_identity_load() {
        let loader = GoogleSdkLoader::new(
            &config(""),
            Arc::new(NoConsent),
            Arc::new(MemoryStore::new()),
        )
        .unwrap();

        let err = loader.load_identity().await.err().unwrap();
        assert!(matches!(err, AppError::SdkLoad { ref sdk, .. } if sdk == "identity client"));
    }

    #[tokio::test]
    async fn test_unreachable_discovery_fails_sheets_load() {
        let sheets = GoogleSheetsClient::new("key")
            .unwrap()
            .with_discovery_url("http://127.0.0.1:9/$discovery/rest");
        let loader = GoogleSdkLoader::with_sheets_client(
            &config("client"),
            Arc::new(NoConsent),
            Arc::new(MemoryStore::new()),
            Arc::new(sheets),
        );

        let err = loader.load_sheets().await.err().unwrap();
        assert!(matches!(err, AppError::SdkLoad { ref sdk, .. } if sdk == "spreadsheet client"));
        assert!(!loader.sheets_client().is_initialized());
    }
}
