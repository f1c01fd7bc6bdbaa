//! Integration tests for the persistence infrastructure
//!
//! These tests verify that the store selected by configuration keeps the
//! three persisted records apart and survives being reopened.

use common::{AppConfig, StorageBackend, StorageKeys, open_store};

fn file_config(dir: &std::path::Path) -> AppConfig {
    AppConfig {
        app_name: "integration".to_string(),
        api_key: String::new(),
        client_id: String::new(),
        client_secret: None,
        redirect_url: "http://127.0.0.1:8085/callback".to_string(),
        storage: StorageBackend::File,
        data_dir: Some(dir.to_path_buf()),
        redis_url: "redis://localhost:6379".to_string(),
    }
}

#[tokio::test]
async fn test_records_are_isolated_and_durable() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let config = file_config(dir.path());
    let keys = StorageKeys::new(&config.app_name);

    let store = open_store(&config).await?;
    store
        .set(&keys.token, r#"{"token":"abc","expiry":1}"#)
        .await?;
    store
        .set(&keys.dataset, r#"{"baseline":[],"working":[]}"#)
        .await?;

    // Reopen as a fresh process would
    let reopened = open_store(&config).await?;
    assert_eq!(
        reopened.get(&keys.token).await?,
        Some(r#"{"token":"abc","expiry":1}"#.to_string())
    );

    // Clearing credentials must not touch the dataset
    reopened.delete(&keys.token).await?;
    assert_eq!(reopened.get(&keys.token).await?, None);
    assert!(reopened.get(&keys.dataset).await?.is_some());
    assert_eq!(reopened.get(&keys.config).await?, None);

    Ok(())
}

#[tokio::test]
async fn test_memory_backend_is_ephemeral() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let mut config = file_config(dir.path());
    config.storage = StorageBackend::Memory;

    let store = open_store(&config).await?;
    store.set("integration-config", "{}").await?;

    let other = open_store(&config).await?;
    assert_eq!(other.get("integration-config").await?, None);
    Ok(())
}
