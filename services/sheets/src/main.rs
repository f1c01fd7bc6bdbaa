use anyhow::{Context, Result};
use async_trait::async_trait;
use auth::{ConsentHandler, ConsentResponse, SessionManager};
use common::{AppConfig, IdentityError, StatusBoard, StorageKeys, open_store};
use sheets::{BonusDataStore, GoogleSdkLoader, SheetsConfigStore, SheetsConfigUpdate, SheetsService};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Consent window for a terminal: print the URL, read back the redirect
struct TerminalConsent;

#[async_trait]
impl ConsentHandler for TerminalConsent {
    async fn authorize(&self, authorization_url: &str) -> Result<ConsentResponse, IdentityError> {
        let mut stdout = tokio::io::stdout();
        let prompt = format!(
            "Open this URL in your browser and grant access:\n\n  {authorization_url}\n\n\
             Paste the URL you were redirected to (empty to cancel): "
        );
        stdout
            .write_all(prompt.as_bytes())
            .await
            .map_err(|_| IdentityError::PopupBlocked)?;
        stdout.flush().await.map_err(|_| IdentityError::PopupBlocked)?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .map_err(|_| IdentityError::PopupBlocked)?;

        if line.trim().is_empty() {
            return Err(IdentityError::Cancelled);
        }
        ConsentResponse::from_redirect_url(&line)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    info!("Starting Balanciago");

    let config = AppConfig::from_env().context("loading configuration")?;
    let keys = StorageKeys::new(&config.app_name);
    let store = open_store(&config).await.context("opening storage")?;

    let loader = GoogleSdkLoader::new(&config, Arc::new(TerminalConsent), store.clone())?;
    let client = loader.sheets_client();

    let session = SessionManager::new(
        Arc::new(loader),
        store.clone(),
        keys.token.clone(),
        StatusBoard::new(),
    );
    let data = BonusDataStore::open(store.clone(), keys.dataset.clone()).await;
    let sheets_config = SheetsConfigStore::open(store, keys.config.clone()).await;

    if let Some(spreadsheet_id) = std::env::args().nth(1) {
        sheets_config
            .update(SheetsConfigUpdate {
                spreadsheet_id: Some(spreadsheet_id),
                ..Default::default()
            })
            .await?;
    }

    let service = SheetsService::new(session, client, data, sheets_config);

    service.initialize().await;
    if !service.session().is_signed_in() && !service.sign_in().await {
        report_error(&service);
        anyhow::bail!("Sign-in failed");
    }
    info!("Signed in");

    if !service.sync_from_sheet().await {
        report_error(&service);
        anyhow::bail!("Failed to read spreadsheet");
    }

    let items = service.data().current_data();
    println!("{} items in {}", items.len(), service.config().get().default_range);
    for item in &items {
        println!("  {:<24} {:>10} {}", item.name, item.value, item.category);
    }

    Ok(())
}

fn report_error(service: &SheetsService) {
    let last_error = service.status().borrow().last_error.clone();
    if let Some(last) = last_error {
        warn!("{} failed: {}", last.context, last.error);
        eprintln!("{}", last.error);
    }
}
