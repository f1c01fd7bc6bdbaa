//! UI-facing spreadsheet service
//!
//! Wraps the session manager, the spreadsheet client and the two persisted
//! stores. No operation here returns an error: failures land in the status
//! board's last-error slot and the operation yields `None` or `false`.

use auth::{SESSION_EXPIRED_MESSAGE, SessionManager};
use common::{AppError, Operation, Status, StatusBoard};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::client::{SheetsApiError, SpreadsheetClient, Table, UpdateValuesResponse};
use crate::config::SheetsConfigStore;
use crate::dataset::BonusDataStore;

/// Spreadsheet service
#[derive(Clone)]
pub struct SheetsService {
    session: SessionManager,
    client: Arc<dyn SpreadsheetClient>,
    data: BonusDataStore,
    config: SheetsConfigStore,
}

impl SheetsService {
    pub fn new(
        session: SessionManager,
        client: Arc<dyn SpreadsheetClient>,
        data: BonusDataStore,
        config: SheetsConfigStore,
    ) -> Self {
        Self {
            session,
            client,
            data,
            config,
        }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn data(&self) -> &BonusDataStore {
        &self.data
    }

    pub fn config(&self) -> &SheetsConfigStore {
        &self.config
    }

    /// Observable status: signed-in, loading, readiness flags, last error
    pub fn status(&self) -> watch::Receiver<Status> {
        self.session.status()
    }

    fn board(&self) -> &StatusBoard {
        self.session.board()
    }

    pub async fn initialize(&self) {
        self.session.initialize().await;
    }

    pub async fn sign_in(&self) -> bool {
        self.session.sign_in().await
    }

    pub async fn sign_out(&self) {
        self.session.sign_out().await;
    }

    pub fn clear_error(&self) {
        self.session.clear_error();
    }

    /// Read a range. `None` when the session is not usable or the API fails.
    pub async fn get_sheet_data(&self, spreadsheet_id: &str, range: &str) -> Option<Table> {
        self.gated(Operation::GetSheetData, || {
            self.client.get_values(spreadsheet_id, range)
        })
        .await
    }

    /// Overwrite a range with `values`
    pub async fn write_sheet_data(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: &Table,
    ) -> Option<UpdateValuesResponse> {
        self.gated(Operation::WriteSheetData, || {
            self.client.update_values(spreadsheet_id, range, values)
        })
        .await
    }

    /// Run a remote call after the validity check of the same operation.
    ///
    /// The call is never started when the check fails. API errors are
    /// recorded but leave the session alone.
    async fn gated<T, F, Fut>(&self, context: Operation, call: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SheetsApiError>>,
    {
        if !self.session.ensure_valid_token().await {
            warn!("No valid session for {}", context);
            self.board().record_error(
                context,
                AppError::SessionInvalid(SESSION_EXPIRED_MESSAGE.to_string()),
            );
            return None;
        }

        let _loading = self.board().begin_loading();
        match call().await {
            Ok(result) => Some(result),
            Err(e) => {
                self.board().record_error(context, e.into());
                None
            }
        }
    }

    /// Pull the configured range into the dataset as the new baseline
    pub async fn sync_from_sheet(&self) -> bool {
        let config = self.config.get();
        if !config.is_configured() {
            self.board().record_error(
                Operation::GetSheetData,
                AppError::NotConfigured("spreadsheet id".to_string()),
            );
            return false;
        }

        let Some(table) = self
            .get_sheet_data(&config.spreadsheet_id, &config.default_range)
            .await
        else {
            return false;
        };

        match self.data.load_table(&table).await {
            Ok(()) => {
                info!(
                    "Loaded {} rows from {}",
                    table.len().saturating_sub(1),
                    config.default_range
                );
                true
            }
            Err(e) => {
                self.board().record_error(Operation::GetSheetData, e);
                false
            }
        }
    }

    /// Push the working copy to the configured range.
    ///
    /// An empty working copy means there is nothing to write. After a
    /// successful write the exported table becomes the new baseline.
    pub async fn sync_to_sheet(&self) -> bool {
        let config = self.config.get();
        if !config.is_configured() {
            self.board().record_error(
                Operation::WriteSheetData,
                AppError::NotConfigured("spreadsheet id".to_string()),
            );
            return false;
        }

        let table = self.data.export_table();
        if table.is_empty() {
            debug!("Nothing to write");
            return false;
        }

        let Some(response) = self
            .write_sheet_data(&config.spreadsheet_id, &config.default_range, &table)
            .await
        else {
            return false;
        };

        info!(
            "Wrote {} cells to {}",
            response.updated_cells.unwrap_or_default(),
            response
                .updated_range
                .as_deref()
                .unwrap_or(&config.default_range)
        );

        if let Err(e) = self.data.load_table(&table).await {
            self.board().record_error(Operation::WriteSheetData, e);
            return false;
        }
        true
    }
}
