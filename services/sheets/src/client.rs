//! Spreadsheet client
//!
//! [`SpreadsheetClient`] is the seam the service talks to. The Google
//! implementation calls the Sheets v4 REST API with the API key on every
//! request and the bearer token once the session manager has activated one.

use async_trait::async_trait;
use auth::TokenSink;
use common::AppError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

/// Rows of cells, row 0 being the header
pub type Table = Vec<Vec<Value>>;

pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com/v4";
pub const DISCOVERY_URL: &str = "https://sheets.googleapis.com/$discovery/rest?version=v4";

/// Error returned by the spreadsheet client
#[derive(Error, Debug)]
pub enum SheetsApiError {
    /// Transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status
    #[error("Sheets API error {status}: {body}")]
    Api { status: u16, body: Value },

    /// A request URL could not be built
    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),
}

impl From<SheetsApiError> for AppError {
    fn from(err: SheetsApiError) -> Self {
        match err {
            SheetsApiError::Api { status, body } => AppError::RemoteApi {
                status: Some(status),
                details: body,
            },
            other => AppError::RemoteApi {
                status: None,
                details: Value::String(other.to_string()),
            },
        }
    }
}

/// Result of a values update
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateValuesResponse {
    #[serde(default)]
    pub spreadsheet_id: Option<String>,
    #[serde(default)]
    pub updated_range: Option<String>,
    #[serde(default)]
    pub updated_rows: Option<u64>,
    #[serde(default)]
    pub updated_columns: Option<u64>,
    #[serde(default)]
    pub updated_cells: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Table,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueRangeBody<'a> {
    range: &'a str,
    major_dimension: &'static str,
    values: &'a Table,
}

/// Spreadsheet values API
#[async_trait]
pub trait SpreadsheetClient: Send + Sync {
    /// Read a range as rows of cells
    async fn get_values(&self, spreadsheet_id: &str, range: &str) -> Result<Table, SheetsApiError>;

    /// Overwrite a range, interpreting cells as if typed by the user
    async fn update_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: &Table,
    ) -> Result<UpdateValuesResponse, SheetsApiError>;
}

/// Google Sheets REST client
pub struct GoogleSheetsClient {
    http: reqwest::Client,
    api_key: String,
    base_url: Url,
    discovery_url: String,
    token: RwLock<Option<String>>,
    initialized: AtomicBool,
}

impl GoogleSheetsClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, SheetsApiError> {
        Ok(Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: Url::parse(DEFAULT_BASE_URL)
                .map_err(|e| SheetsApiError::InvalidUrl(e.to_string()))?,
            discovery_url: DISCOVERY_URL.to_string(),
            token: RwLock::new(None),
            initialized: AtomicBool::new(false),
        })
    }

    /// Point the client at another API root (proxies, emulators)
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, SheetsApiError> {
        self.base_url =
            Url::parse(base_url).map_err(|e| SheetsApiError::InvalidUrl(e.to_string()))?;
        Ok(self)
    }

    pub fn with_discovery_url(mut self, discovery_url: impl Into<String>) -> Self {
        self.discovery_url = discovery_url.into();
        self
    }

    /// Use a custom HTTP client (for connection pool reuse)
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn has_token(&self) -> bool {
        self.token.read().is_some()
    }

    /// Fetch the discovery document, verifying the API key and endpoint.
    ///
    /// Does nothing once the client is initialized.
    pub async fn init(&self) -> Result<(), SheetsApiError> {
        if self.is_initialized() {
            return Ok(());
        }

        let mut url = Url::parse(&self.discovery_url)
            .map_err(|e| SheetsApiError::InvalidUrl(e.to_string()))?;
        if !self.api_key.is_empty() {
            url.query_pairs_mut().append_pair("key", &self.api_key);
        }

        let response = self.http.get(url).send().await?;
        Self::ensure_success(response).await?;

        self.initialized.store(true, Ordering::SeqCst);
        info!("Spreadsheet client initialized");
        Ok(())
    }

    /// `{base}/spreadsheets/{id}/values/{range}?key=...`
    fn values_url(&self, spreadsheet_id: &str, range: &str) -> Result<Url, SheetsApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SheetsApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["spreadsheets", spreadsheet_id, "values", range]);
        if !self.api_key.is_empty() {
            url.query_pairs_mut().append_pair("key", &self.api_key);
        }
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token.read().as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Checks HTTP response status; returns the response on success or the
    /// API's error payload.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, SheetsApiError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        Err(SheetsApiError::Api {
            status,
            body: error_payload(&text),
        })
    }
}

/// Google wraps errors as `{"error": {...}}`; unwrap that when present
fn error_payload(text: &str) -> Value {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(mut map)) => map
            .remove("error")
            .unwrap_or(Value::Object(map)),
        Ok(other) => other,
        Err(_) => Value::String(text.to_string()),
    }
}

impl TokenSink for GoogleSheetsClient {
    fn set_token(&self, token: Option<&str>) {
        *self.token.write() = token.map(str::to_string);
        debug!("Spreadsheet client token {}", if token.is_some() { "set" } else { "cleared" });
    }
}

#[async_trait]
impl SpreadsheetClient for GoogleSheetsClient {
    async fn get_values(&self, spreadsheet_id: &str, range: &str) -> Result<Table, SheetsApiError> {
        let url = self.values_url(spreadsheet_id, range)?;
        debug!("GET {}", url);

        let response = self.authorize(self.http.get(url)).send().await?;
        let response = Self::ensure_success(response).await?;
        let body: ValueRange = response.json().await?;
        Ok(body.values)
    }

    async fn update_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: &Table,
    ) -> Result<UpdateValuesResponse, SheetsApiError> {
        let mut url = self.values_url(spreadsheet_id, range)?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED");
        debug!("PUT {} ({} rows)", url, values.len());

        let body = ValueRangeBody {
            range,
            major_dimension: "ROWS",
            values,
        };
        let response = self.authorize(self.http.put(url).json(&body)).send().await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.json().await?)
    }
}
