//! Spreadsheet side of the Balanciago editor
//!
//! The Sheets REST client, the baseline/working dataset, the user's sheet
//! settings, the skill tree model and the [`SheetsService`] facade the UI
//! talks to.

pub mod bonus;
pub mod client;
pub mod config;
pub mod dataset;
pub mod loader;
pub mod service;

pub use bonus::{Bonus, BonusTree, Edge, EdgeKind};
pub use client::{
    GoogleSheetsClient, SheetsApiError, SpreadsheetClient, Table, UpdateValuesResponse,
};
pub use config::{SheetsConfig, SheetsConfigStore, SheetsConfigUpdate};
pub use dataset::{BonusData, BonusDataStore, BonusItem};
pub use loader::GoogleSdkLoader;
pub use service::SheetsService;
