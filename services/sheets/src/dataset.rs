//! Sheet data synchronization
//!
//! Maps a header-plus-rows table onto typed [`BonusItem`]s and keeps two
//! independent copies: the baseline (last loaded) and the working copy
//! (user edits). Pending changes are always recomputed from the two.

use common::{AppError, KeyValueStore};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::Table;

pub const ID_FIELD: &str = "id";
pub const NAME_FIELD: &str = "name";
pub const VALUE_FIELD: &str = "value";
pub const CATEGORY_FIELD: &str = "category";

/// Exported header for the three fixed columns
const FIXED_FIELDS: [&str; 3] = [NAME_FIELD, VALUE_FIELD, CATEGORY_FIELD];

/// One spreadsheet row
///
/// The first three columns are typed; any further column lives in `extra`
/// under its header name, in header order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BonusItem {
    pub id: String,
    pub name: String,
    pub value: f64,
    pub category: String,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl BonusItem {
    /// New item; the id is assigned when it is added to a dataset
    pub fn new(name: impl Into<String>, value: f64, category: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            value,
            category: category.into(),
            extra: IndexMap::new(),
        }
    }

    pub fn with_field(mut self, field: &str, value: Value) -> Self {
        self.set_field(field, value);
        self
    }

    /// Set a field by name. Fixed fields are coerced to their types; the id
    /// cannot be changed this way.
    pub fn set_field(&mut self, field: &str, value: Value) -> bool {
        match field {
            ID_FIELD => return false,
            NAME_FIELD => self.name = cell_to_string(&value),
            VALUE_FIELD => self.value = cell_to_number(&value),
            CATEGORY_FIELD => self.category = cell_to_string(&value),
            _ => {
                self.extra.insert(field.to_string(), value);
            }
        }
        true
    }

    /// Field value as a cell, `None` when the item has no such field
    pub fn field(&self, field: &str) -> Option<Value> {
        match field {
            ID_FIELD => Some(Value::String(self.id.clone())),
            NAME_FIELD => Some(Value::String(self.name.clone())),
            VALUE_FIELD => Some(number_cell(self.value)),
            CATEGORY_FIELD => Some(Value::String(self.category.clone())),
            other => self.extra.get(other).cloned(),
        }
    }

    /// Key-sorted view of every field, used for change detection
    pub fn canonical(&self) -> BTreeMap<&str, Value> {
        let mut map: BTreeMap<&str, Value> = self
            .extra
            .iter()
            .map(|(k, v)| (k.as_str(), v.clone()))
            .collect();
        map.insert(ID_FIELD, Value::String(self.id.clone()));
        map.insert(NAME_FIELD, Value::String(self.name.clone()));
        map.insert(VALUE_FIELD, number_cell(self.value));
        map.insert(CATEGORY_FIELD, Value::String(self.category.clone()));
        map
    }
}

/// Cell as text; empty for missing or null cells
fn cell_to_string(cell: &Value) -> String {
    match cell {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Cell as a number, reading the longest numeric prefix of text cells and
/// falling back to zero
fn cell_to_number(cell: &Value) -> f64 {
    let parsed = match cell {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number_prefix(s),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Single pass over `[sign] digits [. digits] [e [sign] digits]`, keeping
/// the end of the longest complete number seen
fn parse_number_prefix(text: &str) -> Option<f64> {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let skip_digits = |mut i: usize| {
        while bytes.get(i).is_some_and(u8::is_ascii_digit) {
            i += 1;
        }
        i
    };

    let start = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let mut end = skip_digits(start);
    let mut has_digits = end > start;

    if bytes.get(end) == Some(&b'.') {
        let fraction_end = skip_digits(end + 1);
        if has_digits || fraction_end > end + 1 {
            has_digits = true;
            end = fraction_end;
        }
    }
    if !has_digits {
        return None;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exponent = end + 1;
        if matches!(bytes.get(exponent), Some(b'+' | b'-')) {
            exponent += 1;
        }
        let exponent_end = skip_digits(exponent);
        if exponent_end > exponent {
            end = exponent_end;
        }
    }

    text[..end].parse().ok()
}

/// Extra columns paired with the field each loads into. A header repeated
/// among the extras is renamed `<header>_<column>` so no column is lost.
fn extra_columns(fields: &[String]) -> Vec<(usize, String)> {
    let mut seen: HashSet<String> = HashSet::new();
    fields
        .iter()
        .enumerate()
        .skip(FIXED_FIELDS.len())
        .map(|(column, field)| {
            let field = if seen.contains(field.as_str()) {
                let renamed = format!("{field}_{column}");
                warn!(
                    "Duplicate header {:?} in column {}, loading it as {:?}",
                    field, column, renamed
                );
                renamed
            } else {
                field.clone()
            };
            seen.insert(field.clone());
            (column, field)
        })
        .collect()
}

/// Whole numbers export as integers so `1` stays `1` and not `1.0`
fn number_cell(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

/// Baseline and working copy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BonusData {
    #[serde(alias = "initialData", default)]
    baseline: Vec<BonusItem>,
    #[serde(alias = "changesData", default)]
    working: Vec<BonusItem>,
    #[serde(alias = "isTableVisible", default)]
    table_visible: bool,
}

impl BonusData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn baseline(&self) -> &[BonusItem] {
        &self.baseline
    }

    /// The working copy
    pub fn current_data(&self) -> &[BonusItem] {
        &self.working
    }

    pub fn is_table_visible(&self) -> bool {
        self.table_visible
    }

    pub fn toggle_table_visibility(&mut self) {
        self.table_visible = !self.table_visible;
    }

    /// Replace the baseline with `table` and copy it into the working copy.
    ///
    /// Row 0 is the header. Columns 0-2 are name, value and category; later
    /// columns are keyed by their header. Item ids are `item-<row index>`.
    pub fn load_table(&mut self, table: &[Vec<Value>]) {
        let Some((header, rows)) = table.split_first() else {
            self.baseline.clear();
            self.working.clear();
            return;
        };

        let fields: Vec<String> = header.iter().map(cell_to_string).collect();
        let extras = extra_columns(&fields);

        self.baseline = rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                let cell = |i: usize| row.get(i).cloned().unwrap_or(Value::Null);
                let mut item = BonusItem {
                    id: format!("item-{index}"),
                    name: cell_to_string(&cell(0)),
                    value: cell_to_number(&cell(1)),
                    category: cell_to_string(&cell(2)),
                    extra: IndexMap::new(),
                };
                for (column, field) in &extras {
                    let value = match cell(*column) {
                        Value::Null => Value::String(String::new()),
                        v => v,
                    };
                    item.set_field(field, value);
                }
                item
            })
            .collect();

        self.reset();
        debug!("Loaded {} items", self.baseline.len());
    }

    /// Load from an untyped payload that must be an array of arrays
    pub fn load_from_value(&mut self, value: Value) -> Result<(), AppError> {
        let Value::Array(rows) = value else {
            return Err(AppError::MalformedImport(
                "expected an array of rows".to_string(),
            ));
        };

        let table = rows
            .into_iter()
            .enumerate()
            .map(|(index, row)| match row {
                Value::Array(cells) => Ok(cells),
                _ => Err(AppError::MalformedImport(format!(
                    "row {index} is not an array"
                ))),
            })
            .collect::<Result<Table, _>>()?;

        self.load_table(&table);
        Ok(())
    }

    /// Set one field of one working-copy item. Returns whether anything changed.
    pub fn update_field(&mut self, id: &str, field: &str, value: Value) -> bool {
        match self.working.iter_mut().find(|item| item.id == id) {
            Some(item) => item.set_field(field, value),
            None => false,
        }
    }

    /// Append an item to the working copy, assigning a fresh id when the
    /// item has none or its id is taken. Returns the id used.
    pub fn add_item(&mut self, mut item: BonusItem) -> String {
        let taken: HashSet<&str> = self.working.iter().map(|i| i.id.as_str()).collect();
        if item.id.is_empty() || taken.contains(item.id.as_str()) {
            item.id = (self.working.len()..)
                .map(|n| format!("item-{n}"))
                .find(|id| !taken.contains(id.as_str()))
                .unwrap_or_default();
        }
        let id = item.id.clone();
        self.working.push(item);
        id
    }

    /// Remove a working-copy item. Unknown ids are ignored.
    pub fn remove_item(&mut self, id: &str) -> bool {
        match self.working.iter().position(|item| item.id == id) {
            Some(index) => {
                self.working.remove(index);
                true
            }
            None => false,
        }
    }

    /// Discard all working-copy edits
    pub fn reset(&mut self) {
        self.working = self.baseline.clone();
    }

    /// Whether the working copy diverges from the baseline
    pub fn has_changes(&self) -> bool {
        self.baseline.len() != self.working.len()
            || self
                .working
                .iter()
                .zip(&self.baseline)
                .any(|(working, baseline)| working.canonical() != baseline.canonical())
    }

    /// Working copy as a table for writeback.
    ///
    /// The header is the union of all field names except the id: the fixed
    /// fields first, then extra fields in first-seen order. Cells for fields
    /// an item lacks are empty strings. An empty working copy exports as an
    /// empty table.
    pub fn export_table(&self) -> Table {
        if self.working.is_empty() {
            return Vec::new();
        }

        let mut fields: IndexMap<&str, ()> =
            FIXED_FIELDS.iter().map(|f| (*f, ())).collect();
        for item in &self.working {
            for key in item.extra.keys() {
                fields.entry(key.as_str()).or_insert(());
            }
        }

        let header: Vec<Value> = fields
            .keys()
            .map(|f| Value::String(f.to_string()))
            .collect();

        let rows = self.working.iter().map(|item| {
            fields
                .keys()
                .map(|f| item.field(f).unwrap_or_else(|| Value::String(String::new())))
                .collect::<Vec<_>>()
        });

        std::iter::once(header).chain(rows).collect()
    }

    /// Drop both copies and hide the table
    pub fn clear(&mut self) {
        self.baseline.clear();
        self.working.clear();
        self.table_visible = false;
    }
}

/// Persisted, shareable handle on the dataset
///
/// Every mutation is written back under the dataset storage key. Field-level
/// edits from different callers are last-write-wins.
#[derive(Clone)]
pub struct BonusDataStore {
    data: Arc<RwLock<BonusData>>,
    store: Arc<dyn KeyValueStore>,
    key: String,
    persist_lock: Arc<tokio::sync::Mutex<()>>,
}

impl BonusDataStore {
    /// Open the store, restoring any persisted dataset
    pub async fn open(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        let data = match store.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<BonusData>(&raw) {
                Ok(data) => {
                    info!("Restored dataset with {} items", data.working.len());
                    data
                }
                Err(e) => {
                    warn!("Discarding malformed dataset record '{}': {}", key, e);
                    BonusData::default()
                }
            },
            Ok(None) => BonusData::default(),
            Err(e) => {
                warn!("Failed to read dataset record '{}': {}", key, e);
                BonusData::default()
            }
        };

        Self {
            data: Arc::new(RwLock::new(data)),
            store,
            key,
            persist_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Copy of the current dataset
    pub fn snapshot(&self) -> BonusData {
        self.data.read().clone()
    }

    pub fn current_data(&self) -> Vec<BonusItem> {
        self.data.read().working.clone()
    }

    pub fn has_changes(&self) -> bool {
        self.data.read().has_changes()
    }

    pub fn export_table(&self) -> Table {
        self.data.read().export_table()
    }

    pub fn is_table_visible(&self) -> bool {
        self.data.read().is_table_visible()
    }

    pub async fn load_table(&self, table: &[Vec<Value>]) -> Result<(), AppError> {
        self.data.write().load_table(table);
        self.persist().await
    }

    pub async fn load_from_value(&self, value: Value) -> Result<(), AppError> {
        self.data.write().load_from_value(value)?;
        self.persist().await
    }

    pub async fn update_field(&self, id: &str, field: &str, value: Value) -> Result<bool, AppError> {
        let changed = self.data.write().update_field(id, field, value);
        if changed {
            self.persist().await?;
        }
        Ok(changed)
    }

    pub async fn add_item(&self, item: BonusItem) -> Result<String, AppError> {
        let id = self.data.write().add_item(item);
        self.persist().await?;
        Ok(id)
    }

    pub async fn remove_item(&self, id: &str) -> Result<bool, AppError> {
        let removed = self.data.write().remove_item(id);
        if removed {
            self.persist().await?;
        }
        Ok(removed)
    }

    pub async fn reset(&self) -> Result<(), AppError> {
        self.data.write().reset();
        self.persist().await
    }

    pub async fn toggle_table_visibility(&self) -> Result<(), AppError> {
        self.data.write().toggle_table_visibility();
        self.persist().await
    }

    pub async fn clear(&self) -> Result<(), AppError> {
        self.data.write().clear();
        self.persist().await
    }

    /// Write the latest snapshot; writers are serialized so an older
    /// snapshot never lands after a newer one
    async fn persist(&self) -> Result<(), AppError> {
        let _guard = self.persist_lock.lock().await;
        let json = {
            let data = self.data.read();
            serde_json::to_string(&*data).map_err(|e| AppError::Storage(e.to_string()))?
        };
        self.store.set(&self.key, &json).await?;
        Ok(())
    }
}
