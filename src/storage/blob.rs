//! Row documents and their JSON blob format.
//!
//! Each row is stored as a separate JSON file. Metadata fields use a `_`
//! prefix so they never clash with user columns:
//!
//! ```text
//! {
//!   "_pk": "abc123",
//!   "_version": 1,
//!   "_created_at": "2026-01-01T00:00:00Z",
//!   "_updated_at": "2026-01-01T00:00:00Z",
//!   "name": "abc"
//! }
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::error::{StoreError, StoreResult};
use crate::storage::types::RowKey;

/// A stored row: primary key, version metadata and column values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub key: RowKey,
    /// Bumped on every replacement.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub data: BTreeMap<String, Value>,
}

impl Row {
    /// A fresh row at version 1.
    pub fn new(key: RowKey, data: BTreeMap<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            key,
            version: 1,
            created_at: now,
            updated_at: now,
            data,
        }
    }

    /// Replace the columns, keeping the creation time.
    pub fn replaced(self, data: BTreeMap<String, Value>) -> Self {
        Self {
            version: self.version + 1,
            updated_at: Utc::now(),
            data,
            ..self
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.data.get(column)
    }

    /// The row as it is stored, metadata included.
    pub fn to_value(&self) -> StoreResult<Value> {
        Ok(serde_json::to_value(RowJson::from(self))?)
    }
}

/// Turn a JSON object into row columns.
///
/// Metadata fields (`_`-prefixed) are dropped; the store owns them.
pub fn columns(value: Value) -> StoreResult<BTreeMap<String, Value>> {
    match value {
        Value::Object(map) => Ok(map.into_iter().filter(|(k, _)| !k.starts_with('_')).collect()),
        other => Err(StoreError::InvalidRow(format!(
            "row data must be a JSON object, got {}",
            kind(&other)
        ))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Serialize, Deserialize)]
struct RowJson {
    #[serde(rename = "_pk")]
    pk: RowKey,
    #[serde(rename = "_version")]
    version: u64,
    #[serde(rename = "_created_at")]
    created_at: DateTime<Utc>,
    #[serde(rename = "_updated_at")]
    updated_at: DateTime<Utc>,
    #[serde(flatten)]
    data: BTreeMap<String, Value>,
}

impl From<&Row> for RowJson {
    fn from(row: &Row) -> Self {
        Self {
            pk: row.key.clone(),
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
            data: row.data.clone(),
        }
    }
}

/// Serialize a row to JSON bytes.
///
/// BTreeMap keeps key order stable, so identical rows hash to identical blobs.
pub fn serialize_row(row: &Row) -> StoreResult<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(&RowJson::from(row))?)
}

/// Deserialize a row, checking the stored key against the file name.
pub fn deserialize_row(bytes: &[u8], expected_key: &RowKey) -> StoreResult<Row> {
    let json: RowJson = serde_json::from_slice(bytes)?;

    if &json.pk != expected_key {
        return Err(StoreError::CorruptedData {
            path: expected_key.file_name(),
            reason: format!(
                "primary key mismatch: file name suggests '{}' but content has '{}'",
                expected_key, json.pk
            ),
        });
    }

    Ok(Row {
        key: json.pk,
        version: json.version,
        created_at: json.created_at,
        updated_at: json.updated_at,
        data: json.data,
    })
}
