//! Store configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::storage::error::StoreResult;

/// Options for opening a [`GitStore`](crate::storage::GitStore).
///
/// Loadable from JSON; missing fields take their defaults:
///
/// ```text
/// { "path": "./data", "author_name": "billing-service" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the store directory.
    pub path: PathBuf,
    /// Initialize a new store if none exists at `path`.
    pub create_if_missing: bool,
    /// Author recorded on every commit.
    pub author_name: String,
    pub author_email: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".transactor"),
            create_if_missing: true,
            author_name: "transactor".to_string(),
            author_email: "transactor@localhost".to_string(),
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Read a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> StoreResult<Self> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Set the commit author.
    pub fn author(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.author_name = name.into();
        self.author_email = email.into();
        self
    }

    pub(crate) fn signature(&self) -> StoreResult<git2::Signature<'static>> {
        Ok(git2::Signature::now(&self.author_name, &self.author_email)?)
    }
}
